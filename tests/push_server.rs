use std::io::BufReader;
use std::net::TcpStream;
use std::time::{Duration, Instant};

use image::{Rgb, RgbImage};

use ttc_avoider::transport::{
    read_frame, FrameClient, FrameServer, PushHandle, PushServer, TtcClient, TtcEncoding,
    TtcServer,
};
use ttc_avoider::TtcTriple;

const READ_TIMEOUT: Duration = Duration::from_secs(5);

fn spawn_server() -> PushHandle {
    PushServer::bind("127.0.0.1:0", "test")
        .expect("bind")
        .spawn()
        .expect("spawn")
}

fn subscribe(handle: &PushHandle) -> BufReader<TcpStream> {
    let stream = TcpStream::connect(handle.addr).expect("connect");
    stream.set_read_timeout(Some(READ_TIMEOUT)).unwrap();
    BufReader::new(stream)
}

fn wait_for_subscribers(count: impl Fn() -> usize, expected: usize) {
    let deadline = Instant::now() + READ_TIMEOUT;
    while count() != expected {
        assert!(Instant::now() < deadline, "expected {} subscribers", expected);
        std::thread::sleep(Duration::from_millis(10));
    }
}

/// Read until `expected` arrives; intermediate payloads may be skipped but never reordered.
fn read_until(reader: &mut BufReader<TcpStream>, expected: &[u8]) -> usize {
    let mut seen = 0;
    loop {
        let payload = read_frame(reader).unwrap().expect("stream open");
        seen += 1;
        if payload == expected {
            return seen;
        }
    }
}

#[test]
fn late_subscriber_receives_existing_payload() {
    let handle = spawn_server();
    assert_eq!(handle.publish(b"payload-a".to_vec()), 1);

    let mut reader = subscribe(&handle);
    let payload = read_frame(&mut reader).unwrap();
    assert_eq!(payload, Some(b"payload-a".to_vec()));

    handle.stop().unwrap();
}

#[test]
fn every_session_observes_latest_payload() {
    let handle = spawn_server();
    let mut readers: Vec<_> = (0..4).map(|_| subscribe(&handle)).collect();
    wait_for_subscribers(|| handle.subscriber_count(), 4);

    for i in 0..20 {
        handle.publish(format!("tick-{}", i).into_bytes());
    }
    for reader in &mut readers {
        let seen = read_until(reader, b"tick-19");
        assert!((1..=20).contains(&seen));
    }

    handle.stop().unwrap();
}

#[test]
fn dropped_session_does_not_affect_others() {
    let handle = spawn_server();
    let mut survivor = subscribe(&handle);
    let dropped = subscribe(&handle);
    wait_for_subscribers(|| handle.subscriber_count(), 2);

    drop(dropped);
    let deadline = Instant::now() + READ_TIMEOUT;
    let mut tick = 0u64;
    while handle.subscriber_count() != 1 {
        assert!(Instant::now() < deadline, "dropped session was never removed");
        handle.publish(format!("tick-{}", tick).into_bytes());
        tick += 1;
        std::thread::sleep(Duration::from_millis(10));
    }

    handle.publish(b"after-drop".to_vec());
    read_until(&mut survivor, b"after-drop");

    handle.stop().unwrap();
}

#[test]
fn ttc_channel_delivers_triples_in_both_encodings() {
    for encoding in [TtcEncoding::Binary, TtcEncoding::Json] {
        let server = TtcServer::spawn("127.0.0.1:0", encoding).unwrap();
        let publisher = server.publisher();
        publisher
            .publish(&TtcTriple {
                min: 1.5,
                left: -2.0,
                right: f64::INFINITY,
            })
            .unwrap();

        let mut client = TtcClient::connect(server.addr(), encoding).unwrap();
        client.set_read_timeout(Some(READ_TIMEOUT)).unwrap();
        let triple = client.next_triple().unwrap().expect("triple");
        assert!((triple.min - 1.5).abs() < 1e-9);
        assert_eq!(triple.left, f64::INFINITY);
        assert_eq!(triple.right, f64::INFINITY);

        server.stop().unwrap();
    }
}

#[test]
fn binary_client_treats_wrong_length_as_end_of_stream() {
    let handle = spawn_server();
    handle.publish(vec![0u8; 10]);

    let mut client = TtcClient::connect(handle.addr, TtcEncoding::Binary).unwrap();
    client.set_read_timeout(Some(READ_TIMEOUT)).unwrap();
    assert_eq!(client.next_triple().unwrap(), None);

    handle.stop().unwrap();
}

#[test]
fn binary_client_treats_unknown_sentinel_as_end_of_stream() {
    let handle = spawn_server();
    let mut payload = vec![0u8; 27];
    payload[0] = 2;
    handle.publish(payload);

    let mut client = TtcClient::connect(handle.addr, TtcEncoding::Binary).unwrap();
    client.set_read_timeout(Some(READ_TIMEOUT)).unwrap();
    assert_eq!(client.next_triple().unwrap(), None);

    handle.stop().unwrap();
}

#[test]
fn json_client_treats_garbage_as_end_of_stream() {
    let handle = spawn_server();
    handle.publish(b"{not json".to_vec());

    let mut client = TtcClient::connect(handle.addr, TtcEncoding::Json).unwrap();
    client.set_read_timeout(Some(READ_TIMEOUT)).unwrap();
    assert_eq!(client.next_triple().unwrap(), None);

    handle.stop().unwrap();
}

#[test]
fn huge_finite_ttc_still_publishes_triple() {
    let server = TtcServer::spawn("127.0.0.1:0", TtcEncoding::Binary).unwrap();
    server
        .publisher()
        .publish(&TtcTriple {
            min: 1.0,
            left: 5e9,
            right: 2.0,
        })
        .unwrap();

    let mut client = TtcClient::connect(server.addr(), TtcEncoding::Binary).unwrap();
    client.set_read_timeout(Some(READ_TIMEOUT)).unwrap();
    let triple = client.next_triple().unwrap().expect("triple");
    assert_eq!(triple.min, 1.0);
    assert_eq!(triple.left, f64::INFINITY);
    assert_eq!(triple.right, 2.0);

    server.stop().unwrap();
}

#[test]
fn frame_channel_delivers_jpeg() {
    let server = FrameServer::spawn("127.0.0.1:0", 80).unwrap();
    let frame = RgbImage::from_pixel(64, 48, Rgb([30, 90, 150]));
    server.publisher().publish(&frame).unwrap();

    let mut client = FrameClient::connect(server.addr()).unwrap();
    client.set_read_timeout(Some(READ_TIMEOUT)).unwrap();
    let jpeg = client.next_frame().unwrap().expect("frame");
    let decoded = ttc_avoider::transport::decode_jpeg(&jpeg).unwrap();
    assert_eq!(decoded.dimensions(), (64, 48));

    server.stop().unwrap();
}
