//! Frame and TTC channels built on the push server, plus their clients.

use anyhow::{Context, Result};
use image::codecs::jpeg::JpegEncoder;
use image::{ExtendedColorType, ImageEncoder, RgbImage};
use std::io::BufReader;
use std::net::{SocketAddr, TcpStream, ToSocketAddrs};
use std::time::Duration;

use super::codec::{TtcEncoding, FINITE_LIMIT};
use super::framing::read_frame;
use super::push::{PushHandle, PushServer, Publisher};
use crate::ttc::TtcTriple;

pub const DEFAULT_FRAME_ADDR: &str = "0.0.0.0:11111";
pub const DEFAULT_TTC_ADDR: &str = "0.0.0.0:22222";
pub const DEFAULT_JPEG_QUALITY: u8 = 80;

pub fn encode_jpeg(image: &RgbImage, quality: u8) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    JpegEncoder::new_with_quality(&mut out, quality.clamp(1, 100))
        .write_image(
            image.as_raw(),
            image.width(),
            image.height(),
            ExtendedColorType::Rgb8,
        )
        .context("encode jpeg")?;
    Ok(out)
}

pub fn decode_jpeg(bytes: &[u8]) -> Result<RgbImage> {
    let image = image::load_from_memory(bytes).context("decode jpeg")?;
    Ok(image.into_rgb8())
}

/// Map a triple onto values the TTC channel can carry. A negative finite TTC means the
/// region is expanding, which is reported as no approach. TTCs past the binary range
/// saturate to +inf so the other two values still go out.
pub fn wire_triple(triple: &TtcTriple) -> TtcTriple {
    let clamp = |v: f64| {
        if v.is_finite() && (0.0..FINITE_LIMIT).contains(&v) {
            v
        } else {
            f64::INFINITY
        }
    };
    TtcTriple {
        min: clamp(triple.min),
        left: clamp(triple.left),
        right: clamp(triple.right),
    }
}

/// Publishes annotated frames as JPEG.
pub struct FrameServer {
    handle: PushHandle,
    quality: u8,
}

impl FrameServer {
    pub fn spawn<A: ToSocketAddrs>(addr: A, quality: u8) -> Result<Self> {
        let handle = PushServer::bind(addr, "frame")?.spawn()?;
        Ok(Self { handle, quality })
    }

    pub fn addr(&self) -> SocketAddr {
        self.handle.addr
    }

    pub fn publisher(&self) -> FramePublisher {
        FramePublisher {
            publisher: self.handle.publisher(),
            quality: self.quality,
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.handle.subscriber_count()
    }

    pub fn stop(self) -> Result<()> {
        self.handle.stop()
    }
}

#[derive(Clone, Debug)]
pub struct FramePublisher {
    publisher: Publisher,
    quality: u8,
}

impl FramePublisher {
    pub fn publish(&self, frame: &RgbImage) -> Result<u64> {
        let jpeg = encode_jpeg(frame, self.quality)?;
        Ok(self.publisher.publish(jpeg))
    }
}

/// Publishes TTC triples in the configured encoding.
pub struct TtcServer {
    handle: PushHandle,
    encoding: TtcEncoding,
}

impl TtcServer {
    pub fn spawn<A: ToSocketAddrs>(addr: A, encoding: TtcEncoding) -> Result<Self> {
        let handle = PushServer::bind(addr, "ttc")?.spawn()?;
        Ok(Self { handle, encoding })
    }

    pub fn addr(&self) -> SocketAddr {
        self.handle.addr
    }

    pub fn encoding(&self) -> TtcEncoding {
        self.encoding
    }

    pub fn publisher(&self) -> TtcPublisher {
        TtcPublisher {
            publisher: self.handle.publisher(),
            encoding: self.encoding,
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.handle.subscriber_count()
    }

    pub fn stop(self) -> Result<()> {
        self.handle.stop()
    }
}

#[derive(Clone, Debug)]
pub struct TtcPublisher {
    publisher: Publisher,
    encoding: TtcEncoding,
}

impl TtcPublisher {
    pub fn publish(&self, triple: &TtcTriple) -> Result<u64> {
        let payload = self.encoding.encode(&wire_triple(triple))?;
        Ok(self.publisher.publish(payload))
    }
}

pub struct FrameClient {
    reader: BufReader<TcpStream>,
}

impl FrameClient {
    pub fn connect<A: ToSocketAddrs>(addr: A) -> Result<Self> {
        let stream = TcpStream::connect(addr).context("connect to frame server")?;
        Ok(Self {
            reader: BufReader::new(stream),
        })
    }

    pub fn set_read_timeout(&self, timeout: Option<Duration>) -> Result<()> {
        Ok(self.reader.get_ref().set_read_timeout(timeout)?)
    }

    /// Next JPEG payload, or `None` once the server closes the stream.
    pub fn next_frame(&mut self) -> Result<Option<Vec<u8>>> {
        read_frame(&mut self.reader)
    }
}

pub struct TtcClient {
    reader: BufReader<TcpStream>,
    encoding: TtcEncoding,
}

impl TtcClient {
    pub fn connect<A: ToSocketAddrs>(addr: A, encoding: TtcEncoding) -> Result<Self> {
        let stream = TcpStream::connect(addr).context("connect to ttc server")?;
        Ok(Self {
            reader: BufReader::new(stream),
            encoding,
        })
    }

    pub fn set_read_timeout(&self, timeout: Option<Duration>) -> Result<()> {
        Ok(self.reader.get_ref().set_read_timeout(timeout)?)
    }

    /// Next triple, or `None` at end-of-stream. A payload that does not decode in the
    /// client's encoding also ends the stream.
    pub fn next_triple(&mut self) -> Result<Option<TtcTriple>> {
        let Some(payload) = read_frame(&mut self.reader)? else {
            return Ok(None);
        };
        match self.encoding.decode(&payload) {
            Ok(triple) => Ok(Some(triple)),
            Err(err) => {
                log::warn!(
                    "malformed ttc payload of {} bytes ({:#}); closing stream",
                    payload.len(),
                    err
                );
                Ok(None)
            }
        }
    }
}
