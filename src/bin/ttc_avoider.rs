//! ttc_avoider - camera to TTC distribution daemon
//!
//! This daemon:
//! 1. Loads configuration (`TTC_CONFIG` file plus `TTC_*` overrides)
//! 2. Starts the frame and TTC push servers
//! 3. Runs the avoider until Ctrl-C or the camera stream ends

use anyhow::{anyhow, Result};
use clap::Parser;
use std::sync::mpsc;
use std::time::Duration;

use ttc_avoider::{
    transport::{FrameServer, TtcEncoding, TtcServer},
    Avoider, AvoiderConfig, CameraSource, NetworkSink, TrackerBackend,
};

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Camera URL (`stub://<name>`, device index, or stream URL). Overrides config.
    #[arg(long)]
    camera: Option<String>,
    /// TTC wire encoding (binary or json). Overrides config.
    #[arg(long)]
    encoding: Option<TtcEncoding>,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let mut config = AvoiderConfig::load()?;
    if let Some(camera) = args.camera {
        config.camera.url = camera;
    }
    if let Some(encoding) = args.encoding {
        config.servers.ttc_encoding = encoding;
    }
    config.validate()?;

    let frame_server = FrameServer::spawn(&config.servers.frame_addr, config.servers.jpeg_quality)?;
    let ttc_server = TtcServer::spawn(&config.servers.ttc_addr, config.servers.ttc_encoding)?;
    log::info!(
        "serving frames on {} and ttc ({:?}) on {}",
        frame_server.addr(),
        ttc_server.encoding(),
        ttc_server.addr()
    );

    let source = CameraSource::new(config.camera.clone())?;
    let tracker = TrackerBackend::for_camera_url(
        &config.camera.url,
        &config.camera.scene(),
        config.features.clone(),
        config.tracking.clone(),
    )?;
    let sink = NetworkSink::new(frame_server.publisher(), ttc_server.publisher());
    let handle = Avoider::spawn(&config, Box::new(source), Box::new(tracker), Box::new(sink))?;

    let (tx, rx) = mpsc::channel();
    ctrlc::set_handler(move || {
        let _ = tx.send(());
    })
    .map_err(|e| anyhow!("error setting Ctrl-C handler: {}", e))?;

    log::info!("ttc_avoider running on {} (Ctrl-C to stop)", config.camera.url);
    loop {
        match rx.recv_timeout(Duration::from_millis(200)) {
            Ok(()) => {
                log::info!("shutdown signal received, stopping avoider...");
                break;
            }
            Err(mpsc::RecvTimeoutError::Timeout) if !handle.is_finished() => continue,
            Err(_) => break,
        }
    }
    let result = handle.stop();
    frame_server.stop()?;
    ttc_server.stop()?;
    result
}
