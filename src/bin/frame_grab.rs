//! frame_grab - save JPEG frames from a frame server to a directory

use anyhow::{Context, Result};
use clap::Parser;
use std::fs;
use std::path::PathBuf;

use ttc_avoider::transport::{decode_jpeg, FrameClient};

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Frame server address.
    #[arg(long, default_value = "127.0.0.1:11111")]
    addr: String,
    /// Output directory for received frames.
    #[arg(long, default_value = "frames_out")]
    out: PathBuf,
    /// Stop after this many frames.
    #[arg(long, default_value_t = 100)]
    count: u64,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    fs::create_dir_all(&args.out)
        .with_context(|| format!("create output directory {}", args.out.display()))?;
    let mut client = FrameClient::connect(&args.addr)?;
    log::info!("connected to {}", args.addr);

    let mut saved = 0u64;
    while saved < args.count {
        let Some(jpeg) = client.next_frame()? else {
            log::info!("frame server closed the stream");
            break;
        };
        let image = decode_jpeg(&jpeg)?;
        let path = args.out.join(format!("frame_{:06}.jpg", saved));
        fs::write(&path, &jpeg).with_context(|| format!("write {}", path.display()))?;
        log::debug!("{} ({}x{})", path.display(), image.width(), image.height());
        saved += 1;
    }
    log::info!("saved {} frames to {}", saved, args.out.display());
    Ok(())
}
