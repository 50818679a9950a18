//! ttc_watch - print TTC triples and steering hints from a TTC server

use anyhow::Result;
use clap::Parser;

use ttc_avoider::transport::{TtcClient, TtcEncoding};

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// TTC server address.
    #[arg(long, default_value = "127.0.0.1:22222")]
    addr: String,
    /// Wire encoding the server publishes with.
    #[arg(long, default_value = "binary")]
    encoding: TtcEncoding,
    /// Stop after this many triples.
    #[arg(long)]
    count: Option<u64>,
}

fn format_ttc(value: f64) -> String {
    if value.is_infinite() {
        "inf".to_string()
    } else {
        format!("{:.3}s", value)
    }
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let mut client = TtcClient::connect(&args.addr, args.encoding)?;
    log::info!("connected to {}", args.addr);

    let mut received = 0u64;
    while let Some(triple) = client.next_triple()? {
        received += 1;
        println!(
            "min={} left={} right={} steer={:?}",
            format_ttc(triple.min),
            format_ttc(triple.left),
            format_ttc(triple.right),
            triple.balance_hint().steer()
        );
        if args.count.is_some_and(|count| received >= count) {
            break;
        }
    }
    log::info!("received {} triples", received);
    Ok(())
}
