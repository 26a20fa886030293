//! Replay a captured spyglass session log to viewers.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use clap::Parser;

use spyglass::{ReplayConfig, ReplayServer, read_log};

/// Serve a captured session log over WebSocket
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Cli {
    /// Path to the captured session log
    #[arg(value_hint = clap::ValueHint::FilePath)]
    log: PathBuf,

    /// Network interface to bind
    #[arg(long, default_value = "127.0.0.1")]
    host: String,

    /// Port number to listen on
    #[arg(short, long, default_value_t = 8120)]
    port: u16,

    /// Delay between frames in milliseconds
    #[arg(short, long, default_value_t = 300)]
    interval: u64,

    /// Enable debug output
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    spyglass::logger::set_verbose(cli.verbose);

    let frames = read_log(&cli.log)?;
    if frames.is_empty() {
        anyhow::bail!("log file `{}` contains no frames", cli.log.display());
    }

    let _server = ReplayServer::start(
        frames,
        ReplayConfig {
            host: cli.host,
            port: cli.port,
            interval: Duration::from_millis(cli.interval),
        },
    )?;

    // Connections are served on their own threads; park the main thread
    loop {
        std::thread::sleep(Duration::from_secs(60));
    }
}
