//! wavetone - play a looping WAVE file, or a sine tone when there is none.
//!
//! ```bash
//! wavetone --source loop.wav --duration 10
//! wavetone --config wavetone.toml --frequency 440
//! RUST_LOG=debug wavetone --mute
//! ```

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;

use wavetone::playback::{AudioDevice, StreamSession};
use wavetone::EngineConfig;

#[derive(Parser)]
#[command(name = "wavetone")]
#[command(author, version, about = "Ring-buffered WAVE player with a sine tone fallback")]
struct Args {
    /// TOML configuration file
    #[arg(long, short = 'c')]
    config: Option<PathBuf>,

    /// WAVE file to loop (overrides the config)
    #[arg(long, short = 's')]
    source: Option<PathBuf>,

    /// Tone frequency in Hz (overrides the config)
    #[arg(long, short = 'f')]
    frequency: Option<u32>,

    /// Start muted
    #[arg(long)]
    mute: bool,

    /// Seconds to play before exiting
    #[arg(long, short = 'd', default_value = "5")]
    duration: u64,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => EngineConfig::load(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => EngineConfig::default(),
    };
    if let Some(source) = args.source {
        config.stream.source = Some(source);
    }
    if let Some(frequency) = args.frequency {
        config.tone.frequency_hz = frequency;
    }
    if args.mute {
        config.stream.start_muted = true;
    }

    let (session, source) = StreamSession::open(&config).context("starting stream session")?;
    let mut device = AudioDevice::new(source).context("opening audio output")?;
    device.play()?;

    std::thread::sleep(Duration::from_secs(args.duration));

    device.stop();
    if let Some(stats) = session.stop() {
        tracing::info!(
            chunks_read = stats.chunks_read,
            chunks_dropped = stats.chunks_dropped,
            loops = stats.loops,
            "Ingestion summary"
        );
    }
    Ok(())
}
