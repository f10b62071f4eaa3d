//! BHP Replay
//!
//! Reads surface samples as JSON lines on stdin and writes one enhanced
//! sample (with its bottom-hole concentration) per line on stdout.
//!
//! # Usage
//! ```bash
//! cat job.jsonl | ./bhp-replay --mode rate --flush-volume 120
//! cat job.jsonl | ./bhp-replay --mode fixed --offset-minutes 6.5 --config bhp_config.toml
//! ```
//!
//! Logs go to stderr; set `RUST_LOG` to adjust verbosity (default: info).

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use std::path::PathBuf;
use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;
use tracing::info;

use bhp_engine::config::defaults::DEFAULT_OFFSET_MINUTES;
use bhp_engine::pipeline::{JsonLinesSource, ProcessingLoop, StopReason, StreamCoordinator};
use bhp_engine::BhpConfig;

// ============================================================================
// CLI Arguments
// ============================================================================

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Mode {
    /// Offset = flush volume / pump rate
    Rate,
    /// Operator-set offset in minutes
    Fixed,
}

#[derive(Parser, Debug)]
#[command(name = "bhp-replay")]
#[command(about = "Replay pumping samples through the bottom-hole concentration engine")]
#[command(version)]
struct Args {
    /// Offset mode
    #[arg(long, value_enum, default_value = "rate")]
    mode: Mode,

    /// Wellbore flush volume in barrels (rate mode)
    #[arg(long, env = "BHP_FLUSH_VOLUME")]
    flush_volume: Option<f64>,

    /// Travel time in minutes (fixed mode)
    #[arg(long, env = "BHP_OFFSET_MINUTES")]
    offset_minutes: Option<f64>,

    /// Path to a TOML config file (default: $BHP_CONFIG, then ./bhp_config.toml)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Print final stats as JSON on stderr
    #[arg(long)]
    stats: bool,
}

// ============================================================================
// Main
// ============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let config = match &args.config {
        Some(path) => BhpConfig::load_from_file(path)
            .with_context(|| format!("loading config from {}", path.display()))?,
        None => BhpConfig::load(),
    };

    let coordinator = match args.mode {
        Mode::Rate => {
            let mut c = StreamCoordinator::rate_derived(config)?;
            if let Some(volume) = args.flush_volume {
                c.set_flush_volume(volume)?;
            } else {
                info!("No flush volume given; values stay pending until one is set");
            }
            c
        }
        Mode::Fixed => StreamCoordinator::fixed_offset(
            config,
            args.offset_minutes.unwrap_or(DEFAULT_OFFSET_MINUTES),
        )?,
    };

    // Printer drains the output stream on its own task
    let mut output = coordinator.subscribe();
    let printer = tokio::spawn(async move {
        let mut stdout = tokio::io::stdout();
        while let Some(enhanced) = output.recv().await {
            let mut line = serde_json::to_vec(&enhanced)?;
            line.push(b'\n');
            stdout.write_all(&line).await?;
        }
        stdout.flush().await?;
        anyhow::Ok(())
    });

    let shared = coordinator.into_shared();

    let shutdown_token = CancellationToken::new();
    let signal_token = shutdown_token.clone();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("Received Ctrl+C, initiating shutdown...");
        signal_token.cancel();
    });

    let mut source = JsonLinesSource::stdin();
    let summary = ProcessingLoop::new(shared.clone(), shutdown_token)
        .run(&mut source)
        .await;

    let stats = shared.lock().await.stats();
    // Dropping the last coordinator handle closes the output stream
    drop(shared);
    printer.await??;

    if args.stats {
        eprintln!("{}", serde_json::to_string_pretty(&stats)?);
    }

    if let StopReason::SourceError(e) = summary.stop {
        anyhow::bail!("input failed: {e}");
    }
    Ok(())
}
