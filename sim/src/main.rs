//! MIMO-OFDM Channel Estimation Simulator
//!
//! Synthesizes a static multipath MIMO channel, runs the streaming channel
//! estimator over it and reports CSI quality per frame.

mod channel;
mod config;
mod runner;

use anyhow::Result;
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::{fmt, EnvFilter};

use crate::config::SimConfig;

/// MIMO-OFDM channel estimation simulator
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file (TOML or YAML)
    #[arg(short, long)]
    config: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Number of transmit antennas
    #[arg(long)]
    num_tx: Option<usize>,

    /// Number of receive antennas
    #[arg(long)]
    num_rx: Option<usize>,

    /// Number of OFDM symbols to simulate
    #[arg(long)]
    symbols: Option<usize>,

    /// Per-sample SNR in dB (noiseless if omitted)
    #[arg(long)]
    snr_db: Option<f64>,

    /// Random seed
    #[arg(long)]
    seed: Option<u64>,

    /// Write the last CSI to this JSON file
    #[arg(long)]
    dump_csi: Option<String>,
}

fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    fmt()
        .with_env_filter(env_filter)
        .with_target(true)
        .with_thread_ids(true)
        .with_line_number(true)
        .init();

    info!("Starting MIMO-OFDM channel estimation simulator");

    let mut config = match &args.config {
        Some(path) => {
            info!("Configuration file: {}", path);
            SimConfig::from_file(path)?
        }
        None => SimConfig::default(),
    };

    if let Some(num_tx) = args.num_tx {
        config.estimator.num_tx = num_tx;
    }
    if let Some(num_rx) = args.num_rx {
        config.estimator.num_rx = num_rx;
    }
    if let Some(symbols) = args.symbols {
        config.run.symbols = symbols;
    }
    if args.snr_db.is_some() {
        config.channel.snr_db = args.snr_db;
    }
    if let Some(seed) = args.seed {
        config.run.seed = seed;
    }
    if args.dump_csi.is_some() {
        config.run.dump_csi = args.dump_csi.clone();
    }

    info!("Simulation configuration:");
    info!("  Antennas: {} tx x {} rx", config.estimator.num_tx, config.estimator.num_rx);
    info!("  FFT length: {}, CP length: {}", config.estimator.fft_len, config.estimator.cp_len);
    info!("  Symbols: {}, frame length: {}", config.run.symbols, config.run.frame_len);
    match config.channel.snr_db {
        Some(snr) => info!("  SNR: {} dB", snr),
        None => info!("  SNR: noiseless"),
    }

    let summary = runner::run(&config)?;

    info!("Run complete:");
    info!("  Frames: {}", summary.frames);
    info!("  Fresh / held / stale: {} / {} / {}", summary.fresh, summary.held, summary.stale);
    info!("  Time delay: {} samples", summary.time_delay);
    match summary.nmse_db {
        Some(db) => info!("  CSI NMSE: {:.2} dB", db),
        None => warn!("No fresh CSI produced"),
    }
    if summary.estimation_errors > 0 {
        warn!("{} pilot solves failed", summary.estimation_errors);
    }

    if let Some(path) = &config.run.dump_csi {
        match &summary.last_csi {
            Some(csi) => {
                std::fs::write(path, serde_json::to_string_pretty(csi)?)?;
                info!("Last CSI written to {}", path);
            }
            None => warn!("No CSI to write to {}", path),
        }
    }

    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}
