//! Simulation run loop and CSI scoring

use crate::channel::{MultipathChannel, Synthesizer};
use crate::config::SimConfig;
use anyhow::Context;
use common::utils::linear_to_db;
use estimator::{ChannelEstimator, CsiStatus};
use interfaces::{CsiPayload, StreamTag, TagValue, TaggedChannelEstimator};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::Serialize;
use tracing::{debug, info};

/// Outcome of a whole run
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunSummary {
    pub symbols: usize,
    pub frames: usize,
    pub fresh: usize,
    pub held: usize,
    pub stale: usize,
    pub estimation_errors: usize,
    /// Mean normalized CSI error over fresh symbols
    pub nmse_db: Option<f64>,
    pub time_delay: i64,
    /// Last fresh CSI as `[carrier][rx][tx]` pairs
    #[serde(skip)]
    pub last_csi: Option<CsiPayload>,
}

/// Per-frame error accumulator
#[derive(Default)]
struct FrameStats {
    error: f64,
    power: f64,
    fresh: usize,
}

impl FrameStats {
    fn nmse_db(&self) -> Option<f64> {
        (self.fresh > 0 && self.power > 0.0).then(|| linear_to_db(self.error / self.power))
    }
}

pub fn run(config: &SimConfig) -> anyhow::Result<RunSummary> {
    let estimator_config = config.estimator_config()?;
    let num_rx = estimator_config.num_rx;
    let num_tx = estimator_config.num_tx;
    let samples_per_symbol = (estimator_config.fft_len + estimator_config.cp_len) as u64;
    let pattern_len = estimator_config.pilot_symbols.len().max(1);
    let occupied = estimator_config.occupied_carriers.clone();
    let start_key = estimator_config.start_key.clone();
    let frame_len = config.run.frame_len.max(1);

    let mut rng = StdRng::seed_from_u64(config.run.seed);
    let channel = MultipathChannel::random(
        &mut rng,
        num_rx,
        num_tx,
        config.channel.num_taps,
        config.channel.tap_decay,
        estimator_config.fft_len,
    )?;
    let synth = Synthesizer::new(channel, &estimator_config, config.channel.snr_db)?;

    let estimator =
        ChannelEstimator::new(estimator_config).context("Invalid estimator configuration")?;
    let mut tagged = TaggedChannelEstimator::new(estimator);

    let mut summary = RunSummary::default();
    let mut frame = FrameStats::default();
    let (mut total_error, mut total_power) = (0.0, 0.0);
    let mut since_start: Option<usize> = None;

    for n in 0..config.run.symbols {
        let mut tags = Vec::new();
        if n >= config.run.lead_in && (n - config.run.lead_in) % frame_len == 0 {
            if let Some(db) = frame.nmse_db() {
                info!("Frame {}: NMSE {:.1} dB over {} fresh symbols", summary.frames, db, frame.fresh);
            }
            frame = FrameStats::default();
            summary.frames += 1;
            since_start = Some(0);

            let boundary = n as u64 * samples_per_symbol;
            let detected = boundary.saturating_add_signed(config.channel.start_offset);
            tags.push(StreamTag::new(n as u64, start_key.clone(), TagValue::Long(detected as i64)));
        }

        let position = since_start.map_or(0, |s| s % pattern_len);
        let streams = synth.symbol(&mut rng, position, num_rx)?;
        let out = tagged.process(&streams, tags)?;
        summary.estimation_errors += out.output.estimation_errors.len();

        match out.output.status {
            CsiStatus::Fresh => summary.fresh += 1,
            CsiStatus::Held => summary.held += 1,
            CsiStatus::Stale(reason) => {
                debug!("Symbol {}: {}", n, reason);
                summary.stale += 1;
            }
        }

        if let Some(csi) = &out.output.csi {
            let (mut error, mut power) = (0.0, 0.0);
            for (idx, &carrier) in occupied.iter().enumerate() {
                for rx in 0..num_rx {
                    for tx in 0..num_tx {
                        let truth = synth.channel.response(rx, tx, carrier);
                        error += (csi.get(tx, rx, idx) - truth).norm_sqr() as f64;
                        power += truth.norm_sqr() as f64;
                    }
                }
            }
            frame.error += error;
            frame.power += power;
            frame.fresh += 1;
            total_error += error;
            total_power += power;
            summary.last_csi = Some(CsiPayload::from(csi));
        }

        if let Some(s) = since_start.as_mut() {
            *s += 1;
        }
    }

    if let Some(db) = frame.nmse_db() {
        info!("Frame {}: NMSE {:.1} dB over {} fresh symbols", summary.frames, db, frame.fresh);
    }

    summary.symbols = config.run.symbols;
    summary.time_delay = tagged.time_delay();
    summary.nmse_db = (total_power > 0.0).then(|| linear_to_db(total_error / total_power));
    Ok(summary)
}
