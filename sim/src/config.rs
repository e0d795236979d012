//! Simulator Configuration
//!
//! TOML or YAML file with an estimator section and channel/run sections.
//! Every field has a default, so an empty file is a valid 2x2 setup.

use anyhow::{anyhow, Context};
use common::types::InterpolationPolicy;
use common::utils::{default_occupied_carriers, default_pilot_carriers, hadamard};
use estimator::ChannelEstimatorConfig;
use num_complex::Complex32;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Top-level simulator configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct SimConfig {
    #[serde(default)]
    pub estimator: EstimatorSection,
    #[serde(default)]
    pub channel: ChannelSection,
    #[serde(default)]
    pub run: RunSection,
}

/// Estimator parameters; carrier layout and pilots fall back to the
/// standard receiver layout when omitted
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EstimatorSection {
    #[serde(default = "default_antennas")]
    pub num_tx: usize,
    #[serde(default = "default_antennas")]
    pub num_rx: usize,
    #[serde(default = "default_fft_len")]
    pub fft_len: usize,
    #[serde(default = "default_cp_len")]
    pub cp_len: usize,
    pub pilot_carriers: Option<Vec<i32>>,
    pub occupied_carriers: Option<Vec<i32>>,
    /// Defaults to the Hadamard matrix of order `num_tx`
    pub pilot_symbols: Option<Vec<Vec<Complex32>>>,
    #[serde(default = "default_csi_key")]
    pub csi_key: String,
    #[serde(default = "default_start_key")]
    pub start_key: String,
    #[serde(default)]
    pub interpolation: InterpolationPolicy,
    #[serde(default = "default_singular_threshold")]
    pub singular_threshold: f64,
}

fn default_antennas() -> usize {
    2
}

fn default_fft_len() -> usize {
    64
}

fn default_cp_len() -> usize {
    16
}

fn default_csi_key() -> String {
    "csi".to_string()
}

fn default_start_key() -> String {
    "start".to_string()
}

fn default_singular_threshold() -> f64 {
    1e-9
}

impl Default for EstimatorSection {
    fn default() -> Self {
        Self {
            num_tx: default_antennas(),
            num_rx: default_antennas(),
            fft_len: default_fft_len(),
            cp_len: default_cp_len(),
            pilot_carriers: None,
            occupied_carriers: None,
            pilot_symbols: None,
            csi_key: default_csi_key(),
            start_key: default_start_key(),
            interpolation: InterpolationPolicy::default(),
            singular_threshold: default_singular_threshold(),
        }
    }
}

/// Synthetic propagation channel
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ChannelSection {
    /// Taps of the delay line per antenna pair
    #[serde(default = "default_num_taps")]
    pub num_taps: usize,
    /// Power ratio between consecutive taps
    #[serde(default = "default_tap_decay")]
    pub tap_decay: f64,
    /// Per-sample SNR; noiseless when absent
    pub snr_db: Option<f64>,
    /// Synchronizer error in samples added to every frame start
    #[serde(default)]
    pub start_offset: i64,
}

fn default_num_taps() -> usize {
    4
}

fn default_tap_decay() -> f64 {
    0.5
}

impl Default for ChannelSection {
    fn default() -> Self {
        Self {
            num_taps: default_num_taps(),
            tap_decay: default_tap_decay(),
            snr_db: None,
            start_offset: 0,
        }
    }
}

/// Run length and framing
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RunSection {
    #[serde(default = "default_symbols")]
    pub symbols: usize,
    /// Symbols per frame
    #[serde(default = "default_frame_len")]
    pub frame_len: usize,
    /// Unsynced symbols before the first frame start
    #[serde(default)]
    pub lead_in: usize,
    #[serde(default = "default_seed")]
    pub seed: u64,
    /// Write the last CSI here as JSON
    pub dump_csi: Option<String>,
}

fn default_symbols() -> usize {
    200
}

fn default_frame_len() -> usize {
    20
}

fn default_seed() -> u64 {
    1
}

impl Default for RunSection {
    fn default() -> Self {
        Self {
            symbols: default_symbols(),
            frame_len: default_frame_len(),
            lead_in: 0,
            seed: default_seed(),
            dump_csi: None,
        }
    }
}

impl SimConfig {
    /// Load from a `.toml`, `.yaml` or `.yml` file
    pub fn from_file(path: &str) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read configuration file {}", path))?;
        let extension = Path::new(path)
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or_default();

        let config = match extension {
            "toml" => toml::from_str(&contents)?,
            "yaml" | "yml" => serde_yaml::from_str(&contents)?,
            other => return Err(anyhow!("Unsupported configuration format: {:?}", other)),
        };
        Ok(config)
    }

    /// Resolve defaults into a full estimator configuration
    pub fn estimator_config(&self) -> anyhow::Result<ChannelEstimatorConfig> {
        let section = &self.estimator;
        let pilot_carriers = section
            .pilot_carriers
            .clone()
            .unwrap_or_else(|| default_pilot_carriers(section.fft_len));
        let occupied_carriers = section
            .occupied_carriers
            .clone()
            .unwrap_or_else(|| default_occupied_carriers(section.fft_len, &pilot_carriers));
        let pilot_symbols = match &section.pilot_symbols {
            Some(symbols) => symbols.clone(),
            None => hadamard(section.num_tx).ok_or_else(|| {
                anyhow!(
                    "No default pilot pattern for {} transmit antennas; set pilot_symbols",
                    section.num_tx
                )
            })?,
        };

        Ok(ChannelEstimatorConfig {
            csi_key: section.csi_key.clone(),
            start_key: section.start_key.clone(),
            cp_len: section.cp_len,
            interpolation: section.interpolation,
            singular_threshold: section.singular_threshold,
            ..ChannelEstimatorConfig::new(
                section.num_tx,
                section.num_rx,
                section.fft_len,
                pilot_symbols,
                pilot_carriers,
                occupied_carriers,
            )
        })
    }
}
