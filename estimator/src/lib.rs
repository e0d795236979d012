//! MIMO-OFDM Channel Estimation Library
//!
//! This crate turns post-FFT OFDM symbols from N receive antennas into
//! per-carrier channel state information for M transmit streams.

pub mod carrier_map;
pub mod channel_estimator;
pub mod csi;
pub mod frame_tracker;
pub mod interpolation;
pub mod pilots;
mod solver;

pub use carrier_map::CarrierMap;
pub use channel_estimator::{
    ChannelEstimator, ChannelEstimatorConfig, CsiStatus, SymbolInput, SymbolOutput,
};
pub use csi::Csi;
pub use frame_tracker::{FrameState, FrameTracker, StartMarker};
pub use pilots::PilotPattern;

use common::types::CarrierClass;
use num_complex::Complex32;
use thiserror::Error;

/// Construction-time configuration errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("Number of {0} antennas must be at least 1")]
    NoAntennas(&'static str),

    #[error("FFT length must be non-zero")]
    ZeroFftLength,

    #[error("{class:?} carrier {carrier} out of range for FFT length {fft_len}")]
    CarrierOutOfRange {
        class: CarrierClass,
        carrier: i32,
        fft_len: usize,
    },

    #[error("Duplicate {class:?} carrier {carrier}")]
    DuplicateCarrier { class: CarrierClass, carrier: i32 },

    #[error("Carrier {carrier} is configured as both pilot and occupied")]
    CarrierOverlap { carrier: i32 },

    #[error("No pilot carriers configured")]
    NoPilotCarriers,

    #[error("Pilot pattern is empty")]
    EmptyPilotPattern,

    #[error("Pilot pattern position {position} has {len} values, expected {num_tx} or {expected}")]
    PilotLengthMismatch {
        position: usize,
        len: usize,
        num_tx: usize,
        expected: usize,
    },

    #[error("Pilot pattern position {position} contains a non-finite value")]
    NonFinitePilot { position: usize },

    #[error("Transmit antenna {tx} never sends a pilot")]
    SilentTransmitter { tx: usize },

    #[error("Pilot carrier {carrier} is unresolvable: rank {rank} for {active} active transmit antennas")]
    UnresolvablePilots {
        carrier: i32,
        rank: usize,
        active: usize,
    },

    #[error("Invalid configuration: {0}")]
    InvalidParameter(String),
}

/// Runtime state errors; the stream continues without fresh CSI
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateError {
    #[error("No frame start observed yet")]
    Unsynced,

    #[error("Pilot pattern position {position} carries no pilots")]
    MissingPilots { position: usize },
}

/// Numeric failures of a pilot solve; the prior estimate is held
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum EstimationError {
    #[error("Singular pilot system at carrier {carrier}, rx {rx}")]
    Singular { carrier: i32, rx: usize },

    #[error("Non-finite channel estimate at carrier {carrier}, rx {rx}")]
    NonFinite { carrier: i32, rx: usize },
}

/// Top-level error for the estimator
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EstimatorError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    State(#[from] StateError),

    #[error(transparent)]
    Estimation(#[from] EstimationError),

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

/// Public contract of a streaming MIMO-OFDM channel estimator
pub trait MimoChannelEstimator {
    /// Process one OFDM symbol (one vector per receive antenna)
    fn process(&mut self, input: SymbolInput<'_>) -> Result<SymbolOutput, EstimatorError>;

    /// Most recently measured frame boundary offset in samples
    fn time_delay(&self) -> i64;

    /// Configuration the instance was built from
    fn config(&self) -> &ChannelEstimatorConfig;
}

impl<E: MimoChannelEstimator + ?Sized> MimoChannelEstimator for Box<E> {
    fn process(&mut self, input: SymbolInput<'_>) -> Result<SymbolOutput, EstimatorError> {
        (**self).process(input)
    }

    fn time_delay(&self) -> i64 {
        (**self).time_delay()
    }

    fn config(&self) -> &ChannelEstimatorConfig {
        (**self).config()
    }
}

/// Create a channel estimator with default tuning.
///
/// All parameters are validated; no instance exists on error.
#[allow(clippy::too_many_arguments)]
pub fn make(
    num_tx: usize,
    num_rx: usize,
    fft_len: usize,
    pilot_symbols: Vec<Vec<Complex32>>,
    pilot_carriers: Vec<i32>,
    occupied_carriers: Vec<i32>,
    csi_key: &str,
    start_key: &str,
) -> Result<Box<dyn MimoChannelEstimator + Send>, ConfigError> {
    let config = ChannelEstimatorConfig {
        csi_key: csi_key.to_string(),
        start_key: start_key.to_string(),
        ..ChannelEstimatorConfig::new(
            num_tx,
            num_rx,
            fft_len,
            pilot_symbols,
            pilot_carriers,
            occupied_carriers,
        )
    };
    Ok(Box::new(ChannelEstimator::new(config)?))
}
