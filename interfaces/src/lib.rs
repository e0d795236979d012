//! Host Tag Interfaces Library
//!
//! This crate adapts the channel estimator to hosts that exchange
//! string-keyed stream tags instead of typed side channels.

pub mod tagged;
pub mod tags;

pub use tagged::{TaggedChannelEstimator, TaggedOutput};
pub use tags::{CsiPayload, StreamTag, TagValue};

use estimator::EstimatorError;
use thiserror::Error;

/// Interface errors
#[derive(Error, Debug)]
pub enum InterfaceError {
    #[error("Estimator error: {0}")]
    Estimator(#[from] EstimatorError),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Binary serialization error: {0}")]
    Bincode(#[from] bincode::Error),

    #[error("Invalid tag: {0}")]
    InvalidTag(String),
}
