//! Common Types for the MIMO-OFDM receive chain
//!
//! Defines fundamental types shared by the estimator, the tag interop layer
//! and the simulator

use serde::{Deserialize, Serialize};

/// Role of a subcarrier within an OFDM symbol
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CarrierClass {
    /// Carries a value known a priori to the receiver
    Pilot,
    /// Carries unknown data
    Occupied,
    /// Unused (guard band, DC)
    Guard,
}

/// Policy used to fill occupied carriers from sparse pilot estimates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InterpolationPolicy {
    /// Linear in carrier index, flat hold beyond the outermost pilots
    #[default]
    Linear,
    /// Value of the closest pilot (lower index wins ties)
    Nearest,
}
