//! Stream Tag Types
//!
//! String-keyed side-channel items for hosts that attach metadata to sample
//! streams. Encoded as JSON or bincode.

use crate::InterfaceError;
use estimator::Csi;
use ndarray::Array3;
use num_complex::Complex32;
use serde::{Deserialize, Serialize};

/// Side-channel item attached to a stream offset
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamTag {
    /// Item offset (one item per OFDM symbol)
    pub offset: u64,
    /// Slot name
    pub key: String,
    pub value: TagValue,
}

/// Tag payloads understood by the estimator adapter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TagValue {
    Unit,
    Long(i64),
    Csi(CsiPayload),
}

/// CSI as nested `[carrier][rx][tx]` lists of `[re, im]`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CsiPayload(pub Vec<Vec<Vec<[f32; 2]>>>);

impl From<&Csi> for CsiPayload {
    fn from(csi: &Csi) -> Self {
        let payload = csi
            .as_array()
            .outer_iter()
            .map(|carrier| {
                carrier
                    .outer_iter()
                    .map(|rx| rx.iter().map(|h| [h.re, h.im]).collect())
                    .collect()
            })
            .collect();
        Self(payload)
    }
}

impl CsiPayload {
    /// Rebuild CSI; every carrier must have the same antenna dimensions
    pub fn to_csi(&self) -> Result<Csi, InterfaceError> {
        let num_carriers = self.0.len();
        let num_rx = self.0.first().map_or(0, Vec::len);
        let num_tx = self
            .0
            .first()
            .and_then(|carrier| carrier.first())
            .map_or(0, Vec::len);

        let values: Vec<Complex32> = self
            .0
            .iter()
            .flatten()
            .flatten()
            .map(|&[re, im]| Complex32::new(re, im))
            .collect();

        let ragged = self
            .0
            .iter()
            .any(|carrier| carrier.len() != num_rx || carrier.iter().any(|rx| rx.len() != num_tx));
        if ragged {
            return Err(InterfaceError::InvalidTag(
                "CSI payload has ragged antenna dimensions".to_string(),
            ));
        }

        let matrix = Array3::from_shape_vec((num_carriers, num_rx, num_tx), values)
            .map_err(|e| InterfaceError::InvalidTag(e.to_string()))?;
        Ok(Csi::from_array(matrix))
    }
}

impl StreamTag {
    pub fn new(offset: u64, key: impl Into<String>, value: TagValue) -> Self {
        Self {
            offset,
            key: key.into(),
            value,
        }
    }

    pub fn to_json(&self) -> Result<String, InterfaceError> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(text: &str) -> Result<Self, InterfaceError> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, InterfaceError> {
        Ok(bincode::serialize(self)?)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, InterfaceError> {
        Ok(bincode::deserialize(bytes)?)
    }
}
