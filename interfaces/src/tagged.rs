//! Tagged estimator adapter
//!
//! Wraps a `MimoChannelEstimator` so that frame starts arrive and CSI leaves
//! as `StreamTag`s under the configured keys.

use crate::tags::{CsiPayload, StreamTag, TagValue};
use crate::InterfaceError;
use estimator::{MimoChannelEstimator, StartMarker, SymbolInput, SymbolOutput};
use num_complex::Complex32;
use tracing::{debug, trace, warn};

/// Result of one tagged call
#[derive(Debug, Clone)]
pub struct TaggedOutput {
    pub output: SymbolOutput,
    /// Pass-through tags followed by the CSI tag, if any
    pub tags: Vec<StreamTag>,
}

/// Estimator driven by string-keyed tags
pub struct TaggedChannelEstimator<E> {
    inner: E,
    /// Offset of the next item
    offset: u64,
}

impl<E: MimoChannelEstimator> TaggedChannelEstimator<E> {
    pub fn new(inner: E) -> Self {
        Self { inner, offset: 0 }
    }

    pub fn inner(&self) -> &E {
        &self.inner
    }

    /// Offset the next call will be attributed to
    pub fn offset(&self) -> u64 {
        self.offset
    }

    pub fn time_delay(&self) -> i64 {
        self.inner.time_delay()
    }

    /// Process one symbol with the tags attached to it.
    ///
    /// A `start_key` tag becomes the frame start (`Long(v)` is the detected
    /// boundary sample, a negative one counts as aligned). Incoming `csi_key` tags are dropped. Other tags are
    /// returned unchanged.
    pub fn process(
        &mut self,
        streams: &[Vec<Complex32>],
        tags: Vec<StreamTag>,
    ) -> Result<TaggedOutput, InterfaceError> {
        let config = self.inner.config();
        let start_key = config.start_key.clone();
        let csi_key = config.csi_key.clone();

        let mut start = None;
        let mut passthrough = Vec::with_capacity(tags.len());
        for tag in tags {
            if tag.key == start_key {
                start = Some(match tag.value {
                    TagValue::Long(sample) => match u64::try_from(sample) {
                        Ok(sample) => StartMarker::detected_at(sample),
                        Err(_) => {
                            warn!(
                                "Negative frame start sample {} at offset {}, treating as aligned",
                                sample, tag.offset
                            );
                            StartMarker::aligned()
                        }
                    },
                    _ => StartMarker::aligned(),
                });
            } else if tag.key == csi_key {
                trace!("Dropping upstream CSI tag at offset {}", tag.offset);
            } else {
                passthrough.push(tag);
            }
        }

        let output = self.inner.process(SymbolInput { streams, start })?;

        if let Some(csi) = &output.csi {
            passthrough.push(StreamTag::new(
                self.offset,
                csi_key,
                TagValue::Csi(CsiPayload::from(csi)),
            ));
        }
        if start.is_some() {
            debug!(
                "Frame start at item {}, time delay {}",
                self.offset,
                self.inner.time_delay()
            );
        }
        self.offset += 1;

        Ok(TaggedOutput {
            output,
            tags: passthrough,
        })
    }
}
