//! Frame Tracker
//!
//! Start-of-frame state machine. Tracks the symbol index within the current
//! frame and measures where the upstream synchronizer placed the frame
//! boundary relative to the running symbol count.

use crate::StateError;
use tracing::debug;

/// Synchronization state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameState {
    /// No frame start seen yet
    Unsynced,
    /// Tracking an active frame
    Synced {
        /// Symbols since the last frame start
        symbol_index: u64,
    },
}

/// Start-of-frame indication delivered alongside a symbol
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StartMarker {
    /// Absolute sample offset of the detected boundary, if measured
    pub detected_at: Option<u64>,
}

impl StartMarker {
    /// Boundary coincides with the tagged symbol
    pub fn aligned() -> Self {
        Self { detected_at: None }
    }

    /// Boundary detected at an absolute sample offset
    pub fn detected_at(sample: u64) -> Self {
        Self {
            detected_at: Some(sample),
        }
    }
}

/// Frame state machine
#[derive(Debug, Clone)]
pub struct FrameTracker {
    state: FrameState,
    /// Pilot pattern period in symbols
    pattern_len: usize,
    /// Samples per OFDM symbol including cyclic prefix
    samples_per_symbol: u64,
    /// Symbols processed since construction
    symbols_seen: u64,
    /// Frame starts observed
    frames_seen: u64,
    /// Cached boundary offset of the latest frame start
    time_delay: i64,
}

impl FrameTracker {
    /// Create an unsynced tracker
    pub fn new(pattern_len: usize, samples_per_symbol: u64) -> Self {
        Self {
            state: FrameState::Unsynced,
            pattern_len: pattern_len.max(1),
            samples_per_symbol,
            symbols_seen: 0,
            frames_seen: 0,
            time_delay: 0,
        }
    }

    /// Apply a start indication coincident with the current symbol.
    ///
    /// Returns the new time delay.
    pub fn start_frame(&mut self, marker: StartMarker) -> i64 {
        let expected = self.expected_boundary();
        self.time_delay = match marker.detected_at {
            Some(detected) => (expected as i128 - detected as i128)
                .clamp(i64::MIN as i128, i64::MAX as i128) as i64,
            None => 0,
        };

        if let FrameState::Synced { symbol_index } = self.state {
            debug!(
                "Frame restart after {} symbols, time delay {}",
                symbol_index, self.time_delay
            );
        } else {
            debug!("Frame sync acquired, time delay {}", self.time_delay);
        }

        self.state = FrameState::Synced { symbol_index: 0 };
        self.frames_seen += 1;
        self.time_delay
    }

    /// Finish the current symbol
    pub fn advance(&mut self) {
        self.symbols_seen += 1;
        if let FrameState::Synced { symbol_index } = &mut self.state {
            *symbol_index = symbol_index.wrapping_add(1);
        }
    }

    /// Position of the current symbol in the pilot pattern
    pub fn pattern_position(&self) -> Result<usize, StateError> {
        match self.state {
            FrameState::Synced { symbol_index } => {
                Ok((symbol_index % self.pattern_len as u64) as usize)
            }
            FrameState::Unsynced => Err(StateError::Unsynced),
        }
    }

    /// Sample position where the current symbol starts in the running stream
    pub fn expected_boundary(&self) -> u64 {
        self.symbols_seen.saturating_mul(self.samples_per_symbol)
    }

    pub fn state(&self) -> FrameState {
        self.state
    }

    pub fn is_synced(&self) -> bool {
        matches!(self.state, FrameState::Synced { .. })
    }

    /// Symbol index within the current frame
    pub fn symbol_index(&self) -> Option<u64> {
        match self.state {
            FrameState::Synced { symbol_index } => Some(symbol_index),
            FrameState::Unsynced => None,
        }
    }

    pub fn time_delay(&self) -> i64 {
        self.time_delay
    }

    pub fn symbols_seen(&self) -> u64 {
        self.symbols_seen
    }

    pub fn frames_seen(&self) -> u64 {
        self.frames_seen
    }
}
