//! Pilot Pattern
//!
//! Known transmitted pilot values, indexed by pattern position, transmit
//! antenna and pilot carrier. A zero value means the antenna sends no pilot
//! on that carrier at that position.

use crate::{solver, ConfigError};
use ndarray::{Array2, ArrayView1};
use num_complex::{Complex32, Complex64};
use num_traits::Zero;
use tracing::debug;

/// Pilot values for every pattern position
#[derive(Debug, Clone)]
pub struct PilotPattern {
    /// One (num_tx, num_pilot_carriers) matrix per position
    positions: Vec<Array2<Complex32>>,
    num_tx: usize,
    num_pilots: usize,
}

impl PilotPattern {
    /// Build the pattern from configuration.
    ///
    /// Each entry is either `num_tx` values (broadcast over all pilot
    /// carriers) or `num_tx * num_pilots` values, transmit-antenna major.
    pub fn new(
        pilot_symbols: &[Vec<Complex32>],
        num_tx: usize,
        num_pilots: usize,
    ) -> Result<Self, ConfigError> {
        if pilot_symbols.is_empty() {
            return Err(ConfigError::EmptyPilotPattern);
        }

        let expected = num_tx * num_pilots;
        let positions = pilot_symbols
            .iter()
            .enumerate()
            .map(|(position, values)| {
                if values.iter().any(|v| !v.re.is_finite() || !v.im.is_finite()) {
                    return Err(ConfigError::NonFinitePilot { position });
                }
                if values.len() == expected {
                    Array2::from_shape_vec((num_tx, num_pilots), values.clone()).map_err(|_| {
                        ConfigError::PilotLengthMismatch {
                            position,
                            len: values.len(),
                            num_tx,
                            expected,
                        }
                    })
                } else if values.len() == num_tx {
                    Ok(Array2::from_shape_fn((num_tx, num_pilots), |(tx, _)| values[tx]))
                } else {
                    Err(ConfigError::PilotLengthMismatch {
                        position,
                        len: values.len(),
                        num_tx,
                        expected,
                    })
                }
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            positions,
            num_tx,
            num_pilots,
        })
    }

    /// Pattern period in symbols
    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    pub fn num_tx(&self) -> usize {
        self.num_tx
    }

    pub fn num_pilots(&self) -> usize {
        self.num_pilots
    }

    /// Pilot sent by `tx` on the `pilot`-th pilot carrier at `position`
    pub fn value(&self, position: usize, tx: usize, pilot: usize) -> Complex32 {
        self.positions[position][[tx, pilot]]
    }

    /// Pilots of all transmit antennas on one carrier at one position
    pub fn column(&self, position: usize, pilot: usize) -> ArrayView1<'_, Complex32> {
        self.positions[position].column(pilot)
    }

    /// Transmit antennas with a non-zero pilot on one carrier at one position
    pub fn active_tx(&self, position: usize, pilot: usize) -> Vec<usize> {
        self.column(position, pilot)
            .iter()
            .enumerate()
            .filter(|(_, v)| !v.is_zero())
            .map(|(tx, _)| tx)
            .collect()
    }

    /// True when no antenna sends a pilot anywhere at `position`
    pub fn is_silent(&self, position: usize) -> bool {
        self.positions[position].iter().all(|v| v.is_zero())
    }

    /// Check that every antenna transmits a pilot and that one full period
    /// determines every active antenna on every pilot carrier.
    pub fn validate(&self, pilot_carriers: &[i32], threshold: f64) -> Result<(), ConfigError> {
        for tx in 0..self.num_tx {
            let transmits = self
                .positions
                .iter()
                .any(|p| p.row(tx).iter().any(|v| !v.is_zero()));
            if !transmits {
                return Err(ConfigError::SilentTransmitter { tx });
            }
        }

        for (pilot, &carrier) in pilot_carriers.iter().enumerate() {
            let rows: Vec<ArrayView1<'_, Complex32>> = (0..self.len())
                .map(|position| self.column(position, pilot))
                .filter(|col| col.iter().any(|v| !v.is_zero()))
                .collect();
            let active: Vec<usize> = (0..self.num_tx)
                .filter(|&tx| rows.iter().any(|row| !row[tx].is_zero()))
                .collect();
            if active.is_empty() {
                continue;
            }

            let system = Array2::from_shape_fn((rows.len(), active.len()), |(r, c)| {
                widen(rows[r][active[c]])
            });
            let rank = solver::rank(system.view(), threshold);
            if rank < active.len() {
                return Err(ConfigError::UnresolvablePilots {
                    carrier,
                    rank,
                    active: active.len(),
                });
            }
        }

        debug!(
            "Pilot pattern: {} positions, {} tx, {} pilot carriers",
            self.len(),
            self.num_tx,
            self.num_pilots
        );
        Ok(())
    }
}

/// Promote a sample to the solver precision
pub(crate) fn widen(v: Complex32) -> Complex64 {
    Complex64::new(v.re as f64, v.im as f64)
}
