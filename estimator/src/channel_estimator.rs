//! MIMO-OFDM Channel Estimator
//!
//! Per OFDM symbol: extracts pilot samples on every receive antenna, resolves
//! the per-antenna-pair channel on each pilot carrier, interpolates across
//! the occupied carriers and emits fresh CSI next to the data carriers.
//!
//! Pilot resolution per carrier:
//! - one transmit antenna sounding the carrier across the window: direct division
//! - several: least squares over the pilot observations of the current frame
//!   (at most one pattern period), once enough rows are available

use crate::carrier_map::CarrierMap;
use crate::csi::Csi;
use crate::frame_tracker::{FrameTracker, StartMarker};
use crate::interpolation::{interpolate, CarrierPoint};
use crate::pilots::{widen, PilotPattern};
use crate::{
    solver, ConfigError, EstimationError, EstimatorError, MimoChannelEstimator, StateError,
};
use common::types::{CarrierClass, InterpolationPolicy};
use ndarray::{Array1, Array2, Array3};
use num_complex::{Complex32, Complex64};
use num_traits::Zero;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use tracing::{debug, info, trace, warn};

/// Estimator configuration (immutable after construction)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelEstimatorConfig {
    /// Number of transmit antennas / spatial streams (M)
    pub num_tx: usize,
    /// Number of receive antennas (N)
    pub num_rx: usize,
    /// Subcarriers per OFDM symbol
    pub fft_len: usize,
    /// Pilot values per pattern position
    pub pilot_symbols: Vec<Vec<Complex32>>,
    /// Pilot carrier indices (negative counts from the top of the FFT)
    pub pilot_carriers: Vec<i32>,
    /// Data carrier indices, in output order
    pub occupied_carriers: Vec<i32>,
    /// Name of the CSI side-channel slot
    #[serde(default = "default_csi_key")]
    pub csi_key: String,
    /// Name of the frame-start side-channel slot
    #[serde(default = "default_start_key")]
    pub start_key: String,
    /// Cyclic prefix length in samples
    #[serde(default)]
    pub cp_len: usize,
    /// Interpolation across occupied carriers
    #[serde(default)]
    pub interpolation: InterpolationPolicy,
    /// Relative pivot magnitude below which a pilot solve is singular
    #[serde(default = "default_singular_threshold")]
    pub singular_threshold: f64,
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

impl ChannelEstimatorConfig {
    /// Configuration with default keys and tuning
    pub fn new(
        num_tx: usize,
        num_rx: usize,
        fft_len: usize,
        pilot_symbols: Vec<Vec<Complex32>>,
        pilot_carriers: Vec<i32>,
        occupied_carriers: Vec<i32>,
    ) -> Self {
        Self {
            num_tx,
            num_rx,
            fft_len,
            pilot_symbols,
            pilot_carriers,
            occupied_carriers,
            csi_key: default_csi_key(),
            start_key: default_start_key(),
            cp_len: 0,
            interpolation: InterpolationPolicy::default(),
            singular_threshold: default_singular_threshold(),
        }
    }
}

/// One call's input: a symbol per receive antenna plus an optional frame start
#[derive(Debug, Clone, Copy)]
pub struct SymbolInput<'a> {
    /// `num_rx` vectors of `fft_len` samples
    pub streams: &'a [Vec<Complex32>],
    /// Frame start coincident with this symbol
    pub start: Option<StartMarker>,
}

/// Freshness of the CSI for one symbol
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CsiStatus {
    /// CSI recomputed and attached
    Fresh,
    /// Synced, but nothing new could be resolved; no attachment
    Held,
    /// No estimate possible for this symbol; no attachment
    Stale(StateError),
}

/// One call's output
#[derive(Debug, Clone)]
pub struct SymbolOutput {
    /// Occupied-carrier samples per receive antenna, in configured order
    pub data: Vec<Vec<Complex32>>,
    /// Full CSI, present only when refreshed this symbol
    pub csi: Option<Csi>,
    pub status: CsiStatus,
    /// Pilot solves that failed this symbol (their prior values were held)
    pub estimation_errors: Vec<EstimationError>,
}

/// One pilot carrier observation: transmitted pilots and per-antenna samples
#[derive(Debug, Clone)]
struct Observation {
    pilots: Vec<Complex64>,
    received: Vec<Complex64>,
}

/// Streaming MIMO-OFDM channel estimator
#[derive(Debug)]
pub struct ChannelEstimator {
    config: ChannelEstimatorConfig,
    carrier_map: CarrierMap,
    pattern: PilotPattern,
    tracker: FrameTracker,
    /// Logical index of each pilot carrier
    pilot_positions: Vec<i32>,
    /// Logical index of each occupied carrier
    occupied_positions: Vec<i32>,
    /// Observations of the current frame, per pilot carrier
    windows: Vec<VecDeque<Observation>>,
    /// Latest resolved estimate per (pilot carrier, rx, tx)
    pilot_estimates: Array3<Option<Complex32>>,
    /// CSI cache
    csi: Csi,
}

impl ChannelEstimator {
    /// Validate the configuration and build an unsynced estimator
    pub fn new(config: ChannelEstimatorConfig) -> Result<Self, ConfigError> {
        if config.num_tx == 0 {
            return Err(ConfigError::NoAntennas("transmit"));
        }
        if config.num_rx == 0 {
            return Err(ConfigError::NoAntennas("receive"));
        }
        if config.fft_len == 0 {
            return Err(ConfigError::ZeroFftLength);
        }
        if !config.singular_threshold.is_finite() || config.singular_threshold < 0.0 {
            return Err(ConfigError::InvalidParameter(format!(
                "singular_threshold must be finite and non-negative, got {}",
                config.singular_threshold
            )));
        }

        let carrier_map = CarrierMap::new(
            config.fft_len,
            &config.pilot_carriers,
            &config.occupied_carriers,
        )?;
        if carrier_map.num_pilots() == 0 {
            return Err(ConfigError::NoPilotCarriers);
        }

        let pattern = PilotPattern::new(
            &config.pilot_symbols,
            config.num_tx,
            carrier_map.num_pilots(),
        )?;
        pattern.validate(&config.pilot_carriers, config.singular_threshold)?;

        let pilot_positions = carrier_map
            .carriers(CarrierClass::Pilot)
            .iter()
            .map(|&bin| carrier_map.logical_index(bin))
            .collect();
        let occupied_positions = carrier_map
            .carriers(CarrierClass::Occupied)
            .iter()
            .map(|&bin| carrier_map.logical_index(bin))
            .collect();

        let samples_per_symbol = (config.fft_len + config.cp_len) as u64;
        let tracker = FrameTracker::new(pattern.len(), samples_per_symbol);
        let windows = vec![VecDeque::with_capacity(pattern.len()); carrier_map.num_pilots()];
        let pilot_estimates = Array3::from_elem(
            (carrier_map.num_pilots(), config.num_rx, config.num_tx),
            None,
        );
        let csi = Csi::new(carrier_map.num_occupied(), config.num_rx, config.num_tx);

        info!(
            "Channel estimator: {}x{} MIMO, fft_len={}, {} pilot / {} occupied carriers, pattern length {}",
            config.num_tx,
            config.num_rx,
            config.fft_len,
            carrier_map.num_pilots(),
            carrier_map.num_occupied(),
            pattern.len()
        );

        Ok(Self {
            config,
            carrier_map,
            pattern,
            tracker,
            pilot_positions,
            occupied_positions,
            windows,
            pilot_estimates,
            csi,
        })
    }

    pub fn carrier_map(&self) -> &CarrierMap {
        &self.carrier_map
    }

    pub fn frame_tracker(&self) -> &FrameTracker {
        &self.tracker
    }

    /// Latest per-pilot-carrier estimates, shape `(pilots, num_rx, num_tx)`
    pub fn pilot_estimates(&self) -> &Array3<Option<Complex32>> {
        &self.pilot_estimates
    }

    /// Current CSI cache (possibly held from earlier symbols)
    pub fn csi(&self) -> &Csi {
        &self.csi
    }

    fn check_input(&self, streams: &[Vec<Complex32>]) -> Result<(), EstimatorError> {
        if streams.len() != self.config.num_rx {
            return Err(EstimatorError::InvalidInput(format!(
                "expected {} receive streams, got {}",
                self.config.num_rx,
                streams.len()
            )));
        }
        if let Some((rx, s)) = streams
            .iter()
            .enumerate()
            .find(|(_, s)| s.len() != self.config.fft_len)
        {
            return Err(EstimatorError::InvalidInput(format!(
                "stream {} has {} samples, expected {}",
                rx,
                s.len(),
                self.config.fft_len
            )));
        }
        Ok(())
    }

    /// Resolve every pilot carrier at `position` and refresh the CSI.
    ///
    /// Returns whether any antenna pair was refreshed.
    fn estimate(
        &mut self,
        position: usize,
        streams: &[Vec<Complex32>],
        errors: &mut Vec<EstimationError>,
    ) -> bool {
        let num_tx = self.config.num_tx;
        let num_rx = self.config.num_rx;
        let pattern_len = self.pattern.len();
        let threshold = self.config.singular_threshold;

        // Freshly resolved pilots per antenna pair, indexed rx * num_tx + tx
        let mut points: Vec<Vec<CarrierPoint>> = vec![Vec::new(); num_rx * num_tx];

        let pilot_bins = self.carrier_map.carriers(CarrierClass::Pilot);
        for (k, &bin) in pilot_bins.iter().enumerate() {
            let active = self.pattern.active_tx(position, k);
            if active.is_empty() {
                continue;
            }

            let pilots: Vec<Complex64> = self
                .pattern
                .column(position, k)
                .iter()
                .map(|&v| widen(v))
                .collect();
            let received: Vec<Complex64> = streams.iter().map(|s| widen(s[bin])).collect();

            let window = &mut self.windows[k];
            window.push_back(Observation {
                pilots: pilots.clone(),
                received: received.clone(),
            });
            while window.len() > pattern_len {
                window.pop_front();
            }

            let carrier = self.config.pilot_carriers[k];
            let columns = Self::window_columns(window);
            let solved = if let [tx] = columns.as_slice() {
                Some(Self::divide(&pilots, &received, *tx))
            } else {
                Self::solve_window(window, columns, pattern_len, threshold)
            };

            let Some((columns, solutions)) = solved else {
                // Awaiting more pilot symbols in this frame
                continue;
            };

            for (rx, solution) in solutions.into_iter().enumerate() {
                match solution {
                    Some(h) if h.iter().all(|v| v.re.is_finite() && v.im.is_finite()) => {
                        for (&tx, &value) in columns.iter().zip(h.iter()) {
                            let value = Complex32::new(value.re as f32, value.im as f32);
                            self.pilot_estimates[[k, rx, tx]] = Some(value);
                            points[rx * num_tx + tx]
                                .push(CarrierPoint::new(self.pilot_positions[k], widen(value)));
                        }
                    }
                    failure => {
                        let error = match failure {
                            None => EstimationError::Singular { carrier, rx },
                            Some(_) => EstimationError::NonFinite { carrier, rx },
                        };
                        warn!("{}, holding prior estimate", error);
                        errors.push(error);
                    }
                }
            }
        }

        let mut refreshed = false;
        for rx in 0..num_rx {
            for tx in 0..num_tx {
                let pair = rx * num_tx + tx;
                let Some(values) = interpolate(
                    &points[pair],
                    &self.occupied_positions,
                    self.config.interpolation,
                ) else {
                    continue;
                };
                for (carrier, value) in values.into_iter().enumerate() {
                    self.csi.set(
                        tx,
                        rx,
                        carrier,
                        Complex32::new(value.re as f32, value.im as f32),
                    );
                }
                trace!("CSI refreshed for tx{} -> rx{} from {} pilots", tx, rx, points[pair].len());
                refreshed = true;
            }
        }

        refreshed
    }

    /// Direct division for a carrier sounded by a single antenna
    fn divide(
        pilots: &[Complex64],
        received: &[Complex64],
        tx: usize,
    ) -> (Vec<usize>, Vec<Option<Array1<Complex64>>>) {
        let pilot = pilots[tx];
        let solutions = received
            .iter()
            .map(|&y| Some(Array1::from_elem(1, y / pilot)))
            .collect();
        (vec![tx], solutions)
    }

    /// Transmit antennas with a pilot in any observation of the window
    fn window_columns(window: &VecDeque<Observation>) -> Vec<usize> {
        let num_tx = window.front().map_or(0, |obs| obs.pilots.len());
        (0..num_tx)
            .filter(|&tx| window.iter().any(|obs| !obs.pilots[tx].is_zero()))
            .collect()
    }

    /// Joint least squares over the window; `None` while underdetermined
    fn solve_window(
        window: &VecDeque<Observation>,
        columns: Vec<usize>,
        pattern_len: usize,
        threshold: f64,
    ) -> Option<(Vec<usize>, Vec<Option<Array1<Complex64>>>)> {
        if columns.is_empty() || window.len() < columns.len() {
            return None;
        }

        let x = Array2::from_shape_fn((window.len(), columns.len()), |(r, c)| {
            window[r].pilots[columns[c]]
        });
        let num_rx = window.front()?.received.len();

        let mut solutions = Vec::with_capacity(num_rx);
        for rx in 0..num_rx {
            let y = Array1::from_iter(window.iter().map(|obs| obs.received[rx]));
            match solver::least_squares(x.view(), y.view(), threshold) {
                Some(h) => solutions.push(Some(h)),
                // Rank may still be building up before a full period is seen
                None if window.len() < pattern_len => return None,
                None => solutions.push(None),
            }
        }
        Some((columns, solutions))
    }
}

impl MimoChannelEstimator for ChannelEstimator {
    fn process(&mut self, input: SymbolInput<'_>) -> Result<SymbolOutput, EstimatorError> {
        self.check_input(input.streams)?;

        if let Some(marker) = input.start {
            self.tracker.start_frame(marker);
            for window in &mut self.windows {
                window.clear();
            }
        }

        let data: Vec<Vec<Complex32>> = input
            .streams
            .iter()
            .map(|s| self.carrier_map.extract(s, CarrierClass::Occupied))
            .collect();

        let position = match self.tracker.pattern_position() {
            Ok(position) => position,
            Err(error) => {
                trace!("Symbol {}: {}", self.tracker.symbols_seen(), error);
                self.tracker.advance();
                return Ok(SymbolOutput {
                    data,
                    csi: None,
                    status: CsiStatus::Stale(error),
                    estimation_errors: Vec::new(),
                });
            }
        };

        if self.pattern.is_silent(position) {
            self.tracker.advance();
            return Ok(SymbolOutput {
                data,
                csi: None,
                status: CsiStatus::Stale(StateError::MissingPilots { position }),
                estimation_errors: Vec::new(),
            });
        }

        let mut estimation_errors = Vec::new();
        let refreshed = self.estimate(position, input.streams, &mut estimation_errors);
        self.tracker.advance();

        let (csi, status) = if refreshed {
            (Some(self.csi.clone()), CsiStatus::Fresh)
        } else {
            debug!("Pattern position {}: no pilot resolved, CSI held", position);
            (None, CsiStatus::Held)
        };

        Ok(SymbolOutput {
            data,
            csi,
            status,
            estimation_errors,
        })
    }

    fn time_delay(&self) -> i64 {
        self.tracker.time_delay()
    }

    fn config(&self) -> &ChannelEstimatorConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::utils::hadamard;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    const PILOTS: [i32; 4] = [-21, -7, 7, 21];

    fn occupied_carriers() -> Vec<i32> {
        (-26..=26)
            .filter(|c| *c != 0 && !PILOTS.contains(c))
            .collect()
    }

    fn c(re: f32, im: f32) -> Complex32 {
        Complex32::new(re, im)
    }

    /// Channel linear in the logical carrier index: h(f) = a + b·f
    #[derive(Clone, Copy)]
    struct LinearChannel {
        a: Complex32,
        b: Complex32,
    }

    impl LinearChannel {
        fn at(&self, f: i32) -> Complex32 {
            self.a + self.b * f as f32
        }
    }

    fn random_channels(rng: &mut StdRng, num_rx: usize, num_tx: usize) -> Vec<Vec<LinearChannel>> {
        (0..num_rx)
            .map(|_| {
                (0..num_tx)
                    .map(|_| LinearChannel {
                        a: c(rng.gen_range(0.5..1.5), rng.gen_range(-1.0..1.0)),
                        b: c(rng.gen_range(-0.02..0.02), rng.gen_range(-0.02..0.02)),
                    })
                    .collect()
            })
            .collect()
    }

    /// Received symbol given the transmitted value per tx on each logical carrier
    fn receive(
        channels: &[Vec<LinearChannel>],
        fft_len: usize,
        carriers: &[i32],
        tx_value: impl Fn(usize, usize) -> Complex32,
    ) -> Vec<Vec<Complex32>> {
        channels
            .iter()
            .map(|row| {
                let mut symbol = vec![Complex32::zero(); fft_len];
                for (idx, &f) in carriers.iter().enumerate() {
                    let bin = common::utils::carrier_to_bin(f, fft_len).unwrap();
                    symbol[bin] = row
                        .iter()
                        .enumerate()
                        .map(|(tx, h)| h.at(f) * tx_value(tx, idx))
                        .sum();
                }
                symbol
            })
            .collect()
    }

    fn relative_error(estimate: Complex32, truth: Complex32) -> f32 {
        (estimate - truth).norm() / truth.norm()
    }

    /// Pilot estimates match exactly; CSI matches inside each pair's pilot
    /// span and stays within the flat-hold bound outside it.
    fn assert_recovered(
        estimator: &ChannelEstimator,
        csi: &Csi,
        channels: &[Vec<LinearChannel>],
    ) {
        let occupied = occupied_carriers();
        for (rx, row) in channels.iter().enumerate() {
            for (tx, channel) in row.iter().enumerate() {
                let mut measured = Vec::new();
                for (k, &f) in PILOTS.iter().enumerate() {
                    if let Some(h) = estimator.pilot_estimates()[[k, rx, tx]] {
                        assert!(relative_error(h, channel.at(f)) < 1e-5);
                        measured.push(f);
                    }
                }
                let lo = *measured.iter().min().unwrap();
                let hi = *measured.iter().max().unwrap();

                for (idx, &f) in occupied.iter().enumerate() {
                    let error = (csi.get(tx, rx, idx) - channel.at(f)).norm();
                    let outside = if f < lo {
                        lo - f
                    } else if f > hi {
                        f - hi
                    } else {
                        0
                    };
                    let bound = channel.b.norm() * outside as f32 + 1e-5;
                    assert!(error <= bound, "tx{} rx{} carrier {}: {} > {}", tx, rx, f, error, bound);
                }
            }
        }
    }

    #[test]
    fn test_siso_exact_recovery() {
        let p = c(0.6, -0.8);
        let h = c(-0.3, 1.7);
        let config = ChannelEstimatorConfig::new(1, 1, 8, vec![vec![p]], vec![1], vec![2, 3]);
        let mut estimator = ChannelEstimator::new(config).unwrap();

        let mut symbol = vec![Complex32::zero(); 8];
        let r = h * p;
        symbol[1] = r;
        symbol[2] = c(1.0, 0.0);
        symbol[3] = c(0.0, -1.0);
        let streams = vec![symbol];

        let out = estimator
            .process(SymbolInput {
                streams: &streams,
                start: Some(StartMarker::aligned()),
            })
            .unwrap();

        assert_eq!(out.status, CsiStatus::Fresh);
        assert_eq!(out.data, vec![vec![c(1.0, 0.0), c(0.0, -1.0)]]);

        let estimate = estimator.pilot_estimates()[[0, 0, 0]].unwrap();
        assert!((estimate * p - r).norm() < 1e-6);

        let csi = out.csi.unwrap();
        assert!(relative_error(csi.get(0, 0, 0), h) < 1e-6);
        assert!(relative_error(csi.get(0, 0, 1), h) < 1e-6);
    }

    #[test]
    fn test_mimo_2x2_frequency_orthogonal_single_symbol() {
        // tx0 on carriers -21 and 7, tx1 on -7 and 21
        let one = c(1.0, 0.0);
        let zero = Complex32::zero();
        let pattern = vec![vec![one, zero, one, zero, zero, one, zero, one]];
        let config =
            ChannelEstimatorConfig::new(2, 2, 64, pattern.clone(), PILOTS.to_vec(), occupied_carriers());
        let mut estimator = ChannelEstimator::new(config).unwrap();

        let mut rng = StdRng::seed_from_u64(7);
        let channels = random_channels(&mut rng, 2, 2);
        let streams = receive(&channels, 64, &PILOTS, |tx, k| pattern[0][tx * 4 + k]);

        let out = estimator
            .process(SymbolInput {
                streams: &streams,
                start: Some(StartMarker::aligned()),
            })
            .unwrap();

        assert_eq!(out.status, CsiStatus::Fresh);
        assert!(out.estimation_errors.is_empty());
        let csi = out.csi.unwrap();
        assert_eq!((csi.num_carriers(), csi.num_rx(), csi.num_tx()), (48, 2, 2));
        assert_recovered(&estimator, &csi, &channels);
    }

    #[test]
    fn test_mimo_2x2_hadamard_over_two_symbols() {
        let pattern = hadamard(2).unwrap();
        let config =
            ChannelEstimatorConfig::new(2, 2, 64, pattern.clone(), PILOTS.to_vec(), occupied_carriers());
        let mut estimator = ChannelEstimator::new(config).unwrap();

        let mut rng = StdRng::seed_from_u64(42);
        let channels = random_channels(&mut rng, 2, 2);

        // First pilot symbol alone is underdetermined
        let first = receive(&channels, 64, &PILOTS, |tx, _| pattern[0][tx]);
        let out = estimator
            .process(SymbolInput {
                streams: &first,
                start: Some(StartMarker::aligned()),
            })
            .unwrap();
        assert_eq!(out.status, CsiStatus::Held);
        assert!(out.csi.is_none());

        let second = receive(&channels, 64, &PILOTS, |tx, _| pattern[1][tx]);
        let out = estimator
            .process(SymbolInput {
                streams: &second,
                start: None,
            })
            .unwrap();
        assert_eq!(out.status, CsiStatus::Fresh);
        let csi = out.csi.unwrap();
        assert_recovered(&estimator, &csi, &channels);

        // Interior carriers are exact for a linear channel
        let occupied = occupied_carriers();
        let idx = occupied.iter().position(|&f| f == 3).unwrap();
        assert!(relative_error(csi.get(1, 0, idx), channels[0][1].at(3)) < 1e-5);

        // Next period keeps producing fresh CSI from the sliding window
        let third = receive(&channels, 64, &PILOTS, |tx, _| pattern[0][tx]);
        let out = estimator
            .process(SymbolInput {
                streams: &third,
                start: None,
            })
            .unwrap();
        assert_eq!(out.status, CsiStatus::Fresh);
        assert_recovered(&estimator, out.csi.as_ref().unwrap(), &channels);
    }

    #[test]
    fn test_unsynced_symbols_are_stale() {
        let config =
            ChannelEstimatorConfig::new(2, 2, 64, hadamard(2).unwrap(), PILOTS.to_vec(), occupied_carriers());
        let mut estimator = ChannelEstimator::new(config).unwrap();
        let streams = vec![vec![c(1.0, 1.0); 64]; 2];

        for _ in 0..2 {
            let out = estimator
                .process(SymbolInput {
                    streams: &streams,
                    start: None,
                })
                .unwrap();
            assert_eq!(out.data.len(), 2);
            assert_eq!(out.data[0].len(), 48);
            assert!(out.csi.is_none());
            assert_eq!(out.status, CsiStatus::Stale(StateError::Unsynced));
        }
        assert_eq!(estimator.time_delay(), 0);
        assert_eq!(estimator.frame_tracker().symbols_seen(), 2);
    }

    #[test]
    fn test_silent_antenna_keeps_prior_csi() {
        // Position 0 sounds tx0 only, position 1 tx1 only
        let one = c(1.0, 0.0);
        let zero = Complex32::zero();
        let config = ChannelEstimatorConfig::new(
            2,
            1,
            16,
            vec![vec![one, zero], vec![zero, one]],
            vec![2, 6],
            vec![3, 4, 5],
        );
        let mut estimator = ChannelEstimator::new(config).unwrap();

        let first = vec![{
            let mut s = vec![Complex32::zero(); 16];
            s[2] = c(2.0, 0.0);
            s[6] = c(2.0, 0.0);
            s
        }];
        let out = estimator
            .process(SymbolInput {
                streams: &first,
                start: Some(StartMarker::aligned()),
            })
            .unwrap();
        let csi = out.csi.unwrap();
        assert_eq!(csi.get(0, 0, 1), c(2.0, 0.0));
        assert_eq!(csi.get(1, 0, 1), Complex32::zero());

        let second = vec![{
            let mut s = vec![Complex32::zero(); 16];
            s[2] = c(0.0, 3.0);
            s[6] = c(0.0, 3.0);
            s
        }];
        let out = estimator
            .process(SymbolInput {
                streams: &second,
                start: None,
            })
            .unwrap();
        let csi = out.csi.unwrap();
        // Both rows of the period now resolve tx0 and tx1 jointly
        assert_eq!(csi.get(0, 0, 1), c(2.0, 0.0));
        assert_eq!(csi.get(1, 0, 1), c(0.0, 3.0));
    }

    #[test]
    fn test_non_finite_sample_holds_prior_pilot() {
        let one = c(1.0, 0.0);
        let config = ChannelEstimatorConfig::new(1, 1, 16, vec![vec![one]], vec![1, 5], vec![2, 3, 4]);
        let mut estimator = ChannelEstimator::new(config).unwrap();

        let mut symbol = vec![Complex32::zero(); 16];
        symbol[1] = c(1.0, 0.0);
        symbol[5] = c(3.0, 0.0);
        let streams = vec![symbol.clone()];
        estimator
            .process(SymbolInput {
                streams: &streams,
                start: Some(StartMarker::aligned()),
            })
            .unwrap();

        symbol[1] = c(f32::NAN, 0.0);
        symbol[5] = c(5.0, 0.0);
        let streams = vec![symbol];
        let out = estimator
            .process(SymbolInput {
                streams: &streams,
                start: None,
            })
            .unwrap();

        assert_eq!(
            out.estimation_errors,
            vec![EstimationError::NonFinite { carrier: 1, rx: 0 }]
        );
        assert_eq!(estimator.pilot_estimates()[[0, 0, 0]], Some(c(1.0, 0.0)));

        // Only the fresh pilot at 5 supports this symbol's CSI
        let csi = out.csi.unwrap();
        assert!(csi.as_array().iter().all(|v| (v - c(5.0, 0.0)).norm() < 1e-6));
        assert!(csi.as_array().iter().all(|v| v.re.is_finite() && v.im.is_finite()));
    }

    #[test]
    fn test_time_delay_reported() {
        let one = c(1.0, 0.0);
        let mut config = ChannelEstimatorConfig::new(1, 1, 64, vec![vec![one]], vec![5], vec![6]);
        config.cp_len = 16;
        let mut estimator = ChannelEstimator::new(config).unwrap();
        let streams = vec![vec![one; 64]];

        assert_eq!(estimator.time_delay(), 0);
        for _ in 0..2 {
            estimator
                .process(SymbolInput {
                    streams: &streams,
                    start: None,
                })
                .unwrap();
        }

        // Third symbol starts at sample 160; synchronizer saw the boundary at 158
        estimator
            .process(SymbolInput {
                streams: &streams,
                start: Some(StartMarker::detected_at(158)),
            })
            .unwrap();
        assert_eq!(estimator.time_delay(), 2);

        for _ in 0..3 {
            estimator
                .process(SymbolInput {
                    streams: &streams,
                    start: None,
                })
                .unwrap();
            assert_eq!(estimator.time_delay(), 2);
        }
    }

    /// Single symbol on pilot carrier 2 for two antennas with gains `h`
    fn two_tx_symbol(pilots: [Complex32; 2], h: [Complex32; 2]) -> Vec<Vec<Complex32>> {
        let mut s = vec![Complex32::zero(); 8];
        s[2] = h[0] * pilots[0] + h[1] * pilots[1];
        vec![s]
    }

    #[test]
    fn test_mixed_pattern_solved_jointly_every_frame() {
        // Position 1 sounds tx0 alone, but the window still determines tx1
        let one = c(1.0, 0.0);
        let zero = Complex32::zero();
        let pattern = vec![vec![one, one], vec![one, zero]];
        let config = ChannelEstimatorConfig::new(2, 1, 8, pattern.clone(), vec![2], vec![3]);
        let mut estimator = ChannelEstimator::new(config).unwrap();
        let h = [c(1.0, 0.0), c(2.0, 0.0)];

        for _ in 0..3 {
            let first = two_tx_symbol([pattern[0][0], pattern[0][1]], h);
            let out = estimator
                .process(SymbolInput {
                    streams: &first,
                    start: Some(StartMarker::aligned()),
                })
                .unwrap();
            assert_ne!(out.status, CsiStatus::Fresh);

            let second = two_tx_symbol([pattern[1][0], pattern[1][1]], h);
            let out = estimator
                .process(SymbolInput {
                    streams: &second,
                    start: None,
                })
                .unwrap();
            assert_eq!(out.status, CsiStatus::Fresh);
            assert!(out.estimation_errors.is_empty());

            let tx1 = estimator.pilot_estimates()[[0, 0, 1]].unwrap();
            assert!((tx1 - h[1]).norm() < 1e-6);
            let csi = out.csi.unwrap();
            assert!((csi.get(0, 0, 0) - h[0]).norm() < 1e-6);
            assert!((csi.get(1, 0, 0) - h[1]).norm() < 1e-6);
        }
    }

    #[test]
    fn test_singular_window_holds_prior_pilot() {
        // Full-rank pattern whose normal equations fall under the threshold
        let one = c(1.0, 0.0);
        let zero = Complex32::zero();
        let mut config = ChannelEstimatorConfig::new(
            2,
            1,
            8,
            vec![vec![one, zero], vec![one, c(0.1, 0.0)]],
            vec![2],
            vec![3],
        );
        config.singular_threshold = 0.01;
        let mut estimator = ChannelEstimator::new(config).unwrap();
        let h = [c(0.5, 0.5), c(-1.0, 0.0)];

        let first = two_tx_symbol([one, zero], h);
        let out = estimator
            .process(SymbolInput {
                streams: &first,
                start: Some(StartMarker::aligned()),
            })
            .unwrap();
        assert_eq!(out.status, CsiStatus::Fresh);
        let prior = estimator.pilot_estimates()[[0, 0, 0]];
        assert!((prior.unwrap() - h[0]).norm() < 1e-6);

        let second = two_tx_symbol([one, c(0.1, 0.0)], h);
        let out = estimator
            .process(SymbolInput {
                streams: &second,
                start: None,
            })
            .unwrap();
        assert_eq!(
            out.estimation_errors,
            vec![EstimationError::Singular { carrier: 2, rx: 0 }]
        );
        assert_eq!(out.status, CsiStatus::Held);
        assert!(out.csi.is_none());
        assert_eq!(estimator.pilot_estimates()[[0, 0, 0]], prior);
        assert_eq!(estimator.pilot_estimates()[[0, 0, 1]], None);
        assert!(estimator
            .csi()
            .as_array()
            .iter()
            .all(|v| v.re.is_finite() && v.im.is_finite()));
    }

    #[test]
    fn test_invalid_input_shape() {
        let one = c(1.0, 0.0);
        let config = ChannelEstimatorConfig::new(1, 2, 8, vec![vec![one]], vec![1], vec![2]);
        let mut estimator = ChannelEstimator::new(config).unwrap();

        let too_few = vec![vec![one; 8]];
        assert!(matches!(
            estimator.process(SymbolInput {
                streams: &too_few,
                start: Some(StartMarker::aligned()),
            }),
            Err(EstimatorError::InvalidInput(_))
        ));

        let short = vec![vec![one; 8], vec![one; 7]];
        assert!(matches!(
            estimator.process(SymbolInput {
                streams: &short,
                start: None,
            }),
            Err(EstimatorError::InvalidInput(_))
        ));
        assert_eq!(estimator.frame_tracker().symbols_seen(), 0);
        assert!(!estimator.frame_tracker().is_synced());
    }

    #[test]
    fn test_invalid_configurations() {
        let one = c(1.0, 0.0);
        let occupied = occupied_carriers();

        let cases = vec![
            ChannelEstimatorConfig::new(0, 1, 64, vec![vec![]], PILOTS.to_vec(), occupied.clone()),
            ChannelEstimatorConfig::new(1, 0, 64, vec![vec![one]], PILOTS.to_vec(), occupied.clone()),
            ChannelEstimatorConfig::new(1, 1, 0, vec![vec![one]], vec![], vec![]),
            ChannelEstimatorConfig::new(1, 1, 64, vec![vec![one]], vec![], occupied.clone()),
            ChannelEstimatorConfig::new(1, 1, 64, vec![vec![one]], vec![-21, 70], occupied.clone()),
            ChannelEstimatorConfig::new(1, 1, 64, vec![vec![one]], vec![-21, 1], occupied.clone()),
            ChannelEstimatorConfig::new(1, 1, 64, vec![], PILOTS.to_vec(), occupied.clone()),
            ChannelEstimatorConfig::new(2, 1, 64, vec![vec![one; 3]], PILOTS.to_vec(), occupied.clone()),
            ChannelEstimatorConfig::new(2, 1, 64, vec![vec![one, one]], PILOTS.to_vec(), occupied.clone()),
        ];
        for config in cases {
            assert!(ChannelEstimator::new(config).is_err());
        }

        let mut config = ChannelEstimatorConfig::new(1, 1, 64, vec![vec![one]], PILOTS.to_vec(), occupied);
        config.singular_threshold = -1.0;
        assert!(matches!(
            ChannelEstimator::new(config),
            Err(ConfigError::InvalidParameter(_))
        ));
    }

    #[test]
    fn test_config_from_json_uses_defaults() {
        let json = r#"{
            "num_tx": 1,
            "num_rx": 1,
            "fft_len": 8,
            "pilot_symbols": [[[1.0, 0.0]]],
            "pilot_carriers": [1],
            "occupied_carriers": [2, 3]
        }"#;
        let config: ChannelEstimatorConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.csi_key, "csi");
        assert_eq!(config.start_key, "start");
        assert_eq!(config.interpolation, InterpolationPolicy::Linear);
        assert!(ChannelEstimator::new(config).is_ok());
    }
}
