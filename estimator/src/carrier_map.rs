//! Carrier Map
//!
//! Static partition of the FFT bins into pilot, occupied and guard carriers.
//! Configured order is preserved: it fixes the order data carriers are
//! emitted in and the order pilot carriers are matched to pilot values.

use crate::ConfigError;
use common::types::CarrierClass;
use common::utils::{bin_to_logical, carrier_to_bin};
use num_complex::Complex32;
use tracing::debug;

/// Carrier classification for one OFDM symbol layout
#[derive(Debug, Clone)]
pub struct CarrierMap {
    /// FFT size
    fft_len: usize,
    /// Class of every bin
    classes: Vec<CarrierClass>,
    /// Pilot bins in configured order
    pilots: Vec<usize>,
    /// Occupied bins in configured order
    occupied: Vec<usize>,
    /// Guard bins, ascending
    guard: Vec<usize>,
}

impl CarrierMap {
    /// Build the map, rejecting out-of-range, duplicate or overlapping carriers
    pub fn new(
        fft_len: usize,
        pilot_carriers: &[i32],
        occupied_carriers: &[i32],
    ) -> Result<Self, ConfigError> {
        if fft_len == 0 {
            return Err(ConfigError::ZeroFftLength);
        }

        let mut classes = vec![CarrierClass::Guard; fft_len];
        let pilots = Self::place(&mut classes, pilot_carriers, CarrierClass::Pilot)?;
        let occupied = Self::place(&mut classes, occupied_carriers, CarrierClass::Occupied)?;

        let guard: Vec<usize> = classes
            .iter()
            .enumerate()
            .filter(|(_, class)| **class == CarrierClass::Guard)
            .map(|(bin, _)| bin)
            .collect();

        debug!(
            "Carrier map: fft_len={}, {} pilot, {} occupied, {} guard",
            fft_len,
            pilots.len(),
            occupied.len(),
            guard.len()
        );

        Ok(Self {
            fft_len,
            classes,
            pilots,
            occupied,
            guard,
        })
    }

    fn place(
        classes: &mut [CarrierClass],
        carriers: &[i32],
        class: CarrierClass,
    ) -> Result<Vec<usize>, ConfigError> {
        let fft_len = classes.len();
        let mut bins = Vec::with_capacity(carriers.len());

        for &carrier in carriers {
            let bin = carrier_to_bin(carrier, fft_len).ok_or(ConfigError::CarrierOutOfRange {
                class,
                carrier,
                fft_len,
            })?;

            match classes[bin] {
                CarrierClass::Guard => classes[bin] = class,
                existing if existing == class => {
                    return Err(ConfigError::DuplicateCarrier { class, carrier });
                }
                _ => return Err(ConfigError::CarrierOverlap { carrier }),
            }
            bins.push(bin);
        }

        Ok(bins)
    }

    /// FFT size
    pub fn fft_len(&self) -> usize {
        self.fft_len
    }

    /// Classify an FFT bin; bins beyond the FFT are guard
    pub fn classify(&self, bin: usize) -> CarrierClass {
        self.classes
            .get(bin)
            .copied()
            .unwrap_or(CarrierClass::Guard)
    }

    /// Bins of the given class in configured order
    pub fn carriers(&self, class: CarrierClass) -> &[usize] {
        match class {
            CarrierClass::Pilot => &self.pilots,
            CarrierClass::Occupied => &self.occupied,
            CarrierClass::Guard => &self.guard,
        }
    }

    pub fn num_pilots(&self) -> usize {
        self.pilots.len()
    }

    pub fn num_occupied(&self) -> usize {
        self.occupied.len()
    }

    /// Signed, DC-centred index of a bin (the interpolation axis)
    pub fn logical_index(&self, bin: usize) -> i32 {
        bin_to_logical(bin, self.fft_len)
    }

    /// Gather the samples of one class from a full FFT vector
    pub fn extract(&self, symbol: &[Complex32], class: CarrierClass) -> Vec<Complex32> {
        self.carriers(class).iter().map(|&bin| symbol[bin]).collect()
    }
}
