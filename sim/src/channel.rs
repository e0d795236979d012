//! Synthetic MIMO-OFDM transmitter and channel

use anyhow::anyhow;
use common::utils::{carrier_to_bin, db_to_linear};
use ndarray::Array3;
use num_complex::Complex32;
use rand::rngs::StdRng;
use rand::Rng;
use rand_distr::{Distribution, Normal};
use std::f32::consts::PI;

/// Static tapped-delay-line channel per antenna pair
#[derive(Debug, Clone)]
pub struct MultipathChannel {
    /// Tap gains, shape `(num_rx, num_tx, num_taps)`
    taps: Array3<Complex32>,
    fft_len: usize,
}

impl MultipathChannel {
    /// Rayleigh taps with exponentially decaying power, unit total power
    pub fn random(
        rng: &mut StdRng,
        num_rx: usize,
        num_tx: usize,
        num_taps: usize,
        tap_decay: f64,
        fft_len: usize,
    ) -> anyhow::Result<Self> {
        if num_taps == 0 {
            return Err(anyhow!("Channel needs at least one tap"));
        }
        let total: f64 = (0..num_taps).map(|l| tap_decay.powi(l as i32)).sum();
        let gains = (0..num_taps)
            .map(|l| Normal::new(0.0, (tap_decay.powi(l as i32) / total / 2.0).sqrt()))
            .collect::<Result<Vec<_>, _>>()?;

        let taps = Array3::from_shape_fn((num_rx, num_tx, num_taps), |(_, _, l)| {
            let re: f64 = gains[l].sample(rng);
            let im: f64 = gains[l].sample(rng);
            Complex32::new(re as f32, im as f32)
        });
        Ok(Self { taps, fft_len })
    }

    /// Frequency response on a logical carrier
    pub fn response(&self, rx: usize, tx: usize, carrier: i32) -> Complex32 {
        self.taps
            .slice(ndarray::s![rx, tx, ..])
            .iter()
            .enumerate()
            .map(|(l, &h)| {
                let phase = -2.0 * PI * (l as f32) * (carrier as f32) / self.fft_len as f32;
                h * Complex32::from_polar(1.0, phase)
            })
            .sum()
    }
}

/// Unit-power QPSK symbol
pub fn qpsk(rng: &mut StdRng) -> Complex32 {
    let a = std::f32::consts::FRAC_1_SQRT_2;
    let re = if rng.gen::<bool>() { a } else { -a };
    let im = if rng.gen::<bool>() { a } else { -a };
    Complex32::new(re, im)
}

/// Builds received post-FFT symbols for one pilot pattern and carrier layout
pub struct Synthesizer {
    pub channel: MultipathChannel,
    pilot_symbols: Vec<Vec<Complex32>>,
    pilot_carriers: Vec<i32>,
    occupied_carriers: Vec<i32>,
    num_tx: usize,
    fft_len: usize,
    noise: Option<Normal<f64>>,
}

impl Synthesizer {
    pub fn new(
        channel: MultipathChannel,
        config: &estimator::ChannelEstimatorConfig,
        snr_db: Option<f64>,
    ) -> anyhow::Result<Self> {
        let noise = snr_db
            .map(|snr| Normal::new(0.0, (1.0 / db_to_linear(snr) / 2.0).sqrt()))
            .transpose()?;
        Ok(Self {
            channel,
            pilot_symbols: config.pilot_symbols.clone(),
            pilot_carriers: config.pilot_carriers.clone(),
            occupied_carriers: config.occupied_carriers.clone(),
            num_tx: config.num_tx,
            fft_len: config.fft_len,
            noise,
        })
    }

    fn pilot(&self, position: usize, tx: usize, pilot: usize) -> Complex32 {
        let entry = &self.pilot_symbols[position % self.pilot_symbols.len()];
        if entry.len() == self.num_tx {
            entry[tx]
        } else {
            entry[tx * self.pilot_carriers.len() + pilot]
        }
    }

    /// Received symbols (one per rx) at pattern `position`
    pub fn symbol(
        &self,
        rng: &mut StdRng,
        position: usize,
        num_rx: usize,
    ) -> anyhow::Result<Vec<Vec<Complex32>>> {
        // Transmitted value per (logical carrier, tx)
        let mut transmitted: Vec<(i32, Vec<Complex32>)> = Vec::new();
        for (k, &carrier) in self.pilot_carriers.iter().enumerate() {
            let values = (0..self.num_tx).map(|tx| self.pilot(position, tx, k)).collect();
            transmitted.push((carrier, values));
        }
        for &carrier in &self.occupied_carriers {
            let values = (0..self.num_tx).map(|_| qpsk(rng)).collect();
            transmitted.push((carrier, values));
        }

        let mut streams = vec![vec![Complex32::new(0.0, 0.0); self.fft_len]; num_rx];
        for (rx, stream) in streams.iter_mut().enumerate() {
            for (carrier, values) in &transmitted {
                let bin = carrier_to_bin(*carrier, self.fft_len)
                    .ok_or_else(|| anyhow!("Carrier {} outside FFT", carrier))?;
                stream[bin] = values
                    .iter()
                    .enumerate()
                    .map(|(tx, &x)| self.channel.response(rx, tx, *carrier) * x)
                    .sum();
            }
            if let Some(noise) = &self.noise {
                for sample in stream.iter_mut() {
                    let re: f64 = noise.sample(rng);
                    let im: f64 = noise.sample(rng);
                    *sample += Complex32::new(re as f32, im as f32);
                }
            }
        }
        Ok(streams)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    #[test]
    fn test_single_tap_is_flat() {
        let mut rng = StdRng::seed_from_u64(3);
        let channel = MultipathChannel::random(&mut rng, 1, 1, 1, 0.5, 64).unwrap();
        let h0 = channel.response(0, 0, 0);
        for carrier in [-20, -1, 5, 31] {
            assert!((channel.response(0, 0, carrier) - h0).norm() < 1e-6);
        }
    }

    #[test]
    fn test_response_is_periodic_in_fft_len() {
        let mut rng = StdRng::seed_from_u64(9);
        let channel = MultipathChannel::random(&mut rng, 2, 2, 4, 0.5, 16).unwrap();
        let a = channel.response(1, 0, -3);
        let b = channel.response(1, 0, 13);
        assert!((a - b).norm() < 1e-5);
    }

    #[test]
    fn test_qpsk_unit_power() {
        let mut rng = StdRng::seed_from_u64(0);
        for _ in 0..16 {
            assert!((qpsk(&mut rng).norm() - 1.0).abs() < 1e-6);
        }
    }

    #[test]
    fn test_zero_taps_rejected() {
        let mut rng = StdRng::seed_from_u64(0);
        assert!(MultipathChannel::random(&mut rng, 1, 1, 0, 0.5, 64).is_err());
    }
}
