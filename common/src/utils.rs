//! Common Utilities
//!
//! Carrier index helpers, default carrier layouts and pilot sequences

use num_complex::Complex32;
use tracing::trace;

/// Distance between the outermost FFT bin and the first default pilot
const MAX_CARRIER_OFFSET: i32 = 6;

/// Spacing between default pilot carriers
const PILOT_SPACING: usize = 3;

/// Map a signed carrier index to an FFT bin.
///
/// Negative indices count down from the top of the FFT, so `-1` is bin
/// `fft_len - 1`. Returns `None` outside `[-fft_len, fft_len)`.
pub fn carrier_to_bin(carrier: i32, fft_len: usize) -> Option<usize> {
    let n = i64::try_from(fft_len).ok()?;
    let c = carrier as i64;
    if c < -n || c >= n {
        return None;
    }
    let bin = if c < 0 { c + n } else { c };
    Some(bin as usize)
}

/// Signed, DC-centred index of an FFT bin
pub fn bin_to_logical(bin: usize, fft_len: usize) -> i32 {
    if bin >= fft_len / 2 + fft_len % 2 && bin < fft_len {
        bin as i32 - fft_len as i32
    } else {
        bin as i32
    }
}

/// Default pilot carriers: every third carrier, skipping DC and the band edges
pub fn default_pilot_carriers(fft_len: usize) -> Vec<i32> {
    let half = (fft_len / 2) as i32;
    let mut pilots: Vec<i32> = (-half + MAX_CARRIER_OFFSET..0)
        .step_by(PILOT_SPACING)
        .collect();
    pilots.extend((2..=half - MAX_CARRIER_OFFSET).step_by(PILOT_SPACING));

    trace!("Default layout for fft_len={}: {} pilot carriers", fft_len, pilots.len());
    pilots
}

/// Default occupied carriers: the inner band minus DC and the given pilots
pub fn default_occupied_carriers(fft_len: usize, pilot_carriers: &[i32]) -> Vec<i32> {
    let half = (fft_len / 2) as i32;
    (-half + MAX_CARRIER_OFFSET + 2..half - MAX_CARRIER_OFFSET - 1)
        .filter(|c| *c != 0 && !pilot_carriers.contains(c))
        .collect()
}

/// Sylvester-construction Hadamard matrix of the given order.
///
/// Row `i` is the pilot pattern position, column `m` the transmit antenna.
/// Returns `None` unless `order` is a power of two.
pub fn hadamard(order: usize) -> Option<Vec<Vec<Complex32>>> {
    if order == 0 || !order.is_power_of_two() {
        return None;
    }

    let mut matrix = vec![vec![1.0f32]];
    while matrix.len() < order {
        let size = matrix.len();
        let mut next = vec![vec![0.0f32; size * 2]; size * 2];
        for (i, row) in matrix.iter().enumerate() {
            for (j, &v) in row.iter().enumerate() {
                next[i][j] = v;
                next[i][j + size] = v;
                next[i + size][j] = v;
                next[i + size][j + size] = -v;
            }
        }
        matrix = next;
    }

    Some(
        matrix
            .into_iter()
            .map(|row| row.into_iter().map(|v| Complex32::new(v, 0.0)).collect())
            .collect(),
    )
}

/// Convert a power ratio to dB
pub fn linear_to_db(value: f64) -> f64 {
    10.0 * value.log10()
}

/// Convert dB to a power ratio
pub fn db_to_linear(db: f64) -> f64 {
    10.0_f64.powf(db / 10.0)
}
