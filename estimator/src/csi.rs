//! Channel State Information
//!
//! Per occupied carrier, an N×M matrix of complex gains such that
//! `y[k] = H[k] · x[k]` (rows are receive antennas, columns transmit antennas).

use ndarray::{Array3, ArrayView2};
use num_complex::Complex32;

/// CSI for every occupied carrier, shape `(carriers, num_rx, num_tx)`
#[derive(Debug, Clone, PartialEq)]
pub struct Csi {
    matrix: Array3<Complex32>,
}

impl Csi {
    /// All-zero CSI
    pub fn new(num_carriers: usize, num_rx: usize, num_tx: usize) -> Self {
        Self {
            matrix: Array3::zeros((num_carriers, num_rx, num_tx)),
        }
    }

    /// Wrap an existing `(carriers, num_rx, num_tx)` array
    pub fn from_array(matrix: Array3<Complex32>) -> Self {
        Self { matrix }
    }

    /// Gain from `tx` to `rx` at the `carrier`-th occupied carrier
    pub fn get(&self, tx: usize, rx: usize, carrier: usize) -> Complex32 {
        self.matrix[[carrier, rx, tx]]
    }

    pub fn set(&mut self, tx: usize, rx: usize, carrier: usize, value: Complex32) {
        self.matrix[[carrier, rx, tx]] = value;
    }

    /// Channel matrix (num_rx × num_tx) of one occupied carrier
    pub fn carrier_matrix(&self, carrier: usize) -> ArrayView2<'_, Complex32> {
        self.matrix.index_axis(ndarray::Axis(0), carrier)
    }

    pub fn num_carriers(&self) -> usize {
        self.matrix.dim().0
    }

    pub fn num_rx(&self) -> usize {
        self.matrix.dim().1
    }

    pub fn num_tx(&self) -> usize {
        self.matrix.dim().2
    }

    pub fn as_array(&self) -> &Array3<Complex32> {
        &self.matrix
    }

    pub fn into_array(self) -> Array3<Complex32> {
        self.matrix
    }
}
