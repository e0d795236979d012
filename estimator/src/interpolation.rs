//! Carrier Interpolation
//!
//! Fills occupied carriers from sparse pilot estimates along the logical
//! (DC-centred) carrier axis. Carriers outside the outermost pilots take the
//! nearest pilot value (flat hold).

use common::types::InterpolationPolicy;
use num_complex::Complex64;
use std::cmp::Ordering;

/// Estimate at a logical carrier position
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CarrierPoint {
    pub position: i32,
    pub value: Complex64,
}

impl CarrierPoint {
    pub fn new(position: i32, value: Complex64) -> Self {
        Self { position, value }
    }
}

/// Evaluate sparse points at every target position.
///
/// Returns `None` when there are no points. A target that coincides with a
/// point gets that point's value unchanged.
pub fn interpolate(
    points: &[CarrierPoint],
    targets: &[i32],
    policy: InterpolationPolicy,
) -> Option<Vec<Complex64>> {
    if points.is_empty() {
        return None;
    }

    let mut sorted = points.to_vec();
    sorted.sort_by_key(|p| p.position);

    Some(
        targets
            .iter()
            .map(|&t| evaluate(&sorted, t, policy))
            .collect(),
    )
}

fn evaluate(sorted: &[CarrierPoint], target: i32, policy: InterpolationPolicy) -> Complex64 {
    // First point at or above the target
    let upper = sorted.partition_point(|p| p.position < target);

    if upper == 0 {
        return sorted[0].value;
    }
    if upper == sorted.len() {
        return sorted[sorted.len() - 1].value;
    }

    let hi = sorted[upper];
    if hi.position == target {
        return hi.value;
    }
    let lo = sorted[upper - 1];

    match policy {
        InterpolationPolicy::Linear => {
            let t = (target - lo.position) as f64 / (hi.position - lo.position) as f64;
            lo.value + (hi.value - lo.value) * t
        }
        InterpolationPolicy::Nearest => {
            match (target - lo.position).cmp(&(hi.position - target)) {
                Ordering::Greater => hi.value,
                Ordering::Less | Ordering::Equal => lo.value,
            }
        }
    }
}
