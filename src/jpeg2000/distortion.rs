//! Distortion reduction estimates for coding passes.
//!
//! Rate control only needs each pass to report a non-negative reduction of the
//! squared error, so the estimator is pluggable. Reconstruction is taken to be
//! truncation: a coefficient known down to bit-plane `p` is rebuilt as
//! `(m >> p) << p`.

use std::sync::LazyLock;

use crate::constants::DISTORTION_TABLE_FRACTION_BITS;

/// Squared-error reduction of a single coefficient decision, before weighting.
pub trait DistortionEstimator: Send + Sync {
    /// The coefficient of magnitude `magnitude` becomes significant at `bit_plane`.
    fn significance_reduction(&self, magnitude: u32, bit_plane: u8) -> f64;

    /// Bit `bit_plane` of an already significant coefficient is refined.
    fn refinement_reduction(&self, magnitude: u32, bit_plane: u8) -> f64;
}

/// Which estimator the encoder uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DistortionModel {
    #[default]
    Table,
    Exact,
}

impl DistortionModel {
    pub fn estimator(self) -> &'static dyn DistortionEstimator {
        match self {
            DistortionModel::Table => &TableEstimator,
            DistortionModel::Exact => &ExactEstimator,
        }
    }
}

#[inline]
fn truncate(magnitude: u32, bit_plane: u8) -> u64 {
    ((magnitude as u64) >> bit_plane) << bit_plane
}

#[inline]
fn squared(v: u64) -> f64 {
    let v = v as f64;
    v * v
}

/// Exact reduction computed from the full magnitude.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExactEstimator;

impl DistortionEstimator for ExactEstimator {
    fn significance_reduction(&self, magnitude: u32, bit_plane: u8) -> f64 {
        let m = magnitude as u64;
        squared(m) - squared(m - truncate(magnitude, bit_plane))
    }

    fn refinement_reduction(&self, magnitude: u32, bit_plane: u8) -> f64 {
        let m = magnitude as u64;
        squared(m - truncate(magnitude, bit_plane + 1)) - squared(m - truncate(magnitude, bit_plane))
    }
}

const DISTORTION_TABLE_SIZE: usize = 1 << (DISTORTION_TABLE_FRACTION_BITS + 1);

// Indexed by the coded bit and the six bits below it, read as a fixed point
// number t in [0, 2). Both pass types reduce the error by (2t - 1) * 4^p when the
// coded bit is set and by nothing otherwise.
static DISTORTION_TABLE: LazyLock<[f64; DISTORTION_TABLE_SIZE]> = LazyLock::new(|| {
    let one = (1usize << DISTORTION_TABLE_FRACTION_BITS) as f64;
    let mut table = [0.0; DISTORTION_TABLE_SIZE];
    for (i, value) in table.iter_mut().enumerate() {
        let t = i as f64 / one;
        if t >= 1.0 {
            *value = 2.0 * t - 1.0;
        }
    }
    table
});

/// Table driven approximation that looks at the seven magnitude bits starting
/// at the coded bit-plane.
#[derive(Debug, Clone, Copy, Default)]
pub struct TableEstimator;

impl TableEstimator {
    fn lookup(magnitude: u32, bit_plane: u8) -> f64 {
        let fraction = DISTORTION_TABLE_FRACTION_BITS;
        let window = if bit_plane as u32 >= fraction {
            magnitude >> (bit_plane as u32 - fraction)
        } else {
            magnitude << (fraction - bit_plane as u32)
        };
        let scale = (1u64 << (2 * bit_plane as u32)) as f64;
        DISTORTION_TABLE[window as usize & (DISTORTION_TABLE_SIZE - 1)] * scale
    }
}

impl DistortionEstimator for TableEstimator {
    fn significance_reduction(&self, magnitude: u32, bit_plane: u8) -> f64 {
        Self::lookup(magnitude, bit_plane)
    }

    fn refinement_reduction(&self, magnitude: u32, bit_plane: u8) -> f64 {
        Self::lookup(magnitude, bit_plane)
    }
}
