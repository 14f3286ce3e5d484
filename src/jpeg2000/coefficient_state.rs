//! Per-coefficient coding state shared by the bit-plane encoder and decoder.
//!
//! Flags live in an array padded by one coefficient on every side so neighbour
//! lookups need no bounds checks.

use super::context::{NeighborSignificance, NeighborSigns};
use crate::Tier1Error;
use crate::constants::STRIPE_HEIGHT;
use crate::error::try_filled_vec;

// State Bit Definitions
pub(crate) const SIGNIFICANT: u8 = 1 << 0;
pub(crate) const VISITED: u8 = 1 << 1;
pub(crate) const REFINED: u8 = 1 << 2;
pub(crate) const NEGATIVE: u8 = 1 << 3;

pub(crate) struct CoefficientStates {
    width: usize,
    height: usize,
    stride: usize,
    flags: Vec<u8>,
    vertically_causal: bool,
}

impl CoefficientStates {
    pub(crate) fn new(width: u32, height: u32, vertically_causal: bool) -> Result<Self, Tier1Error> {
        let stride = width as usize + 2;
        let flags = try_filled_vec(stride * (height as usize + 2), 0u8)?;
        Ok(Self {
            width: width as usize,
            height: height as usize,
            stride,
            flags,
            vertically_causal,
        })
    }

    pub(crate) fn width(&self) -> usize {
        self.width
    }

    pub(crate) fn height(&self) -> usize {
        self.height
    }

    #[inline]
    fn index(&self, x: usize, y: usize) -> usize {
        (y + 1) * self.stride + x + 1
    }

    #[inline]
    pub(crate) fn get(&self, x: usize, y: usize) -> u8 {
        self.flags[self.index(x, y)]
    }

    #[inline]
    pub(crate) fn is_significant(&self, x: usize, y: usize) -> bool {
        self.get(x, y) & SIGNIFICANT != 0
    }

    #[inline]
    pub(crate) fn set_significant(&mut self, x: usize, y: usize, negative: bool) {
        let i = self.index(x, y);
        self.flags[i] |= SIGNIFICANT;
        if negative {
            self.flags[i] |= NEGATIVE;
        }
    }

    #[inline]
    pub(crate) fn set_visited(&mut self, x: usize, y: usize) {
        let i = self.index(x, y);
        self.flags[i] |= VISITED;
    }

    #[inline]
    pub(crate) fn clear_visited(&mut self, x: usize, y: usize) {
        let i = self.index(x, y);
        self.flags[i] &= !VISITED;
    }

    #[inline]
    pub(crate) fn set_refined(&mut self, x: usize, y: usize) {
        let i = self.index(x, y);
        self.flags[i] |= REFINED;
    }

    // With vertically causal context formation the row below a stripe is
    // treated as insignificant.
    #[inline]
    fn causal_cut(&self, y: usize) -> bool {
        self.vertically_causal && y % STRIPE_HEIGHT as usize == STRIPE_HEIGHT as usize - 1
    }

    pub(crate) fn neighbor_significance(&self, x: usize, y: usize) -> NeighborSignificance {
        let i = self.index(x, y);
        let up = i - self.stride;
        let down = i + self.stride;
        let sig = |j: usize, bit: u8| if self.flags[j] & SIGNIFICANT != 0 { bit } else { 0 };

        let mut pattern = sig(i - 1, NeighborSignificance::W)
            | sig(i + 1, NeighborSignificance::E)
            | sig(up, NeighborSignificance::N)
            | sig(up - 1, NeighborSignificance::NW)
            | sig(up + 1, NeighborSignificance::NE);
        if !self.causal_cut(y) {
            pattern |= sig(down, NeighborSignificance::S)
                | sig(down - 1, NeighborSignificance::SW)
                | sig(down + 1, NeighborSignificance::SE);
        }
        NeighborSignificance(pattern)
    }

    pub(crate) fn neighbor_signs(&self, x: usize, y: usize) -> NeighborSigns {
        let i = self.index(x, y);
        let sign = |j: usize, sig_bit: u8, neg_bit: u8| {
            let f = self.flags[j];
            if f & SIGNIFICANT == 0 {
                0
            } else if f & NEGATIVE != 0 {
                sig_bit | neg_bit
            } else {
                sig_bit
            }
        };

        let mut pattern = sign(i - 1, NeighborSigns::W_SIG, NeighborSigns::W_NEG)
            | sign(i + 1, NeighborSigns::E_SIG, NeighborSigns::E_NEG)
            | sign(i - self.stride, NeighborSigns::N_SIG, NeighborSigns::N_NEG);
        if !self.causal_cut(y) {
            pattern |= sign(i + self.stride, NeighborSigns::S_SIG, NeighborSigns::S_NEG);
        }
        NeighborSigns(pattern)
    }

    /// Whether the four rows starting at `y` in column `x` can be coded in
    /// run-length mode: a full stripe column, none significant, none visited and
    /// every neighbourhood empty.
    pub(crate) fn is_run_length_column(&self, x: usize, y: usize) -> bool {
        let stripe = STRIPE_HEIGHT as usize;
        if y % stripe != 0 || y + stripe > self.height {
            return false;
        }
        (y..y + stripe).all(|row| {
            self.get(x, row) & (SIGNIFICANT | VISITED) == 0
                && self.neighbor_significance(x, row).is_empty()
        })
    }
}

/// Rows of the stripe starting at `y0`.
pub(crate) fn stripe_rows(y0: usize, height: usize) -> std::ops::Range<usize> {
    y0..(y0 + STRIPE_HEIGHT as usize).min(height)
}

/// First row of every stripe of a block with `height` rows.
pub(crate) fn stripes(height: usize) -> std::iter::StepBy<std::ops::Range<usize>> {
    (0..height).step_by(STRIPE_HEIGHT as usize)
}
