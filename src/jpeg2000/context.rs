//! Context formation for the bit-plane coder (ISO/IEC 15444-1 D.3).
//!
//! All decisions are pure table lookups keyed by compact neighbourhood
//! encodings. The tables are built once and shared read-only by every coder.

use std::sync::LazyLock;

use super::image::SubbandOrientation;

pub const FIRST_SIGN_CONTEXT: u8 = 9;
pub const FIRST_MAGNITUDE_CONTEXT: u8 = 14;
pub const RUN_LENGTH_CONTEXT: u8 = 17;
pub const UNIFORM_CONTEXT: u8 = 18;

/// Significance of the eight neighbours of a coefficient, one bit each.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct NeighborSignificance(pub u8);

impl NeighborSignificance {
    pub const W: u8 = 1 << 0;
    pub const E: u8 = 1 << 1;
    pub const N: u8 = 1 << 2;
    pub const S: u8 = 1 << 3;
    pub const NW: u8 = 1 << 4;
    pub const NE: u8 = 1 << 5;
    pub const SW: u8 = 1 << 6;
    pub const SE: u8 = 1 << 7;

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    fn horizontal(self) -> u8 {
        (self.0 & Self::W != 0) as u8 + (self.0 & Self::E != 0) as u8
    }

    fn vertical(self) -> u8 {
        (self.0 & Self::N != 0) as u8 + (self.0 & Self::S != 0) as u8
    }

    fn diagonal(self) -> u8 {
        (self.0 & (Self::NW | Self::NE | Self::SW | Self::SE)).count_ones() as u8
    }
}

/// Significance and sign of the four horizontal and vertical neighbours.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct NeighborSigns(pub u8);

impl NeighborSigns {
    pub const W_SIG: u8 = 1 << 0;
    pub const W_NEG: u8 = 1 << 1;
    pub const E_SIG: u8 = 1 << 2;
    pub const E_NEG: u8 = 1 << 3;
    pub const N_SIG: u8 = 1 << 4;
    pub const N_NEG: u8 = 1 << 5;
    pub const S_SIG: u8 = 1 << 6;
    pub const S_NEG: u8 = 1 << 7;

    // Contribution of one neighbour: 1 positive, -1 negative, 0 insignificant.
    fn contribution(self, sig: u8, neg: u8) -> i8 {
        if self.0 & sig == 0 {
            0
        } else if self.0 & neg != 0 {
            -1
        } else {
            1
        }
    }

    fn horizontal(self) -> i8 {
        (self.contribution(Self::W_SIG, Self::W_NEG) + self.contribution(Self::E_SIG, Self::E_NEG))
            .clamp(-1, 1)
    }

    fn vertical(self) -> i8 {
        (self.contribution(Self::N_SIG, Self::N_NEG) + self.contribution(Self::S_SIG, Self::S_NEG))
            .clamp(-1, 1)
    }
}

// Table D.1. The rows are LL/LH, HL and HH.
static ZERO_CODING_TABLE: LazyLock<[[u8; 256]; 3]> = LazyLock::new(|| {
    let mut table = [[0u8; 256]; 3];
    for pattern in 0..256usize {
        let n = NeighborSignificance(pattern as u8);
        let (h, v, d) = (n.horizontal(), n.vertical(), n.diagonal());
        table[0][pattern] = horizontal_dominant_label(h, v, d);
        table[1][pattern] = horizontal_dominant_label(v, h, d);
        table[2][pattern] = diagonal_label(h + v, d);
    }
    table
});

fn horizontal_dominant_label(h: u8, v: u8, d: u8) -> u8 {
    match (h, v, d) {
        (2, _, _) => 8,
        (1, 1.., _) => 7,
        (1, 0, 1..) => 6,
        (1, 0, 0) => 5,
        (0, 2, _) => 4,
        (0, 1, _) => 3,
        (0, 0, 2..) => 2,
        (0, 0, 1) => 1,
        _ => 0,
    }
}

fn diagonal_label(hv: u8, d: u8) -> u8 {
    match (d, hv) {
        (3.., _) => 8,
        (2, 1..) => 7,
        (2, 0) => 6,
        (1, 2..) => 5,
        (1, 1) => 4,
        (1, 0) => 3,
        (0, 2..) => 2,
        (0, 1) => 1,
        _ => 0,
    }
}

// Table D.3, indexed by the sign encoding; each entry is (context, xor bit).
static SIGN_CODING_TABLE: LazyLock<[(u8, u8); 256]> = LazyLock::new(|| {
    let mut table = [(0u8, 0u8); 256];
    for (pattern, entry) in table.iter_mut().enumerate() {
        let signs = NeighborSigns(pattern as u8);
        let (offset, xor) = match (signs.horizontal(), signs.vertical()) {
            (1, 1) => (4, 0),
            (1, 0) => (3, 0),
            (1, -1) => (2, 0),
            (0, 1) => (1, 0),
            (0, 0) => (0, 0),
            (0, -1) => (1, 1),
            (-1, 1) => (2, 1),
            (-1, 0) => (3, 1),
            _ => (4, 1),
        };
        *entry = (FIRST_SIGN_CONTEXT + offset, xor);
    }
    table
});

/// Zero coding context (0..=8) of an insignificant coefficient.
#[inline]
pub fn zero_coding_context(neighbors: NeighborSignificance, orientation: SubbandOrientation) -> u8 {
    let row = match orientation {
        SubbandOrientation::LL | SubbandOrientation::LH => 0,
        SubbandOrientation::HL => 1,
        SubbandOrientation::HH => 2,
    };
    ZERO_CODING_TABLE[row][neighbors.0 as usize]
}

/// Sign coding context (9..=13) and the bit the sign is XORed with.
#[inline]
pub fn sign_coding_context(signs: NeighborSigns) -> (u8, u8) {
    SIGN_CODING_TABLE[signs.0 as usize]
}

/// Magnitude refinement context (14..=16), Table D.4.
#[inline]
pub fn magnitude_refinement_context(neighbors: NeighborSignificance, first_refinement: bool) -> u8 {
    if !first_refinement {
        FIRST_MAGNITUDE_CONTEXT + 2
    } else if neighbors.is_empty() {
        FIRST_MAGNITUDE_CONTEXT
    } else {
        FIRST_MAGNITUDE_CONTEXT + 1
    }
}

#[inline]
pub fn run_length_context() -> u8 {
    RUN_LENGTH_CONTEXT
}

#[inline]
pub fn uniform_context() -> u8 {
    UNIFORM_CONTEXT
}

#[cfg(test)]
mod tests {
    use super::*;

    use super::NeighborSignificance as N;
    use super::NeighborSigns as S;

    #[test]
    fn test_zero_coding_horizontal_dominant() {
        let ll = SubbandOrientation::LL;
        assert_eq!(zero_coding_context(N(0), ll), 0);
        assert_eq!(zero_coding_context(N(N::NW), ll), 1);
        assert_eq!(zero_coding_context(N(N::NW | N::SE), ll), 2);
        assert_eq!(zero_coding_context(N(N::N), ll), 3);
        assert_eq!(zero_coding_context(N(N::N | N::S | N::NE), ll), 4);
        assert_eq!(zero_coding_context(N(N::W), ll), 5);
        assert_eq!(zero_coding_context(N(N::E | N::SW), ll), 6);
        assert_eq!(zero_coding_context(N(N::E | N::S), ll), 7);
        assert_eq!(zero_coding_context(N(N::E | N::W), ll), 8);
        assert_eq!(
            zero_coding_context(N(N::E | N::W), SubbandOrientation::LH),
            8
        );
    }

    #[test]
    fn test_zero_coding_hl_swaps_directions() {
        let hl = SubbandOrientation::HL;
        assert_eq!(zero_coding_context(N(N::N | N::S), hl), 8);
        assert_eq!(zero_coding_context(N(N::W | N::E), hl), 4);
        assert_eq!(zero_coding_context(N(N::N), hl), 5);
        assert_eq!(zero_coding_context(N(N::W), hl), 3);
    }

    #[test]
    fn test_zero_coding_diagonal() {
        let hh = SubbandOrientation::HH;
        assert_eq!(zero_coding_context(N(0), hh), 0);
        assert_eq!(zero_coding_context(N(N::W), hh), 1);
        assert_eq!(zero_coding_context(N(N::W | N::N), hh), 2);
        assert_eq!(zero_coding_context(N(N::NE), hh), 3);
        assert_eq!(zero_coding_context(N(N::NE | N::S), hh), 4);
        assert_eq!(zero_coding_context(N(N::NE | N::S | N::E), hh), 5);
        assert_eq!(zero_coding_context(N(N::NE | N::SW), hh), 6);
        assert_eq!(zero_coding_context(N(N::NE | N::SW | N::W), hh), 7);
        assert_eq!(zero_coding_context(N(N::NE | N::SW | N::NW), hh), 8);
    }

    #[test]
    fn test_sign_coding_mirror_symmetry() {
        assert_eq!(sign_coding_context(S(0)), (9, 0));
        assert_eq!(sign_coding_context(S(S::W_SIG)), (12, 0));
        assert_eq!(sign_coding_context(S(S::W_SIG | S::W_NEG)), (12, 1));
        assert_eq!(sign_coding_context(S(S::N_SIG)), (10, 0));
        assert_eq!(sign_coding_context(S(S::S_SIG | S::S_NEG)), (10, 1));
        assert_eq!(sign_coding_context(S(S::E_SIG | S::N_SIG)), (13, 0));
        assert_eq!(
            sign_coding_context(S(S::E_SIG | S::E_NEG | S::N_SIG | S::N_NEG)),
            (13, 1)
        );
        assert_eq!(sign_coding_context(S(S::E_SIG | S::S_SIG | S::S_NEG)), (11, 0));
        assert_eq!(sign_coding_context(S(S::E_SIG | S::E_NEG | S::S_SIG)), (11, 1));
        // Opposite horizontal neighbours cancel out.
        assert_eq!(sign_coding_context(S(S::W_SIG | S::E_SIG | S::E_NEG)), (9, 0));
    }

    #[test]
    fn test_magnitude_refinement_contexts() {
        assert_eq!(magnitude_refinement_context(N(0), true), 14);
        assert_eq!(magnitude_refinement_context(N(N::SE), true), 15);
        assert_eq!(magnitude_refinement_context(N(0), false), 16);
        assert_eq!(magnitude_refinement_context(N(N::W), false), 16);
        assert_eq!(run_length_context(), 17);
        assert_eq!(uniform_context(), 18);
    }
}
