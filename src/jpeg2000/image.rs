//! Code-block data structures shared by the block coder, rate control and the
//! encode/decode orchestration.

use num_enum::{IntoPrimitive, TryFromPrimitive};

use crate::Tier1Error;
use crate::constants::{MAXIMUM_BIT_PLANES, MAXIMUM_CODE_BLOCK_AREA, MAXIMUM_CODE_BLOCK_DIMENSION};
use crate::coding_parameters::CodeBlockStyle;

/// Orientation of a wavelet subband.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, TryFromPrimitive, IntoPrimitive)]
#[repr(u8)]
pub enum SubbandOrientation {
    #[default]
    /// Low-Low (base image)
    LL = 0,
    /// High-Low (horizontally high-pass)
    HL = 1,
    /// Low-High (vertically high-pass)
    LH = 2,
    /// High-High (diagonal details)
    HH = 3,
}

/// The three coding pass types of the Tier-1 coder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, TryFromPrimitive, IntoPrimitive)]
#[repr(u8)]
pub enum PassType {
    SignificancePropagation = 0,
    MagnitudeRefinement = 1,
    Cleanup = 2,
}

impl PassType {
    /// Type of the pass with the given index inside a code-block. The first
    /// bit-plane only has a cleanup pass, every following one runs
    /// significance propagation, magnitude refinement and cleanup.
    pub fn for_pass_index(index: usize) -> PassType {
        if index == 0 {
            PassType::Cleanup
        } else {
            match (index - 1) % 3 {
                0 => PassType::SignificancePropagation,
                1 => PassType::MagnitudeRefinement,
                _ => PassType::Cleanup,
            }
        }
    }
}

/// Number of coding passes of a code-block with `num_bit_planes` bit-planes.
pub fn pass_count(num_bit_planes: u8) -> usize {
    if num_bit_planes == 0 {
        0
    } else {
        3 * num_bit_planes as usize - 2
    }
}

/// Bit-plane scanned by pass `index` of a block with `num_bit_planes` bit-planes.
pub fn bit_plane_of_pass(num_bit_planes: u8, index: usize) -> u8 {
    num_bit_planes - 1 - ((index + 2) / 3) as u8
}

/// Number of magnitude bit-planes needed to represent `magnitude`.
pub fn bit_planes_for_magnitude(magnitude: u32) -> u8 {
    (u32::BITS - magnitude.leading_zeros()) as u8
}

/// Dimensions and subband of a code-block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CodeBlockGeometry {
    pub width: u32,
    pub height: u32,
    pub orientation: SubbandOrientation,
}

impl CodeBlockGeometry {
    pub fn new(width: u32, height: u32, orientation: SubbandOrientation) -> Self {
        Self {
            width,
            height,
            orientation,
        }
    }

    pub fn area(&self) -> usize {
        self.width as usize * self.height as usize
    }

    /// Rejects empty blocks and blocks larger than the coder supports.
    pub fn validate(&self) -> Result<(), Tier1Error> {
        if self.width == 0
            || self.height == 0
            || self.width > MAXIMUM_CODE_BLOCK_DIMENSION
            || self.height > MAXIMUM_CODE_BLOCK_DIMENSION
            || self.width * self.height > MAXIMUM_CODE_BLOCK_AREA
        {
            return Err(Tier1Error::InvalidCodeBlockSize);
        }
        Ok(())
    }
}

/// A code-block of quantized wavelet coefficients, the input of the block encoder.
#[derive(Debug, Clone)]
pub struct CodeBlock {
    /// Width of the code-block.
    pub width: u32,
    /// Height of the code-block.
    pub height: u32,
    /// Signed coefficients in row-major order.
    pub coefficients: Vec<i32>,
    /// Orientation of the subband the block belongs to.
    pub orientation: SubbandOrientation,
    /// Magnitude bit count of the subband (Mb). Bit-planes above the block's own
    /// most significant bit are signalled as zero bit-planes.
    pub magnitude_bits: u8,
    /// Resolution level of the subband (0 is the lowest resolution).
    pub resolution: u8,
    /// Multiplier applied to the distortion estimates, typically the subband
    /// energy gain times the squared quantization step.
    pub weight: f64,
}

impl CodeBlock {
    /// Create a code-block whose subband magnitude bit count is the block's own
    /// bit-plane count.
    pub fn new(
        width: u32,
        height: u32,
        coefficients: Vec<i32>,
        orientation: SubbandOrientation,
    ) -> Self {
        let max = coefficients.iter().map(|c| c.unsigned_abs()).max().unwrap_or(0);
        Self {
            width,
            height,
            coefficients,
            orientation,
            magnitude_bits: bit_planes_for_magnitude(max),
            resolution: 0,
            weight: 1.0,
        }
    }

    pub fn with_magnitude_bits(mut self, magnitude_bits: u8) -> Self {
        self.magnitude_bits = magnitude_bits;
        self
    }

    pub fn with_resolution(mut self, resolution: u8) -> Self {
        self.resolution = resolution;
        self
    }

    pub fn with_weight(mut self, weight: f64) -> Self {
        self.weight = weight;
        self
    }

    pub fn geometry(&self) -> CodeBlockGeometry {
        CodeBlockGeometry::new(self.width, self.height, self.orientation)
    }

    /// Checks dimensions, buffer length and magnitude range.
    ///
    /// Returns the number of bit-planes of the block.
    pub fn validate(&self) -> Result<u8, Tier1Error> {
        self.geometry().validate()?;
        if self.coefficients.len() != self.geometry().area() {
            return Err(Tier1Error::InvalidCoefficientCount);
        }
        if self.magnitude_bits > MAXIMUM_BIT_PLANES {
            return Err(Tier1Error::TooManyBitPlanes);
        }
        if !self.weight.is_finite() || self.weight < 0.0 {
            return Err(Tier1Error::InvalidArgument);
        }

        let max = self
            .coefficients
            .iter()
            .map(|c| c.unsigned_abs())
            .max()
            .unwrap_or(0);
        let num_bit_planes = bit_planes_for_magnitude(max);
        if num_bit_planes > MAXIMUM_BIT_PLANES {
            return Err(Tier1Error::TooManyBitPlanes);
        }
        if num_bit_planes > self.magnitude_bits {
            return Err(Tier1Error::CoefficientOutOfRange);
        }
        Ok(num_bit_planes)
    }

    /// Partition a subband into code-blocks of at most `block_width` x
    /// `block_height` coefficients, in raster order of the blocks.
    ///
    /// All blocks share the magnitude bit count of the whole subband.
    pub fn split_subband(
        coefficients: &[i32],
        width: u32,
        height: u32,
        orientation: SubbandOrientation,
        block_width: u32,
        block_height: u32,
    ) -> Result<Vec<CodeBlock>, Tier1Error> {
        if coefficients.len() != width as usize * height as usize {
            return Err(Tier1Error::InvalidCoefficientCount);
        }
        CodeBlockGeometry::new(block_width, block_height, orientation).validate()?;

        let max = coefficients.iter().map(|c| c.unsigned_abs()).max().unwrap_or(0);
        let magnitude_bits = bit_planes_for_magnitude(max);

        let mut blocks = Vec::new();
        for y0 in (0..height).step_by(block_height as usize) {
            for x0 in (0..width).step_by(block_width as usize) {
                let w = block_width.min(width - x0);
                let h = block_height.min(height - y0);
                let mut data = Vec::with_capacity((w * h) as usize);
                for y in y0..y0 + h {
                    let row = (y * width) as usize;
                    data.extend_from_slice(&coefficients[row + x0 as usize..row + (x0 + w) as usize]);
                }
                blocks.push(
                    CodeBlock::new(w, h, data, orientation).with_magnitude_bits(magnitude_bits),
                );
            }
        }
        Ok(blocks)
    }
}

/// Rate/distortion record of one coding pass.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CodingPass {
    /// Index of the pass inside the code-block.
    pub index: usize,
    pub pass_type: PassType,
    /// Bit-plane the pass scanned (0 is the least significant).
    pub bit_plane: u8,
    /// Bytes of the code-block segment needed to decode up to and including this pass.
    pub cumulative_rate: usize,
    /// Weighted squared-error reduction achieved by all passes up to this one.
    pub cumulative_distortion: f64,
    /// Whether the MQ codeword or raw segment was terminated at the end of
    /// this pass.
    pub terminated: bool,
}

/// Output of the block encoder.
#[derive(Debug, Clone, Default)]
pub struct EncodedCodeBlock {
    pub width: u32,
    pub height: u32,
    pub orientation: SubbandOrientation,
    pub resolution: u8,
    /// Number of bit-planes actually coded (P).
    pub num_bit_planes: u8,
    /// Leading all-zero bit-planes relative to the subband magnitude bit count.
    pub zero_bit_planes: u8,
    /// The compressed segment of all passes.
    pub data: Vec<u8>,
    /// One record per pass, in coding order.
    pub passes: Vec<CodingPass>,
    /// Style switches the block was coded with.
    pub style: CodeBlockStyle,
}

impl EncodedCodeBlock {
    pub fn geometry(&self) -> CodeBlockGeometry {
        CodeBlockGeometry::new(self.width, self.height, self.orientation)
    }

    pub fn num_passes(&self) -> usize {
        self.passes.len()
    }

    /// Bytes needed for the first `num_passes` passes.
    pub fn rate(&self, num_passes: usize) -> usize {
        match num_passes {
            0 => 0,
            n => self.passes[n.min(self.passes.len()) - 1].cumulative_rate,
        }
    }

    /// Distortion reduction of the first `num_passes` passes.
    pub fn distortion(&self, num_passes: usize) -> f64 {
        match num_passes {
            0 => 0.0,
            n => self.passes[n.min(self.passes.len()) - 1].cumulative_distortion,
        }
    }

    /// Cumulative end offset of every pass, as signalled by packet headers.
    pub fn pass_ends(&self) -> Vec<usize> {
        self.passes.iter().map(|p| p.cumulative_rate).collect()
    }
}

impl AsRef<[CodingPass]> for EncodedCodeBlock {
    fn as_ref(&self) -> &[CodingPass] {
        &self.passes
    }
}

/// Compressed bytes of a code-block as handed to the block decoder.
#[derive(Debug, Clone, Copy)]
pub struct CodeBlockSegment<'a> {
    /// The bytes of the included passes.
    pub data: &'a [u8],
    /// Cumulative end offset of each included pass. Only the ends of terminated
    /// passes are consulted; the last segment of a request may run to the end
    /// of `data`.
    pub pass_ends: &'a [usize],
}

/// Outcome of decoding a code-block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeStatus {
    /// Every requested pass was decoded.
    Complete,
    /// The segment turned out malformed while decoding the given pass. Decoding
    /// stopped after it; coefficients reconstructed so far are kept.
    Corrupted { first_bad_pass: usize },
}

/// Output of the block decoder.
#[derive(Debug, Clone)]
pub struct DecodedCodeBlock {
    pub width: u32,
    pub height: u32,
    /// Reconstructed coefficients, row-major. Bit-planes never reached are zero.
    pub coefficients: Vec<i32>,
    /// Number of passes that were run.
    pub passes_decoded: usize,
    pub status: DecodeStatus,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pass_type_sequence() {
        let types: Vec<PassType> = (0..7).map(PassType::for_pass_index).collect();
        assert_eq!(
            types,
            vec![
                PassType::Cleanup,
                PassType::SignificancePropagation,
                PassType::MagnitudeRefinement,
                PassType::Cleanup,
                PassType::SignificancePropagation,
                PassType::MagnitudeRefinement,
                PassType::Cleanup,
            ]
        );
    }

    #[test]
    fn test_pass_count_and_bit_planes() {
        assert_eq!(pass_count(0), 0);
        assert_eq!(pass_count(1), 1);
        assert_eq!(pass_count(3), 7);
        assert_eq!(bit_plane_of_pass(3, 0), 2);
        assert_eq!(bit_plane_of_pass(3, 1), 1);
        assert_eq!(bit_plane_of_pass(3, 3), 1);
        assert_eq!(bit_plane_of_pass(3, 4), 0);
        assert_eq!(bit_plane_of_pass(3, 6), 0);
        assert_eq!(bit_planes_for_magnitude(0), 0);
        assert_eq!(bit_planes_for_magnitude(5), 3);
        assert_eq!(bit_planes_for_magnitude(8), 4);
    }

    #[test]
    fn test_orientation_conversion() {
        assert_eq!(SubbandOrientation::try_from(3u8).unwrap(), SubbandOrientation::HH);
        assert!(SubbandOrientation::try_from(4u8).is_err());
        assert_eq!(u8::from(SubbandOrientation::HL), 1);
    }

    #[test]
    fn test_code_block_validation() {
        let block = CodeBlock::new(4, 4, vec![0; 16], SubbandOrientation::LL);
        assert_eq!(block.validate(), Ok(0));

        let block = CodeBlock::new(4, 4, vec![0; 15], SubbandOrientation::LL);
        assert_eq!(block.validate(), Err(Tier1Error::InvalidCoefficientCount));

        let block = CodeBlock::new(128, 64, vec![0; 128 * 64], SubbandOrientation::LL);
        assert_eq!(block.validate(), Err(Tier1Error::InvalidCodeBlockSize));

        let mut data = vec![0; 16];
        data[3] = -9;
        let block = CodeBlock::new(4, 4, data, SubbandOrientation::HH).with_magnitude_bits(3);
        assert_eq!(block.validate(), Err(Tier1Error::CoefficientOutOfRange));

        let block = CodeBlock::new(1, 1, vec![i32::MIN], SubbandOrientation::HH);
        assert_eq!(block.validate(), Err(Tier1Error::TooManyBitPlanes));
    }

    #[test]
    fn test_split_subband() {
        let coefficients: Vec<i32> = (0..(10 * 6)).collect();
        let blocks =
            CodeBlock::split_subband(&coefficients, 10, 6, SubbandOrientation::LH, 4, 4).unwrap();
        assert_eq!(blocks.len(), 6);
        assert_eq!((blocks[0].width, blocks[0].height), (4, 4));
        assert_eq!((blocks[2].width, blocks[2].height), (2, 4));
        assert_eq!((blocks[5].width, blocks[5].height), (2, 2));
        assert_eq!(blocks[1].coefficients[0], 4);
        assert_eq!(blocks[3].coefficients[..4], [40, 41, 42, 43]);
        assert!(blocks.iter().all(|b| b.magnitude_bits == 6));
    }
}
