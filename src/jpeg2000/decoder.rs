//! Tier-1 Decoder.
//!
//! This module provides the `Tier1Decoder` which decodes layered code-blocks up
//! to a selected number of quality layers and resolution levels.

use log::debug;

use super::bit_plane_decoder::decode_code_block;
use super::encoder::LayeredCodeBlocks;
use super::image::{CodeBlockSegment, DecodeStatus, DecodedCodeBlock, EncodedCodeBlock};
use crate::Tier1Error;
use crate::coding_parameters::DecodeParameters;
use crate::constants::MAXIMUM_RESOLUTION_LEVELS;

/// Layer and resolution selective code-block decoder.
#[derive(Debug, Clone, Copy, Default)]
pub struct Tier1Decoder {
    parameters: DecodeParameters,
}

impl Tier1Decoder {
    pub fn new(parameters: DecodeParameters) -> Result<Self, Tier1Error> {
        parameters.validate(MAXIMUM_RESOLUTION_LEVELS)?;
        Ok(Self { parameters })
    }

    pub fn parameters(&self) -> &DecodeParameters {
        &self.parameters
    }

    /// Decode the first `num_passes` passes of an encoded block.
    pub fn decode_block(
        &self,
        encoded: &EncodedCodeBlock,
        num_passes: usize,
    ) -> Result<DecodedCodeBlock, Tier1Error> {
        if num_passes > encoded.num_passes() {
            return Err(Tier1Error::InvalidPassCount);
        }
        let pass_ends = encoded.pass_ends();
        let segment = CodeBlockSegment {
            data: &encoded.data[..encoded.rate(num_passes)],
            pass_ends: &pass_ends,
        };
        decode_code_block(
            encoded.geometry(),
            encoded.num_bit_planes,
            encoded.style,
            segment,
            num_passes,
        )
    }

    /// Decode every block with the passes of the selected layers.
    ///
    /// Blocks of the resolution levels discarded by the reduction factor are
    /// not touched and come back as `None`.
    pub fn decode(
        &self,
        layered: &LayeredCodeBlocks,
        num_resolutions: u8,
    ) -> Result<Vec<Option<DecodedCodeBlock>>, Tier1Error> {
        self.parameters.validate(num_resolutions)?;
        let kept_resolutions = num_resolutions - self.parameters.reduce;

        let decode_one = |(index, encoded): (usize, &EncodedCodeBlock)| {
            if encoded.resolution >= kept_resolutions {
                return Ok(None);
            }
            let num_passes = layered
                .plan
                .passes_for_decode(index, self.parameters.max_layers);
            self.decode_block(encoded, num_passes).map(Some)
        };

        #[cfg(feature = "rayon")]
        let decoded = {
            use rayon::prelude::*;
            layered
                .blocks
                .par_iter()
                .enumerate()
                .map(decode_one)
                .collect::<Result<Vec<_>, Tier1Error>>()?
        };
        #[cfg(not(feature = "rayon"))]
        let decoded = layered
            .blocks
            .iter()
            .enumerate()
            .map(decode_one)
            .collect::<Result<Vec<_>, Tier1Error>>()?;

        let corrupted = decoded
            .iter()
            .flatten()
            .filter(|b| b.status != DecodeStatus::Complete)
            .count();
        debug!(
            "decoded {} of {} code-blocks, {} corrupted",
            decoded.iter().flatten().count(),
            decoded.len(),
            corrupted
        );
        Ok(decoded)
    }
}
