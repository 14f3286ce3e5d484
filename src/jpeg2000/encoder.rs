//! Tier-1 Encoder
//!
//! This module codes a set of code-blocks (typically all blocks of one tile
//! component) with the EBCOT bit-plane coder and forms quality layers over the
//! result with PCRD-opt.

use log::debug;

use super::bit_plane_coder::encode_code_block;
use super::image::{CodeBlock, EncodedCodeBlock};
use super::rate_control::{LayerPlan, form_layers};
use crate::Tier1Error;
use crate::coding_parameters::EncodeParameters;

/// Coded code-blocks together with the layers formed over them.
#[derive(Debug, Clone)]
pub struct LayeredCodeBlocks {
    /// Encoded blocks in input order.
    pub blocks: Vec<EncodedCodeBlock>,
    /// Inclusion of every block in every layer.
    pub plan: LayerPlan,
}

impl LayeredCodeBlocks {
    pub fn num_layers(&self) -> usize {
        self.plan.num_layers()
    }

    /// Bytes `block` contributes to `layer` alone, as a packet writer would emit them.
    pub fn layer_contribution(&self, block: usize, layer: usize) -> &[u8] {
        let start = match layer {
            0 => 0,
            k => self.plan.bytes_included(block, k - 1),
        };
        let end = self.plan.bytes_included(block, layer);
        &self.blocks[block].data[start..end]
    }

    /// Total bytes of all blocks up to and including `layer`.
    pub fn layer_bytes(&self, layer: usize) -> usize {
        self.plan.layer_bytes(layer)
    }
}

/// Tier-1 Encoder
#[derive(Debug, Clone)]
pub struct Tier1Encoder {
    parameters: EncodeParameters,
}

impl Tier1Encoder {
    /// Create an encoder, validating the parameters up front.
    pub fn new(parameters: EncodeParameters) -> Result<Self, Tier1Error> {
        parameters.validate()?;
        Ok(Self { parameters })
    }

    pub fn parameters(&self) -> &EncodeParameters {
        &self.parameters
    }

    /// Encode a single code-block. The block must not exceed the nominal size.
    pub fn encode_block(&self, block: &CodeBlock) -> Result<EncodedCodeBlock, Tier1Error> {
        if block.width > self.parameters.code_block_width
            || block.height > self.parameters.code_block_height
        {
            return Err(Tier1Error::InvalidCodeBlockSize);
        }
        encode_code_block(
            block,
            self.parameters.style,
            self.parameters.distortion_model.estimator(),
        )
    }

    /// Encode every block. With the `rayon` feature blocks are coded in parallel.
    pub fn encode_blocks(&self, blocks: &[CodeBlock]) -> Result<Vec<EncodedCodeBlock>, Tier1Error> {
        #[cfg(feature = "rayon")]
        let encoded = {
            use rayon::prelude::*;
            blocks
                .par_iter()
                .map(|block| self.encode_block(block))
                .collect::<Result<Vec<_>, _>>()?
        };
        #[cfg(not(feature = "rayon"))]
        let encoded = blocks
            .iter()
            .map(|block| self.encode_block(block))
            .collect::<Result<Vec<_>, _>>()?;

        debug!(
            "encoded {} code-blocks into {} bytes",
            encoded.len(),
            encoded.iter().map(|b| b.data.len()).sum::<usize>()
        );
        Ok(encoded)
    }

    /// Encode every block and form the configured quality layers.
    ///
    /// `num_samples` is the number of image samples the blocks represent; the
    /// layer rates in bits per sample are converted to byte budgets against it.
    pub fn encode(
        &self,
        blocks: &[CodeBlock],
        num_samples: usize,
    ) -> Result<LayeredCodeBlocks, Tier1Error> {
        let targets = self.parameters.layer_byte_targets(num_samples)?;
        let encoded = self.encode_blocks(blocks)?;
        let plan = form_layers(&encoded, &targets)?;
        Ok(LayeredCodeBlocks {
            blocks: encoded,
            plan,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jpeg2000::image::SubbandOrientation;

    fn ramp_blocks() -> Vec<CodeBlock> {
        let coefficients: Vec<i32> = (0..64 * 64).map(|i| (i % 97) - 48).collect();
        CodeBlock::split_subband(&coefficients, 64, 64, SubbandOrientation::HL, 32, 32).unwrap()
    }

    #[test]
    fn test_encoder_rejects_oversized_block() {
        let encoder = Tier1Encoder::new(EncodeParameters {
            code_block_width: 16,
            code_block_height: 16,
            ..Default::default()
        })
        .unwrap();
        let block = CodeBlock::new(32, 16, vec![1; 512], SubbandOrientation::LL);
        assert_eq!(
            encoder.encode_block(&block).unwrap_err(),
            Tier1Error::InvalidCodeBlockSize
        );
    }

    #[test]
    fn test_encoder_rejects_invalid_parameters() {
        let params = EncodeParameters {
            layer_rates: vec![2.0, 1.0],
            ..Default::default()
        };
        assert_eq!(
            Tier1Encoder::new(params).unwrap_err(),
            Tier1Error::InvalidParameterLayerRate
        );
    }

    #[test]
    fn test_encode_forms_layers() {
        let encoder = Tier1Encoder::new(EncodeParameters {
            layer_rates: vec![0.5, 1.5, 0.0],
            ..Default::default()
        })
        .unwrap();
        let blocks = ramp_blocks();
        let layered = encoder.encode(&blocks, 64 * 64).unwrap();

        assert_eq!(layered.blocks.len(), 4);
        assert_eq!(layered.num_layers(), 3);
        assert!(layered.layer_bytes(0) <= 256);
        assert!(layered.layer_bytes(1) <= 768);
        let total: usize = layered.blocks.iter().map(|b| b.data.len()).sum();
        assert_eq!(layered.layer_bytes(2), total);

        for block in 0..4 {
            let contributed: usize = (0..3)
                .map(|layer| layered.layer_contribution(block, layer).len())
                .sum();
            assert_eq!(contributed, layered.blocks[block].data.len());
        }
    }
}
