//! EBCOT bit-plane encoder (ISO/IEC 15444-1 Annex D).
//!
//! Codes one code-block with the MQ coder, or raw under selective bypass, and
//! records the rate and distortion reduction of every coding pass for rate
//! control.

use log::trace;

use super::coefficient_state::{
    CoefficientStates, REFINED, SIGNIFICANT, VISITED, stripe_rows, stripes,
};
use super::context::{
    magnitude_refinement_context, run_length_context, sign_coding_context, uniform_context,
    zero_coding_context,
};
use super::distortion::DistortionEstimator;
use super::image::{
    CodeBlock, CodingPass, EncodedCodeBlock, PassType, bit_plane_of_pass, pass_count,
};
use super::mq_coder::MqEncoder;
use super::raw_coder::RawEncoder;
use crate::Tier1Error;
use crate::coding_parameters::CodeBlockStyle;
use crate::error::try_filled_vec;

pub struct BitPlaneCoder<'a> {
    block: &'a CodeBlock,
    style: CodeBlockStyle,
    estimator: &'a dyn DistortionEstimator,
    num_bit_planes: u8,
    magnitudes: Vec<u32>,
    states: CoefficientStates,
    mq: MqEncoder,
    raw: RawEncoder,
    // Whether the pass being coded is a raw pass.
    raw_pass: bool,
}

impl<'a> BitPlaneCoder<'a> {
    /// Prepare the coder, rejecting blocks outside the supported range.
    pub fn new(
        block: &'a CodeBlock,
        style: CodeBlockStyle,
        estimator: &'a dyn DistortionEstimator,
    ) -> Result<Self, Tier1Error> {
        let num_bit_planes = block.validate()?;

        let mut magnitudes = try_filled_vec(block.coefficients.len(), 0u32)?;
        for (m, c) in magnitudes.iter_mut().zip(&block.coefficients) {
            *m = c.unsigned_abs();
        }

        Ok(Self {
            block,
            style,
            estimator,
            num_bit_planes,
            magnitudes,
            states: CoefficientStates::new(
                block.width,
                block.height,
                style.vertically_causal_context,
            )?,
            mq: MqEncoder::new(),
            raw: RawEncoder::new(),
            raw_pass: false,
        })
    }

    pub fn num_bit_planes(&self) -> u8 {
        self.num_bit_planes
    }

    /// Run every coding pass from the most significant bit-plane down.
    pub fn encode_codeblock(mut self) -> Result<EncodedCodeBlock, Tier1Error> {
        let num_passes = pass_count(self.num_bit_planes);
        let mut passes = Vec::new();
        passes
            .try_reserve_exact(num_passes)
            .map_err(|_| Tier1Error::NotEnoughMemory)?;

        let style = self.style;
        let mut distortion = 0.0;
        for index in 0..num_passes {
            let pass_type = PassType::for_pass_index(index);
            let bit_plane = bit_plane_of_pass(self.num_bit_planes, index);
            self.raw_pass = style.is_raw_pass(index);

            let reduction = match pass_type {
                PassType::SignificancePropagation => self.significance_propagation(bit_plane),
                PassType::MagnitudeRefinement => self.magnitude_refinement(bit_plane),
                PassType::Cleanup => self.cleanup(bit_plane),
            };
            distortion += reduction * self.block.weight;

            let terminated = style.is_terminated_pass(index, num_passes);
            // Rates of non-terminated MQ passes are resolved once their
            // codeword is terminated.
            let cumulative_rate = match (self.raw_pass, terminated) {
                (true, true) => {
                    let segment = self.raw.terminate();
                    self.mq.append_segment(&segment)
                }
                (true, false) => self.mq.len() + self.raw.truncation_length(),
                (false, true) => self.mq.terminate(style.termination()),
                (false, false) => {
                    self.mq.mark_truncation_point();
                    0
                }
            };
            if style.reset_context_probabilities {
                self.mq.reset_contexts();
            }

            passes.push(CodingPass {
                index,
                pass_type,
                bit_plane,
                cumulative_rate,
                cumulative_distortion: distortion,
                terminated,
            });
        }

        let mut lengths = self.mq.truncation_lengths().iter();
        for pass in passes.iter_mut() {
            if !pass.terminated && !style.is_raw_pass(pass.index) {
                pass.cumulative_rate = lengths.next().copied().unwrap_or(pass.cumulative_rate);
            }
        }

        let data = self.mq.into_bytes();
        // A raw pass left open ends inside the segment its refinement pass
        // terminates. The decoder substitutes a trailing 0xFF.
        let mut segment_end = data.len();
        for pass in passes.iter_mut().rev() {
            if pass.terminated {
                segment_end = pass.cumulative_rate;
            } else if style.is_raw_pass(pass.index) {
                let mut rate = pass.cumulative_rate.min(segment_end);
                if rate > 0 && data[rate - 1] == 0xFF {
                    rate -= 1;
                }
                pass.cumulative_rate = rate;
            }
        }

        trace!(
            "encoded {}x{} code-block: {} bit-planes, {} passes, {} bytes",
            self.block.width,
            self.block.height,
            self.num_bit_planes,
            passes.len(),
            data.len()
        );

        Ok(EncodedCodeBlock {
            width: self.block.width,
            height: self.block.height,
            orientation: self.block.orientation,
            resolution: self.block.resolution,
            num_bit_planes: self.num_bit_planes,
            zero_bit_planes: self.block.magnitude_bits - self.num_bit_planes,
            data,
            passes,
            style: self.style,
        })
    }

    #[inline]
    fn magnitude(&self, x: usize, y: usize) -> u32 {
        self.magnitudes[y * self.block.width as usize + x]
    }

    #[inline]
    fn is_negative(&self, x: usize, y: usize) -> bool {
        self.block.coefficients[y * self.block.width as usize + x] < 0
    }

    // Code one decision of the current pass, raw or in context `cx`.
    #[inline]
    fn encode_decision(&mut self, cx: u8, bit: u8) {
        if self.raw_pass {
            self.raw.encode_bit(bit);
        } else {
            self.mq.encode_bit(cx as usize, bit);
        }
    }

    // Code the sign of a coefficient that just became significant and mark it.
    // Raw passes code the sign bit itself.
    fn encode_sign(&mut self, x: usize, y: usize) {
        let (cx, xor) = sign_coding_context(self.states.neighbor_signs(x, y));
        let negative = self.is_negative(x, y);
        if self.raw_pass {
            self.raw.encode_bit(negative as u8);
        } else {
            self.mq.encode_bit(cx as usize, negative as u8 ^ xor);
        }
        self.states.set_significant(x, y, negative);
    }

    fn significance_propagation(&mut self, bit_plane: u8) -> f64 {
        let (width, height) = (self.states.width(), self.states.height());
        let orientation = self.block.orientation;
        let mut reduction = 0.0;

        for y0 in stripes(height) {
            for x in 0..width {
                for y in stripe_rows(y0, height) {
                    if self.states.is_significant(x, y) {
                        continue;
                    }
                    let neighbors = self.states.neighbor_significance(x, y);
                    if neighbors.is_empty() {
                        continue;
                    }

                    let m = self.magnitude(x, y);
                    let bit = ((m >> bit_plane) & 1) as u8;
                    self.encode_decision(zero_coding_context(neighbors, orientation), bit);
                    self.states.set_visited(x, y);
                    if bit == 1 {
                        self.encode_sign(x, y);
                        reduction += self.estimator.significance_reduction(m, bit_plane);
                    }
                }
            }
        }
        reduction
    }

    fn magnitude_refinement(&mut self, bit_plane: u8) -> f64 {
        let (width, height) = (self.states.width(), self.states.height());
        let mut reduction = 0.0;

        for y0 in stripes(height) {
            for x in 0..width {
                for y in stripe_rows(y0, height) {
                    let flags = self.states.get(x, y);
                    if flags & SIGNIFICANT == 0 || flags & VISITED != 0 {
                        continue;
                    }

                    let m = self.magnitude(x, y);
                    let cx = magnitude_refinement_context(
                        self.states.neighbor_significance(x, y),
                        flags & REFINED == 0,
                    );
                    self.encode_decision(cx, ((m >> bit_plane) & 1) as u8);
                    self.states.set_refined(x, y);
                    reduction += self.estimator.refinement_reduction(m, bit_plane);
                }
            }
        }
        reduction
    }

    fn cleanup(&mut self, bit_plane: u8) -> f64 {
        let (width, height) = (self.states.width(), self.states.height());
        let orientation = self.block.orientation;
        let mut reduction = 0.0;

        for y0 in stripes(height) {
            let rows = stripe_rows(y0, height);
            for x in 0..width {
                let mut start = y0;

                if self.states.is_run_length_column(x, y0) {
                    let first = rows
                        .clone()
                        .find(|&y| (self.magnitude(x, y) >> bit_plane) & 1 == 1);
                    let Some(y) = first else {
                        self.mq.encode_bit(run_length_context() as usize, 0);
                        continue;
                    };

                    self.mq.encode_bit(run_length_context() as usize, 1);
                    let offset = (y - y0) as u8;
                    self.mq.encode_bit(uniform_context() as usize, offset >> 1);
                    self.mq.encode_bit(uniform_context() as usize, offset & 1);
                    self.encode_sign(x, y);
                    reduction += self
                        .estimator
                        .significance_reduction(self.magnitude(x, y), bit_plane);
                    start = y + 1;
                }

                for y in start..rows.end {
                    if self.states.get(x, y) & (SIGNIFICANT | VISITED) == 0 {
                        let m = self.magnitude(x, y);
                        let bit = ((m >> bit_plane) & 1) as u8;
                        let neighbors = self.states.neighbor_significance(x, y);
                        self.mq
                            .encode_bit(zero_coding_context(neighbors, orientation) as usize, bit);
                        if bit == 1 {
                            self.encode_sign(x, y);
                            reduction += self.estimator.significance_reduction(m, bit_plane);
                        }
                    }
                    self.states.clear_visited(x, y);
                }
            }
        }

        if self.style.segmentation_symbols {
            for bit in [1, 0, 1, 0] {
                self.mq.encode_bit(uniform_context() as usize, bit);
            }
        }
        reduction
    }
}

/// Encode one code-block.
pub fn encode_code_block(
    block: &CodeBlock,
    style: CodeBlockStyle,
    estimator: &dyn DistortionEstimator,
) -> Result<EncodedCodeBlock, Tier1Error> {
    BitPlaneCoder::new(block, style, estimator)?.encode_codeblock()
}
