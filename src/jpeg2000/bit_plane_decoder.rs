//! EBCOT bit-plane decoder, the inverse of [`super::bit_plane_coder`].

use log::{trace, warn};

use super::coefficient_state::{
    CoefficientStates, NEGATIVE, REFINED, SIGNIFICANT, VISITED, stripe_rows, stripes,
};
use super::context::{
    magnitude_refinement_context, run_length_context, sign_coding_context, uniform_context,
    zero_coding_context,
};
use super::image::{
    CodeBlockGeometry, CodeBlockSegment, DecodeStatus, DecodedCodeBlock, PassType,
    bit_plane_of_pass, pass_count,
};
use super::mq_coder::MqDecoder;
use super::raw_coder::RawDecoder;
use crate::Tier1Error;
use crate::coding_parameters::CodeBlockStyle;
use crate::constants::MAXIMUM_BIT_PLANES;
use crate::error::try_filled_vec;

// Source of the decisions of one pass, arithmetic or raw.
trait PassDecoder {
    fn decision(&mut self, cx: u8) -> u8;
    fn sign(&mut self, cx: u8, xor: u8) -> u8;
    fn is_corrupted(&self) -> bool;
}

impl PassDecoder for MqDecoder<'_> {
    #[inline]
    fn decision(&mut self, cx: u8) -> u8 {
        self.decode_bit(cx as usize)
    }

    #[inline]
    fn sign(&mut self, cx: u8, xor: u8) -> u8 {
        self.decode_bit(cx as usize) ^ xor
    }

    fn is_corrupted(&self) -> bool {
        MqDecoder::is_corrupted(self)
    }
}

// Raw passes carry the bits themselves, the sign included.
impl PassDecoder for RawDecoder<'_> {
    #[inline]
    fn decision(&mut self, _cx: u8) -> u8 {
        self.decode_bit()
    }

    #[inline]
    fn sign(&mut self, _cx: u8, _xor: u8) -> u8 {
        self.decode_bit()
    }

    fn is_corrupted(&self) -> bool {
        RawDecoder::is_corrupted(self)
    }
}

pub struct BitPlaneDecoder<'a> {
    geometry: CodeBlockGeometry,
    style: CodeBlockStyle,
    num_bit_planes: u8,
    segment: CodeBlockSegment<'a>,
    magnitudes: Vec<u32>,
    states: CoefficientStates,
}

impl<'a> BitPlaneDecoder<'a> {
    pub fn new(
        geometry: CodeBlockGeometry,
        num_bit_planes: u8,
        style: CodeBlockStyle,
        segment: CodeBlockSegment<'a>,
    ) -> Result<Self, Tier1Error> {
        geometry.validate()?;
        if num_bit_planes > MAXIMUM_BIT_PLANES {
            return Err(Tier1Error::TooManyBitPlanes);
        }

        Ok(Self {
            geometry,
            style,
            num_bit_planes,
            segment,
            magnitudes: try_filled_vec(geometry.area(), 0u32)?,
            states: CoefficientStates::new(
                geometry.width,
                geometry.height,
                style.vertically_causal_context,
            )?,
        })
    }

    // Bytes of every MQ codeword or raw segment covering the first `num_passes`
    // passes. A segment ends with a terminated pass; the last one may be cut
    // short by the request and then runs to the end of the data.
    fn segments(&self, num_passes: usize) -> Result<Vec<&'a [u8]>, Tier1Error> {
        let data = self.segment.data;
        let ends = self.segment.pass_ends;
        let total = pass_count(self.num_bit_planes);

        let mut segments = Vec::new();
        let mut start = 0;
        let mut index = 0;
        while index < num_passes {
            let last = (index..total)
                .find(|&i| self.style.is_terminated_pass(i, total))
                .unwrap_or(total - 1);
            let end = match ends.get(last) {
                _ if last >= num_passes => data.len(),
                Some(&end) => end,
                None if last + 1 == total => data.len(),
                None => return Err(Tier1Error::InvalidSegmentLengths),
            };
            if end < start || end > data.len() {
                return Err(Tier1Error::InvalidSegmentLengths);
            }
            segments.push(&data[start..end]);
            start = end;
            index = last + 1;
        }
        Ok(segments)
    }

    /// Decode the first `num_passes` passes. Bit-planes that are never reached
    /// stay zero.
    pub fn decode_codeblock(mut self, num_passes: usize) -> Result<DecodedCodeBlock, Tier1Error> {
        let total = pass_count(self.num_bit_planes);
        if num_passes > total {
            return Err(Tier1Error::InvalidPassCount);
        }
        let mut segments = self.segments(num_passes)?.into_iter();

        let mut status = DecodeStatus::Complete;
        let mut passes_decoded = 0;
        if num_passes > 0 {
            // MQ contexts carry over raw segments.
            let mut mq = MqDecoder::new(segments.next().unwrap_or_default());
            let mut raw = RawDecoder::new(&[]);
            for index in 0..num_passes {
                let raw_pass = self.style.is_raw_pass(index);
                if index > 0 && self.style.is_terminated_pass(index - 1, total) {
                    let segment = segments.next().unwrap_or_default();
                    if raw_pass {
                        raw = RawDecoder::new(segment);
                    } else {
                        mq.restart(segment);
                    }
                }

                let bit_plane = bit_plane_of_pass(self.num_bit_planes, index);
                let consistent = if raw_pass {
                    self.decode_pass(&mut raw, index, bit_plane)
                } else {
                    self.decode_pass(&mut mq, index, bit_plane)
                };
                passes_decoded = index + 1;

                if !consistent {
                    warn!(
                        "corrupted {}x{} code-block segment in pass {}",
                        self.geometry.width, self.geometry.height, index
                    );
                    status = DecodeStatus::Corrupted {
                        first_bad_pass: index,
                    };
                    break;
                }

                if self.style.reset_context_probabilities {
                    mq.reset_contexts();
                }
            }
        }

        trace!(
            "decoded {}x{} code-block: {} of {} passes",
            self.geometry.width,
            self.geometry.height,
            passes_decoded,
            total
        );

        let mut coefficients = try_filled_vec(self.geometry.area(), 0i32)?;
        let width = self.geometry.width as usize;
        for (i, c) in coefficients.iter_mut().enumerate() {
            let magnitude = self.magnitudes[i] as i32;
            *c = if self.states.get(i % width, i / width) & NEGATIVE != 0 {
                -magnitude
            } else {
                magnitude
            };
        }

        Ok(DecodedCodeBlock {
            width: self.geometry.width,
            height: self.geometry.height,
            coefficients,
            passes_decoded,
            status,
        })
    }

    // Returns false when the pass turned out inconsistent.
    fn decode_pass<D: PassDecoder>(&mut self, decoder: &mut D, index: usize, bit_plane: u8) -> bool {
        let consistent = match PassType::for_pass_index(index) {
            PassType::SignificancePropagation => {
                self.significance_propagation(decoder, bit_plane);
                true
            }
            PassType::MagnitudeRefinement => {
                self.magnitude_refinement(decoder, bit_plane);
                true
            }
            PassType::Cleanup => self.cleanup(decoder, bit_plane),
        };
        consistent && !decoder.is_corrupted()
    }

    // A coefficient found significant at `bit_plane`: decode its sign and mark it.
    fn decode_sign<D: PassDecoder>(&mut self, decoder: &mut D, x: usize, y: usize, bit_plane: u8) {
        let (cx, xor) = sign_coding_context(self.states.neighbor_signs(x, y));
        let negative = decoder.sign(cx, xor) == 1;
        self.states.set_significant(x, y, negative);
        self.magnitudes[y * self.geometry.width as usize + x] |= 1 << bit_plane;
    }

    fn significance_propagation<D: PassDecoder>(&mut self, decoder: &mut D, bit_plane: u8) {
        let (width, height) = (self.states.width(), self.states.height());
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

                    let cx = zero_coding_context(neighbors, self.geometry.orientation);
                    self.states.set_visited(x, y);
                    if decoder.decision(cx) == 1 {
                        self.decode_sign(decoder, x, y, bit_plane);
                    }
                }
            }
        }
    }

    fn magnitude_refinement<D: PassDecoder>(&mut self, decoder: &mut D, bit_plane: u8) {
        let (width, height) = (self.states.width(), self.states.height());
        for y0 in stripes(height) {
            for x in 0..width {
                for y in stripe_rows(y0, height) {
                    let flags = self.states.get(x, y);
                    if flags & SIGNIFICANT == 0 || flags & VISITED != 0 {
                        continue;
                    }

                    let cx = magnitude_refinement_context(
                        self.states.neighbor_significance(x, y),
                        flags & REFINED == 0,
                    );
                    if decoder.decision(cx) == 1 {
                        self.magnitudes[y * width + x] |= 1 << bit_plane;
                    }
                    self.states.set_refined(x, y);
                }
            }
        }
    }

    // Returns false when the segmentation symbols do not match.
    fn cleanup<D: PassDecoder>(&mut self, decoder: &mut D, bit_plane: u8) -> bool {
        let (width, height) = (self.states.width(), self.states.height());
        for y0 in stripes(height) {
            let rows = stripe_rows(y0, height);
            for x in 0..width {
                let mut start = y0;

                if self.states.is_run_length_column(x, y0) {
                    if decoder.decision(run_length_context()) == 0 {
                        continue;
                    }
                    let high = decoder.decision(uniform_context());
                    let low = decoder.decision(uniform_context());
                    let y = y0 + ((high << 1) | low) as usize;
                    self.decode_sign(decoder, x, y, bit_plane);
                    start = y + 1;
                }

                for y in start..rows.end {
                    if self.states.get(x, y) & (SIGNIFICANT | VISITED) == 0 {
                        let cx = zero_coding_context(
                            self.states.neighbor_significance(x, y),
                            self.geometry.orientation,
                        );
                        if decoder.decision(cx) == 1 {
                            self.decode_sign(decoder, x, y, bit_plane);
                        }
                    }
                    self.states.clear_visited(x, y);
                }
            }
        }

        if self.style.segmentation_symbols {
            let mut symbol = 0;
            for _ in 0..4 {
                symbol = (symbol << 1) | decoder.decision(uniform_context());
            }
            return symbol == 0b1010;
        }
        true
    }
}

/// Decode the first `num_passes` passes of one code-block.
pub fn decode_code_block(
    geometry: CodeBlockGeometry,
    num_bit_planes: u8,
    style: CodeBlockStyle,
    segment: CodeBlockSegment,
    num_passes: usize,
) -> Result<DecodedCodeBlock, Tier1Error> {
    BitPlaneDecoder::new(geometry, num_bit_planes, style, segment)?.decode_codeblock(num_passes)
}
