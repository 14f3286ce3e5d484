use log::warn;
use num_enum::{IntoPrimitive, TryFromPrimitive};

use crate::Tier1Error;
use crate::constants::{
    CINEMA_2K_MAXIMUM_RESOLUTIONS, CINEMA_4K_MAXIMUM_RESOLUTIONS, CINEMA_24_CODESTREAM_BYTES,
    CINEMA_24_COMPONENT_BYTES, CINEMA_48_CODESTREAM_BYTES, CINEMA_48_COMPONENT_BYTES,
    CINEMA_CODE_BLOCK_SIZE, DEFAULT_CODE_BLOCK_SIZE, MAXIMUM_CODE_BLOCK_AREA,
    MAXIMUM_CODE_BLOCK_DIMENSION, MAXIMUM_LAYERS, MAXIMUM_RESOLUTION_LEVELS,
    FIRST_BYPASS_PASS, MINIMUM_NOMINAL_CODE_BLOCK_DIMENSION,
};
use crate::jpeg2000::distortion::DistortionModel;
use crate::jpeg2000::image::PassType;
use crate::jpeg2000::mq_coder::Termination;

/// Code-block coding style switches (SPcod/SPcoc, ISO/IEC 15444-1 Table A.19).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CodeBlockStyle {
    pub selective_arithmetic_coding_bypass: bool,
    pub reset_context_probabilities: bool,
    pub termination_on_each_pass: bool,
    pub vertically_causal_context: bool,
    pub predictable_termination: bool,
    pub segmentation_symbols: bool,
}

impl CodeBlockStyle {
    pub fn from_bits(value: u8) -> Self {
        Self {
            selective_arithmetic_coding_bypass: (value & 0x01) != 0,
            reset_context_probabilities: (value & 0x02) != 0,
            termination_on_each_pass: (value & 0x04) != 0,
            vertically_causal_context: (value & 0x08) != 0,
            predictable_termination: (value & 0x10) != 0,
            segmentation_symbols: (value & 0x20) != 0,
        }
    }

    pub fn to_bits(&self) -> u8 {
        (self.selective_arithmetic_coding_bypass as u8)
            | (self.reset_context_probabilities as u8) << 1
            | (self.termination_on_each_pass as u8) << 2
            | (self.vertically_causal_context as u8) << 3
            | (self.predictable_termination as u8) << 4
            | (self.segmentation_symbols as u8) << 5
    }

    /// Like [`CodeBlockStyle::from_bits`], but rejects the high-throughput and
    /// reserved bits instead of ignoring them.
    pub fn try_from_bits(value: u8) -> Result<Self, Tier1Error> {
        if value & 0xC0 != 0 {
            return Err(Tier1Error::UnsupportedCodeBlockStyle);
        }
        Ok(Self::from_bits(value))
    }

    /// Whether pass `index` is coded raw rather than with the MQ coder.
    pub fn is_raw_pass(&self, index: usize) -> bool {
        self.selective_arithmetic_coding_bypass
            && index >= FIRST_BYPASS_PASS
            && PassType::for_pass_index(index) != PassType::Cleanup
    }

    /// Whether the codeword or raw segment ends with pass `index` of a block
    /// coded in `num_passes` passes.
    ///
    /// Under bypass the MQ codeword is terminated before the first raw pass,
    /// every raw segment ends with its refinement pass and every later cleanup
    /// pass is terminated too.
    pub fn is_terminated_pass(&self, index: usize, num_passes: usize) -> bool {
        self.termination_on_each_pass
            || index + 1 == num_passes
            || (self.selective_arithmetic_coding_bypass
                && index + 1 >= FIRST_BYPASS_PASS
                && PassType::for_pass_index(index) != PassType::SignificancePropagation)
    }

    pub fn termination(&self) -> Termination {
        if self.predictable_termination {
            Termination::Predictable
        } else {
            Termination::Default
        }
    }
}

/// Digital cinema operating points (ISO/IEC 15444-1 Amd 1).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, TryFromPrimitive, IntoPrimitive)]
#[repr(u8)]
pub enum CinemaProfile {
    Cinema2k24 = 3,
    Cinema2k48 = 4,
    Cinema4k24 = 5,
}

impl CinemaProfile {
    pub fn max_codestream_bytes(&self) -> usize {
        match self {
            CinemaProfile::Cinema2k24 | CinemaProfile::Cinema4k24 => CINEMA_24_CODESTREAM_BYTES,
            CinemaProfile::Cinema2k48 => CINEMA_48_CODESTREAM_BYTES,
        }
    }

    pub fn max_component_bytes(&self) -> usize {
        match self {
            CinemaProfile::Cinema2k24 | CinemaProfile::Cinema4k24 => CINEMA_24_COMPONENT_BYTES,
            CinemaProfile::Cinema2k48 => CINEMA_48_COMPONENT_BYTES,
        }
    }

    pub fn max_resolutions(&self) -> u8 {
        match self {
            CinemaProfile::Cinema4k24 => CINEMA_4K_MAXIMUM_RESOLUTIONS,
            _ => CINEMA_2K_MAXIMUM_RESOLUTIONS,
        }
    }
}

/// Parameters of the Tier-1 encoder.
#[derive(Debug, Clone, PartialEq)]
pub struct EncodeParameters {
    /// Nominal code-block width, a power of two.
    pub code_block_width: u32,
    /// Nominal code-block height, a power of two.
    pub code_block_height: u32,
    pub style: CodeBlockStyle,
    /// Cumulative rate of every quality layer in bits per sample, non-decreasing.
    /// The last entry may be 0.0 to include everything. An empty list forms a
    /// single lossless layer.
    pub layer_rates: Vec<f64>,
    pub distortion_model: DistortionModel,
    /// Caps the rate of the final layer at the profile's limit.
    pub cinema: Option<CinemaProfile>,
}

impl Default for EncodeParameters {
    fn default() -> Self {
        Self {
            code_block_width: DEFAULT_CODE_BLOCK_SIZE,
            code_block_height: DEFAULT_CODE_BLOCK_SIZE,
            style: CodeBlockStyle::default(),
            layer_rates: Vec::new(),
            distortion_model: DistortionModel::default(),
            cinema: None,
        }
    }
}

impl EncodeParameters {
    /// Digital cinema settings: 32x32 code-blocks, default style and a single
    /// layer at the last requested rate.
    pub fn with_cinema_profile(mut self, profile: CinemaProfile) -> Self {
        self.code_block_width = CINEMA_CODE_BLOCK_SIZE;
        self.code_block_height = CINEMA_CODE_BLOCK_SIZE;
        self.style = CodeBlockStyle::default();
        let rate = self.layer_rates.last().copied().unwrap_or(0.0);
        self.layer_rates = vec![rate];
        self.cinema = Some(profile);
        self
    }

    pub fn validate(&self) -> Result<(), Tier1Error> {
        let valid_dimension = |d: u32| {
            d.is_power_of_two()
                && (MINIMUM_NOMINAL_CODE_BLOCK_DIMENSION..=MAXIMUM_CODE_BLOCK_DIMENSION).contains(&d)
        };
        if !valid_dimension(self.code_block_width)
            || !valid_dimension(self.code_block_height)
            || self.code_block_width * self.code_block_height > MAXIMUM_CODE_BLOCK_AREA
        {
            return Err(Tier1Error::InvalidParameterCodeBlockSize);
        }

        if self.layer_rates.len() > MAXIMUM_LAYERS {
            return Err(Tier1Error::InvalidParameterLayerCount);
        }

        let last = self.layer_rates.len().saturating_sub(1);
        let mut previous = 0.0;
        for (i, &rate) in self.layer_rates.iter().enumerate() {
            if !rate.is_finite() || rate < 0.0 {
                return Err(Tier1Error::InvalidParameterLayerRate);
            }
            if rate == 0.0 {
                if i != last {
                    return Err(Tier1Error::InvalidParameterLayerRate);
                }
                continue;
            }
            if rate < previous {
                return Err(Tier1Error::InvalidParameterLayerRate);
            }
            previous = rate;
        }
        Ok(())
    }

    pub fn layer_count(&self) -> usize {
        self.layer_rates.len().max(1)
    }

    /// Cumulative byte budget of every layer for `num_samples` coefficients.
    pub fn layer_byte_targets(&self, num_samples: usize) -> Result<Vec<usize>, Tier1Error> {
        self.validate()?;

        let mut targets: Vec<usize> = if self.layer_rates.is_empty() {
            vec![usize::MAX]
        } else {
            self.layer_rates
                .iter()
                .map(|&rate| {
                    if rate == 0.0 {
                        usize::MAX
                    } else {
                        (rate * num_samples as f64 / 8.0).ceil() as usize
                    }
                })
                .collect()
        };

        if let Some(profile) = self.cinema {
            let cap = profile.max_component_bytes();
            for target in targets.iter_mut() {
                if *target > cap {
                    if *target != usize::MAX {
                        warn!(
                            "layer budget of {} bytes exceeds the {:?} limit, capped at {} bytes",
                            target, profile, cap
                        );
                    }
                    *target = cap;
                }
            }
        }
        Ok(targets)
    }
}

/// Parameters selecting what the Tier-1 decoder reconstructs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DecodeParameters {
    /// Number of highest resolution levels to discard.
    pub reduce: u8,
    /// Decode at most this many quality layers. `None` decodes all of them.
    pub max_layers: Option<usize>,
}

impl DecodeParameters {
    pub fn validate(&self, num_resolutions: u8) -> Result<(), Tier1Error> {
        if num_resolutions == 0 || num_resolutions > MAXIMUM_RESOLUTION_LEVELS {
            return Err(Tier1Error::InvalidArgument);
        }
        if self.reduce >= num_resolutions || self.reduce >= MAXIMUM_RESOLUTION_LEVELS {
            return Err(Tier1Error::InvalidParameterReduce);
        }
        if self.max_layers == Some(0) {
            return Err(Tier1Error::InvalidParameterLayerCount);
        }
        Ok(())
    }
}
