//! JPEG 2000 Tier-1 block coding with PCRD-opt quality layer formation.
//!
//! Code-blocks of quantized wavelet coefficients are entropy coded bit-plane by
//! bit-plane with the MQ arithmetic coder. Rate control then picks, per block
//! and per quality layer, how many coding passes to keep.

pub mod coding_parameters;
pub mod constants;
pub mod error;
pub mod jpeg2000;

pub use coding_parameters::{CinemaProfile, CodeBlockStyle, DecodeParameters, EncodeParameters};
pub use error::Tier1Error;
pub use jpeg2000::bit_plane_coder::{BitPlaneCoder, encode_code_block};
pub use jpeg2000::bit_plane_decoder::{BitPlaneDecoder, decode_code_block};
pub use jpeg2000::decoder::Tier1Decoder;
pub use jpeg2000::distortion::{DistortionEstimator, DistortionModel, ExactEstimator, TableEstimator};
pub use jpeg2000::encoder::{LayeredCodeBlocks, Tier1Encoder};
pub use jpeg2000::image::{
    CodeBlock, CodeBlockGeometry, CodeBlockSegment, CodingPass, DecodeStatus, DecodedCodeBlock,
    EncodedCodeBlock, PassType, SubbandOrientation,
};
pub use jpeg2000::mq_coder::{MqDecoder, MqEncoder, Termination};
pub use jpeg2000::raw_coder::{RawDecoder, RawEncoder};
pub use jpeg2000::rate_control::{
    InclusionPoint, LayerPlan, form_layers, form_layers_by_slope, form_quality_layers,
};
