//! JPEG 2000 Tier-1 coding (Part 1, ISO/IEC 15444-1 Annexes C and D, J.14)
//!
//! The module is divided into the following sub-modules:
//!
//! - `mq_coder`: The MQ Arithmetic Coder.
//! - `raw_coder`: Raw bit packing of bypassed passes.
//! - `context`: Context formation from neighbour significance and signs.
//! - `coefficient_state`: Per-coefficient flags and the stripe scan.
//! - `bit_plane_coder` / `bit_plane_decoder`: The three coding passes per bit-plane.
//! - `distortion`: Distortion reduction estimates of coding passes.
//! - `rate_control`: PCRD-opt quality layer formation.
//! - `image`: Code-block and coding pass data structures.
//! - `encoder` / `decoder`: Coding of whole sets of code-blocks.

pub mod bit_plane_coder;
pub mod bit_plane_decoder;
pub mod coefficient_state;
pub mod context;
pub mod decoder;
pub mod distortion;
pub mod encoder;
pub mod image;
pub mod mq_coder;
pub mod raw_coder;
pub mod rate_control;
