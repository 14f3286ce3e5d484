// Context alphabet of the Tier-1 coder, ISO/IEC 15444-1 table D.7.
pub const NUM_ZC_CONTEXTS: usize = 9; // Zero coding
pub const NUM_SC_CONTEXTS: usize = 5; // Sign coding
pub const NUM_MAG_CONTEXTS: usize = 3; // Magnitude refinement
pub const NUM_AGG_CONTEXTS: usize = 1; // Run-length (aggregation)
pub const NUM_UNI_CONTEXTS: usize = 1; // Uniform
pub const NUM_CONTEXTS: usize =
    NUM_ZC_CONTEXTS + NUM_SC_CONTEXTS + NUM_MAG_CONTEXTS + NUM_AGG_CONTEXTS + NUM_UNI_CONTEXTS;

// Number of probability states of the MQ coder, ISO/IEC 15444-1 table C.2.
pub const MQ_STATE_COUNT: usize = 47;

// Implementation limit: magnitudes are held in the low 31 bits of an i32 and one
// bit of headroom is kept for the distortion tables.
pub const MAXIMUM_BIT_PLANES: u8 = 30;

// Code-block limits as defined in ISO/IEC 15444-1, A.6.1 (xcb, ycb <= 10, xcb + ycb <= 12).
pub const MAXIMUM_CODE_BLOCK_DIMENSION: u32 = 1024;
pub const MAXIMUM_CODE_BLOCK_AREA: u32 = 4096;
pub const MINIMUM_NOMINAL_CODE_BLOCK_DIMENSION: u32 = 4;
pub const DEFAULT_CODE_BLOCK_SIZE: u32 = 64;

// Height of the stripes the coding passes scan in.
pub const STRIPE_HEIGHT: u32 = 4;

pub const MAXIMUM_RESOLUTION_LEVELS: u8 = 33;
pub const MAXIMUM_LAYERS: usize = 65535;

// With selective arithmetic-coding bypass, significance propagation and magnitude
// refinement passes from this index on (fifth bit-plane) are coded raw.
pub const FIRST_BYPASS_PASS: usize = 10;

// Fractional magnitude bits looked at by the table based distortion estimator.
pub const DISTORTION_TABLE_FRACTION_BITS: u32 = 6;

// Digital cinema (DCI) limits: maximum codestream and per-component size for a
// single frame at 24 and 48 frames per second.
pub const CINEMA_24_CODESTREAM_BYTES: usize = 1_302_083;
pub const CINEMA_48_CODESTREAM_BYTES: usize = 651_041;
pub const CINEMA_24_COMPONENT_BYTES: usize = 1_041_666;
pub const CINEMA_48_COMPONENT_BYTES: usize = 520_833;
pub const CINEMA_CODE_BLOCK_SIZE: u32 = 32;
pub const CINEMA_2K_MAXIMUM_RESOLUTIONS: u8 = 6;
pub const CINEMA_4K_MAXIMUM_RESOLUTIONS: u8 = 7;
