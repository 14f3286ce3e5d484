use thiserror::Error;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tier1Error {
    #[error("Not enough memory")]
    NotEnoughMemory = 1,
    #[error("Invalid code-block dimensions")]
    InvalidCodeBlockSize = 2,
    #[error("Bit-plane count exceeds the supported maximum")]
    TooManyBitPlanes = 3,
    #[error("Coefficient magnitude does not fit the declared bit-plane count")]
    CoefficientOutOfRange = 4,
    #[error("Coefficient buffer does not match the code-block dimensions")]
    InvalidCoefficientCount = 5,
    #[error("Requested pass count exceeds the passes of the code-block")]
    InvalidPassCount = 6,
    #[error("Pass segment lengths are missing or inconsistent")]
    InvalidSegmentLengths = 7,
    #[error("Layer targets must be non-decreasing")]
    InvalidLayerTargets = 8,
    #[error("Unsupported code-block style")]
    UnsupportedCodeBlockStyle = 9,

    #[error("Invalid parameter resolution reduction")]
    InvalidParameterReduce = 20,
    #[error("Invalid parameter layer count")]
    InvalidParameterLayerCount = 21,
    #[error("Invalid parameter layer rate")]
    InvalidParameterLayerRate = 22,
    #[error("Invalid parameter code-block size")]
    InvalidParameterCodeBlockSize = 23,

    // Logic errors
    #[error("Invalid argument")]
    InvalidArgument = 100,
}

/// Allocates a vector of `len` copies of `value`, reporting allocation failure
/// instead of aborting.
pub(crate) fn try_filled_vec<T: Clone>(len: usize, value: T) -> Result<Vec<T>, Tier1Error> {
    let mut v = Vec::new();
    v.try_reserve_exact(len)
        .map_err(|_| Tier1Error::NotEnoughMemory)?;
    v.resize(len, value);
    Ok(v)
}
