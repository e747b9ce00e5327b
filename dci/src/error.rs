use thiserror::Error;

/// Errors the index can report synchronously, without mutating any state.
///
/// Per the contract this core follows: a capacity shortfall (fewer than `k`
/// neighbours found before a cap fired) is *not* an error — see
/// [`crate::QueryOutcome`]. Only malformed configuration and contract
/// violations land here.
#[derive(Debug, Error)]
pub enum DciError {
    #[error("ambient dimension must be positive, got {0}")]
    ZeroDimension(usize),
    #[error("composite index count L must be positive, got {0}")]
    ZeroCompositeCount(usize),
    #[error("simple indices per composite L_s must be positive, got {0}")]
    ZeroSimpleCount(usize),
    #[error("k must be positive, got {0}")]
    ZeroK(usize),
    #[error("ambient dimension mismatch: index was built with D={expected}, got D={actual}")]
    DimensionMismatch { expected: usize, actual: usize },
    #[error("data length {data_len} does not match N * D = {expected} (N={n}, D={d})")]
    DataLengthMismatch {
        data_len: usize,
        expected: usize,
        n: usize,
        d: usize,
    },
    #[error("query configuration has no active cap: at least one of the visit/retrieve caps must be active")]
    NoActiveCap,
    #[error("fractional cap {0} is out of range [0, 1]")]
    FractionOutOfRange(f32),
    #[error("field_of_view must be at least 1 when more than one level is present, got {0}")]
    ZeroFieldOfView(usize),
    #[error("num_levels must be at least 1, got {0}")]
    ZeroLevels(usize),
    #[error("add() called on an index that already holds points; call clear() first")]
    AlreadyPopulated,
    #[error("data pointer is empty but N = {0} > 0")]
    EmptyData(usize),
}

pub type Result<T> = std::result::Result<T, DciError>;
