//! Error types for kernr

use crate::dtype::DType;
use thiserror::Error;

/// Result type alias using kernr's Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in kernr operations
#[derive(Error, Debug)]
pub enum Error {
    /// Shape mismatch in an operation
    #[error("Shape mismatch: expected {expected:?}, got {got:?}")]
    ShapeMismatch {
        /// Expected shape
        expected: Vec<usize>,
        /// Actual shape
        got: Vec<usize>,
    },

    /// Invalid axis index
    #[error("Invalid axis {axis} for rank {rank}")]
    InvalidAxis {
        /// The invalid axis
        axis: usize,
        /// Rank of the operand
        rank: usize,
    },

    /// Invalid broadcast pattern
    #[error(
        "Invalid broadcast pattern {pattern:?}: {non_broadcast} non-broadcast axes for rank-{rank} input"
    )]
    InvalidBroadcast {
        /// The requested per-axis flags
        pattern: Vec<bool>,
        /// Number of `false` entries in the pattern
        non_broadcast: usize,
        /// Rank of the broadcast input
        rank: usize,
    },

    /// Unsupported dtype for an operation
    ///
    /// The "no binding found" arm of the dispatch table. The message names the
    /// offending type; there is no silent fallback.
    #[error("Unsupported dtype {dtype} for operation '{op}'")]
    UnsupportedDType {
        /// The unsupported dtype
        dtype: DType,
        /// The operation name
        op: &'static str,
    },

    /// DType mismatch between operands
    #[error("DType mismatch: {lhs} vs {rhs}")]
    DTypeMismatch {
        /// Left-hand side dtype
        lhs: DType,
        /// Right-hand side dtype
        rhs: DType,
    },

    /// Invalid sparse matrix structure
    #[error("Invalid CSR structure: {reason}")]
    InvalidCsr {
        /// What was violated
        reason: String,
    },

    /// Zero or missing diagonal in a non-unit triangular solve
    #[error("Singular diagonal at row {row} in '{op}'")]
    SingularDiagonal {
        /// Row with the zero or absent diagonal entry
        row: usize,
        /// The operation name
        op: &'static str,
    },

    /// Invalid argument provided to an operation
    #[error("Invalid argument '{arg}': {reason}")]
    InvalidArgument {
        /// The argument name
        arg: &'static str,
        /// Reason for invalidity
        reason: String,
    },

    /// A fusion graph the executor cannot compile
    #[error("Unsupported fusion: {reason}")]
    UnsupportedFusion {
        /// Why the graph falls outside the pointwise family
        reason: String,
    },

    /// Generic internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create a shape mismatch error
    pub fn shape_mismatch(expected: &[usize], got: &[usize]) -> Self {
        Self::ShapeMismatch {
            expected: expected.to_vec(),
            got: got.to_vec(),
        }
    }

    /// Create an unsupported dtype error
    pub fn unsupported_dtype(dtype: DType, op: &'static str) -> Self {
        Self::UnsupportedDType { dtype, op }
    }

    /// Create an invalid CSR error
    pub fn invalid_csr(reason: impl Into<String>) -> Self {
        Self::InvalidCsr {
            reason: reason.into(),
        }
    }

    /// Create an invalid argument error
    pub fn invalid_argument(arg: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidArgument {
            arg,
            reason: reason.into(),
        }
    }

    /// Create an unsupported fusion error
    pub fn unsupported_fusion(reason: impl Into<String>) -> Self {
        Self::UnsupportedFusion {
            reason: reason.into(),
        }
    }
}
