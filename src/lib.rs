//! # kernr
//!
//! **Sparse BLAS dispatch and pointwise kernel fusion with a benchmarking
//! harness.**
//!
//! kernr provides two independent subsystems over a shared dtype/tensor
//! layer:
//!
//! - **Sparse BLAS dispatch** ([`sparse`]): one generic call signature per
//!   operation (CSR construction, matrix–vector multiply, triangular solves
//!   with vector and matrix right-hand sides), resolved at compile time to
//!   concrete kernels for `f32`, `f64`, `Complex64`, `Complex128`. A parallel
//!   runtime-tag path dispatches on the [`DType`](dtype::DType) enumeration;
//!   unmapped tags fail loudly with an error naming the type.
//! - **Pointwise kernel fusion** ([`fusion`]): a small computation-graph
//!   builder (inputs, casts, broadcasts, binary elementwise ops), a compiling
//!   executor that runs a supported graph as one fused elementwise pass, and
//!   an executor cache keyed by the concrete input signature.
//!
//! The [`harness`] module instantiates the canonical broadcast + add graph
//! per (dtype, axis, sizes) configuration and drives compile-once /
//! execute-many timing loops with exact bytes-processed reporting; the
//! `broadcast` bench target wires it into criterion.
//!
//! ## Quick Start
//!
//! ```rust
//! use kernr::prelude::*;
//!
//! // Typed sparse BLAS: y = A · x
//! let row_ptrs = [0i64, 1, 3];
//! let col_indices = [0i64, 0, 1];
//! let values = [2.0f64, 1.0, 3.0];
//! let a = kernr::sparse::blas::create_csr(2, 2, &row_ptrs, &col_indices, &values)?;
//!
//! let x = [1.0, 1.0];
//! let mut y = [0.0, 0.0];
//! kernr::sparse::blas::mv(
//!     Operation::NonTranspose,
//!     1.0,
//!     &a,
//!     &MatrixDescriptor::general(),
//!     &x,
//!     0.0,
//!     &mut y,
//! )?;
//! assert_eq!(y, [2.0, 4.0]);
//! # Ok::<(), kernr::error::Error>(())
//! ```
//!
//! ## Feature Flags
//!
//! - `rayon` (default): multi-threaded fused kernels and SpMV

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod dtype;
pub mod error;
pub mod fusion;
pub mod harness;
pub mod sparse;
pub mod tensor;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::dtype::{Complex64, Complex128, DType, Element};
    pub use crate::error::{Error, Result};
    pub use crate::fusion::{ExecuteOptions, Fusion, FusionExecutor, FusionExecutorCache};
    pub use crate::harness::BroadcastCase;
    pub use crate::sparse::{
        CsrMatrix, CsrTensor, DiagKind, FillMode, MatrixDescriptor, MatrixLayout, Operation,
    };
    pub use crate::tensor::Tensor;
}
