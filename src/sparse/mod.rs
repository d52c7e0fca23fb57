//! Sparse matrix support for kernr
//!
//! CSR storage plus the sparse BLAS dispatch layer. Two dispatch surfaces sit
//! over the same kernels:
//!
//! - [`blas`]: typed entry points generic over [`blas::BlasScalar`], resolved
//!   at compile time (unmapped scalar types do not compile).
//! - [`ops`]: runtime-tag entry points over type-erased tensors, resolved
//!   from the value [`DType`](crate::dtype::DType) (unmapped tags error,
//!   naming the type).

pub mod blas;
mod csr;
mod descriptor;
pub mod ops;

pub use csr::{CsrMatrix, CsrTensor};
pub use descriptor::{
    DiagKind, FillMode, MatrixDescriptor, MatrixKind, MatrixLayout, Operation,
};
