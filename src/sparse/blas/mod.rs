//! Typed sparse BLAS dispatch table
//!
//! Presents one generic call signature per operation ([`create_csr`], [`mv`],
//! [`trsv`], [`trsm`]) and resolves it at compile time to the concrete
//! routine for the scalar type. Exactly four scalar types have bindings:
//! `f32`, `f64`, [`Complex64`], [`Complex128`]. The [`BlasScalar`] trait is
//! sealed, so instantiating an entry point for any other type is a compile
//! error rather than a silent fallback; enumeration-driven callers with
//! type-erased buffers go through [`crate::sparse::ops`] instead, where
//! unmapped tags surface as [`UnsupportedDType`](crate::error::Error) naming
//! the type.
//!
//! All entry points write results into caller-supplied output buffers and
//! forward their arguments unchanged to the concrete kernel. The layer holds
//! no state and no ownership of the matrix arrays.

mod kernels;

use crate::dtype::{Complex64, Complex128, Element};
use crate::error::Result;
use crate::sparse::csr::CsrMatrix;
use crate::sparse::descriptor::{MatrixDescriptor, MatrixLayout, Operation};

mod sealed {
    pub trait Sealed {}

    impl Sealed for f32 {}
    impl Sealed for f64 {}
    impl Sealed for crate::dtype::Complex64 {}
    impl Sealed for crate::dtype::Complex128 {}
}

/// Scalar types with a concrete sparse BLAS binding
///
/// Sealed: implemented for `f32`, `f64`, `Complex64`, `Complex128` and
/// nothing else. Adding a binding for a new scalar type means adding it here
/// and reviewing every kernel it routes to.
pub trait BlasScalar: Element + sealed::Sealed {
    /// Complex conjugate; identity for real scalars
    fn conj(self) -> Self;
}

impl BlasScalar for f32 {
    #[inline]
    fn conj(self) -> Self {
        self
    }
}

impl BlasScalar for f64 {
    #[inline]
    fn conj(self) -> Self {
        self
    }
}

impl BlasScalar for Complex64 {
    #[inline]
    fn conj(self) -> Self {
        Complex64::conj(self)
    }
}

impl BlasScalar for Complex128 {
    #[inline]
    fn conj(self) -> Self {
        Complex128::conj(self)
    }
}

/// Construct a CSR matrix view from caller-owned arrays
///
/// Validates the structure and returns a borrowed handle; the arrays remain
/// owned by the caller and must outlive the view.
pub fn create_csr<'a, T: BlasScalar>(
    nrows: usize,
    ncols: usize,
    row_ptrs: &'a [i64],
    col_indices: &'a [i64],
    values: &'a [T],
) -> Result<CsrMatrix<'a, T>> {
    CsrMatrix::new(nrows, ncols, row_ptrs, col_indices, values)
}

/// Sparse matrix–vector multiply: `y = alpha · op(A) · x + beta · y`
///
/// `descr` selects how the stored entries are interpreted (general, or one
/// triangle with an optional implicit unit diagonal). When `beta` is zero,
/// `y` is written without being read, so it may hold uninitialized values.
pub fn mv<T: BlasScalar>(
    operation: Operation,
    alpha: T,
    a: &CsrMatrix<'_, T>,
    descr: &MatrixDescriptor,
    x: &[T],
    beta: T,
    y: &mut [T],
) -> Result<()> {
    kernels::spmv(operation, alpha, a, descr, x, beta, y)
}

/// Sparse triangular solve, vector RHS: solve `op(A) · y = alpha · x`
///
/// `descr` must be triangular; its fill mode selects the referenced triangle
/// and its diag kind whether the diagonal is read or implicitly 1. A zero or
/// absent diagonal entry in a non-unit solve is an error naming the row.
pub fn trsv<T: BlasScalar>(
    operation: Operation,
    alpha: T,
    a: &CsrMatrix<'_, T>,
    descr: &MatrixDescriptor,
    x: &[T],
    y: &mut [T],
) -> Result<()> {
    kernels::trsv(operation, alpha, a, descr, x, y)
}

/// Sparse triangular solve, matrix RHS: solve `op(A) · Y = alpha · X`
///
/// `X` and `Y` are dense `n × nrhs` operands in the given `layout` with
/// explicit leading dimensions `ldx` / `ldy`, solved one column at a time.
#[allow(clippy::too_many_arguments)]
pub fn trsm<T: BlasScalar>(
    operation: Operation,
    alpha: T,
    a: &CsrMatrix<'_, T>,
    descr: &MatrixDescriptor,
    layout: MatrixLayout,
    x: &[T],
    nrhs: usize,
    ldx: usize,
    y: &mut [T],
    ldy: usize,
) -> Result<()> {
    kernels::trsm(operation, alpha, a, descr, layout, x, nrhs, ldx, y, ldy)
}
