//! Runtime-tag dispatch over type-erased sparse operands
//!
//! The enumeration-driven counterpart of the typed dispatch table in
//! [`crate::sparse::blas`]: callers holding [`CsrTensor`]/[`Tensor`] buffers
//! resolve the concrete kernel from the value dtype at runtime. The match has
//! exactly the four mapped arms; every other tag fails loudly with an error
//! naming the type.

use crate::dtype::Element;
use crate::error::{Error, Result};
use crate::sparse::blas;
use crate::sparse::csr::CsrTensor;
use crate::sparse::descriptor::{MatrixDescriptor, MatrixLayout, Operation};
use crate::tensor::Tensor;

/// Dispatch a body over the four mapped sparse BLAS dtypes.
///
/// The fallback arm is the "no binding found" failure: it returns
/// `UnsupportedDType` carrying the offending tag and operation name.
macro_rules! dispatch_blas_dtype {
    ($dtype:expr, $T:ident => $body:block, $error_op:expr) => {
        match $dtype {
            $crate::dtype::DType::F32 => {
                type $T = f32;
                $body
            }
            $crate::dtype::DType::F64 => {
                type $T = f64;
                $body
            }
            $crate::dtype::DType::Complex64 => {
                type $T = $crate::dtype::Complex64;
                $body
            }
            $crate::dtype::DType::Complex128 => {
                type $T = $crate::dtype::Complex128;
                $body
            }
            other => {
                return Err(Error::UnsupportedDType {
                    dtype: other,
                    op: $error_op,
                })
            }
        }
    };
}

fn check_same_dtype(a: &CsrTensor, b: &Tensor) -> Result<()> {
    if a.dtype() != b.dtype() {
        return Err(Error::DTypeMismatch {
            lhs: a.dtype(),
            rhs: b.dtype(),
        });
    }
    Ok(())
}

/// Sparse matrix–vector multiply: `op(A) · x`
///
/// Allocates and returns the output vector.
pub fn spmv(a: &CsrTensor, operation: Operation, x: &Tensor) -> Result<Tensor> {
    check_same_dtype(a, x)?;
    let [nrows, ncols] = a.shape();
    let out_len = if operation.is_transposed() {
        ncols
    } else {
        nrows
    };

    dispatch_blas_dtype!(a.dtype(), T => {
        let view = a.view::<T>()?;
        let mut y = Tensor::zeros(&[out_len], T::DTYPE);
        blas::mv(
            operation,
            T::one(),
            &view,
            &MatrixDescriptor::general(),
            x.as_slice::<T>()?,
            T::zero(),
            y.as_mut_slice::<T>()?,
        )?;
        Ok(y)
    }, "spmv")
}

/// Sparse triangular solve, vector RHS: solve `op(A) · y = b`
pub fn trsv_solve(
    a: &CsrTensor,
    operation: Operation,
    descr: &MatrixDescriptor,
    b: &Tensor,
) -> Result<Tensor> {
    check_same_dtype(a, b)?;
    let [nrows, _] = a.shape();

    dispatch_blas_dtype!(a.dtype(), T => {
        let view = a.view::<T>()?;
        let mut y = Tensor::zeros(&[nrows], T::DTYPE);
        blas::trsv(
            operation,
            T::one(),
            &view,
            descr,
            b.as_slice::<T>()?,
            y.as_mut_slice::<T>()?,
        )?;
        Ok(y)
    }, "trsv")
}

/// Sparse triangular solve, matrix RHS: solve `op(A) · Y = B`
///
/// `b` is a row-major `[n, nrhs]` tensor; the solution has the same shape.
pub fn trsm_solve(
    a: &CsrTensor,
    operation: Operation,
    descr: &MatrixDescriptor,
    b: &Tensor,
) -> Result<Tensor> {
    check_same_dtype(a, b)?;
    if b.ndim() != 2 {
        return Err(Error::invalid_argument(
            "b",
            format!("expected a 2D right-hand side, got {}D", b.ndim()),
        ));
    }
    let [n, nrhs] = [b.shape()[0], b.shape()[1]];

    dispatch_blas_dtype!(a.dtype(), T => {
        let view = a.view::<T>()?;
        let mut y = Tensor::zeros(&[n, nrhs], T::DTYPE);
        blas::trsm(
            operation,
            T::one(),
            &view,
            descr,
            MatrixLayout::RowMajor,
            b.as_slice::<T>()?,
            nrhs,
            nrhs,
            y.as_mut_slice::<T>()?,
            nrhs,
        )?;
        Ok(y)
    }, "trsm")
}
