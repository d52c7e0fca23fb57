//! Concrete CSR kernels behind the dispatch table
//!
//! Row-gather SpMV (parallel over rows), scatter SpMV for transposed
//! operations, and forward/backward/column-sweep substitution for the
//! triangular solves. All kernels honor the matrix descriptor's fill mode and
//! unit-diagonal flag; conjugate-transpose operations conjugate each matrix
//! element as it is read.

use super::BlasScalar;
use crate::error::{Error, Result};
use crate::sparse::csr::CsrMatrix;
use crate::sparse::descriptor::{
    DiagKind, FillMode, MatrixDescriptor, MatrixKind, MatrixLayout, Operation,
};

/// Diagonal entries with magnitude below this are treated as singular.
const DIAG_EPS: f64 = 1e-15;

#[inline]
fn is_zero<T: BlasScalar>(v: T) -> bool {
    v.to_f64() == 0.0
}

#[inline]
fn maybe_conj<T: BlasScalar>(v: T, conj: bool) -> T {
    if conj {
        v.conj()
    } else {
        v
    }
}

/// Whether a stored entry at (i, j) is referenced under the descriptor.
/// Implicit unit diagonals are handled separately by the callers.
#[inline]
fn references(descr: &MatrixDescriptor, i: usize, j: usize) -> bool {
    if descr.kind == MatrixKind::General {
        return true;
    }
    if i == j {
        return descr.diag == DiagKind::NonUnit;
    }
    match descr.fill {
        FillMode::Lower => j < i,
        FillMode::Upper => j > i,
    }
}

#[inline]
fn implicit_unit_diag(descr: &MatrixDescriptor) -> bool {
    descr.kind == MatrixKind::Triangular && descr.diag == DiagKind::Unit
}

pub(super) fn spmv<T: BlasScalar>(
    operation: Operation,
    alpha: T,
    a: &CsrMatrix<'_, T>,
    descr: &MatrixDescriptor,
    x: &[T],
    beta: T,
    y: &mut [T],
) -> Result<()> {
    if descr.kind == MatrixKind::Triangular && a.nrows() != a.ncols() {
        return Err(Error::invalid_argument(
            "a",
            format!(
                "triangular operand must be square, got {}x{}",
                a.nrows(),
                a.ncols()
            ),
        ));
    }

    let (out_len, in_len) = if operation.is_transposed() {
        (a.ncols(), a.nrows())
    } else {
        (a.nrows(), a.ncols())
    };
    if x.len() != in_len {
        return Err(Error::shape_mismatch(&[in_len], &[x.len()]));
    }
    if y.len() != out_len {
        return Err(Error::shape_mismatch(&[out_len], &[y.len()]));
    }

    if operation.is_transposed() {
        spmv_scatter(operation.conjugates(), alpha, a, descr, x, beta, y);
    } else {
        spmv_gather(alpha, a, descr, x, beta, y);
    }
    Ok(())
}

/// `y[i] = alpha * Σ_j a[i,j] * x[j] + beta * y[i]`, rows independent
fn spmv_gather<T: BlasScalar>(
    alpha: T,
    a: &CsrMatrix<'_, T>,
    descr: &MatrixDescriptor,
    x: &[T],
    beta: T,
    y: &mut [T],
) {
    let beta_zero = is_zero(beta);
    let row = |i: usize, y_i: T| -> T {
        let mut acc = T::zero();
        for idx in a.row_range(i) {
            let j = a.col_indices()[idx] as usize;
            if references(descr, i, j) {
                acc = acc + a.values()[idx] * x[j];
            }
        }
        if implicit_unit_diag(descr) {
            acc = acc + x[i];
        }
        if beta_zero {
            alpha * acc
        } else {
            alpha * acc + beta * y_i
        }
    };

    #[cfg(feature = "rayon")]
    {
        use rayon::prelude::*;
        y.par_iter_mut()
            .enumerate()
            .for_each(|(i, y_i)| *y_i = row(i, *y_i));
    }
    #[cfg(not(feature = "rayon"))]
    {
        for (i, y_i) in y.iter_mut().enumerate() {
            *y_i = row(i, *y_i);
        }
    }
}

/// `y[j] += alpha * op(a)[j,i] * x[i]`, scattered row by row
fn spmv_scatter<T: BlasScalar>(
    conj: bool,
    alpha: T,
    a: &CsrMatrix<'_, T>,
    descr: &MatrixDescriptor,
    x: &[T],
    beta: T,
    y: &mut [T],
) {
    if is_zero(beta) {
        y.fill(T::zero());
    } else {
        for y_j in y.iter_mut() {
            *y_j = beta * *y_j;
        }
    }

    for i in 0..a.nrows() {
        let x_i = x[i];
        if implicit_unit_diag(descr) {
            y[i] = y[i] + alpha * x_i;
        }
        for idx in a.row_range(i) {
            let j = a.col_indices()[idx] as usize;
            if references(descr, i, j) {
                y[j] = y[j] + alpha * maybe_conj(a.values()[idx], conj) * x_i;
            }
        }
    }
}

pub(super) fn trsv<T: BlasScalar>(
    operation: Operation,
    alpha: T,
    a: &CsrMatrix<'_, T>,
    descr: &MatrixDescriptor,
    x: &[T],
    y: &mut [T],
) -> Result<()> {
    let n = validate_triangular(a, descr)?;
    if x.len() != n {
        return Err(Error::shape_mismatch(&[n], &[x.len()]));
    }
    if y.len() != n {
        return Err(Error::shape_mismatch(&[n], &[y.len()]));
    }

    let diag = diag_indices(a, descr, "trsv")?;
    for (y_i, &x_i) in y.iter_mut().zip(x) {
        *y_i = alpha * x_i;
    }
    substitute_in_place(operation, a, descr, diag.as_deref(), y);
    Ok(())
}

#[allow(clippy::too_many_arguments)]
pub(super) fn trsm<T: BlasScalar>(
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
    let n = validate_triangular(a, descr)?;
    validate_dense(layout, n, nrhs, ldx, x.len(), "ldx")?;
    validate_dense(layout, n, nrhs, ldy, y.len(), "ldy")?;

    let diag = diag_indices(a, descr, "trsm")?;
    let mut work = vec![T::zero(); n];
    for k in 0..nrhs {
        for (i, w) in work.iter_mut().enumerate() {
            *w = alpha * x[dense_offset(layout, i, k, ldx)];
        }
        substitute_in_place(operation, a, descr, diag.as_deref(), &mut work);
        for (i, w) in work.iter().enumerate() {
            y[dense_offset(layout, i, k, ldy)] = *w;
        }
    }
    Ok(())
}

fn validate_triangular<T: BlasScalar>(
    a: &CsrMatrix<'_, T>,
    descr: &MatrixDescriptor,
) -> Result<usize> {
    if descr.kind != MatrixKind::Triangular {
        return Err(Error::invalid_argument(
            "descr",
            "triangular solve requires a triangular descriptor",
        ));
    }
    if a.nrows() != a.ncols() {
        return Err(Error::invalid_argument(
            "a",
            format!(
                "triangular operand must be square, got {}x{}",
                a.nrows(),
                a.ncols()
            ),
        ));
    }
    Ok(a.nrows())
}

fn validate_dense(
    layout: MatrixLayout,
    n: usize,
    nrhs: usize,
    ld: usize,
    len: usize,
    ld_arg: &'static str,
) -> Result<()> {
    let min_ld = match layout {
        MatrixLayout::RowMajor => nrhs,
        MatrixLayout::ColMajor => n,
    };
    if ld < min_ld {
        return Err(Error::invalid_argument(
            ld_arg,
            format!("leading dimension {} below minimum {}", ld, min_ld),
        ));
    }
    let required = if n == 0 || nrhs == 0 {
        0
    } else {
        match layout {
            MatrixLayout::RowMajor => (n - 1) * ld + nrhs,
            MatrixLayout::ColMajor => (nrhs - 1) * ld + n,
        }
    };
    if len < required {
        return Err(Error::shape_mismatch(&[required], &[len]));
    }
    Ok(())
}

#[inline]
fn dense_offset(layout: MatrixLayout, row: usize, col: usize, ld: usize) -> usize {
    match layout {
        MatrixLayout::RowMajor => row * ld + col,
        MatrixLayout::ColMajor => col * ld + row,
    }
}

/// Locate each row's diagonal entry for a non-unit solve.
///
/// Returns `None` for unit-diagonal descriptors. A missing diagonal or one
/// with magnitude below [`DIAG_EPS`] is a `SingularDiagonal` error.
fn diag_indices<T: BlasScalar>(
    a: &CsrMatrix<'_, T>,
    descr: &MatrixDescriptor,
    op: &'static str,
) -> Result<Option<Vec<usize>>> {
    if descr.diag == DiagKind::Unit {
        return Ok(None);
    }
    let n = a.nrows();
    let mut found: Vec<Option<usize>> = vec![None; n];
    for (i, slot) in found.iter_mut().enumerate() {
        for idx in a.row_range(i) {
            if a.col_indices()[idx] as usize == i {
                *slot = Some(idx);
            }
        }
    }
    let mut diag = Vec::with_capacity(n);
    for (row, slot) in found.into_iter().enumerate() {
        match slot {
            Some(idx) if a.values()[idx].to_f64().abs() >= DIAG_EPS => diag.push(idx),
            _ => return Err(Error::SingularDiagonal { row, op }),
        }
    }
    Ok(Some(diag))
}

/// Solve `op(A) · y = y` in place, `y` pre-scaled by alpha.
///
/// Non-transposed solves substitute row by row; transposed solves sweep
/// columns through the untransposed CSR, so a lower fill solves as upper and
/// vice versa.
fn substitute_in_place<T: BlasScalar>(
    operation: Operation,
    a: &CsrMatrix<'_, T>,
    descr: &MatrixDescriptor,
    diag: Option<&[usize]>,
    y: &mut [T],
) {
    let n = a.nrows();
    let conj = operation.conjugates();

    match (operation.is_transposed(), descr.fill) {
        // Forward substitution
        (false, FillMode::Lower) => {
            for i in 0..n {
                let mut sum = y[i];
                for idx in a.row_range(i) {
                    let j = a.col_indices()[idx] as usize;
                    if j < i {
                        sum = sum - a.values()[idx] * y[j];
                    }
                }
                if let Some(diag) = diag {
                    sum = sum / a.values()[diag[i]];
                }
                y[i] = sum;
            }
        }
        // Backward substitution
        (false, FillMode::Upper) => {
            for i in (0..n).rev() {
                let mut sum = y[i];
                for idx in a.row_range(i) {
                    let j = a.col_indices()[idx] as usize;
                    if j > i {
                        sum = sum - a.values()[idx] * y[j];
                    }
                }
                if let Some(diag) = diag {
                    sum = sum / a.values()[diag[i]];
                }
                y[i] = sum;
            }
        }
        // op(A) is upper triangular: backward column sweep
        (true, FillMode::Lower) => {
            for i in (0..n).rev() {
                if let Some(diag) = diag {
                    y[i] = y[i] / maybe_conj(a.values()[diag[i]], conj);
                }
                let y_i = y[i];
                for idx in a.row_range(i) {
                    let j = a.col_indices()[idx] as usize;
                    if j < i {
                        y[j] = y[j] - maybe_conj(a.values()[idx], conj) * y_i;
                    }
                }
            }
        }
        // op(A) is lower triangular: forward column sweep
        (true, FillMode::Upper) => {
            for i in 0..n {
                if let Some(diag) = diag {
                    y[i] = y[i] / maybe_conj(a.values()[diag[i]], conj);
                }
                let y_i = y[i];
                for idx in a.row_range(i) {
                    let j = a.col_indices()[idx] as usize;
                    if j > i {
                        y[j] = y[j] - maybe_conj(a.values()[idx], conj) * y_i;
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sparse::blas;

    // Lower triangular:
    // [2.0, 0.0, 0.0]
    // [1.0, 3.0, 0.0]
    // [0.0, 4.0, 5.0]
    const L_ROW_PTRS: [i64; 4] = [0, 1, 3, 5];
    const L_COLS: [i64; 5] = [0, 0, 1, 1, 2];
    const L_VALS: [f64; 5] = [2.0, 1.0, 3.0, 4.0, 5.0];

    fn lower() -> CsrMatrix<'static, f64> {
        CsrMatrix::new(3, 3, &L_ROW_PTRS, &L_COLS, &L_VALS).unwrap()
    }

    #[test]
    fn test_beta_zero_ignores_output_contents() {
        let a = lower();
        let x = [1.0, 1.0, 1.0];
        let mut y = [f64::NAN, f64::NAN, f64::NAN];
        blas::mv(
            Operation::NonTranspose,
            1.0,
            &a,
            &MatrixDescriptor::general(),
            &x,
            0.0,
            &mut y,
        )
        .unwrap();
        assert_eq!(y, [2.0, 4.0, 9.0]);
    }

    #[test]
    fn test_transpose_solve_matches_forward_on_symmetric_permutation() {
        // Solve Lᵀ y = x by backward column sweep and check residual.
        let a = lower();
        let x = [4.0, 10.0, 10.0];
        let mut y = [0.0; 3];
        blas::trsv(
            Operation::Transpose,
            1.0,
            &a,
            &MatrixDescriptor::triangular(FillMode::Lower, DiagKind::NonUnit),
            &x,
            &mut y,
        )
        .unwrap();

        // Residual check: Lᵀ y must reproduce x.
        let mut back = [0.0; 3];
        blas::mv(
            Operation::Transpose,
            1.0,
            &a,
            &MatrixDescriptor::general(),
            &y,
            0.0,
            &mut back,
        )
        .unwrap();
        for (b, e) in back.iter().zip(&x) {
            assert!((b - e).abs() < 1e-12);
        }
    }

    #[test]
    fn test_singular_diagonal_reports_row() {
        // Missing diagonal in row 1.
        let row_ptrs = [0i64, 1, 2];
        let cols = [0i64, 0];
        let vals = [1.0f64, 2.0];
        let a = CsrMatrix::new(2, 2, &row_ptrs, &cols, &vals).unwrap();
        let err = blas::trsv(
            Operation::NonTranspose,
            1.0,
            &a,
            &MatrixDescriptor::triangular(FillMode::Lower, DiagKind::NonUnit),
            &[1.0, 1.0],
            &mut [0.0, 0.0],
        )
        .unwrap_err();
        match err {
            Error::SingularDiagonal { row, op } => {
                assert_eq!(row, 1);
                assert_eq!(op, "trsv");
            }
            other => panic!("expected SingularDiagonal, got {other:?}"),
        }
    }

    #[test]
    fn test_dense_layout_validation() {
        let a = lower();
        let descr = MatrixDescriptor::triangular(FillMode::Lower, DiagKind::NonUnit);
        let x = [0.0f64; 6];
        let mut y = [0.0f64; 6];
        let err = blas::trsm(
            Operation::NonTranspose,
            1.0,
            &a,
            &descr,
            MatrixLayout::RowMajor,
            &x,
            2,
            1, // ldx below nrhs
            &mut y,
            2,
        )
        .unwrap_err();
        assert!(matches!(err, Error::InvalidArgument { arg: "ldx", .. }));
    }
}
