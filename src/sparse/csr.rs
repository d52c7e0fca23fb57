//! CSR (Compressed Sparse Row) matrix views
//!
//! Two forms:
//!
//! - [`CsrMatrix`]: a borrowed, typed view over caller-owned CSR arrays.
//!   This is the handle the typed BLAS dispatch layer operates on; the borrow
//!   makes explicit that the arrays' lifetime is the caller's responsibility.
//! - [`CsrTensor`]: an owned, type-erased CSR over [`Tensor`] storage, used
//!   by the runtime-tag dispatch path.

use crate::dtype::{DType, Element};
use crate::error::{Error, Result};
use crate::tensor::Tensor;

/// Borrowed typed CSR matrix view
///
/// Indices are `i64` (row pointers of length `nrows + 1`, column indices and
/// values of length `nnz`). Construction validates the structure; the view
/// itself holds no ownership.
#[derive(Debug, Clone, Copy)]
pub struct CsrMatrix<'a, T: Element> {
    nrows: usize,
    ncols: usize,
    row_ptrs: &'a [i64],
    col_indices: &'a [i64],
    values: &'a [T],
}

impl<'a, T: Element> CsrMatrix<'a, T> {
    /// Create a CSR view from components
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - `row_ptrs` length is not `nrows + 1`
    /// - `row_ptrs` does not start at 0, end at nnz, or is not non-decreasing
    /// - `col_indices` and `values` have different lengths
    /// - any column index is outside `[0, ncols)`
    pub fn new(
        nrows: usize,
        ncols: usize,
        row_ptrs: &'a [i64],
        col_indices: &'a [i64],
        values: &'a [T],
    ) -> Result<Self> {
        validate_csr(nrows, ncols, row_ptrs, col_indices, values.len())?;
        Ok(Self {
            nrows,
            ncols,
            row_ptrs,
            col_indices,
            values,
        })
    }

    /// Number of rows
    #[inline]
    pub fn nrows(&self) -> usize {
        self.nrows
    }

    /// Number of columns
    #[inline]
    pub fn ncols(&self) -> usize {
        self.ncols
    }

    /// Number of stored entries
    #[inline]
    pub fn nnz(&self) -> usize {
        self.values.len()
    }

    /// Row pointer array (length `nrows + 1`)
    #[inline]
    pub fn row_ptrs(&self) -> &'a [i64] {
        self.row_ptrs
    }

    /// Column index array
    #[inline]
    pub fn col_indices(&self) -> &'a [i64] {
        self.col_indices
    }

    /// Value array
    #[inline]
    pub fn values(&self) -> &'a [T] {
        self.values
    }

    /// Half-open entry range of one row
    #[inline]
    pub(crate) fn row_range(&self, row: usize) -> std::ops::Range<usize> {
        self.row_ptrs[row] as usize..self.row_ptrs[row + 1] as usize
    }
}

/// Owned type-erased CSR matrix
///
/// Index tensors are `I64`; the value tensor carries the element dtype that
/// the runtime-tag dispatch path resolves on.
#[derive(Debug, Clone)]
pub struct CsrTensor {
    row_ptrs: Tensor,
    col_indices: Tensor,
    values: Tensor,
    shape: [usize; 2],
}

impl CsrTensor {
    /// Create a CSR matrix from component tensors
    ///
    /// # Errors
    ///
    /// Returns an error if the index tensors are not `I64`, any tensor is not
    /// 1-D, or the CSR structure is invalid (see [`CsrMatrix::new`]).
    pub fn new(
        row_ptrs: Tensor,
        col_indices: Tensor,
        values: Tensor,
        shape: [usize; 2],
    ) -> Result<Self> {
        for idx in [&row_ptrs, &col_indices] {
            if idx.dtype() != DType::I64 {
                return Err(Error::DTypeMismatch {
                    lhs: DType::I64,
                    rhs: idx.dtype(),
                });
            }
        }
        if row_ptrs.ndim() != 1 || col_indices.ndim() != 1 || values.ndim() != 1 {
            return Err(Error::invalid_csr(format!(
                "expected 1D component tensors, got row_ptrs: {}D, col_indices: {}D, values: {}D",
                row_ptrs.ndim(),
                col_indices.ndim(),
                values.ndim()
            )));
        }

        let [nrows, ncols] = shape;
        validate_csr(
            nrows,
            ncols,
            row_ptrs.as_slice::<i64>()?,
            col_indices.as_slice::<i64>()?,
            values.numel(),
        )?;

        Ok(Self {
            row_ptrs,
            col_indices,
            values,
            shape,
        })
    }

    /// Build from typed slices, copying into owned tensors
    pub fn from_slices<T: Element>(
        row_ptrs: &[i64],
        col_indices: &[i64],
        values: &[T],
        shape: [usize; 2],
    ) -> Result<Self> {
        Self::new(
            Tensor::from_slice(row_ptrs, &[row_ptrs.len()]),
            Tensor::from_slice(col_indices, &[col_indices.len()]),
            Tensor::from_slice(values, &[values.len()]),
            shape,
        )
    }

    /// Matrix shape `[nrows, ncols]`
    #[inline]
    pub fn shape(&self) -> [usize; 2] {
        self.shape
    }

    /// Element dtype of the values
    #[inline]
    pub fn dtype(&self) -> DType {
        self.values.dtype()
    }

    /// Number of stored entries
    #[inline]
    pub fn nnz(&self) -> usize {
        self.values.numel()
    }

    /// Row pointers tensor
    #[inline]
    pub fn row_ptrs(&self) -> &Tensor {
        &self.row_ptrs
    }

    /// Column indices tensor
    #[inline]
    pub fn col_indices(&self) -> &Tensor {
        &self.col_indices
    }

    /// Values tensor
    #[inline]
    pub fn values(&self) -> &Tensor {
        &self.values
    }

    /// Borrow as a typed [`CsrMatrix`] view
    ///
    /// # Errors
    ///
    /// Returns `DTypeMismatch` if `T` does not match the value dtype.
    pub fn view<T: Element>(&self) -> Result<CsrMatrix<'_, T>> {
        // Structure was validated at construction; only the dtype can mismatch.
        CsrMatrix::new(
            self.shape[0],
            self.shape[1],
            self.row_ptrs.as_slice::<i64>()?,
            self.col_indices.as_slice::<i64>()?,
            self.values.as_slice::<T>()?,
        )
    }
}

/// Shared CSR structure validation
fn validate_csr(
    nrows: usize,
    ncols: usize,
    row_ptrs: &[i64],
    col_indices: &[i64],
    nvalues: usize,
) -> Result<()> {
    if row_ptrs.len() != nrows + 1 {
        return Err(Error::shape_mismatch(&[nrows + 1], &[row_ptrs.len()]));
    }
    if col_indices.len() != nvalues {
        return Err(Error::shape_mismatch(&[nvalues], &[col_indices.len()]));
    }
    if row_ptrs[0] != 0 {
        return Err(Error::invalid_csr(format!(
            "row_ptrs must start at 0, got {}",
            row_ptrs[0]
        )));
    }
    if row_ptrs[nrows] != nvalues as i64 {
        return Err(Error::invalid_csr(format!(
            "row_ptrs must end at nnz ({}), got {}",
            nvalues, row_ptrs[nrows]
        )));
    }
    for (row, pair) in row_ptrs.windows(2).enumerate() {
        if pair[1] < pair[0] {
            return Err(Error::invalid_csr(format!(
                "row_ptrs not non-decreasing at row {}",
                row
            )));
        }
    }
    for &col in col_indices {
        if col < 0 || col as usize >= ncols {
            return Err(Error::invalid_csr(format!(
                "column index {} out of range for {} columns",
                col, ncols
            )));
        }
    }
    Ok(())
}
