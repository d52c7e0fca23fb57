//! Operation and matrix descriptors for sparse BLAS calls
//!
//! These mirror the descriptor records of vendor sparse BLAS interfaces and
//! are passed through the dispatch layer unchanged.

/// Which form of the matrix an operation applies
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Operation {
    /// op(A) = A
    NonTranspose,
    /// op(A) = Aᵀ
    Transpose,
    /// op(A) = conj(Aᵀ)
    ConjugateTranspose,
}

impl Operation {
    /// True for `Transpose` and `ConjugateTranspose`
    #[inline]
    pub const fn is_transposed(self) -> bool {
        matches!(self, Self::Transpose | Self::ConjugateTranspose)
    }

    /// True when matrix elements are conjugated
    #[inline]
    pub const fn conjugates(self) -> bool {
        matches!(self, Self::ConjugateTranspose)
    }
}

/// Which triangle of the matrix is referenced
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum FillMode {
    /// Entries with column ≤ row
    Lower,
    /// Entries with column ≥ row
    Upper,
}

/// Whether the diagonal is stored or implicitly unit
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum DiagKind {
    /// Diagonal entries are read from the matrix
    NonUnit,
    /// Diagonal entries are implicitly 1; stored diagonal values are not referenced
    Unit,
}

/// Structural interpretation of the matrix
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum MatrixKind {
    /// All stored entries are referenced
    General,
    /// Only the triangle selected by [`FillMode`] is referenced
    Triangular,
}

/// Structural property record for a sparse matrix operand
///
/// Fill and diagonal flags only apply when `kind` is
/// [`MatrixKind::Triangular`]; the triangular solves require it.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct MatrixDescriptor {
    /// Structural interpretation
    pub kind: MatrixKind,
    /// Referenced triangle
    pub fill: FillMode,
    /// Diagonal handling
    pub diag: DiagKind,
}

impl MatrixDescriptor {
    /// Descriptor for a general matrix (fill/diag flags unused)
    #[inline]
    pub const fn general() -> Self {
        Self {
            kind: MatrixKind::General,
            fill: FillMode::Lower,
            diag: DiagKind::NonUnit,
        }
    }

    /// Descriptor for a triangular matrix
    #[inline]
    pub const fn triangular(fill: FillMode, diag: DiagKind) -> Self {
        Self {
            kind: MatrixKind::Triangular,
            fill,
            diag,
        }
    }
}

/// Dense storage order for the multi-RHS triangular solve
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum MatrixLayout {
    /// Leading dimension strides between rows
    RowMajor,
    /// Leading dimension strides between columns
    ColMajor,
}
