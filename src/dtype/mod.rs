//! Data type system for kernr
//!
//! This module provides the `DType` enum representing all supported element
//! types, the `Element` trait connecting Rust types to runtime tags, and the
//! complex number types used by the sparse BLAS layer.

pub mod complex;
mod element;

pub use complex::{Complex64, Complex128};
pub use element::Element;

use std::fmt;

/// Data types supported by kernr tensors
///
/// This enum represents the element type of a buffer at runtime.
/// Using an enum (rather than generics) allows runtime type selection for
/// type-erased buffers; the typed BLAS dispatch layer resolves types at
/// compile time instead.
///
/// # Discriminant Values (Serialization Stability)
///
/// The discriminant values are **stable**:
/// - Floats: 0-9 (F64=0, F32=1, F16=2, BF16=3)
/// - Signed ints: 10-19 (I64=10)
/// - Complex: 40-49 (Complex64=40, Complex128=41)
///
/// New types will use reserved ranges. Existing values are NEVER changed.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
#[non_exhaustive]
#[repr(u8)]
pub enum DType {
    /// 64-bit floating point
    F64 = 0,
    /// 32-bit floating point (most common)
    F32 = 1,
    /// 16-bit floating point (IEEE 754)
    F16 = 2,
    /// 16-bit brain floating point
    BF16 = 3,

    /// 64-bit signed integer (CSR index arrays)
    I64 = 10,

    /// 64-bit complex (two f32: re, im)
    Complex64 = 40,
    /// 128-bit complex (two f64: re, im)
    Complex128 = 41,
}

impl DType {
    /// Size of one element in bytes
    #[inline]
    pub const fn size_in_bytes(self) -> usize {
        match self {
            Self::Complex128 => 16,
            Self::F64 | Self::I64 | Self::Complex64 => 8,
            Self::F32 => 4,
            Self::F16 | Self::BF16 => 2,
        }
    }

    /// Returns true if this is a floating point type
    #[inline]
    pub const fn is_float(self) -> bool {
        matches!(self, Self::F64 | Self::F32 | Self::F16 | Self::BF16)
    }

    /// Returns true if this is a complex number type
    #[inline]
    pub const fn is_complex(self) -> bool {
        matches!(self, Self::Complex64 | Self::Complex128)
    }

    /// Returns true if this is a reduced-precision float (F16, BF16)
    ///
    /// Reduced-precision operands are widened to F32 for computation by the
    /// fusion builder and narrowed back at the output.
    #[inline]
    pub const fn is_reduced_precision(self) -> bool {
        matches!(self, Self::F16 | Self::BF16)
    }

    /// Returns the underlying float type for complex types
    /// Returns None for non-complex types
    #[inline]
    pub const fn complex_component_dtype(self) -> Option<Self> {
        match self {
            Self::Complex64 => Some(Self::F32),
            Self::Complex128 => Some(Self::F64),
            _ => None,
        }
    }

    /// Short name for display (e.g., "f32", "c64")
    pub const fn short_name(self) -> &'static str {
        match self {
            Self::F64 => "f64",
            Self::F32 => "f32",
            Self::F16 => "f16",
            Self::BF16 => "bf16",
            Self::I64 => "i64",
            Self::Complex64 => "c64",
            Self::Complex128 => "c128",
        }
    }
}

impl fmt::Display for DType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.short_name())
    }
}

/// Macro for runtime dispatch over the real float dtypes.
///
/// Takes a `DType` value and executes a code block with `$T` bound to the
/// corresponding Rust type, for the dtypes the fusion executor computes in.
/// Every other tag returns `Error::UnsupportedDType` naming the type.
#[macro_export]
macro_rules! dispatch_float_dtype {
    ($dtype:expr, $T:ident => $body:block, $error_op:expr) => {
        match $dtype {
            $crate::dtype::DType::F64 => {
                type $T = f64;
                $body
            }
            $crate::dtype::DType::F32 => {
                type $T = f32;
                $body
            }
            $crate::dtype::DType::F16 => {
                type $T = half::f16;
                $body
            }
            $crate::dtype::DType::BF16 => {
                type $T = half::bf16;
                $body
            }
            other => {
                return Err($crate::error::Error::UnsupportedDType {
                    dtype: other,
                    op: $error_op,
                })
            }
        }
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dtype_size() {
        assert_eq!(DType::F64.size_in_bytes(), 8);
        assert_eq!(DType::F32.size_in_bytes(), 4);
        assert_eq!(DType::F16.size_in_bytes(), 2);
        assert_eq!(DType::BF16.size_in_bytes(), 2);
        assert_eq!(DType::I64.size_in_bytes(), 8);
        assert_eq!(DType::Complex64.size_in_bytes(), 8);
        assert_eq!(DType::Complex128.size_in_bytes(), 16);
    }

    #[test]
    fn test_dtype_categories() {
        assert!(DType::F32.is_float());
        assert!(!DType::I64.is_float());
        assert!(DType::Complex64.is_complex());
        assert!(!DType::F32.is_complex());
        assert!(DType::F16.is_reduced_precision());
        assert!(DType::BF16.is_reduced_precision());
        assert!(!DType::F32.is_reduced_precision());
    }

    #[test]
    fn test_complex_component() {
        assert_eq!(DType::Complex64.complex_component_dtype(), Some(DType::F32));
        assert_eq!(
            DType::Complex128.complex_component_dtype(),
            Some(DType::F64)
        );
        assert_eq!(DType::F32.complex_component_dtype(), None);
    }

    #[test]
    fn test_short_names() {
        assert_eq!(DType::F16.short_name(), "f16");
        assert_eq!(DType::Complex128.short_name(), "c128");
        assert_eq!(format!("{}", DType::BF16), "bf16");
    }
}
