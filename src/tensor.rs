//! Minimal contiguous host tensor
//!
//! A row-major, contiguous, host-memory tensor with type-erased storage.
//! The element type is carried as a runtime [`DType`] tag; typed access goes
//! through [`Tensor::as_slice`] / [`Tensor::as_mut_slice`], which check the
//! tag against the requested [`Element`] type.
//!
//! Storage is backed by `u64` words so that every supported element type's
//! alignment requirement is met by construction.

use crate::dtype::{DType, Element};
use crate::error::{Error, Result};

/// Contiguous row-major host tensor with type-erased storage
#[derive(Debug, Clone)]
pub struct Tensor {
    dtype: DType,
    shape: Vec<usize>,
    storage: Vec<u64>,
    len_bytes: usize,
}

impl Tensor {
    /// Create a tensor from a typed slice
    ///
    /// # Panics
    ///
    /// Panics if `data.len()` does not match the product of `shape`.
    pub fn from_slice<T: Element>(data: &[T], shape: &[usize]) -> Self {
        let numel: usize = shape.iter().product();
        assert_eq!(
            data.len(),
            numel,
            "from_slice: {} elements for shape {:?}",
            data.len(),
            shape
        );

        let mut tensor = Self::zeros(shape, T::DTYPE);
        let src: &[u8] = bytemuck::cast_slice(data);
        tensor.bytes_mut().copy_from_slice(src);
        tensor
    }

    /// Create a zero-filled tensor
    pub fn zeros(shape: &[usize], dtype: DType) -> Self {
        let numel: usize = shape.iter().product();
        let len_bytes = numel * dtype.size_in_bytes();
        let words = len_bytes.div_ceil(8);
        Self {
            dtype,
            shape: shape.to_vec(),
            storage: vec![0u64; words],
            len_bytes,
        }
    }

    /// Element dtype
    #[inline]
    pub fn dtype(&self) -> DType {
        self.dtype
    }

    /// Shape of the tensor
    #[inline]
    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    /// Number of dimensions
    #[inline]
    pub fn ndim(&self) -> usize {
        self.shape.len()
    }

    /// Total number of elements
    #[inline]
    pub fn numel(&self) -> usize {
        self.shape.iter().product()
    }

    /// Total storage size in bytes
    #[inline]
    pub fn size_in_bytes(&self) -> usize {
        self.len_bytes
    }

    /// Typed view of the storage
    ///
    /// # Errors
    ///
    /// Returns `DTypeMismatch` if `T::DTYPE` differs from the tensor's dtype.
    pub fn as_slice<T: Element>(&self) -> Result<&[T]> {
        self.check_dtype::<T>()?;
        let typed: &[T] = bytemuck::cast_slice(&self.storage);
        Ok(&typed[..self.numel()])
    }

    /// Mutable typed view of the storage
    ///
    /// # Errors
    ///
    /// Returns `DTypeMismatch` if `T::DTYPE` differs from the tensor's dtype.
    pub fn as_mut_slice<T: Element>(&mut self) -> Result<&mut [T]> {
        self.check_dtype::<T>()?;
        let numel = self.numel();
        let typed: &mut [T] = bytemuck::cast_slice_mut(&mut self.storage);
        Ok(&mut typed[..numel])
    }

    /// Copy the elements out into a `Vec`
    pub fn to_vec<T: Element>(&self) -> Result<Vec<T>> {
        Ok(self.as_slice::<T>()?.to_vec())
    }

    /// Mutable raw storage bytes
    #[inline]
    pub(crate) fn bytes_mut(&mut self) -> &mut [u8] {
        let len = self.len_bytes;
        let all: &mut [u8] = bytemuck::cast_slice_mut(&mut self.storage);
        &mut all[..len]
    }

    fn check_dtype<T: Element>(&self) -> Result<()> {
        if self.dtype != T::DTYPE {
            return Err(Error::DTypeMismatch {
                lhs: self.dtype,
                rhs: T::DTYPE,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dtype::Complex128;

    #[test]
    fn test_from_slice_roundtrip() {
        let t = Tensor::from_slice(&[1.0f32, 2.0, 3.0, 4.0, 5.0, 6.0], &[2, 3]);
        assert_eq!(t.dtype(), DType::F32);
        assert_eq!(t.shape(), &[2, 3]);
        assert_eq!(t.numel(), 6);
        assert_eq!(t.size_in_bytes(), 24);
        assert_eq!(t.to_vec::<f32>().unwrap(), vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
    }

    #[test]
    fn test_odd_length_f16() {
        let data = [
            half::f16::from_f64(0.5),
            half::f16::from_f64(1.5),
            half::f16::from_f64(-2.0),
        ];
        let t = Tensor::from_slice(&data, &[3]);
        assert_eq!(t.size_in_bytes(), 6);
        assert_eq!(t.to_vec::<half::f16>().unwrap(), data.to_vec());
    }

    #[test]
    fn test_complex_storage() {
        let data = [Complex128::new(1.0, -1.0), Complex128::new(2.0, 0.5)];
        let t = Tensor::from_slice(&data, &[2]);
        assert_eq!(t.size_in_bytes(), 32);
        assert_eq!(t.to_vec::<Complex128>().unwrap(), data.to_vec());
    }

    #[test]
    fn test_wrong_dtype_access() {
        let t = Tensor::zeros(&[4], DType::F32);
        let err = t.as_slice::<f64>().unwrap_err();
        assert!(matches!(err, Error::DTypeMismatch { .. }));
    }

    #[test]
    fn test_zero_sized() {
        let t = Tensor::zeros(&[0, 3], DType::F64);
        assert_eq!(t.numel(), 0);
        assert!(t.as_slice::<f64>().unwrap().is_empty());
    }
}
