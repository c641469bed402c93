//! Dense row-major batch tensors.

use flock_core::{BackendError, Shape};
use smallvec::SmallVec;

/// A dense `f32` tensor whose first axis is the batch axis.
///
/// Row `i` holds agent `i`'s slice, `row_len()` values long.
#[derive(Clone, Debug, PartialEq)]
pub struct BatchTensor {
    shape: Shape,
    data: Vec<f32>,
}

impl BatchTensor {
    /// Wrap `data` with the given full shape (batch axis first).
    ///
    /// # Errors
    ///
    /// [`BackendError::InputMismatch`] if the shape is empty or its product
    /// differs from `data.len()`.
    pub fn new(shape: Shape, data: Vec<f32>) -> Result<Self, BackendError> {
        if shape.is_empty() {
            return Err(BackendError::InputMismatch {
                reason: "tensor shape must include a batch axis".into(),
            });
        }
        let expected: usize = shape.iter().product();
        if expected != data.len() {
            return Err(BackendError::InputMismatch {
                reason: format!(
                    "shape {:?} needs {expected} values, got {}",
                    shape.as_slice(),
                    data.len()
                ),
            });
        }
        Ok(Self { shape, data })
    }

    /// Zero-filled tensor of `batch` rows with the given row shape.
    pub fn zeros(batch: usize, row_shape: &[usize]) -> Self {
        let mut shape: Shape = SmallVec::with_capacity(row_shape.len() + 1);
        shape.push(batch);
        shape.extend_from_slice(row_shape);
        let len = shape.iter().product();
        Self {
            shape,
            data: vec![0.0; len],
        }
    }

    /// Stack equally-shaped rows into one tensor.
    ///
    /// # Errors
    ///
    /// [`BackendError::InputMismatch`] if any row's length differs from
    /// the product of `row_shape`.
    pub fn from_rows<'a, I>(row_shape: &[usize], rows: I) -> Result<Self, BackendError>
    where
        I: IntoIterator<Item = &'a [f32]>,
    {
        let row_len: usize = row_shape.iter().product();
        let mut data = Vec::new();
        let mut batch = 0;
        for row in rows {
            if row.len() != row_len {
                return Err(BackendError::InputMismatch {
                    reason: format!("row {batch} has {} values, expected {row_len}", row.len()),
                });
            }
            data.extend_from_slice(row);
            batch += 1;
        }
        let mut shape: Shape = SmallVec::with_capacity(row_shape.len() + 1);
        shape.push(batch);
        shape.extend_from_slice(row_shape);
        Ok(Self { shape, data })
    }

    /// Full shape, batch axis first.
    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    /// Number of rows.
    pub fn batch_size(&self) -> usize {
        self.shape[0]
    }

    /// Values per row.
    pub fn row_len(&self) -> usize {
        self.shape[1..].iter().product()
    }

    /// Row `i`, or `None` if out of range.
    pub fn row(&self, i: usize) -> Option<&[f32]> {
        if i >= self.batch_size() {
            return None;
        }
        let n = self.row_len();
        self.data.get(i * n..(i + 1) * n)
    }

    /// Mutable row `i`, or `None` if out of range.
    pub fn row_mut(&mut self, i: usize) -> Option<&mut [f32]> {
        if i >= self.batch_size() {
            return None;
        }
        let n = self.row_len();
        self.data.get_mut(i * n..(i + 1) * n)
    }

    /// Flat data.
    pub fn data(&self) -> &[f32] {
        &self.data
    }

    /// Mutable flat data.
    pub fn data_mut(&mut self) -> &mut [f32] {
        &mut self.data
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use smallvec::smallvec;

    #[test]
    fn new_rejects_length_mismatch() {
        let r = BatchTensor::new(smallvec![2, 3], vec![0.0; 5]);
        assert!(matches!(r, Err(BackendError::InputMismatch { .. })));
    }

    #[test]
    fn new_rejects_missing_batch_axis() {
        assert!(BatchTensor::new(SmallVec::new(), vec![]).is_err());
    }

    #[test]
    fn rows_index_row_major() {
        let t = BatchTensor::new(smallvec![2, 2], vec![1.0, 2.0, 3.0, 4.0]).unwrap();
        assert_eq!(t.batch_size(), 2);
        assert_eq!(t.row_len(), 2);
        assert_eq!(t.row(1), Some(&[3.0, 4.0][..]));
        assert_eq!(t.row(2), None);
    }

    #[test]
    fn multi_dim_rows() {
        let t = BatchTensor::zeros(3, &[2, 4]);
        assert_eq!(t.shape(), &[3, 2, 4]);
        assert_eq!(t.row_len(), 8);
        assert_eq!(t.data().len(), 24);
    }

    #[test]
    fn from_rows_stacks_in_order() {
        let a = [1.0f32, 2.0];
        let b = [3.0f32, 4.0];
        let t = BatchTensor::from_rows(&[2], [&a[..], &b[..]]).unwrap();
        assert_eq!(t.shape(), &[2, 2]);
        assert_eq!(t.data(), &[1.0, 2.0, 3.0, 4.0]);
    }

    #[test]
    fn from_rows_rejects_ragged() {
        let a = [1.0f32, 2.0];
        let b = [3.0f32];
        assert!(BatchTensor::from_rows(&[2], [&a[..], &b[..]]).is_err());
    }

    #[test]
    fn from_rows_empty_has_zero_batch() {
        let t = BatchTensor::from_rows(&[3], std::iter::empty()).unwrap();
        assert_eq!(t.batch_size(), 0);
        assert!(t.data().is_empty());
    }
}
