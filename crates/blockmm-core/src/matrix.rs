//! Owned row-major matrix.

use std::ops::{Index, IndexMut};

use blockmm_types::Element;

use crate::error::{Result, ShapeError};

/// Owned dense matrix in row-major order.
///
/// `data.len() == rows * cols` always holds. Padding and transposition
/// produce new matrices; nothing in this crate mutates an operand in place.
///
/// ```
/// use blockmm_core::Matrix;
///
/// let m = Matrix::from_vec(vec![1.0f32, 2.0, 3.0, 4.0, 5.0, 6.0], 2, 3).unwrap();
/// assert_eq!(m[(1, 0)], 4.0);
/// assert_eq!(m.shape(), (2, 3));
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct Matrix<T: Element> {
    data: Vec<T>,
    rows: usize,
    cols: usize,
}

impl<T: Element> Matrix<T> {
    /// Create a matrix filled with zeros.
    pub fn zeros(rows: usize, cols: usize) -> Self {
        Self {
            data: vec![T::zero(); rows * cols],
            rows,
            cols,
        }
    }

    /// Create an identity matrix.
    pub fn identity(n: usize) -> Self {
        let mut mat = Self::zeros(n, n);
        for i in 0..n {
            mat.data[i * n + i] = T::one();
        }
        mat
    }

    /// Create a matrix from a function of `(row, col)`.
    pub fn from_fn<F>(rows: usize, cols: usize, mut f: F) -> Self
    where
        F: FnMut(usize, usize) -> T,
    {
        let data = (0..rows * cols).map(|idx| f(idx / cols, idx % cols)).collect();
        Self { data, rows, cols }
    }

    /// Wrap row-major data.
    pub fn from_vec(data: Vec<T>, rows: usize, cols: usize) -> Result<Self> {
        if data.len() != rows * cols {
            return Err(ShapeError::DataLength {
                len: data.len(),
                rows,
                cols,
            });
        }
        Ok(Self { data, rows, cols })
    }

    /// Build from nested rows. All rows must have the same length.
    pub fn from_rows(rows: &[Vec<T>]) -> Result<Self> {
        let nrows = rows.len();
        let ncols = rows.first().map_or(0, Vec::len);
        let mut data = Vec::with_capacity(nrows * ncols);
        for row in rows {
            if row.len() != ncols {
                return Err(ShapeError::DataLength {
                    len: row.len(),
                    rows: 1,
                    cols: ncols,
                });
            }
            data.extend_from_slice(row);
        }
        Ok(Self {
            data,
            rows: nrows,
            cols: ncols,
        })
    }

    /// Number of rows.
    #[inline]
    pub fn rows(&self) -> usize {
        self.rows
    }

    /// Number of columns.
    #[inline]
    pub fn cols(&self) -> usize {
        self.cols
    }

    /// `(rows, cols)`.
    #[inline]
    pub fn shape(&self) -> (usize, usize) {
        (self.rows, self.cols)
    }

    /// Total number of elements.
    #[inline]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// True if either dimension is zero.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Row-major backing data.
    #[inline]
    pub fn as_slice(&self) -> &[T] {
        &self.data
    }

    /// Row-major backing data, mutable.
    #[inline]
    pub fn as_mut_slice(&mut self) -> &mut [T] {
        &mut self.data
    }

    /// Raw bytes of the backing data, for device uploads.
    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.data)
    }

    /// One row as a slice.
    #[inline]
    pub fn row(&self, i: usize) -> &[T] {
        &self.data[i * self.cols..(i + 1) * self.cols]
    }

    /// Element at `(i, j)`, or `None` when out of bounds.
    pub fn get(&self, i: usize, j: usize) -> Option<T> {
        if i < self.rows && j < self.cols {
            Some(self.data[i * self.cols + j])
        } else {
            None
        }
    }

    /// Consume the matrix, returning its row-major data.
    pub fn into_vec(self) -> Vec<T> {
        self.data
    }

    /// Element-wise conversion into another element type.
    pub fn map<U: Element, F>(&self, f: F) -> Matrix<U>
    where
        F: FnMut(T) -> U,
    {
        Matrix {
            data: self.data.iter().copied().map(f).collect(),
            rows: self.rows,
            cols: self.cols,
        }
    }

    /// Convert precision through `f64`.
    pub fn cast<U: Element>(&self) -> Matrix<U> {
        self.map(|x| U::from_f64(x.to_f64()))
    }
}

impl<T: Element> Index<(usize, usize)> for Matrix<T> {
    type Output = T;

    #[inline]
    fn index(&self, (i, j): (usize, usize)) -> &T {
        debug_assert!(i < self.rows, "row index {} out of bounds {}", i, self.rows);
        debug_assert!(j < self.cols, "col index {} out of bounds {}", j, self.cols);
        &self.data[i * self.cols + j]
    }
}

impl<T: Element> IndexMut<(usize, usize)> for Matrix<T> {
    #[inline]
    fn index_mut(&mut self, (i, j): (usize, usize)) -> &mut T {
        debug_assert!(i < self.rows, "row index {} out of bounds {}", i, self.rows);
        debug_assert!(j < self.cols, "col index {} out of bounds {}", j, self.cols);
        &mut self.data[i * self.cols + j]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_vec_checks_length() {
        assert!(Matrix::from_vec(vec![1.0f32; 6], 2, 3).is_ok());
        assert_eq!(
            Matrix::from_vec(vec![1.0f32; 5], 2, 3),
            Err(ShapeError::DataLength {
                len: 5,
                rows: 2,
                cols: 3
            })
        );
    }

    #[test]
    fn test_from_rows() {
        let m = Matrix::from_rows(&[vec![1.0f64, 2.0], vec![3.0, 4.0]]).unwrap();
        assert_eq!(m.shape(), (2, 2));
        assert_eq!(m.as_slice(), &[1.0, 2.0, 3.0, 4.0]);

        let ragged = Matrix::from_rows(&[vec![1.0f64, 2.0], vec![3.0]]);
        assert!(ragged.is_err());
    }

    #[test]
    fn test_identity_and_index() {
        let mut m = Matrix::<f32>::identity(3);
        assert_eq!(m[(0, 0)], 1.0);
        assert_eq!(m[(0, 1)], 0.0);
        m[(2, 1)] = 7.0;
        assert_eq!(m.get(2, 1), Some(7.0));
        assert_eq!(m.get(3, 0), None);
    }

    #[test]
    fn test_from_fn_row_major() {
        let m = Matrix::from_fn(2, 3, |i, j| (i * 10 + j) as f64);
        assert_eq!(m.row(1), &[10.0, 11.0, 12.0]);
    }

    #[test]
    fn test_cast_between_precisions() {
        let m = Matrix::from_vec(vec![0.5f64, 1.25], 1, 2).unwrap();
        let single: Matrix<f32> = m.cast();
        assert_eq!(single.as_slice(), &[0.5f32, 1.25]);
    }

    #[test]
    fn test_bytes_len() {
        let m = Matrix::<f64>::zeros(2, 2);
        assert_eq!(m.as_bytes().len(), 32);
    }
}
