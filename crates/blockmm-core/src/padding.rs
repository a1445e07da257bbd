//! Zero padding, transposition and trimming of operands.
//!
//! The blocked kernel reads whole `t x t` tiles, so every operand is grown
//! with zeros until its extents are multiples of the tile edge. B is padded
//! first and then transposed, which makes both operands stream along the
//! inner dimension.
//!
//! # Layout
//! For `A` (2x3), `B` (3x2) and `t = 4`:
//! ```text
//! A padded (4x4):        B padded (4x4):        Bt (4x4):
//! [ a00 a01 a02 0 ]      [ b00 b01 0 0 ]        [ b00 b10 b20 0 ]
//! [ a10 a11 a12 0 ]      [ b10 b11 0 0 ]        [ b01 b11 b21 0 ]
//! [ 0   0   0   0 ]      [ b20 b21 0 0 ]        [ 0   0   0   0 ]
//! [ 0   0   0   0 ]      [ 0   0   0 0 ]        [ 0   0   0   0 ]
//! ```

use blockmm_types::Element;

use crate::error::{Result, ShapeError};
use crate::matrix::Matrix;
use crate::tiling::{round_up_to_multiple, TileConfig};

/// Zero rows and columns appended to one operand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PaddingSpec {
    pub pad_rows: usize,
    pub pad_cols: usize,
}

impl PaddingSpec {
    pub const NONE: Self = Self {
        pad_rows: 0,
        pad_cols: 0,
    };

    pub fn new(pad_rows: usize, pad_cols: usize) -> Self {
        Self { pad_rows, pad_cols }
    }

    /// True if nothing is appended.
    pub fn is_none(&self) -> bool {
        self.pad_rows == 0 && self.pad_cols == 0
    }
}

/// Padding of both operands for one multiply.
///
/// `b.pad_rows == a.pad_cols` always holds, since both pad the inner
/// dimension to the same tile multiple.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct OperandPadding {
    pub a: PaddingSpec,
    pub b: PaddingSpec,
}

impl OperandPadding {
    /// Derive the padding for an `out_rows x inner` by `inner x out_cols` product.
    pub fn derive(out_rows: usize, inner: usize, out_cols: usize, tile: &TileConfig) -> Self {
        let inner_pad = round_up_to_multiple(inner, tile.tile_edge) - inner;
        let a = PaddingSpec::new(tile.global_y.saturating_sub(out_rows), inner_pad);
        let b = PaddingSpec::new(inner_pad, tile.global_x.saturating_sub(out_cols));
        Self { a, b }
    }

    /// Padded inner dimension shared by A and B.
    pub fn padded_inner(&self, inner: usize) -> usize {
        inner + self.a.pad_cols
    }
}

/// Append `pad_cols` zero columns to every row, then `pad_rows` zero rows.
pub fn pad<T: Element>(matrix: &Matrix<T>, spec: PaddingSpec) -> Matrix<T> {
    if spec.is_none() {
        return matrix.clone();
    }

    let (rows, cols) = matrix.shape();
    Matrix::from_fn(rows + spec.pad_rows, cols + spec.pad_cols, |i, j| {
        matrix.get(i, j).unwrap_or_else(T::zero)
    })
}

/// Transpose: `result[c * rows + r] = input[r * cols + c]`.
pub fn transpose<T: Element>(matrix: &Matrix<T>) -> Matrix<T> {
    let (rows, cols) = matrix.shape();
    let src = matrix.as_slice();
    Matrix::from_fn(cols, rows, |c, r| src[r * cols + c])
}

/// Keep the leading `rows x cols` block.
pub fn trim<T: Element>(matrix: &Matrix<T>, rows: usize, cols: usize) -> Result<Matrix<T>> {
    if rows > matrix.rows() || cols > matrix.cols() {
        return Err(ShapeError::TrimOutOfBounds {
            rows: matrix.rows(),
            cols: matrix.cols(),
            target_rows: rows,
            target_cols: cols,
        });
    }
    if (rows, cols) == matrix.shape() {
        return Ok(matrix.clone());
    }

    Ok(Matrix::from_fn(rows, cols, |i, j| matrix[(i, j)]))
}

/// Operands laid out for the blocked kernel.
#[derive(Debug, Clone)]
pub struct PreparedOperands<T: Element> {
    /// A padded to `global_y x padded_inner`.
    pub a: Matrix<T>,
    /// B padded to `padded_inner x global_x`, then transposed.
    pub b_transposed: Matrix<T>,
    pub padding: OperandPadding,
    pub out_rows: usize,
    pub inner: usize,
    pub out_cols: usize,
}

impl<T: Element> PreparedOperands<T> {
    /// Shape of the padded output the device writes.
    pub fn padded_output_shape(&self) -> (usize, usize) {
        (self.a.rows(), self.b_transposed.rows())
    }

    /// Padded inner dimension.
    pub fn padded_inner(&self) -> usize {
        self.a.cols()
    }
}

/// Check shapes, derive padding and lay out both operands for `tile`.
pub fn prepare_operands<T: Element>(
    a: &Matrix<T>,
    b: &Matrix<T>,
    tile: &TileConfig,
) -> Result<PreparedOperands<T>> {
    if a.cols() != b.rows() {
        return Err(ShapeError::InnerMismatch {
            a_rows: a.rows(),
            a_cols: a.cols(),
            b_rows: b.rows(),
            b_cols: b.cols(),
        });
    }
    let (out_rows, inner) = a.shape();
    let out_cols = b.cols();
    if out_rows == 0 || inner == 0 || out_cols == 0 {
        let (rows, cols) = if a.is_empty() { a.shape() } else { b.shape() };
        return Err(ShapeError::Empty { rows, cols });
    }

    let padding = OperandPadding::derive(out_rows, inner, out_cols, tile);
    log::debug!(
        "padding A {}x{} by {:?}, B {}x{} by {:?}",
        out_rows,
        inner,
        padding.a,
        inner,
        out_cols,
        padding.b
    );

    let a_padded = pad(a, padding.a);
    let b_transposed = transpose(&pad(b, padding.b));

    Ok(PreparedOperands {
        a: a_padded,
        b_transposed,
        padding,
        out_rows,
        inner,
        out_cols,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tiling::TilePolicy;

    fn sample_a() -> Matrix<f32> {
        Matrix::from_vec(vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0], 2, 3).unwrap()
    }

    fn sample_b() -> Matrix<f32> {
        Matrix::from_vec(vec![7.0, 8.0, 9.0, 10.0, 11.0, 12.0], 3, 2).unwrap()
    }

    #[test]
    fn test_pad_appends_zeros() {
        let p = pad(&sample_a(), PaddingSpec::new(1, 2));
        assert_eq!(p.shape(), (3, 5));
        assert_eq!(p.row(0), &[1.0, 2.0, 3.0, 0.0, 0.0]);
        assert_eq!(p.row(1), &[4.0, 5.0, 6.0, 0.0, 0.0]);
        assert_eq!(p.row(2), &[0.0; 5]);
    }

    #[test]
    fn test_pad_none_is_identity() {
        let a = sample_a();
        assert_eq!(pad(&a, PaddingSpec::NONE), a);
    }

    #[test]
    fn test_transpose_layout() {
        let t = transpose(&sample_a());
        assert_eq!(t.shape(), (3, 2));
        assert_eq!(t.as_slice(), &[1.0, 4.0, 2.0, 5.0, 3.0, 6.0]);
    }

    #[test]
    fn test_trim_restores_original() {
        let a = sample_a();
        let padded = pad(&a, PaddingSpec::new(3, 5));
        assert_eq!(trim(&padded, 2, 3).unwrap(), a);
    }

    #[test]
    fn test_trim_out_of_bounds() {
        let err = trim(&sample_a(), 3, 3).unwrap_err();
        assert_eq!(
            err,
            ShapeError::TrimOutOfBounds {
                rows: 2,
                cols: 3,
                target_rows: 3,
                target_cols: 3
            }
        );
    }

    #[test]
    fn test_derive_padding() {
        let tile = TileConfig::select(TilePolicy::RoundUp, 64, 2, 2);
        assert_eq!(tile.tile_edge, 4);

        let padding = OperandPadding::derive(2, 3, 2, &tile);
        assert_eq!(padding.a, PaddingSpec::new(2, 1));
        assert_eq!(padding.b, PaddingSpec::new(1, 2));
        assert_eq!(padding.b.pad_rows, padding.a.pad_cols);
        assert_eq!(padding.padded_inner(3), 4);
    }

    #[test]
    fn test_prepare_operands_layout() {
        let tile = TileConfig::select(TilePolicy::RoundUp, 64, 2, 2);
        let prepared = prepare_operands(&sample_a(), &sample_b(), &tile).unwrap();

        assert_eq!(prepared.a.shape(), (4, 4));
        assert_eq!(prepared.b_transposed.shape(), (4, 4));
        assert_eq!(prepared.padded_output_shape(), (4, 4));
        assert_eq!(prepared.b_transposed.row(0), &[7.0, 9.0, 11.0, 0.0]);
        assert_eq!(prepared.b_transposed.row(1), &[8.0, 10.0, 12.0, 0.0]);
        assert_eq!(prepared.b_transposed.row(2), &[0.0; 4]);
        assert_eq!((prepared.out_rows, prepared.inner, prepared.out_cols), (2, 3, 2));
    }

    #[test]
    fn test_prepare_operands_rejects_inner_mismatch() {
        let tile = TileConfig::select(TilePolicy::RoundUp, 64, 2, 2);
        let err = prepare_operands(&sample_a(), &sample_a(), &tile).unwrap_err();
        assert!(matches!(err, ShapeError::InnerMismatch { a_cols: 3, b_rows: 2, .. }));
    }

    #[test]
    fn test_prepare_operands_rejects_empty() {
        let tile = TileConfig::select(TilePolicy::RoundUp, 64, 1, 1);
        let a = Matrix::<f64>::zeros(0, 3);
        let b = Matrix::<f64>::zeros(3, 2);
        let err = prepare_operands(&a, &b, &tile).unwrap_err();
        assert_eq!(err, ShapeError::Empty { rows: 0, cols: 3 });
    }
}
