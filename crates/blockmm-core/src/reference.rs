//! CPU reference product and element-wise agreement report.

use std::fmt;

use blockmm_types::Element;

use crate::error::{Result, ShapeError};
use crate::matrix::Matrix;

/// Reference product `C[i][j] = sum_k A[i][k] * B[k][j]` by direct triple loop.
pub fn reference_matmul<T: Element>(a: &Matrix<T>, b: &Matrix<T>) -> Result<Matrix<T>> {
    if a.cols() != b.rows() {
        return Err(ShapeError::InnerMismatch {
            a_rows: a.rows(),
            a_cols: a.cols(),
            b_rows: b.rows(),
            b_cols: b.cols(),
        });
    }

    let (m, k) = a.shape();
    let n = b.cols();
    let mut c = Matrix::zeros(m, n);
    for i in 0..m {
        for j in 0..n {
            let mut sum = T::zero();
            for p in 0..k {
                sum += a[(i, p)] * b[(p, j)];
            }
            c[(i, j)] = sum;
        }
    }
    Ok(c)
}

/// First element that failed the tolerance check.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Mismatch {
    /// Row-major linear index.
    pub index: usize,
    pub row: usize,
    pub col: usize,
    pub offload: f64,
    pub reference: f64,
}

/// Outcome of comparing an offloaded product against the reference.
#[derive(Debug, Clone, PartialEq)]
pub struct ComparisonReport {
    pub matches: bool,
    pub first_mismatch: Option<Mismatch>,
    /// Largest finite `|offload - reference|` seen.
    pub max_abs_diff: f64,
    pub tolerance: f64,
    pub compared: usize,
    /// Elements whose difference exceeds the tolerance or is NaN.
    pub mismatch_count: usize,
}

impl ComparisonReport {
    /// Linear index of the first mismatch.
    pub fn first_mismatch_index(&self) -> Option<usize> {
        self.first_mismatch.map(|m| m.index)
    }
}

impl fmt::Display for ComparisonReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.first_mismatch {
            None => write!(
                f,
                "PASSED: {} elements within {:e} (max |diff| {:e})",
                self.compared, self.tolerance, self.max_abs_diff
            ),
            Some(m) => write!(
                f,
                "FAILED: {} of {} elements exceed {:e}; first at index {} ({}, {}): offload {} reference {}",
                self.mismatch_count,
                self.compared,
                self.tolerance,
                m.index,
                m.row,
                m.col,
                m.offload,
                m.reference
            ),
        }
    }
}

/// Compare two same-shaped matrices element-wise.
///
/// A NaN difference counts as a mismatch.
pub fn compare<T: Element>(
    offload: &Matrix<T>,
    reference: &Matrix<T>,
    tolerance: f64,
) -> Result<ComparisonReport> {
    if offload.shape() != reference.shape() {
        return Err(ShapeError::Mismatch {
            expected_rows: reference.rows(),
            expected_cols: reference.cols(),
            actual_rows: offload.rows(),
            actual_cols: offload.cols(),
        });
    }

    let cols = reference.cols();
    let mut first_mismatch = None;
    let mut max_abs_diff = 0.0f64;
    let mut mismatch_count = 0;

    for (index, (&got, &want)) in offload
        .as_slice()
        .iter()
        .zip(reference.as_slice())
        .enumerate()
    {
        let diff = got.abs_diff(want);
        if diff.is_finite() {
            max_abs_diff = max_abs_diff.max(diff);
        }
        // `!(diff <= tol)` so NaN lands here
        if !(diff <= tolerance) {
            mismatch_count += 1;
            if first_mismatch.is_none() {
                first_mismatch = Some(Mismatch {
                    index,
                    row: index / cols,
                    col: index % cols,
                    offload: got.to_f64(),
                    reference: want.to_f64(),
                });
            }
        }
    }

    Ok(ComparisonReport {
        matches: mismatch_count == 0,
        first_mismatch,
        max_abs_diff,
        tolerance,
        compared: reference.len(),
        mismatch_count,
    })
}

/// Recompute `a * b` on the CPU and compare `offload` against it.
///
/// Never mutates its inputs. A failed comparison is reported, not returned as
/// an error.
pub fn verify<T: Element>(
    offload: &Matrix<T>,
    a: &Matrix<T>,
    b: &Matrix<T>,
    tolerance: f64,
) -> Result<ComparisonReport> {
    let reference = reference_matmul(a, b)?;
    let report = compare(offload, &reference, tolerance)?;
    if !report.matches {
        log::warn!("verification failed: {}", report);
    }
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> (Matrix<f32>, Matrix<f32>) {
        let a = Matrix::from_rows(&[vec![1.0, 2.0, 3.0], vec![4.0, 5.0, 6.0]]).unwrap();
        let b = Matrix::from_rows(&[vec![7.0, 8.0], vec![9.0, 10.0], vec![11.0, 12.0]]).unwrap();
        (a, b)
    }

    #[test]
    fn test_reference_small_product() {
        let (a, b) = sample();
        let c = reference_matmul(&a, &b).unwrap();
        assert_eq!(c.as_slice(), &[58.0, 64.0, 139.0, 154.0]);
    }

    #[test]
    fn test_reference_identity() {
        let a = Matrix::from_fn(3, 3, |i, j| (i * 3 + j) as f64);
        let c = reference_matmul(&a, &Matrix::identity(3)).unwrap();
        assert_eq!(c, a);
    }

    #[test]
    fn test_reference_shape_check() {
        let (a, _) = sample();
        assert!(matches!(
            reference_matmul(&a, &a),
            Err(ShapeError::InnerMismatch { .. })
        ));
    }

    #[test]
    fn test_verify_passes_exact() {
        let (a, b) = sample();
        let c = reference_matmul(&a, &b).unwrap();
        let report = verify(&c, &a, &b, 1e-3).unwrap();
        assert!(report.matches);
        assert_eq!(report.first_mismatch_index(), None);
        assert_eq!(report.max_abs_diff, 0.0);
        assert_eq!(report.compared, 4);
        assert!(report.to_string().starts_with("PASSED"));
    }

    #[test]
    fn test_compare_within_tolerance() {
        let want = Matrix::from_vec(vec![1.0f64, 2.0], 1, 2).unwrap();
        let got = Matrix::from_vec(vec![1.0005f64, 2.0], 1, 2).unwrap();
        let report = compare(&got, &want, 1e-3).unwrap();
        assert!(report.matches);
        assert!((report.max_abs_diff - 5e-4).abs() < 1e-12);
    }

    #[test]
    fn test_compare_reports_first_mismatch() {
        let want = Matrix::from_vec(vec![1.0f64, 2.0, 3.0, 4.0], 2, 2).unwrap();
        let got = Matrix::from_vec(vec![1.0f64, 2.0, 3.5, 6.0], 2, 2).unwrap();
        let report = compare(&got, &want, 1e-3).unwrap();

        assert!(!report.matches);
        assert_eq!(report.mismatch_count, 2);
        assert_eq!(report.max_abs_diff, 2.0);
        let first = report.first_mismatch.unwrap();
        assert_eq!((first.index, first.row, first.col), (2, 1, 0));
        assert_eq!((first.offload, first.reference), (3.5, 3.0));
        assert!(report.to_string().starts_with("FAILED: 2 of 4"));
    }

    #[test]
    fn test_compare_nan_is_mismatch() {
        let want = Matrix::from_vec(vec![1.0f32, 2.0], 1, 2).unwrap();
        let got = Matrix::from_vec(vec![1.0f32, f32::NAN], 1, 2).unwrap();
        let report = compare(&got, &want, 1e-3).unwrap();
        assert!(!report.matches);
        assert_eq!(report.first_mismatch_index(), Some(1));
        assert_eq!(report.max_abs_diff, 0.0);
    }

    #[test]
    fn test_compare_shape_mismatch() {
        let a = Matrix::<f32>::zeros(2, 2);
        let b = Matrix::<f32>::zeros(2, 3);
        assert!(matches!(compare(&a, &b, 1e-3), Err(ShapeError::Mismatch { .. })));
    }

    #[test]
    fn test_verify_does_not_mutate() {
        let (a, b) = sample();
        let (a0, b0) = (a.clone(), b.clone());
        let c = Matrix::zeros(2, 2);
        let report = verify(&c, &a, &b, 1e-3).unwrap();
        assert!(!report.matches);
        assert_eq!((a, b), (a0, b0));
    }
}
