//! Matrix text files.
//!
//! Format: a `<rows> <cols>` header followed by `rows * cols`
//! whitespace-separated values in row-major order. Line breaks carry no
//! meaning beyond separating tokens.

use std::fmt::Write as _;
use std::fs;
use std::path::Path;

use blockmm_types::Element;

use crate::error::ResourceError;
use crate::matrix::Matrix;

const MAX_INITIAL_CAPACITY: usize = 1 << 16;

/// Parse a matrix from text. `origin` names the source in error messages.
pub fn parse_matrix<T: Element>(text: &str, origin: &str) -> Result<Matrix<T>, ResourceError> {
    let mut tokens = text.split_whitespace();

    let rows = parse_dim(tokens.next(), origin)?;
    let cols = parse_dim(tokens.next(), origin)?;
    let expected = rows
        .checked_mul(cols)
        .filter(|&n| {
            n.checked_mul(std::mem::size_of::<T>())
                .is_some_and(|bytes| bytes <= isize::MAX as usize)
        })
        .ok_or_else(|| ResourceError::TooLarge {
            origin: origin.to_string(),
            rows,
            cols,
        })?;

    // the header is untrusted: grow with the values actually present
    let mut data = Vec::with_capacity(expected.min(MAX_INITIAL_CAPACITY));
    for (index, token) in tokens.by_ref().take(expected).enumerate() {
        let value = token.parse::<T>().map_err(|_| ResourceError::InvalidValue {
            origin: origin.to_string(),
            index,
            token: token.to_string(),
        })?;
        data.push(value);
    }

    if data.len() < expected {
        return Err(ResourceError::Truncated {
            origin: origin.to_string(),
            expected,
            found: data.len(),
        });
    }

    let surplus = tokens.count();
    if surplus > 0 {
        log::warn!("{}: ignoring {} values after the declared {}x{}", origin, surplus, rows, cols);
    }
    log::debug!("{}: loaded {}x{} {}", origin, rows, cols, T::PRECISION);

    Ok(Matrix::from_fn(rows, cols, |i, j| data[i * cols + j]))
}

fn parse_dim(token: Option<&str>, origin: &str) -> Result<usize, ResourceError> {
    let token = token.ok_or_else(|| ResourceError::MissingHeader {
        origin: origin.to_string(),
    })?;
    token.parse().map_err(|_| ResourceError::InvalidHeader {
        origin: origin.to_string(),
        token: token.to_string(),
    })
}

/// Read a matrix file.
pub fn read_matrix<T: Element>(path: impl AsRef<Path>) -> Result<Matrix<T>, ResourceError> {
    let path = path.as_ref();
    let text = fs::read_to_string(path).map_err(|source| ResourceError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    parse_matrix(&text, &path.display().to_string())
}

/// Render a matrix in the file format, one row per line.
pub fn to_text<T: Element>(matrix: &Matrix<T>) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{} {}", matrix.rows(), matrix.cols());
    for i in 0..matrix.rows() {
        let row = matrix.row(i);
        for (j, value) in row.iter().enumerate() {
            if j > 0 {
                out.push(' ');
            }
            let _ = write!(out, "{}", value);
        }
        out.push('\n');
    }
    out
}

/// Write a matrix file, replacing any existing file.
pub fn write_matrix<T: Element>(path: impl AsRef<Path>, matrix: &Matrix<T>) -> Result<(), ResourceError> {
    let path = path.as_ref();
    fs::write(path, to_text(matrix)).map_err(|source| ResourceError::Io {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_basic() {
        let m: Matrix<f32> = parse_matrix("2 3\n1 2 3\n4 5 6\n", "A.txt").unwrap();
        assert_eq!(m.shape(), (2, 3));
        assert_eq!(m.as_slice(), &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
    }

    #[test]
    fn test_parse_ignores_line_layout() {
        let m: Matrix<f64> = parse_matrix("2 2 1.5\n-2\n3e2 4", "inline").unwrap();
        assert_eq!(m.as_slice(), &[1.5, -2.0, 300.0, 4.0]);
    }

    #[test]
    fn test_parse_surplus_ignored() {
        let m: Matrix<f32> = parse_matrix("1 2\n1 2 3 4", "B.txt").unwrap();
        assert_eq!(m.as_slice(), &[1.0, 2.0]);
    }

    #[test]
    fn test_parse_missing_header() {
        let err = parse_matrix::<f32>("   \n", "empty").unwrap_err();
        assert!(matches!(err, ResourceError::MissingHeader { .. }));

        let err = parse_matrix::<f32>("3", "half").unwrap_err();
        assert!(matches!(err, ResourceError::MissingHeader { .. }));
    }

    #[test]
    fn test_parse_invalid_header() {
        let err = parse_matrix::<f32>("2 x\n1 2", "bad").unwrap_err();
        match err {
            ResourceError::InvalidHeader { token, .. } => assert_eq!(token, "x"),
            other => panic!("unexpected error: {other}"),
        }

        let err = parse_matrix::<f32>("-1 2", "neg").unwrap_err();
        assert!(matches!(err, ResourceError::InvalidHeader { .. }));
    }

    #[test]
    fn test_parse_invalid_value() {
        let err = parse_matrix::<f64>("1 3\n1 two 3", "vals").unwrap_err();
        match err {
            ResourceError::InvalidValue { index, token, .. } => {
                assert_eq!(index, 1);
                assert_eq!(token, "two");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_parse_truncated() {
        let err = parse_matrix::<f32>("2 2\n1 2 3", "short").unwrap_err();
        match err {
            ResourceError::Truncated {
                expected, found, ..
            } => assert_eq!((expected, found), (4, 3)),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_parse_header_overflow() {
        let err = parse_matrix::<f32>("4294967296 4294967296\n1 2", "huge").unwrap_err();
        match err {
            ResourceError::TooLarge { rows, cols, .. } => {
                assert_eq!((rows, cols), (4294967296, 4294967296))
            }
            other => panic!("unexpected error: {other}"),
        }

        let err = parse_matrix::<f64>(&format!("{} 2\n1", usize::MAX), "huge").unwrap_err();
        assert!(matches!(err, ResourceError::TooLarge { .. }));
    }

    #[test]
    fn test_parse_huge_header_is_truncated_not_allocated() {
        let err = parse_matrix::<f32>("1000000000000 1\n1", "huge").unwrap_err();
        match err {
            ResourceError::Truncated {
                expected, found, ..
            } => assert_eq!((expected, found), (1_000_000_000_000, 1)),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_read_missing_file() {
        let err = read_matrix::<f32>("/nonexistent/blockmm/A.txt").unwrap_err();
        assert!(matches!(err, ResourceError::Io { .. }));
        assert!(err.to_string().contains("/nonexistent/blockmm/A.txt"));
    }

    #[test]
    fn test_to_text_layout() {
        let m = Matrix::from_vec(vec![58.0f32, 64.0, 139.0, 154.5], 2, 2).unwrap();
        assert_eq!(to_text(&m), "2 2\n58 64\n139 154.5\n");
    }

    #[test]
    fn test_write_then_read_file() {
        let path = std::env::temp_dir().join(format!("blockmm-loader-{}.txt", std::process::id()));
        let m = Matrix::from_fn(3, 2, |i, j| (i as f64) * 0.25 - j as f64);
        write_matrix(&path, &m).unwrap();
        let back: Matrix<f64> = read_matrix(&path).unwrap();
        let _ = std::fs::remove_file(&path);
        assert_eq!(back, m);
    }
}
