//! Error types for matrix handling and matrix file I/O.

use std::path::PathBuf;

use thiserror::Error;

/// Dimension errors raised by matrix constructors and operand preparation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ShapeError {
    /// Backing data does not hold exactly `rows * cols` elements.
    #[error("data length {len} does not match a {rows}x{cols} matrix")]
    DataLength { len: usize, rows: usize, cols: usize },

    /// A.cols != B.rows.
    #[error("inner dimensions differ: A is {a_rows}x{a_cols}, B is {b_rows}x{b_cols}")]
    InnerMismatch {
        a_rows: usize,
        a_cols: usize,
        b_rows: usize,
        b_cols: usize,
    },

    /// Two matrices that must agree element-wise have different shapes.
    #[error("shape {actual_rows}x{actual_cols} does not match expected {expected_rows}x{expected_cols}")]
    Mismatch {
        expected_rows: usize,
        expected_cols: usize,
        actual_rows: usize,
        actual_cols: usize,
    },

    /// Trim target is larger than the source matrix.
    #[error("cannot trim a {rows}x{cols} matrix to {target_rows}x{target_cols}")]
    TrimOutOfBounds {
        rows: usize,
        cols: usize,
        target_rows: usize,
        target_cols: usize,
    },

    /// An operand has a zero dimension.
    #[error("empty operand: {rows}x{cols}")]
    Empty { rows: usize, cols: usize },

    /// A dimension does not fit the 32-bit kernel argument range.
    #[error("dimension {value} exceeds the 32-bit kernel argument range")]
    Overflow { value: usize },
}

/// Errors reading or writing matrix text files.
#[derive(Debug, Error)]
pub enum ResourceError {
    /// The file could not be opened, read or written.
    #[error("failed to access {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The input has no `<rows> <cols>` header.
    #[error("{origin}: missing dimension header")]
    MissingHeader { origin: String },

    /// A header token is not a non-negative integer.
    #[error("{origin}: invalid dimension header token '{token}'")]
    InvalidHeader { origin: String, token: String },

    /// A value token does not parse as a number.
    #[error("{origin}: value #{index} is not a number: '{token}'")]
    InvalidValue {
        origin: String,
        index: usize,
        token: String,
    },

    /// The header announces more values than can be addressed.
    #[error("{origin}: a {rows}x{cols} matrix is too large")]
    TooLarge {
        origin: String,
        rows: usize,
        cols: usize,
    },

    /// Fewer values than the header announced.
    #[error("{origin}: expected {expected} values, found {found}")]
    Truncated {
        origin: String,
        expected: usize,
        found: usize,
    },
}

/// Result type for shape-checked operations.
pub type Result<T> = std::result::Result<T, ShapeError>;
