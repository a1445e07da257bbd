//! Element types for block-tiled matrix multiplication offload.
//!
//! The engine is generic over one scalar trait, [`Element`], implemented for
//! `f32` and `f64`. Each element type carries a [`Precision`] tag that selects
//! the kernel variant and the default verification tolerance.
//!
//! | Type | Precision | C type | Default tolerance |
//! |------|-----------|--------|-------------------|
//! | `f32` | [`Precision::Single`] | `float` | 1e-3 |
//! | `f64` | [`Precision::Double`] | `double` | 1e-6 |
//!
//! # Example
//!
//! ```
//! use blockmm_types::{Element, Precision};
//!
//! fn describe<T: Element>() -> String {
//!     format!("{} ({} bytes)", T::PRECISION, T::PRECISION.size_of())
//! }
//!
//! assert_eq!(describe::<f32>(), "f32 (4 bytes)");
//! assert_eq!(f64::PRECISION, Precision::Double);
//! ```

mod element;
mod precision;

pub use element::Element;
pub use precision::Precision;

/// Prelude module for convenient imports.
pub mod prelude {
    pub use super::{Element, Precision};
}
