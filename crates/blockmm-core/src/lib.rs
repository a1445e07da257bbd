//! Core algorithms for block-tiled matrix multiplication offload.
//!
//! Everything here is device independent: choosing a tile from a work-group
//! capacity, zero padding and transposing operands into the layout the
//! blocked kernel reads, running that kernel one work-group at a time on the
//! host, and checking a result against a CPU reference.
//!
//! # Pipeline
//!
//! ```text
//! capacity -> TileConfig::select -> prepare_operands -> kernel -> trim -> verify
//! ```
//!
//! # Example
//!
//! ```
//! use blockmm_core::{
//!     prepare_operands, run_blocked_matmul, trim, verify, MatmulArgs, Matrix, TileConfig,
//!     TilePolicy,
//! };
//!
//! let a = Matrix::from_vec(vec![1.0f32, 2.0, 3.0, 4.0, 5.0, 6.0], 2, 3).unwrap();
//! let b = Matrix::from_vec(vec![7.0f32, 8.0, 9.0, 10.0, 11.0, 12.0], 3, 2).unwrap();
//!
//! let tile = TileConfig::select(TilePolicy::RoundUp, 256, a.rows(), b.cols());
//! let prepared = prepare_operands(&a, &b, &tile).unwrap();
//! let args = MatmulArgs::from_prepared(&prepared).unwrap();
//!
//! let (rows, cols) = prepared.padded_output_shape();
//! let mut c = vec![0.0f32; rows * cols];
//! run_blocked_matmul(
//!     (tile.global_x, tile.global_y),
//!     tile.tile_edge,
//!     &args,
//!     prepared.a.as_slice(),
//!     prepared.b_transposed.as_slice(),
//!     &mut c,
//! )
//! .unwrap();
//!
//! let c = trim(&Matrix::from_vec(c, rows, cols).unwrap(), 2, 2).unwrap();
//! assert_eq!(c.as_slice(), &[58.0, 64.0, 139.0, 154.0]);
//! assert!(verify(&c, &a, &b, 1e-3).unwrap().matches);
//! ```

mod error;
mod kernel;
mod loader;
mod matrix;
mod padding;
mod reference;
mod tiling;

pub use error::{ResourceError, Result, ShapeError};
pub use kernel::{
    check_index_range, run_blocked, run_blocked_matmul, GroupKernel, KernelFault, MatmulArgs,
    TiledKernel,
};
pub use loader::{parse_matrix, read_matrix, to_text, write_matrix};
pub use matrix::Matrix;
pub use padding::{
    pad, prepare_operands, transpose, trim, OperandPadding, PaddingSpec, PreparedOperands,
};
pub use reference::{compare, reference_matmul, verify, ComparisonReport, Mismatch};
pub use tiling::{round_up_to_multiple, BlockIterator, TileConfig, TilePolicy};
