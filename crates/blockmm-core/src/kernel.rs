//! Blocked multiply kernel, executed one work-group at a time on the host.
//!
//! This is the same program the device kernels run: every work-group owns a
//! `t x t` tile of the padded output, walks the padded inner dimension in
//! phases of `t`, stages one tile of A and one tile of Bt in group-local
//! memory, and accumulates after the staging barrier.

use blockmm_types::Element;
use thiserror::Error;

use crate::error::{Result, ShapeError};
use crate::padding::PreparedOperands;
use crate::tiling::BlockIterator;

/// Scalar arguments of the `matmult` kernel, in binding order after the
/// three buffers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MatmulArgs {
    pub a_rows: i32,
    pub b_rows: i32,
    pub a_cols: i32,
    pub b_cols: i32,
    pub a_pad_cols: i32,
    pub b_pad_rows: i32,
    pub b_pad_cols: i32,
}

impl MatmulArgs {
    /// Arguments for a prepared multiply. Fails if a dimension exceeds `i32`.
    ///
    /// The kernels index padded buffers with `int` arithmetic, so every
    /// padded extent must also fit.
    pub fn from_prepared<T: Element>(prepared: &PreparedOperands<T>) -> Result<Self> {
        let padding = prepared.padding;
        let (rows, cols) = prepared.padded_output_shape();
        check_index_range(rows, prepared.padded_inner(), cols)?;
        Ok(Self {
            a_rows: to_i32(prepared.out_rows)?,
            b_rows: to_i32(prepared.inner)?,
            a_cols: to_i32(prepared.inner)?,
            b_cols: to_i32(prepared.out_cols)?,
            a_pad_cols: to_i32(padding.a.pad_cols)?,
            b_pad_rows: to_i32(padding.b.pad_rows)?,
            b_pad_cols: to_i32(padding.b.pad_cols)?,
        })
    }

    /// Scalars in kernel argument order.
    pub fn to_array(&self) -> [i32; 7] {
        [
            self.a_rows,
            self.b_rows,
            self.a_cols,
            self.b_cols,
            self.a_pad_cols,
            self.b_pad_rows,
            self.b_pad_cols,
        ]
    }

    /// Row stride of padded A and padded Bt.
    #[inline]
    pub fn inner_stride(&self) -> usize {
        (self.a_cols + self.a_pad_cols) as usize
    }

    /// Row stride of the padded output.
    #[inline]
    pub fn output_stride(&self) -> usize {
        (self.b_cols + self.b_pad_cols) as usize
    }
}

/// Largest linear index of padded A (`rows x inner`), padded Bt
/// (`cols x inner`) and the padded output (`rows x cols`) must fit `i32`.
pub fn check_index_range(rows: usize, inner: usize, cols: usize) -> Result<()> {
    for (x, y) in [(rows, inner), (cols, inner), (rows, cols)] {
        let value = x.saturating_mul(y);
        to_i32(value)?;
    }
    Ok(())
}

fn to_i32(value: usize) -> Result<i32> {
    i32::try_from(value).map_err(|_| ShapeError::Overflow { value })
}

/// Faults raised while executing the kernel on the host.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum KernelFault {
    /// A buffer is smaller than the dispatch reads or writes.
    #[error("buffer {buffer} holds {len} elements, dispatch needs {needed}")]
    OutOfBounds {
        buffer: &'static str,
        len: usize,
        needed: usize,
    },

    /// The padded inner dimension is not a multiple of the tile edge.
    #[error("inner stride {stride} is not a multiple of tile edge {tile_edge}")]
    Misaligned { stride: usize, tile_edge: usize },

    /// The dispatch is wider than the output rows.
    #[error("global width {global_x} exceeds output stride {stride}")]
    TooWide { global_x: usize, stride: usize },
}

/// A kernel that computes one work-group's output tile.
pub trait GroupKernel<T: Element> {
    /// Compute the `tile_edge x tile_edge` output tile at `(group_x, group_y)`.
    ///
    /// Buffers must already be checked against the dispatch extents.
    #[allow(clippy::too_many_arguments)]
    fn execute_group(
        &self,
        group_x: usize,
        group_y: usize,
        tile_edge: usize,
        args: &MatmulArgs,
        a: &[T],
        bt: &[T],
        c: &mut [T],
    );
}

/// Shared-tile kernel: `As[ty][tx] = A[row][p + tx]`, `Bs[ty][tx] = Bt[col][p + ty]`,
/// barrier, `acc += As[ty][k] * Bs[k][tx]`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TiledKernel;

impl<T: Element> GroupKernel<T> for TiledKernel {
    fn execute_group(
        &self,
        group_x: usize,
        group_y: usize,
        t: usize,
        args: &MatmulArgs,
        a: &[T],
        bt: &[T],
        c: &mut [T],
    ) {
        let inner = args.inner_stride();
        let c_width = args.output_stride();
        let row0 = group_y * t;
        let col0 = group_x * t;

        // group-local memory
        let mut a_tile = vec![T::zero(); t * t];
        let mut b_tile = vec![T::zero(); t * t];
        // per work-item private accumulators
        let mut acc = vec![T::zero(); t * t];

        for (phase, _) in BlockIterator::new(inner, t) {
            for ty in 0..t {
                for tx in 0..t {
                    a_tile[ty * t + tx] = a[(row0 + ty) * inner + phase + tx];
                    b_tile[ty * t + tx] = bt[(col0 + tx) * inner + phase + ty];
                }
            }
            // barrier: every item's loads are visible before any item computes
            for ty in 0..t {
                for tx in 0..t {
                    let mut sum = acc[ty * t + tx];
                    for k in 0..t {
                        sum += a_tile[ty * t + k] * b_tile[k * t + tx];
                    }
                    acc[ty * t + tx] = sum;
                }
            }
        }

        for ty in 0..t {
            for tx in 0..t {
                c[(row0 + ty) * c_width + col0 + tx] = acc[ty * t + tx];
            }
        }
    }
}

/// Run `kernel` over a `global_x x global_y` dispatch with square groups of
/// `tile_edge`.
///
/// Checks every buffer against the extents first, so a fault leaves `c`
/// untouched.
pub fn run_blocked<T: Element, K: GroupKernel<T>>(
    kernel: &K,
    global: (usize, usize),
    tile_edge: usize,
    args: &MatmulArgs,
    a: &[T],
    bt: &[T],
    c: &mut [T],
) -> std::result::Result<(), KernelFault> {
    let (global_x, global_y) = global;
    let inner = args.inner_stride();
    let c_width = args.output_stride();

    if tile_edge == 0 || !inner.is_multiple_of(tile_edge) {
        return Err(KernelFault::Misaligned {
            stride: inner,
            tile_edge,
        });
    }
    if global_x > c_width {
        return Err(KernelFault::TooWide {
            global_x,
            stride: c_width,
        });
    }
    check_len("A", a.len(), global_y * inner)?;
    check_len("Bt", bt.len(), global_x * inner)?;
    check_len("C", c.len(), global_y * c_width)?;

    let groups_x = global_x / tile_edge;
    let groups_y = global_y / tile_edge;
    for group_y in 0..groups_y {
        for group_x in 0..groups_x {
            kernel.execute_group(group_x, group_y, tile_edge, args, a, bt, c);
        }
    }
    Ok(())
}

/// Run the shared-tile kernel.
pub fn run_blocked_matmul<T: Element>(
    global: (usize, usize),
    tile_edge: usize,
    args: &MatmulArgs,
    a: &[T],
    bt: &[T],
    c: &mut [T],
) -> std::result::Result<(), KernelFault> {
    run_blocked(&TiledKernel, global, tile_edge, args, a, bt, c)
}

fn check_len(buffer: &'static str, len: usize, needed: usize) -> std::result::Result<(), KernelFault> {
    if len < needed {
        return Err(KernelFault::OutOfBounds {
            buffer,
            len,
            needed,
        });
    }
    Ok(())
}
