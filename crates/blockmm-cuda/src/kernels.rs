//! NVRTC builds and kernel launches.

use std::sync::Arc;

use blockmm::{KernelBindings, LaunchGrid};
use cudarc::driver::{CudaDevice, CudaFunction, LaunchAsync, LaunchConfig};

use crate::error::{CudaError, Result};
use crate::memory::CudaBuffer;

/// A compiled `matmult` function.
#[derive(Clone)]
pub struct CudaProgram {
    pub(crate) function: CudaFunction,
    pub(crate) module: String,
}

impl CudaProgram {
    /// Name of the loaded PTX module.
    pub fn module(&self) -> &str {
        &self.module
    }
}

/// Launch configuration for a square-tiled grid.
///
/// `grid.global.0` spans output columns (`blockIdx.x`), `grid.global.1`
/// spans output rows.
pub(crate) fn launch_config(grid: LaunchGrid) -> LaunchConfig {
    let (gx, gy) = grid.groups();
    LaunchConfig {
        grid_dim: (gx as u32, gy as u32, 1),
        block_dim: (grid.local.0 as u32, grid.local.1 as u32, 1),
        shared_mem_bytes: 0,
    }
}

/// Enqueue `matmult` on the device stream. Does not synchronize.
pub(crate) fn launch_matmult(
    program: &CudaProgram,
    bindings: KernelBindings<'_, CudaBuffer>,
    grid: LaunchGrid,
) -> Result<()> {
    let KernelBindings {
        output,
        a,
        b_transposed,
        args,
        ..
    } = bindings;
    let [a_rows, b_rows, a_cols, b_cols, a_pad_cols, b_pad_rows, b_pad_cols] = args.to_array();

    let cfg = launch_config(grid);
    let function = program.function.clone();
    unsafe {
        function.launch(
            cfg,
            (
                &mut output.slice,
                &a.slice,
                &b_transposed.slice,
                a_rows,
                b_rows,
                a_cols,
                b_cols,
                a_pad_cols,
                b_pad_rows,
                b_pad_cols,
            ),
        )?;
    }
    Ok(())
}

/// Compile a CUDA C unit with NVRTC and load it as `module`.
pub(crate) fn build_module(
    device: &Arc<CudaDevice>,
    unit: &str,
    module: &str,
    entry: &'static str,
) -> Result<CudaFunction> {
    let ptx = cudarc::nvrtc::compile_ptx(unit)?;
    device.load_ptx(ptx, module, &[entry])?;
    device
        .get_func(module, entry)
        .ok_or_else(|| CudaError::KernelNotFound(entry.to_string()))
}
