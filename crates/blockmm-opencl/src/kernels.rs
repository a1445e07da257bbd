//! Program builds and `matmult` launches.

use blockmm::{KernelBindings, LaunchGrid};
use opencl3::command_queue::CommandQueue;
use opencl3::context::Context;
use opencl3::event::Event;
use opencl3::kernel::{ExecuteKernel, Kernel};
use opencl3::program::Program;

use crate::error::{OpenClError, Result};
use crate::memory::OpenClBuffer;

/// A built program and its `matmult` kernel.
pub struct OpenClProgram {
    pub(crate) kernel: Kernel,
    _program: Program,
}

/// Build `source` and create the `entry` kernel.
///
/// A failed build returns the compiler log.
pub(crate) fn build(context: &Context, source: &str, entry: &str) -> Result<OpenClProgram> {
    let program = Program::create_and_build_from_source(context, source, "")
        .map_err(|log| OpenClError::Build { log })?;
    let kernel = Kernel::create(&program, entry).map_err(OpenClError::api("clCreateKernel"))?;
    log::debug!("OpenCL: built '{}'", entry);
    Ok(OpenClProgram {
        kernel,
        _program: program,
    })
}

/// Enqueue one 2-D `matmult` dispatch. Returns without waiting.
pub(crate) fn enqueue_matmult(
    queue: &CommandQueue,
    program: &OpenClProgram,
    bindings: KernelBindings<'_, OpenClBuffer>,
    grid: LaunchGrid,
) -> Result<Event> {
    let KernelBindings {
        output,
        a,
        b_transposed,
        args,
        ..
    } = bindings;
    let [a_rows, b_rows, a_cols, b_cols, a_pad_cols, b_pad_rows, b_pad_cols] = args.to_array();
    let (c_mem, a_mem, b_mem) = (output.raw(), a.raw(), b_transposed.raw());

    unsafe {
        ExecuteKernel::new(&program.kernel)
            .set_arg(&c_mem)
            .set_arg(&a_mem)
            .set_arg(&b_mem)
            .set_arg(&a_rows)
            .set_arg(&b_rows)
            .set_arg(&a_cols)
            .set_arg(&b_cols)
            .set_arg(&a_pad_cols)
            .set_arg(&b_pad_rows)
            .set_arg(&b_pad_cols)
            .set_global_work_sizes(&[grid.global.0, grid.global.1])
            .set_local_work_sizes(&[grid.local.0, grid.local.1])
            .enqueue_nd_range(queue)
            .map_err(OpenClError::api("clEnqueueNDRangeKernel"))
    }
}
