//! CPU-backed compute device with OpenCL semantics.
//!
//! [`HostDevice`] accepts OpenCL C kernels, checks them structurally and runs
//! the blocked multiply one work-group at a time on the calling thread. It
//! keeps the rules a real queue imposes: work-group limits, uniform
//! dispatches, `BLOCK_SIZE`-shaped local sizes, buffer access flags, and no
//! reads of kernel output before `finish`.

mod compiler;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use blockmm_core::run_blocked_matmul;
use blockmm_types::{Element, Precision};

use crate::config::{parse_env_bool, parse_env_usize, EnvLookup};
use crate::device::{
    BufferAccess, ComputeDevice, DeviceCapability, KernelBindings, KernelDialect, LaunchGrid,
};
use crate::error::{ConfigError, DeviceError};

pub use compiler::HostProgram;

/// Default work-group capacity, matching common discrete GPUs.
pub const DEFAULT_MAX_WORK_GROUP_ITEMS: usize = 1024;

#[derive(Debug, Default)]
struct HostCounters {
    builds: AtomicUsize,
    allocations: AtomicUsize,
    live_buffers: AtomicUsize,
    launches: AtomicUsize,
    pending_kernels: AtomicUsize,
}

/// CPU device. Clones share one queue and one set of counters.
#[derive(Debug, Clone)]
pub struct HostDevice {
    max_work_group_items: usize,
    supports_double: bool,
    counters: Arc<HostCounters>,
}

impl Default for HostDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl HostDevice {
    /// Device with 1024-item work-groups and double support.
    pub fn new() -> Self {
        Self::with_limits(DEFAULT_MAX_WORK_GROUP_ITEMS, true)
    }

    /// Device with explicit capability. `max_work_group_items` is clamped to at least 1.
    pub fn with_limits(max_work_group_items: usize, supports_double: bool) -> Self {
        Self {
            max_work_group_items: max_work_group_items.max(1),
            supports_double,
            counters: Arc::new(HostCounters::default()),
        }
    }

    /// Read `BLOCKMM_HOST_MAX_WORKGROUP` and `BLOCKMM_HOST_FP64`.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(&|key| std::env::var(key).ok())
    }

    pub(crate) fn from_lookup(lookup: EnvLookup<'_>) -> Result<Self, ConfigError> {
        let mut max = DEFAULT_MAX_WORK_GROUP_ITEMS;
        let mut fp64 = true;
        if let Some(v) = lookup("BLOCKMM_HOST_MAX_WORKGROUP") {
            max = parse_env_usize("BLOCKMM_HOST_MAX_WORKGROUP", &v)?;
            if max == 0 {
                return Err(ConfigError::Validation(
                    "BLOCKMM_HOST_MAX_WORKGROUP must be > 0".into(),
                ));
            }
        }
        if let Some(v) = lookup("BLOCKMM_HOST_FP64") {
            fp64 = parse_env_bool("BLOCKMM_HOST_FP64", &v)?;
        }
        Ok(Self::with_limits(max, fp64))
    }

    /// Programs built so far, failed builds included.
    pub fn build_count(&self) -> usize {
        self.counters.builds.load(Ordering::SeqCst)
    }

    /// Buffers allocated so far.
    pub fn allocation_count(&self) -> usize {
        self.counters.allocations.load(Ordering::SeqCst)
    }

    /// Buffers not yet dropped.
    pub fn live_buffers(&self) -> usize {
        self.counters.live_buffers.load(Ordering::SeqCst)
    }

    /// Kernel launches enqueued so far.
    pub fn launch_count(&self) -> usize {
        self.counters.launches.load(Ordering::SeqCst)
    }
}

/// Host memory standing in for a device buffer.
///
/// Backed by `u64` words so every element type is aligned.
#[derive(Debug)]
pub struct HostBuffer {
    words: Vec<u64>,
    len: usize,
    access: BufferAccess,
    counters: Arc<HostCounters>,
}

impl HostBuffer {
    /// Size in bytes.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn access(&self) -> BufferAccess {
        self.access
    }

    fn bytes(&self) -> &[u8] {
        &bytemuck::cast_slice(&self.words)[..self.len]
    }

    fn bytes_mut(&mut self) -> &mut [u8] {
        &mut bytemuck::cast_slice_mut(&mut self.words)[..self.len]
    }

    fn elements<T: Element>(&self) -> Result<&[T], DeviceError> {
        let size = T::PRECISION.size_of();
        if !self.len.is_multiple_of(size) {
            return Err(misfit(self.len, T::PRECISION));
        }
        Ok(&bytemuck::cast_slice(&self.words)[..self.len / size])
    }

    fn elements_mut<T: Element>(&mut self) -> Result<&mut [T], DeviceError> {
        let size = T::PRECISION.size_of();
        if !self.len.is_multiple_of(size) {
            return Err(misfit(self.len, T::PRECISION));
        }
        Ok(&mut bytemuck::cast_slice_mut(&mut self.words)[..self.len / size])
    }
}

fn misfit(len: usize, precision: Precision) -> DeviceError {
    DeviceError::Launch(format!("buffer of {} bytes does not hold whole {} elements", len, precision))
}

impl Drop for HostBuffer {
    fn drop(&mut self) {
        self.counters.live_buffers.fetch_sub(1, Ordering::SeqCst);
    }
}

impl ComputeDevice for HostDevice {
    type Buffer = HostBuffer;
    type Program = HostProgram;

    fn name(&self) -> String {
        "host".to_string()
    }

    fn dialect(&self) -> KernelDialect {
        KernelDialect::OpenClC
    }

    fn probe(&self) -> Result<DeviceCapability, DeviceError> {
        Ok(DeviceCapability {
            max_work_group_items: self.max_work_group_items,
            supports_double: self.supports_double,
        })
    }

    fn build_program(&self, source: &str, entry: &str) -> Result<HostProgram, DeviceError> {
        self.counters.builds.fetch_add(1, Ordering::SeqCst);
        let program = compiler::compile(source, entry, self.supports_double)
            .map_err(|log| DeviceError::Build { log })?;
        log::debug!(
            "host: built '{}' ({}, BLOCK_SIZE {})",
            program.entry,
            program.precision,
            program.block_size
        );
        Ok(program)
    }

    fn alloc(&self, bytes: usize, access: BufferAccess) -> Result<HostBuffer, DeviceError> {
        let mut words = Vec::new();
        words
            .try_reserve_exact(bytes.div_ceil(8))
            .map_err(|e| DeviceError::Allocation {
                bytes,
                reason: e.to_string(),
            })?;
        words.resize(bytes.div_ceil(8), 0);

        self.counters.allocations.fetch_add(1, Ordering::SeqCst);
        self.counters.live_buffers.fetch_add(1, Ordering::SeqCst);
        log::trace!("host: alloc {} bytes {:?}", bytes, access);
        Ok(HostBuffer {
            words,
            len: bytes,
            access,
            counters: Arc::clone(&self.counters),
        })
    }

    fn upload(&self, buffer: &mut HostBuffer, bytes: &[u8]) -> Result<(), DeviceError> {
        if bytes.len() > buffer.len {
            return Err(DeviceError::Transfer(format!(
                "upload of {} bytes into a {} byte buffer",
                bytes.len(),
                buffer.len
            )));
        }
        buffer.bytes_mut()[..bytes.len()].copy_from_slice(bytes);
        log::trace!("host: upload {} bytes", bytes.len());
        Ok(())
    }

    fn launch(
        &self,
        program: &HostProgram,
        bindings: KernelBindings<'_, HostBuffer>,
        grid: LaunchGrid,
    ) -> Result<(), DeviceError> {
        if !grid.is_uniform() {
            return Err(DeviceError::Launch(format!(
                "global size {:?} is not a multiple of local size {:?}",
                grid.global, grid.local
            )));
        }
        if grid.local_items() > self.max_work_group_items {
            return Err(DeviceError::Launch(format!(
                "work-group of {} items exceeds the device limit of {}",
                grid.local_items(),
                self.max_work_group_items
            )));
        }
        if grid.local != (program.block_size, program.block_size) {
            return Err(DeviceError::Launch(format!(
                "local size {:?} does not match BLOCK_SIZE {}",
                grid.local, program.block_size
            )));
        }
        if bindings.precision != program.precision {
            return Err(DeviceError::Launch(format!(
                "kernel '{}' is built for {} but the buffers hold {}",
                program.entry, program.precision, bindings.precision
            )));
        }
        if !bindings.output.access.kernel_can_write() {
            return Err(DeviceError::Launch("output buffer is read-only".into()));
        }
        if !bindings.a.access.kernel_can_read() || !bindings.b_transposed.access.kernel_can_read() {
            return Err(DeviceError::Launch("input buffer is write-only".into()));
        }

        match program.precision {
            Precision::Single => execute::<f32>(bindings, grid, program.block_size)?,
            Precision::Double => execute::<f64>(bindings, grid, program.block_size)?,
        }

        self.counters.launches.fetch_add(1, Ordering::SeqCst);
        self.counters.pending_kernels.fetch_add(1, Ordering::SeqCst);
        log::trace!("host: launched {:?} over {:?}", grid.local, grid.global);
        Ok(())
    }

    fn finish(&self) -> Result<(), DeviceError> {
        self.counters.pending_kernels.store(0, Ordering::SeqCst);
        Ok(())
    }

    fn download(&self, buffer: &HostBuffer, out: &mut [u8]) -> Result<(), DeviceError> {
        let pending = self.counters.pending_kernels.load(Ordering::SeqCst);
        if pending > 0 {
            return Err(DeviceError::Synchronize(format!(
                "read issued with {} kernel(s) not yet finished",
                pending
            )));
        }
        if out.len() > buffer.len {
            return Err(DeviceError::Transfer(format!(
                "download of {} bytes from a {} byte buffer",
                out.len(),
                buffer.len
            )));
        }
        out.copy_from_slice(&buffer.bytes()[..out.len()]);
        log::trace!("host: download {} bytes", out.len());
        Ok(())
    }
}

fn execute<T: Element>(
    bindings: KernelBindings<'_, HostBuffer>,
    grid: LaunchGrid,
    block_size: usize,
) -> Result<(), DeviceError> {
    let KernelBindings {
        output,
        a,
        b_transposed,
        args,
        ..
    } = bindings;
    let a = a.elements::<T>()?;
    let bt = b_transposed.elements::<T>()?;
    let c = output.elements_mut::<T>()?;
    run_blocked_matmul(grid.global, block_size, &args, a, bt, c)
        .map_err(|fault| DeviceError::Launch(fault.to_string()))
}
