//! The seam between the offload pipeline and a compute device.
//!
//! A device compiles kernel source, owns byte buffers, runs 2-D dispatches on
//! an in-order queue and copies bytes in both directions. Element types never
//! cross this boundary; the compiled kernel fixes how the bytes are read.

use std::fmt;

use blockmm_core::MatmulArgs;
use blockmm_types::Precision;

use crate::error::DeviceError;

/// Capability snapshot taken once per run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceCapability {
    /// Upper bound on work-items in one work-group.
    pub max_work_group_items: usize,
    /// Whether double-precision arithmetic is available.
    pub supports_double: bool,
}

impl DeviceCapability {
    /// Apply a work-group override. The override can only lower the limit.
    pub fn with_work_group_limit(self, limit: Option<usize>) -> Self {
        match limit {
            Some(limit) => Self {
                max_work_group_items: self.max_work_group_items.min(limit.max(1)),
                ..self
            },
            None => self,
        }
    }
}

impl fmt::Display for DeviceCapability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "max work-group {} items, fp64 {}",
            self.max_work_group_items,
            if self.supports_double { "yes" } else { "no" }
        )
    }
}

/// How kernels may access a buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferAccess {
    ReadOnly,
    WriteOnly,
    ReadWrite,
}

impl BufferAccess {
    pub fn kernel_can_read(self) -> bool {
        !matches!(self, Self::WriteOnly)
    }

    pub fn kernel_can_write(self) -> bool {
        !matches!(self, Self::ReadOnly)
    }
}

/// Source language a device compiles.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KernelDialect {
    OpenClC,
    CudaC,
}

/// 2-D dispatch geometry: `(x, y)` global and local sizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LaunchGrid {
    pub global: (usize, usize),
    pub local: (usize, usize),
}

impl LaunchGrid {
    /// Square work-groups of `tile_edge` over a `global` range.
    pub fn square(global: (usize, usize), tile_edge: usize) -> Self {
        Self {
            global,
            local: (tile_edge, tile_edge),
        }
    }

    /// Work-items per group.
    pub fn local_items(&self) -> usize {
        self.local.0 * self.local.1
    }

    /// Number of groups along `(x, y)`.
    pub fn groups(&self) -> (usize, usize) {
        (self.global.0 / self.local.0.max(1), self.global.1 / self.local.1.max(1))
    }

    /// True if the global range divides evenly into groups.
    pub fn is_uniform(&self) -> bool {
        self.local.0 > 0
            && self.local.1 > 0
            && self.global.0.is_multiple_of(self.local.0)
            && self.global.1.is_multiple_of(self.local.1)
    }
}

/// Arguments of one `matmult` launch, in kernel order: output, A, Bt, then
/// the seven scalars.
pub struct KernelBindings<'a, B> {
    pub output: &'a mut B,
    pub a: &'a B,
    pub b_transposed: &'a B,
    pub args: MatmulArgs,
    /// Element type the buffers hold.
    pub precision: Precision,
}

/// A compute device the dispatcher can drive.
///
/// Uploads and launches are enqueued in order and may complete later;
/// [`finish`](ComputeDevice::finish) blocks until everything enqueued has
/// completed. Reads are only valid after `finish`.
pub trait ComputeDevice {
    /// Device buffer, released on drop.
    type Buffer;
    /// Compiled kernel, released on drop.
    type Program;

    /// Human readable device name.
    fn name(&self) -> String;

    /// Source dialect accepted by [`build_program`](ComputeDevice::build_program).
    fn dialect(&self) -> KernelDialect;

    /// Query the work-group limit and double support. No side effects.
    fn probe(&self) -> Result<DeviceCapability, DeviceError>;

    /// Compile `source` and resolve `entry`. A failed build returns
    /// [`DeviceError::Build`] carrying the full log.
    fn build_program(&self, source: &str, entry: &str) -> Result<Self::Program, DeviceError>;

    /// Allocate `bytes` of device memory.
    fn alloc(&self, bytes: usize, access: BufferAccess) -> Result<Self::Buffer, DeviceError>;

    /// Enqueue a host to device copy into the start of `buffer`.
    fn upload(&self, buffer: &mut Self::Buffer, bytes: &[u8]) -> Result<(), DeviceError>;

    /// Enqueue one 2-D dispatch of `program`.
    fn launch(
        &self,
        program: &Self::Program,
        bindings: KernelBindings<'_, Self::Buffer>,
        grid: LaunchGrid,
    ) -> Result<(), DeviceError>;

    /// Block until all enqueued work has completed.
    fn finish(&self) -> Result<(), DeviceError>;

    /// Copy the start of `buffer` into `out`. Blocking.
    fn download(&self, buffer: &Self::Buffer, out: &mut [u8]) -> Result<(), DeviceError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_override_only_lowers() {
        let cap = DeviceCapability {
            max_work_group_items: 256,
            supports_double: true,
        };
        assert_eq!(cap.with_work_group_limit(None), cap);
        assert_eq!(cap.with_work_group_limit(Some(64)).max_work_group_items, 64);
        assert_eq!(cap.with_work_group_limit(Some(4096)).max_work_group_items, 256);
        assert_eq!(cap.with_work_group_limit(Some(0)).max_work_group_items, 1);
    }

    #[test]
    fn test_launch_grid() {
        let grid = LaunchGrid::square((24, 16), 8);
        assert_eq!(grid.local_items(), 64);
        assert_eq!(grid.groups(), (3, 2));
        assert!(grid.is_uniform());

        let ragged = LaunchGrid {
            global: (10, 8),
            local: (4, 4),
        };
        assert!(!ragged.is_uniform());
    }

    #[test]
    fn test_buffer_access() {
        assert!(BufferAccess::ReadOnly.kernel_can_read());
        assert!(!BufferAccess::ReadOnly.kernel_can_write());
        assert!(!BufferAccess::WriteOnly.kernel_can_read());
        assert!(BufferAccess::ReadWrite.kernel_can_write());
    }
}
