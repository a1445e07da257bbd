//! Device memory for the CUDA backend.

use blockmm::BufferAccess;
use cudarc::driver::{CudaSlice, DeviceSlice};

/// Untyped device allocation.
///
/// Kernels see it as `float*` or `double*`; the allocation is released when
/// the buffer is dropped.
pub struct CudaBuffer {
    pub(crate) slice: CudaSlice<u8>,
    access: BufferAccess,
}

impl CudaBuffer {
    pub(crate) fn new(slice: CudaSlice<u8>, access: BufferAccess) -> Self {
        Self { slice, access }
    }

    /// Size in bytes.
    pub fn len(&self) -> usize {
        self.slice.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slice.len() == 0
    }

    pub fn access(&self) -> BufferAccess {
        self.access
    }

    /// Get the underlying CUDA slice (for kernel launches).
    pub fn as_slice(&self) -> &CudaSlice<u8> {
        &self.slice
    }
}
