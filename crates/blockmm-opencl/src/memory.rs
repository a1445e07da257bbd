//! Device buffers with host staging for non-blocking writes.

use blockmm::BufferAccess;
use opencl3::error_codes::ClError;
use opencl3::event::Event;
use opencl3::memory::{Buffer, ClMem, CL_MEM_READ_ONLY, CL_MEM_READ_WRITE, CL_MEM_WRITE_ONLY};
use opencl3::types::{cl_mem, cl_mem_flags};

pub(crate) fn access_flags(access: BufferAccess) -> cl_mem_flags {
    match access {
        BufferAccess::ReadOnly => CL_MEM_READ_ONLY,
        BufferAccess::WriteOnly => CL_MEM_WRITE_ONLY,
        BufferAccess::ReadWrite => CL_MEM_READ_WRITE,
    }
}

/// Untyped OpenCL buffer.
///
/// A non-blocking write reads from `staging` until its event completes, so
/// the staging copy lives as long as the buffer and drop waits for any write
/// still in flight.
pub struct OpenClBuffer {
    pub(crate) mem: Buffer<u8>,
    len: usize,
    access: BufferAccess,
    pub(crate) staging: Vec<u8>,
    pub(crate) pending: Option<Event>,
}

impl OpenClBuffer {
    pub(crate) fn new(mem: Buffer<u8>, len: usize, access: BufferAccess) -> Self {
        Self {
            mem,
            len,
            access,
            staging: Vec::new(),
            pending: None,
        }
    }

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

    pub(crate) fn raw(&self) -> cl_mem {
        self.mem.get()
    }

    /// Wait for the last write from `staging` to complete.
    pub(crate) fn settle(&mut self) -> Result<(), ClError> {
        match self.pending.take() {
            Some(event) => event.wait(),
            None => Ok(()),
        }
    }

    /// True while a non-blocking write may still read `staging`.
    pub fn has_pending_write(&self) -> bool {
        self.pending.is_some()
    }
}

impl Drop for OpenClBuffer {
    fn drop(&mut self) {
        if let Err(e) = self.settle() {
            log::warn!("OpenCL: pending write failed: {}", e);
        }
    }
}

impl std::fmt::Debug for OpenClBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenClBuffer")
            .field("len", &self.len)
            .field("access", &self.access)
            .field("pending", &self.pending.is_some())
            .finish()
    }
}
