//! CUDA context and the `ComputeDevice` implementation.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use blockmm::{
    BufferAccess, ComputeDevice, DeviceCapability, DeviceError, KernelBindings, KernelDialect,
    LaunchGrid, KERNEL_ENTRY,
};
use cudarc::driver::sys::CUdevice_attribute;
use cudarc::driver::CudaDevice;

use crate::error::{self, CudaError};
use crate::kernels::{build_module, launch_matmult, CudaProgram};
use crate::memory::CudaBuffer;

/// CUDA context for blocked matrix multiplication.
///
/// Manages device selection and caches compiled modules by source, so a
/// repeated multiply with the same tile edge skips NVRTC.
pub struct CudaContext {
    device: Arc<CudaDevice>,
    modules: Mutex<HashMap<String, CudaProgram>>,
}

impl CudaContext {
    /// Create a new CUDA context on the default device (device 0).
    pub fn new() -> error::Result<Self> {
        Self::new_on_device(0)
    }

    /// Create a new CUDA context on a specific device.
    pub fn new_on_device(device_id: usize) -> error::Result<Self> {
        let count = CudaDevice::count()?;
        if count <= 0 || device_id >= count as usize {
            return Err(CudaError::NoDevice);
        }
        let device = CudaDevice::new(device_id)?;
        log::info!("CUDA: using device {} of {}", device_id, count);
        Ok(Self::from_device(device))
    }

    /// Create a context from an existing device.
    pub fn from_device(device: Arc<CudaDevice>) -> Self {
        Self {
            device,
            modules: Mutex::new(HashMap::new()),
        }
    }

    /// Get the underlying CUDA device.
    pub fn device(&self) -> &Arc<CudaDevice> {
        &self.device
    }

    /// Get GPU device name.
    pub fn device_name(&self) -> String {
        format!("CUDA Device {}", self.device.ordinal())
    }

    /// Modules compiled so far.
    pub fn cached_modules(&self) -> usize {
        self.modules.lock().map_or(0, |m| m.len())
    }

    fn attribute(&self, what: &'static str, attr: CUdevice_attribute) -> Result<i32, DeviceError> {
        self.device.attribute(attr).map_err(|e| DeviceError::Query {
            what,
            reason: e.to_string(),
        })
    }
}

impl ComputeDevice for CudaContext {
    type Buffer = CudaBuffer;
    type Program = CudaProgram;

    fn name(&self) -> String {
        self.device_name()
    }

    fn dialect(&self) -> KernelDialect {
        KernelDialect::CudaC
    }

    fn probe(&self) -> Result<DeviceCapability, DeviceError> {
        let threads = self.attribute(
            "max threads per block",
            CUdevice_attribute::CU_DEVICE_ATTRIBUTE_MAX_THREADS_PER_BLOCK,
        )?;
        let major = self.attribute(
            "compute capability",
            CUdevice_attribute::CU_DEVICE_ATTRIBUTE_COMPUTE_CAPABILITY_MAJOR,
        )?;
        let minor = self.attribute(
            "compute capability",
            CUdevice_attribute::CU_DEVICE_ATTRIBUTE_COMPUTE_CAPABILITY_MINOR,
        )?;
        log::debug!("CUDA: sm_{}{}, {} threads per block", major, minor, threads);

        Ok(DeviceCapability {
            max_work_group_items: threads.max(1) as usize,
            // native fp64 arrived with sm_13
            supports_double: (major, minor) >= (1, 3),
        })
    }

    fn build_program(&self, source: &str, entry: &str) -> Result<CudaProgram, DeviceError> {
        if entry != KERNEL_ENTRY {
            return Err(DeviceError::KernelNotFound(entry.to_string()));
        }

        let mut modules = self.modules.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(program) = modules.get(source) {
            log::trace!("CUDA: reusing module {}", program.module);
            return Ok(program.clone());
        }

        let module = format!("matmult_{}", modules.len());
        log::debug!("CUDA: compiling {} with NVRTC", module);
        let function = build_module(&self.device, source, &module, KERNEL_ENTRY)?;
        let program = CudaProgram { function, module };
        modules.insert(source.to_string(), program.clone());
        Ok(program)
    }

    fn alloc(&self, bytes: usize, access: BufferAccess) -> Result<CudaBuffer, DeviceError> {
        let slice = self
            .device
            .alloc_zeros::<u8>(bytes)
            .map_err(|e| DeviceError::Allocation {
                bytes,
                reason: e.to_string(),
            })?;
        log::trace!("CUDA: alloc {} bytes {:?}", bytes, access);
        Ok(CudaBuffer::new(slice, access))
    }

    fn upload(&self, buffer: &mut CudaBuffer, bytes: &[u8]) -> Result<(), DeviceError> {
        if bytes.len() > buffer.len() {
            return Err(DeviceError::Transfer(format!(
                "upload of {} bytes into a {} byte buffer",
                bytes.len(),
                buffer.len()
            )));
        }
        let result = if bytes.len() == buffer.len() {
            // async: the stream owns the staging copy until it is consumed
            self.device.htod_copy_into(bytes.to_vec(), &mut buffer.slice)
        } else {
            let mut head = buffer.slice.slice_mut(..bytes.len());
            self.device.htod_sync_copy_into(bytes, &mut head)
        };
        result.map_err(|e| DeviceError::Transfer(e.to_string()))?;
        log::trace!("CUDA: upload {} bytes", bytes.len());
        Ok(())
    }

    fn launch(
        &self,
        program: &CudaProgram,
        bindings: KernelBindings<'_, CudaBuffer>,
        grid: LaunchGrid,
    ) -> Result<(), DeviceError> {
        if !grid.is_uniform() {
            return Err(DeviceError::Launch(format!(
                "global size {:?} is not a multiple of block size {:?}",
                grid.global, grid.local
            )));
        }
        if !bindings.output.access().kernel_can_write() {
            return Err(DeviceError::Launch("output buffer is read-only".into()));
        }
        launch_matmult(program, bindings, grid).map_err(|e| DeviceError::Launch(e.to_string()))?;
        log::trace!("CUDA: launched {:?} over {:?}", grid.local, grid.global);
        Ok(())
    }

    fn finish(&self) -> Result<(), DeviceError> {
        self.device
            .synchronize()
            .map_err(|e| DeviceError::Synchronize(e.to_string()))
    }

    fn download(&self, buffer: &CudaBuffer, out: &mut [u8]) -> Result<(), DeviceError> {
        if out.len() > buffer.len() {
            return Err(DeviceError::Transfer(format!(
                "download of {} bytes from a {} byte buffer",
                out.len(),
                buffer.len()
            )));
        }
        let head = buffer.slice.slice(..out.len());
        self.device
            .dtoh_sync_copy_into(&head, out)
            .map_err(|e| DeviceError::Transfer(e.to_string()))?;
        log::trace!("CUDA: download {} bytes", out.len());
        Ok(())
    }
}
