//! Device selection and the `ComputeDevice` implementation.

use blockmm::{
    BufferAccess, ComputeDevice, DeviceCapability, DeviceError, KernelBindings, KernelDialect,
    LaunchGrid,
};
use opencl3::command_queue::CommandQueue;
use opencl3::context::Context;
use opencl3::device::{Device, CL_DEVICE_TYPE_ALL, CL_DEVICE_TYPE_GPU};
use opencl3::memory::Buffer;
use opencl3::platform::get_platforms;
use opencl3::types::{cl_device_type, CL_BLOCKING, CL_NON_BLOCKING};

use crate::error::{self, OpenClError};
use crate::kernels::{build, enqueue_matmult, OpenClProgram};
use crate::memory::{access_flags, OpenClBuffer};

/// One OpenCL device with its context and in-order command queue.
pub struct OpenClDevice {
    device: Device,
    context: Context,
    queue: CommandQueue,
    device_name: String,
    platform_name: String,
}

impl std::fmt::Debug for OpenClDevice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenClDevice")
            .field("device_name", &self.device_name)
            .field("platform_name", &self.platform_name)
            .finish()
    }
}

impl OpenClDevice {
    /// First GPU on any platform, or else the first device of any type.
    pub fn new() -> error::Result<Self> {
        Self::first_of_type(CL_DEVICE_TYPE_GPU).or_else(|e| {
            log::debug!("OpenCL: {}; trying any device type", e);
            Self::first_of_type(CL_DEVICE_TYPE_ALL)
        })
    }

    fn first_of_type(device_type: cl_device_type) -> error::Result<Self> {
        let platforms = get_platforms().map_err(|_| OpenClError::NoPlatforms)?;
        if platforms.is_empty() {
            return Err(OpenClError::NoPlatforms);
        }

        for platform in &platforms {
            let platform_name = platform.name().unwrap_or_default();
            log::debug!("Scanning OpenCL platform: {}", platform_name);

            let device_ids = platform.get_devices(device_type).unwrap_or_default();
            if let Some(&id) = device_ids.first() {
                return Self::open(Device::new(id), platform_name);
            }
        }

        Err(OpenClError::NoDevice {
            reason: format!("no device of type {:#x} on {} platform(s)", device_type, platforms.len()),
        })
    }

    fn open(device: Device, platform_name: String) -> error::Result<Self> {
        let device_name = device.name().unwrap_or_default();
        let context =
            Context::from_device(&device).map_err(OpenClError::api("clCreateContext"))?;
        let queue = CommandQueue::create_default_with_properties(&context, 0, 0)
            .map_err(OpenClError::api("clCreateCommandQueue"))?;
        log::info!("OpenCL: selected {} on {}", device_name, platform_name);

        Ok(Self {
            device,
            context,
            queue,
            device_name,
            platform_name,
        })
    }

    pub fn device_name(&self) -> &str {
        &self.device_name
    }

    pub fn platform_name(&self) -> &str {
        &self.platform_name
    }
}

impl ComputeDevice for OpenClDevice {
    type Buffer = OpenClBuffer;
    type Program = OpenClProgram;

    fn name(&self) -> String {
        format!("{} ({})", self.device_name, self.platform_name)
    }

    fn dialect(&self) -> KernelDialect {
        KernelDialect::OpenClC
    }

    fn probe(&self) -> Result<DeviceCapability, DeviceError> {
        let max = self
            .device
            .max_work_group_size()
            .map_err(|e| DeviceError::Query {
                what: "CL_DEVICE_MAX_WORK_GROUP_SIZE",
                reason: e.to_string(),
            })?;
        // devices without cl_khr_fp64 report an empty config or reject the query
        let fp64 = self.device.double_fp_config().is_ok_and(|cfg| cfg != 0);

        Ok(DeviceCapability {
            max_work_group_items: max.max(1),
            supports_double: fp64,
        })
    }

    fn build_program(&self, source: &str, entry: &str) -> Result<OpenClProgram, DeviceError> {
        Ok(build(&self.context, source, entry)?)
    }

    fn alloc(&self, bytes: usize, access: BufferAccess) -> Result<OpenClBuffer, DeviceError> {
        let mem = unsafe {
            Buffer::<u8>::create(&self.context, access_flags(access), bytes, std::ptr::null_mut())
        }
        .map_err(|e| DeviceError::Allocation {
            bytes,
            reason: e.to_string(),
        })?;
        log::trace!("OpenCL: alloc {} bytes {:?}", bytes, access);
        Ok(OpenClBuffer::new(mem, bytes, access))
    }

    fn upload(&self, buffer: &mut OpenClBuffer, bytes: &[u8]) -> Result<(), DeviceError> {
        if bytes.len() > buffer.len() {
            return Err(DeviceError::Transfer(format!(
                "upload of {} bytes into a {} byte buffer",
                bytes.len(),
                buffer.len()
            )));
        }
        buffer
            .settle()
            .map_err(|e| DeviceError::Transfer(format!("previous write failed: {}", e)))?;
        buffer.staging.clear();
        buffer.staging.extend_from_slice(bytes);

        let event = unsafe {
            self.queue
                .enqueue_write_buffer(&mut buffer.mem, CL_NON_BLOCKING, 0, &buffer.staging, &[])
        }
        .map_err(|e| DeviceError::Transfer(e.to_string()))?;
        buffer.pending = Some(event);
        log::trace!("OpenCL: upload {} bytes", bytes.len());
        Ok(())
    }

    fn launch(
        &self,
        program: &OpenClProgram,
        bindings: KernelBindings<'_, OpenClBuffer>,
        grid: LaunchGrid,
    ) -> Result<(), DeviceError> {
        if !grid.is_uniform() {
            return Err(DeviceError::Launch(format!(
                "global size {:?} is not a multiple of local size {:?}",
                grid.global, grid.local
            )));
        }
        enqueue_matmult(&self.queue, program, bindings, grid)
            .map_err(|e| DeviceError::Launch(e.to_string()))?;
        log::trace!("OpenCL: enqueued {:?} over {:?}", grid.local, grid.global);
        Ok(())
    }

    fn finish(&self) -> Result<(), DeviceError> {
        self.queue
            .finish()
            .map_err(|e| DeviceError::Synchronize(e.to_string()))
    }

    fn download(&self, buffer: &OpenClBuffer, out: &mut [u8]) -> Result<(), DeviceError> {
        if out.len() > buffer.len() {
            return Err(DeviceError::Transfer(format!(
                "download of {} bytes from a {} byte buffer",
                out.len(),
                buffer.len()
            )));
        }
        unsafe {
            self.queue
                .enqueue_read_buffer(&buffer.mem, CL_BLOCKING, 0, out, &[])
        }
        .map_err(|e| DeviceError::Transfer(e.to_string()))?;
        log::trace!("OpenCL: download {} bytes", out.len());
        Ok(())
    }
}
