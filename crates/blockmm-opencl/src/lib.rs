//! OpenCL device for the blockmm offload engine.
//!
//! [`OpenClDevice`] implements [`blockmm::ComputeDevice`] over `opencl3`:
//! programs are built from source at run time with the tile edge injected as
//! `BLOCK_SIZE`, uploads are non-blocking writes on an in-order queue, and
//! `finish` separates the kernel from the blocking read-back.
//!
//! ```ignore
//! use blockmm::{Engine, Matrix};
//! use blockmm_opencl::OpenClDevice;
//!
//! let engine = Engine::new(OpenClDevice::new()?);
//! let out = engine.multiply(&a, &b)?;
//! assert!(out.is_verified());
//! ```

mod context;
mod error;
mod kernels;
mod memory;

pub use context::OpenClDevice;
pub use error::{OpenClError, Result};
pub use kernels::OpenClProgram;
pub use memory::OpenClBuffer;

#[cfg(test)]
mod tests {
    use super::*;
    use blockmm::{
        reference_matmul, BufferAccess, ComputeDevice, DeviceError, Engine, EngineConfig,
        KernelDialect, KernelSource, Matrix, Precision, KERNEL_ENTRY,
    };

    fn opencl_device_or_skip() -> Option<OpenClDevice> {
        match OpenClDevice::new() {
            Ok(device) => Some(device),
            Err(e) => {
                println!("OpenCL not available (error: {}), skipping test", e);
                None
            }
        }
    }

    #[test]
    fn test_probe() {
        let Some(device) = opencl_device_or_skip() else {
            return;
        };
        let cap = device.probe().unwrap();
        assert!(cap.max_work_group_items >= 1);
        assert_eq!(device.dialect(), KernelDialect::OpenClC);
    }

    #[test]
    fn test_known_product() {
        let Some(device) = opencl_device_or_skip() else {
            return;
        };
        let engine = Engine::new(device);

        let a = Matrix::from_rows(&[vec![1.0f32, 2.0, 3.0], vec![4.0, 5.0, 6.0]]).unwrap();
        let b = Matrix::from_rows(&[vec![7.0f32, 8.0], vec![9.0, 10.0], vec![11.0, 12.0]]).unwrap();
        let out = engine.multiply(&a, &b).unwrap();

        assert_eq!(out.result.as_slice(), &[58.0, 64.0, 139.0, 154.0]);
        assert!(out.is_verified());
    }

    #[test]
    fn test_double_or_fallback() {
        let Some(device) = opencl_device_or_skip() else {
            return;
        };
        let fp64 = device.probe().unwrap().supports_double;
        let engine = Engine::with_config(device, EngineConfig::default().with_fail_on_mismatch(true))
            .unwrap();

        let a = Matrix::from_fn(19, 33, |i, j| ((i + j) % 5) as f64);
        let b = Matrix::from_fn(33, 41, |i, j| ((2 * i + j) % 3) as f64 - 1.0);
        let out = engine.multiply(&a, &b).unwrap();

        let expected = if fp64 { Precision::Double } else { Precision::Single };
        assert_eq!(out.precision, expected);
        assert_eq!(out.result, reference_matmul(&a, &b).unwrap());
    }

    #[test]
    fn test_build_failure_has_log() {
        let Some(device) = opencl_device_or_skip() else {
            return;
        };
        let broken = KernelSource::builtin(KernelDialect::OpenClC, Precision::Single)
            .text()
            .replace("barrier(CLK_LOCAL_MEM_FENCE);", "barrier(CLK_LOCAL_MEM_FENCE)");
        let err = device
            .build_program(&format!("#define BLOCK_SIZE 4\n{}", broken), KERNEL_ENTRY)
            .err()
            .unwrap();
        match err {
            DeviceError::Build { log } => assert!(!log.is_empty()),
            other => panic!("expected a build failure, got {other}"),
        }
    }

    #[test]
    fn test_upload_download_round_trip() {
        let Some(device) = opencl_device_or_skip() else {
            return;
        };
        let mut buf = device.alloc(16, BufferAccess::ReadWrite).unwrap();
        device.upload(&mut buf, &[9; 16]).unwrap();
        device.finish().unwrap();
        let mut out = [0u8; 16];
        device.download(&buf, &mut out).unwrap();
        assert_eq!(out, [9; 16]);
    }

    #[test]
    fn test_reupload_settles_previous_write() {
        let Some(device) = opencl_device_or_skip() else {
            return;
        };
        let mut buf = device.alloc(8, BufferAccess::ReadWrite).unwrap();
        device.upload(&mut buf, &[1; 8]).unwrap();
        assert!(buf.has_pending_write());

        // the first write is waited on before its staging is replaced
        device.upload(&mut buf, &[2; 8]).unwrap();
        assert!(buf.has_pending_write());
        buf.settle().unwrap();
        assert!(!buf.has_pending_write());

        device.finish().unwrap();
        let mut out = [0u8; 8];
        device.download(&buf, &mut out).unwrap();
        assert_eq!(out, [2; 8]);
    }
}
