//! Error types for CUDA operations.

use blockmm::DeviceError;
use cudarc::driver::DriverError;
use cudarc::nvrtc::CompileError;
use thiserror::Error;

/// Errors that can occur during CUDA operations.
#[derive(Debug, Error)]
pub enum CudaError {
    /// CUDA driver error.
    #[error("CUDA driver error: {0}")]
    Driver(#[from] DriverError),

    /// NVRTC compilation error.
    #[error("CUDA compilation error: {0}")]
    Compile(#[from] CompileError),

    /// No CUDA device available.
    #[error("No CUDA device available")]
    NoDevice,

    /// Kernel not found in a loaded module.
    #[error("Kernel not found: {0}")]
    KernelNotFound(String),
}

impl From<CudaError> for DeviceError {
    fn from(err: CudaError) -> Self {
        match err {
            CudaError::Compile(CompileError::CompileError { log, .. }) => DeviceError::Build {
                log: log.to_string_lossy().into_owned(),
            },
            CudaError::Compile(other) => DeviceError::Build {
                log: other.to_string(),
            },
            CudaError::NoDevice => DeviceError::NoDevice("no CUDA device".into()),
            CudaError::KernelNotFound(name) => DeviceError::KernelNotFound(name),
            CudaError::Driver(e) => DeviceError::Setup {
                what: "CUDA context",
                reason: e.to_string(),
            },
        }
    }
}

/// Result type for CUDA operations.
pub type Result<T> = std::result::Result<T, CudaError>;
