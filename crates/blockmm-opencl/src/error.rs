//! Error types for OpenCL operations.

use blockmm::DeviceError;
use opencl3::error_codes::ClError;
use thiserror::Error;

/// Errors that can occur during OpenCL operations.
#[derive(Debug, Error)]
pub enum OpenClError {
    /// No OpenCL platform is installed.
    #[error("no OpenCL platforms found")]
    NoPlatforms,

    /// No usable device on any platform.
    #[error("no OpenCL device: {reason}")]
    NoDevice { reason: String },

    /// An OpenCL API call failed.
    #[error("{op} failed: {source}")]
    Api {
        op: &'static str,
        #[source]
        source: ClError,
    },

    /// Program build failed; `log` is the compiler output.
    #[error("OpenCL build failed:\n{log}")]
    Build { log: String },
}

impl OpenClError {
    pub(crate) fn api(op: &'static str) -> impl FnOnce(ClError) -> Self {
        move |source| Self::Api { op, source }
    }
}

impl From<OpenClError> for DeviceError {
    fn from(err: OpenClError) -> Self {
        match err {
            OpenClError::NoPlatforms => DeviceError::NoDevice("no OpenCL platforms found".into()),
            OpenClError::NoDevice { reason } => DeviceError::NoDevice(reason),
            OpenClError::Build { log } => DeviceError::Build { log },
            OpenClError::Api { op, source } => DeviceError::Setup {
                what: op,
                reason: source.to_string(),
            },
        }
    }
}

/// Result type for OpenCL operations.
pub type Result<T> = std::result::Result<T, OpenClError>;
