//! Error types for device access and the offload pipeline.

use blockmm_core::{ComparisonReport, ResourceError, ShapeError};
use thiserror::Error;

/// Errors raised by a compute device.
#[derive(Debug, Error)]
pub enum DeviceError {
    /// No platform or device could be enumerated.
    #[error("no compute device available: {0}")]
    NoDevice(String),

    /// A capability query failed.
    #[error("device query failed for {what}: {reason}")]
    Query { what: &'static str, reason: String },

    /// Context, queue or module creation failed.
    #[error("failed to create {what}: {reason}")]
    Setup { what: &'static str, reason: String },

    /// Kernel compilation failed. `log` is the full build log.
    #[error("kernel build failed:\n{log}")]
    Build { log: String },

    /// The compiled program has no such entry point.
    #[error("kernel not found: {0}")]
    KernelNotFound(String),

    /// A device buffer could not be allocated.
    #[error("failed to allocate {bytes} bytes: {reason}")]
    Allocation { bytes: usize, reason: String },

    /// A host/device copy failed.
    #[error("transfer failed: {0}")]
    Transfer(String),

    /// The kernel could not be launched or faulted while running.
    #[error("kernel launch failed: {0}")]
    Launch(String),

    /// Waiting for queued work failed, or work was read before it completed.
    #[error("synchronization failed: {0}")]
    Synchronize(String),
}

impl DeviceError {
    /// Build log of a failed compilation.
    pub fn build_log(&self) -> Option<&str> {
        match self {
            Self::Build { log } => Some(log),
            _ => None,
        }
    }
}

/// Invalid configuration values.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("validation error: {0}")]
    Validation(String),

    #[error("invalid environment variable value for {key}: {value}")]
    InvalidEnvVar { key: String, value: String },

    #[error("unknown tile policy: {0}")]
    UnknownTilePolicy(String),
}

/// Errors returned by the offload engine.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Resource(#[from] ResourceError),

    #[error(transparent)]
    Shape(#[from] ShapeError),

    #[error(transparent)]
    Device(#[from] DeviceError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The offloaded result disagreed with the reference and the engine is
    /// configured to fail on mismatch.
    #[error("result verification failed: {0}")]
    Validation(ComparisonReport),
}

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, EngineError>;
