//! Adaptive block-tiled matrix multiplication offload.
//!
//! Given two matrices and a compute device with a bounded work-group
//! capacity, the engine picks a square tile from the capacity, zero pads both
//! operands to tile multiples, transposes the second one, runs a blocked
//! multiply kernel on the device, trims the padded result and checks it
//! against a CPU reference.
//!
//! ```text
//! probe -> TileConfig -> pad/transpose -> compile + upload + launch + finish -> read back -> trim -> verify
//! ```
//!
//! # Quick Start
//!
//! ```
//! use blockmm::{offload_matmul, Matrix};
//!
//! let a = Matrix::from_rows(&[vec![1.0f32, 2.0, 3.0], vec![4.0, 5.0, 6.0]]).unwrap();
//! let b = Matrix::from_rows(&[vec![7.0f32, 8.0], vec![9.0, 10.0], vec![11.0, 12.0]]).unwrap();
//!
//! // Uses the lazily created process-wide host engine.
//! let c = offload_matmul(&a, &b).unwrap();
//! assert_eq!(c.as_slice(), &[58.0, 64.0, 139.0, 154.0]);
//! ```
//!
//! # Explicit Engine
//!
//! ```
//! use blockmm::{Engine, EngineConfig, HostDevice, Matrix, TilePolicy};
//!
//! let config = EngineConfig::default()
//!     .with_tile_policy(TilePolicy::RoundUp)
//!     .with_fail_on_mismatch(true);
//! let engine = Engine::with_config(HostDevice::with_limits(256, false), config).unwrap();
//!
//! let a = Matrix::<f64>::identity(3);
//! let b = Matrix::from_fn(3, 5, |i, j| (i + j) as f64);
//! let out = engine.multiply(&a, &b).unwrap();
//!
//! assert_eq!(out.result, b);
//! assert_eq!(out.tile.tile_edge, 8);
//! // no fp64 on this device: computed in single precision
//! assert_eq!(out.precision, blockmm::Precision::Single);
//! ```
//!
//! # Devices
//!
//! [`HostDevice`] runs the kernel on the CPU with OpenCL queue semantics and
//! is what the default engine uses. GPU devices live in the `blockmm-cuda`
//! and `blockmm-opencl` crates and plug into the same [`Engine`] through
//! [`ComputeDevice`].

mod config;
mod device;
mod dispatch;
mod engine;
mod error;
mod host;
mod kernel_source;

use once_cell::sync::OnceCell;

pub use blockmm_core::{
    compare, pad, parse_matrix, prepare_operands, read_matrix, reference_matmul,
    round_up_to_multiple, to_text, transpose, trim, verify, write_matrix, ComparisonReport,
    MatmulArgs, Matrix, Mismatch, OperandPadding, PaddingSpec, PreparedOperands, ResourceError,
    ShapeError, TileConfig, TilePolicy,
};
pub use blockmm_types::{Element, Precision};
pub use config::EngineConfig;
pub use device::{
    BufferAccess, ComputeDevice, DeviceCapability, KernelBindings, KernelDialect, LaunchGrid,
};
pub use dispatch::OffloadDispatcher;
pub use engine::{Engine, MultiplyOutcome};
pub use error::{ConfigError, DeviceError, EngineError, Result};
pub use host::{HostBuffer, HostDevice, HostProgram, DEFAULT_MAX_WORK_GROUP_ITEMS};
pub use kernel_source::{KernelSource, KERNEL_ENTRY};

/// Process-wide host engine, created on first use.
static DEFAULT_ENGINE: OnceCell<Engine<HostDevice>> = OnceCell::new();

/// Get or initialize the process-wide host engine.
///
/// Device limits come from `BLOCKMM_HOST_*` and engine settings from
/// `BLOCKMM_*` environment variables, read once. The device is probed once
/// per process.
///
/// # Errors
///
/// Returns an error if an environment variable holds an invalid value.
pub fn default_engine() -> Result<&'static Engine<HostDevice>> {
    DEFAULT_ENGINE.get_or_try_init(|| {
        let device = HostDevice::from_env()?;
        let config = EngineConfig::from_env()?;
        log::info!("default engine: {}", config);
        Engine::with_config(device, config)
    })
}

/// One-shot multiply on the default engine, returning only the product.
///
/// Fails with [`EngineError::Validation`] only when `BLOCKMM_STRICT` is set.
pub fn offload_matmul<T: Element>(a: &Matrix<T>, b: &Matrix<T>) -> Result<Matrix<T>> {
    Ok(default_engine()?.multiply(a, b)?.result)
}

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::{
        default_engine, offload_matmul, ComputeDevice, Element, Engine, EngineConfig,
        EngineError, HostDevice, Matrix, MultiplyOutcome, Precision, TilePolicy,
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_engine_is_shared() {
        let first = default_engine().unwrap() as *const _;
        let second = default_engine().unwrap() as *const _;
        assert_eq!(first, second);
    }

    #[test]
    fn test_offload_matmul() {
        let a = Matrix::from_fn(4, 3, |i, j| (i + 2 * j) as f32);
        let b = Matrix::from_fn(3, 5, |i, j| (i * j) as f32);
        let c = offload_matmul(&a, &b).unwrap();
        assert_eq!(c, reference_matmul(&a, &b).unwrap());
    }
}
