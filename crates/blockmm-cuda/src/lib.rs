//! CUDA device for the blockmm offload engine.
//!
//! [`CudaContext`] implements [`blockmm::ComputeDevice`] with the cudarc
//! driver API: kernels are compiled at run time with NVRTC, the tile edge
//! becomes the CUDA block size, and uploads are queued on the device stream
//! ahead of the launch.
//!
//! # Quick Start
//!
//! ```ignore
//! use blockmm::Matrix;
//! use blockmm_cuda::offload_matmul_gpu;
//!
//! // Simple one-shot API (uses a cached global engine)
//! let a = Matrix::from_fn(1024, 512, |i, j| (i + j) as f32);
//! let b = Matrix::from_fn(512, 256, |i, j| (i * j % 7) as f32);
//! let c = offload_matmul_gpu(&a, &b)?;
//! ```
//!
//! # Persistent Context
//!
//! ```ignore
//! use blockmm::{Engine, EngineConfig};
//! use blockmm_cuda::CudaContext;
//!
//! let engine = Engine::with_config(CudaContext::new()?, EngineConfig::default())?;
//! let out = engine.multiply(&a, &b)?;
//! println!("tile {} -> {}", out.tile.tile_edge, out.report.unwrap());
//! ```
//!
//! # Performance
//!
//! Compiled modules are cached per context by source text, so each distinct
//! tile edge and precision pays the NVRTC cost once. The global engine keeps
//! its context for the process lifetime.

mod context;
mod error;
mod kernels;
mod memory;

use std::sync::Mutex;

use blockmm::{Element, Engine, EngineConfig, Matrix};
use once_cell::sync::OnceCell;

pub use context::CudaContext;
pub use error::{CudaError, Result};
pub use kernels::CudaProgram;
pub use memory::CudaBuffer;

/// Global CUDA engine for the convenience functions.
/// Lazily initialized on first use, persists for process lifetime.
static GLOBAL_ENGINE: OnceCell<Engine<CudaContext>> = OnceCell::new();

/// Mutex to ensure only one thread initializes the engine.
static INIT_MUTEX: Mutex<()> = Mutex::new(());

/// Get or initialize the global CUDA engine.
///
/// This function is thread-safe and will only initialize the engine once.
/// Engine settings come from the `BLOCKMM_*` environment variables.
///
/// # Errors
///
/// Returns an error if CUDA initialization fails (no device, driver issues,
/// etc.) or the environment holds an invalid setting.
pub fn get_global_engine() -> blockmm::Result<&'static Engine<CudaContext>> {
    // Fast path: already initialized
    if let Some(engine) = GLOBAL_ENGINE.get() {
        return Ok(engine);
    }

    // Slow path: need to initialize
    let _lock = INIT_MUTEX.lock().unwrap_or_else(|e| e.into_inner());

    GLOBAL_ENGINE.get_or_try_init(|| {
        let ctx = CudaContext::new().map_err(blockmm::DeviceError::from)?;
        Engine::with_config(ctx, EngineConfig::from_env()?)
    })
}

/// One-shot blocked matrix multiplication on the GPU.
///
/// Pads, uploads, launches, reads back and verifies through the global
/// engine. Only the product is returned; use [`get_global_engine`] for the
/// tile and verification details.
pub fn offload_matmul_gpu<T: Element>(a: &Matrix<T>, b: &Matrix<T>) -> blockmm::Result<Matrix<T>> {
    Ok(get_global_engine()?.multiply(a, b)?.result)
}
