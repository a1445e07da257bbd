//! The offload pipeline: probe, tile, pad, dispatch, trim, verify.

use std::path::Path;
use std::sync::Mutex;

use blockmm_core::{
    prepare_operands, read_matrix, verify, ComparisonReport, Matrix, OperandPadding, ShapeError,
    TileConfig,
};
use blockmm_types::{Element, Precision};
use once_cell::sync::OnceCell;

use crate::config::EngineConfig;
use crate::device::{ComputeDevice, DeviceCapability};
use crate::dispatch::OffloadDispatcher;
use crate::error::{EngineError, Result};
use crate::kernel_source::KernelSource;

/// Result of one offloaded multiply.
#[derive(Debug, Clone)]
pub struct MultiplyOutcome<T: Element> {
    /// Product with the original `A.rows x B.cols` shape.
    pub result: Matrix<T>,
    pub tile: TileConfig,
    pub padding: OperandPadding,
    /// Precision the device actually computed in.
    pub precision: Precision,
    /// `None` when verification is disabled.
    pub report: Option<ComparisonReport>,
}

impl<T: Element> MultiplyOutcome<T> {
    /// True unless verification ran and failed.
    pub fn is_verified(&self) -> bool {
        self.report.as_ref().is_none_or(|r| r.matches)
    }
}

/// Offload engine bound to one device.
///
/// The device is probed once, on first use, and the capability is cached for
/// the engine's lifetime. Multiplies on one engine are serialized.
pub struct Engine<D: ComputeDevice> {
    device: D,
    config: EngineConfig,
    capability: OnceCell<DeviceCapability>,
    in_flight: Mutex<()>,
}

impl<D: ComputeDevice> Engine<D> {
    /// Engine with the default configuration.
    pub fn new(device: D) -> Self {
        Self {
            device,
            config: EngineConfig::default(),
            capability: OnceCell::new(),
            in_flight: Mutex::new(()),
        }
    }

    /// Engine with a validated configuration.
    pub fn with_config(device: D, config: EngineConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            ..Self::new(device)
        })
    }

    pub fn device(&self) -> &D {
        &self.device
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Probed capability with the configured work-group override applied.
    pub fn capability(&self) -> Result<DeviceCapability> {
        let cap = self.capability.get_or_try_init(|| {
            let cap = self.device.probe()?;
            log::info!("{}: {}", self.device.name(), cap);
            Ok::<_, EngineError>(cap)
        })?;
        Ok(cap.with_work_group_limit(self.config.workgroup_size_override))
    }

    /// Multiply `a * b` on the device.
    ///
    /// Double-precision operands on a device without double support are
    /// computed in single precision and widened back; the outcome's
    /// `precision` says which path ran.
    pub fn multiply<T: Element>(&self, a: &Matrix<T>, b: &Matrix<T>) -> Result<MultiplyOutcome<T>> {
        check_operands(a, b)?;
        let cap = self.capability()?;

        let (result, tile, padding, precision) =
            if T::PRECISION == Precision::Double && !cap.supports_double {
                log::warn!(
                    "{} has no double support; computing {}x{} * {}x{} in single precision",
                    self.device.name(),
                    a.rows(),
                    a.cols(),
                    b.rows(),
                    b.cols()
                );
                let (c, tile, padding) = self.run::<f32>(&a.cast(), &b.cast(), &cap)?;
                (c.cast::<T>(), tile, padding, Precision::Single)
            } else {
                let (c, tile, padding) = self.run(a, b, &cap)?;
                (c, tile, padding, T::PRECISION)
            };

        let report = if self.config.verify {
            let report = verify(&result, a, b, self.config.tolerance_for(precision))?;
            log::debug!("{}", report);
            if !report.matches && self.config.fail_on_mismatch {
                return Err(EngineError::Validation(report));
            }
            Some(report)
        } else {
            None
        };

        Ok(MultiplyOutcome {
            result,
            tile,
            padding,
            precision,
            report,
        })
    }

    /// Load both operands from matrix text files and multiply them.
    pub fn multiply_files<T: Element>(
        &self,
        a_path: impl AsRef<Path>,
        b_path: impl AsRef<Path>,
    ) -> Result<MultiplyOutcome<T>> {
        let a = read_matrix::<T>(a_path)?;
        let b = read_matrix::<T>(b_path)?;
        self.multiply(&a, &b)
    }

    fn kernel_source(&self, precision: Precision) -> Result<KernelSource> {
        match &self.config.kernel_path {
            Some(path) => Ok(KernelSource::from_file(path)?),
            None => Ok(KernelSource::builtin(self.device.dialect(), precision)),
        }
    }

    fn run<C: Element>(
        &self,
        a: &Matrix<C>,
        b: &Matrix<C>,
        cap: &DeviceCapability,
    ) -> Result<(Matrix<C>, TileConfig, OperandPadding)> {
        let tile = TileConfig::select(
            self.config.tile_policy,
            cap.max_work_group_items,
            a.rows(),
            b.cols(),
        );
        log::debug!(
            "tile edge {} ({:?}), global {}x{}",
            tile.tile_edge,
            self.config.tile_policy,
            tile.global_x,
            tile.global_y
        );

        let prepared = prepare_operands(a, b, &tile)?;
        let source = self.kernel_source(C::PRECISION)?;

        // device state is per call, so a poisoned lock is still usable
        let _guard = self.in_flight.lock().unwrap_or_else(|e| e.into_inner());
        let result = OffloadDispatcher::new(&self.device).dispatch(&source, &prepared, &tile)?;
        Ok((result, tile, prepared.padding))
    }
}

fn check_operands<T: Element>(a: &Matrix<T>, b: &Matrix<T>) -> std::result::Result<(), ShapeError> {
    if a.cols() != b.rows() {
        return Err(ShapeError::InnerMismatch {
            a_rows: a.rows(),
            a_cols: a.cols(),
            b_rows: b.rows(),
            b_cols: b.cols(),
        });
    }
    for m in [a, b] {
        if m.is_empty() {
            return Err(ShapeError::Empty {
                rows: m.rows(),
                cols: m.cols(),
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::KernelDialect;
    use crate::error::DeviceError;
    use crate::host::HostDevice;
    use blockmm_core::TilePolicy;

    fn sample<T: Element>() -> (Matrix<T>, Matrix<T>) {
        let a = Matrix::from_fn(2, 3, |i, j| T::from_f64((i * 3 + j + 1) as f64));
        let b = Matrix::from_fn(3, 2, |i, j| T::from_f64((i * 2 + j + 7) as f64));
        (a, b)
    }

    #[test]
    fn test_multiply_small_product() {
        let engine = Engine::new(HostDevice::new());
        let (a, b) = sample::<f32>();
        let out = engine.multiply(&a, &b).unwrap();

        assert_eq!(out.result.as_slice(), &[58.0, 64.0, 139.0, 154.0]);
        assert_eq!(out.tile.tile_edge, 16);
        assert_eq!(out.precision, Precision::Single);
        assert!(out.is_verified());
        assert_eq!(out.report.unwrap().tolerance, 1e-3);
    }

    #[test]
    fn test_multiply_double() {
        let engine = Engine::new(HostDevice::with_limits(64, true));
        let (a, b) = sample::<f64>();
        let out = engine.multiply(&a, &b).unwrap();
        assert_eq!(out.result.as_slice(), &[58.0, 64.0, 139.0, 154.0]);
        assert_eq!(out.precision, Precision::Double);
    }

    #[test]
    fn test_double_falls_back_to_single() {
        let engine = Engine::new(HostDevice::with_limits(64, false));
        let (a, b) = sample::<f64>();
        let out = engine.multiply(&a, &b).unwrap();
        assert_eq!(out.result.as_slice(), &[58.0, 64.0, 139.0, 154.0]);
        assert_eq!(out.precision, Precision::Single);
        assert_eq!(out.report.unwrap().tolerance, 1e-3);
    }

    #[test]
    fn test_capability_with_override() {
        let config = EngineConfig::default().with_workgroup_size_override(16);
        let engine = Engine::with_config(HostDevice::new(), config).unwrap();
        let cap = engine.capability().unwrap();
        assert_eq!(cap.max_work_group_items, 16);

        let (a, b) = sample::<f32>();
        assert_eq!(engine.multiply(&a, &b).unwrap().tile.tile_edge, 2);
    }

    #[test]
    fn test_rejects_empty_and_mismatched() {
        let engine = Engine::new(HostDevice::new());
        let empty = Matrix::<f32>::zeros(0, 0);
        let err = engine.multiply(&empty, &empty).unwrap_err();
        assert!(matches!(err, EngineError::Shape(ShapeError::Empty { rows: 0, cols: 0 })));

        let (a, _) = sample::<f32>();
        let err = engine.multiply(&a, &a).unwrap_err();
        assert!(matches!(err, EngineError::Shape(ShapeError::InnerMismatch { .. })));
        assert_eq!(engine.device().build_count(), 0);
    }

    #[test]
    fn test_verify_disabled() {
        let config = EngineConfig::default().with_verify(false);
        let engine = Engine::with_config(HostDevice::new(), config).unwrap();
        let (a, b) = sample::<f32>();
        let out = engine.multiply(&a, &b).unwrap();
        assert!(out.report.is_none());
        assert!(out.is_verified());
    }

    #[test]
    fn test_exact_divisor_policy() {
        let config = EngineConfig::default().with_tile_policy(TilePolicy::ExactDivisor);
        let engine = Engine::with_config(HostDevice::with_limits(64, true), config).unwrap();
        let (a, b) = sample::<f32>();
        let out = engine.multiply(&a, &b).unwrap();
        // 2x2 output, sqrt(64) = 8 -> 4 is the largest divisor of 4 not above 8
        assert_eq!(out.tile.tile_edge, 4);
        assert_eq!(out.result.as_slice(), &[58.0, 64.0, 139.0, 154.0]);
    }

    /// Host device whose readback corrupts the first element.
    struct CorruptingDevice(HostDevice);

    impl ComputeDevice for CorruptingDevice {
        type Buffer = <HostDevice as ComputeDevice>::Buffer;
        type Program = <HostDevice as ComputeDevice>::Program;

        fn name(&self) -> String {
            "corrupting".to_string()
        }

        fn dialect(&self) -> KernelDialect {
            self.0.dialect()
        }

        fn probe(&self) -> std::result::Result<DeviceCapability, DeviceError> {
            self.0.probe()
        }

        fn build_program(
            &self,
            source: &str,
            entry: &str,
        ) -> std::result::Result<Self::Program, DeviceError> {
            self.0.build_program(source, entry)
        }

        fn alloc(
            &self,
            bytes: usize,
            access: crate::device::BufferAccess,
        ) -> std::result::Result<Self::Buffer, DeviceError> {
            self.0.alloc(bytes, access)
        }

        fn upload(&self, buffer: &mut Self::Buffer, bytes: &[u8]) -> std::result::Result<(), DeviceError> {
            self.0.upload(buffer, bytes)
        }

        fn launch(
            &self,
            program: &Self::Program,
            bindings: crate::device::KernelBindings<'_, Self::Buffer>,
            grid: crate::device::LaunchGrid,
        ) -> std::result::Result<(), DeviceError> {
            self.0.launch(program, bindings, grid)
        }

        fn finish(&self) -> std::result::Result<(), DeviceError> {
            self.0.finish()
        }

        fn download(&self, buffer: &Self::Buffer, out: &mut [u8]) -> std::result::Result<(), DeviceError> {
            self.0.download(buffer, out)?;
            let first: &mut [f32] = bytemuck::cast_slice_mut(&mut out[..4]);
            first[0] += 1.0;
            Ok(())
        }
    }

    #[test]
    fn test_mismatch_reported() {
        let engine = Engine::new(CorruptingDevice(HostDevice::new()));
        let (a, b) = sample::<f32>();
        let out = engine.multiply(&a, &b).unwrap();

        assert!(!out.is_verified());
        let report = out.report.unwrap();
        assert_eq!(report.first_mismatch_index(), Some(0));
        assert_eq!(report.max_abs_diff, 1.0);
        assert_eq!(out.result[(0, 0)], 59.0);
    }

    #[test]
    fn test_strict_mode_escalates_mismatch() {
        let config = EngineConfig::default().with_fail_on_mismatch(true);
        let engine = Engine::with_config(CorruptingDevice(HostDevice::new()), config).unwrap();
        let (a, b) = sample::<f32>();
        match engine.multiply(&a, &b).unwrap_err() {
            EngineError::Validation(report) => assert_eq!(report.mismatch_count, 1),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_missing_kernel_file() {
        let config = EngineConfig::default().with_kernel_path("/nonexistent/blockmm/k.cl");
        let engine = Engine::with_config(HostDevice::new(), config).unwrap();
        let (a, b) = sample::<f32>();
        let err = engine.multiply(&a, &b).unwrap_err();
        assert!(matches!(err, EngineError::Resource(_)));
    }

    #[test]
    fn test_malformed_kernel_file() {
        let path = std::env::temp_dir().join(format!("blockmm-bad-{}.cl", std::process::id()));
        std::fs::write(&path, "__kernel void matmult(__global float* C) {\n  C[0] = 1.0f;\n").unwrap();
        let config = EngineConfig::default().with_kernel_path(&path);
        let engine = Engine::with_config(HostDevice::new(), config).unwrap();
        let (a, b) = sample::<f32>();
        let err = engine.multiply(&a, &b).unwrap_err();
        let _ = std::fs::remove_file(&path);

        match err {
            EngineError::Device(DeviceError::Build { log }) => assert!(!log.is_empty()),
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(engine.device().launch_count(), 0);
        assert_eq!(engine.device().allocation_count(), 0);
    }
}
