//! Drives one blocked multiply through a [`ComputeDevice`].

use blockmm_core::{trim, MatmulArgs, Matrix, PreparedOperands, TileConfig};
use blockmm_types::Element;

use crate::device::{BufferAccess, ComputeDevice, KernelBindings, LaunchGrid};
use crate::error::Result;
use crate::kernel_source::{KernelSource, KERNEL_ENTRY};

/// Runs prepared operands on a device.
///
/// `dispatch` takes `&mut self`, so one dispatcher has at most one multiply
/// in flight. Every device resource a dispatch creates is owned by that call
/// and dropped on every exit path.
pub struct OffloadDispatcher<'d, D: ComputeDevice> {
    device: &'d D,
    dispatches: usize,
}

impl<'d, D: ComputeDevice> OffloadDispatcher<'d, D> {
    pub fn new(device: &'d D) -> Self {
        Self {
            device,
            dispatches: 0,
        }
    }

    pub fn device(&self) -> &D {
        self.device
    }

    /// Completed dispatches.
    pub fn dispatches(&self) -> usize {
        self.dispatches
    }

    /// Compile, upload, launch, wait, read back and trim.
    ///
    /// Returns exactly `out_rows x out_cols`. Nothing is allocated before
    /// the kernel has built.
    pub fn dispatch<T: Element>(
        &mut self,
        source: &KernelSource,
        prepared: &PreparedOperands<T>,
        tile: &TileConfig,
    ) -> Result<Matrix<T>> {
        let device = self.device;
        let args = MatmulArgs::from_prepared(prepared)?;

        let unit = source.compile_unit(tile.tile_edge);
        log::debug!(
            "building {} on {} with BLOCK_SIZE {}",
            source.origin(),
            device.name(),
            tile.tile_edge
        );
        let program = device.build_program(&unit, KERNEL_ENTRY)?;

        let (c_rows, c_cols) = prepared.padded_output_shape();
        let elem = T::PRECISION.size_of();
        let mut a_buf = device.alloc(prepared.a.len() * elem, BufferAccess::ReadOnly)?;
        let mut b_buf = device.alloc(prepared.b_transposed.len() * elem, BufferAccess::ReadOnly)?;
        let mut c_buf = device.alloc(c_rows * c_cols * elem, BufferAccess::WriteOnly)?;

        device.upload(&mut a_buf, prepared.a.as_bytes())?;
        device.upload(&mut b_buf, prepared.b_transposed.as_bytes())?;

        let grid = LaunchGrid::square((tile.global_x, tile.global_y), tile.tile_edge);
        log::debug!(
            "launching {:?} groups of {}x{} for a {}x{} output",
            grid.groups(),
            tile.tile_edge,
            tile.tile_edge,
            prepared.out_rows,
            prepared.out_cols
        );
        device.launch(
            &program,
            KernelBindings {
                output: &mut c_buf,
                a: &a_buf,
                b_transposed: &b_buf,
                args,
                precision: T::PRECISION,
            },
            grid,
        )?;
        device.finish()?;

        let mut padded = Matrix::<T>::zeros(c_rows, c_cols);
        device.download(&c_buf, bytemuck::cast_slice_mut(padded.as_mut_slice()))?;
        self.dispatches += 1;

        Ok(trim(&padded, prepared.out_rows, prepared.out_cols)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::KernelDialect;
    use crate::error::{DeviceError, EngineError};
    use crate::host::HostDevice;
    use blockmm_core::{prepare_operands, TilePolicy};
    use blockmm_types::Precision;

    fn sample() -> (Matrix<f32>, Matrix<f32>) {
        let a = Matrix::from_rows(&[vec![1.0, 2.0, 3.0], vec![4.0, 5.0, 6.0]]).unwrap();
        let b = Matrix::from_rows(&[vec![7.0, 8.0], vec![9.0, 10.0], vec![11.0, 12.0]]).unwrap();
        (a, b)
    }

    #[test]
    fn test_dispatch_small_product() {
        let device = HostDevice::with_limits(16, true);
        let (a, b) = sample();
        let tile = TileConfig::select(TilePolicy::RoundUp, 16, 2, 2);
        let prepared = prepare_operands(&a, &b, &tile).unwrap();
        let source = KernelSource::builtin(KernelDialect::OpenClC, Precision::Single);

        let mut dispatcher = OffloadDispatcher::new(&device);
        let c = dispatcher.dispatch(&source, &prepared, &tile).unwrap();

        assert_eq!(c.shape(), (2, 2));
        assert_eq!(c.as_slice(), &[58.0, 64.0, 139.0, 154.0]);
        assert_eq!(dispatcher.dispatches(), 1);
        assert_eq!(device.live_buffers(), 0);
    }

    #[test]
    fn test_build_failure_allocates_nothing() {
        let device = HostDevice::new();
        let (a, b) = sample();
        let tile = TileConfig::select(TilePolicy::RoundUp, 1024, 2, 2);
        let prepared = prepare_operands(&a, &b, &tile).unwrap();
        let source = KernelSource::new("broken.cl", "__kernel void matmult(__global float* C {\n");

        let mut dispatcher = OffloadDispatcher::new(&device);
        let err = dispatcher.dispatch(&source, &prepared, &tile).unwrap_err();

        match err {
            EngineError::Device(DeviceError::Build { log }) => assert!(!log.is_empty()),
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(device.allocation_count(), 0);
        assert_eq!(device.launch_count(), 0);
        assert_eq!(dispatcher.dispatches(), 0);
    }

    #[test]
    fn test_source_block_size_must_match_tile() {
        let device = HostDevice::new();
        let (a, b) = sample();
        let tile = TileConfig::select(TilePolicy::RoundUp, 1024, 2, 2);
        let builtin = KernelSource::builtin(KernelDialect::OpenClC, Precision::Single);
        let source = KernelSource::new("fixed.cl", format!("#define BLOCK_SIZE 4\n{}", builtin.text()));
        let prepared = prepare_operands(&a, &b, &tile).unwrap();

        let err = OffloadDispatcher::new(&device)
            .dispatch(&source, &prepared, &tile)
            .unwrap_err();
        assert!(matches!(err, EngineError::Device(DeviceError::Launch(_))));
        assert_eq!(device.live_buffers(), 0);
    }
}
