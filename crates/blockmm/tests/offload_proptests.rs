//! Property-based tests for the full offload pipeline.
//!
//! Verified invariants:
//! - The offloaded product matches the reference within tolerance for any
//!   operand shapes, device limits and tile policy.
//! - The result always has the unpadded `A.rows x B.cols` shape.
//! - Tile extents cover the output and are multiples of the tile edge.

use blockmm::prelude::*;
use blockmm::reference_matmul;
use proptest::prelude::*;

// ---------------------------------------------------------------------------
// Strategies
// ---------------------------------------------------------------------------

fn dim_strategy() -> impl Strategy<Value = usize> {
    1..=20_usize
}

fn matrix_f32(rows: usize, cols: usize) -> impl Strategy<Value = Matrix<f32>> {
    proptest::collection::vec(-4.0..4.0_f32, rows * cols)
        .prop_map(move |data| Matrix::from_vec(data, rows, cols).unwrap())
}

fn operand_pair() -> impl Strategy<Value = (Matrix<f32>, Matrix<f32>)> {
    (dim_strategy(), dim_strategy(), dim_strategy())
        .prop_flat_map(|(m, k, n)| (matrix_f32(m, k), matrix_f32(k, n)))
}

fn policy_strategy() -> impl Strategy<Value = TilePolicy> {
    prop_oneof![Just(TilePolicy::RoundUp), Just(TilePolicy::ExactDivisor)]
}

// ---------------------------------------------------------------------------
// Properties
// ---------------------------------------------------------------------------

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn offload_matches_reference(
        (a, b) in operand_pair(),
        limit in 1..=1024_usize,
        policy in policy_strategy(),
    ) {
        let config = EngineConfig::default().with_tile_policy(policy);
        let engine = Engine::with_config(HostDevice::with_limits(limit, true), config).unwrap();
        let out = engine.multiply(&a, &b).unwrap();

        prop_assert_eq!(out.result.shape(), (a.rows(), b.cols()));
        prop_assert!(out.is_verified());

        let reference = reference_matmul(&a, &b).unwrap();
        for (x, y) in out.result.as_slice().iter().zip(reference.as_slice()) {
            prop_assert!((x - y).abs() <= 1e-3, "{} vs {}", x, y);
        }
    }

    #[test]
    fn tile_covers_output((a, b) in operand_pair(), limit in 1..=4096_usize) {
        let engine = Engine::new(HostDevice::with_limits(limit, true));
        let out = engine.multiply(&a, &b).unwrap();
        let tile = out.tile;

        prop_assert!(tile.tile_edge >= 1);
        prop_assert!(tile.local_items() <= limit);
        prop_assert_eq!(tile.global_x % tile.tile_edge, 0);
        prop_assert_eq!(tile.global_y % tile.tile_edge, 0);
        prop_assert!(tile.global_x >= b.cols());
        prop_assert!(tile.global_y >= a.rows());
    }

    #[test]
    fn double_fallback_matches_reference((a, b) in operand_pair()) {
        let engine = Engine::new(HostDevice::with_limits(256, false));
        let out = engine.multiply(&a.cast::<f64>(), &b.cast::<f64>()).unwrap();

        prop_assert_eq!(out.precision, Precision::Single);
        prop_assert!(out.is_verified());
    }
}
