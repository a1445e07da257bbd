//! Basic example of an offloaded blocked multiply on the host device.

use blockmm::prelude::*;
use blockmm::TileConfig;

fn main() -> Result<(), EngineError> {
    env_logger::init();
    println!("blockmm - Basic Example\n");

    let a = Matrix::from_rows(&[vec![1.0f32, 2.0, 3.0], vec![4.0, 5.0, 6.0]])?;
    let b = Matrix::from_rows(&[vec![7.0f32, 8.0], vec![9.0, 10.0], vec![11.0, 12.0]])?;

    println!("Matrix A (2x3):");
    print_matrix(&a);
    println!("\nMatrix B (3x2):");
    print_matrix(&b);

    // A device with a 64-item work-group limit gets a 4x4 tile, so both
    // operands are zero padded before the kernel runs.
    let engine = Engine::new(HostDevice::with_limits(64, true));
    let out = engine.multiply(&a, &b)?;

    println!("\nResult C = A * B:");
    print_matrix(&out.result);
    describe_tile(&out.tile);
    println!(
        "padding: A +{}x{}, B +{}x{}",
        out.padding.a.pad_rows, out.padding.a.pad_cols, out.padding.b.pad_rows, out.padding.b.pad_cols
    );
    if let Some(report) = &out.report {
        println!("{}", report);
    }

    // Same product in double precision on a device without fp64.
    println!("\n--- Double precision on a single-precision device ---\n");
    let single_only = Engine::new(HostDevice::with_limits(64, false));
    let out = single_only.multiply(&a.cast::<f64>(), &b.cast::<f64>())?;
    println!("computed in {}", out.precision);
    print_matrix(&out.result);

    Ok(())
}

fn describe_tile(tile: &TileConfig) {
    let (gx, gy) = tile.groups();
    println!(
        "\ntile {}x{}, global {}x{}, {}x{} work-groups",
        tile.tile_edge, tile.tile_edge, tile.global_x, tile.global_y, gx, gy
    );
}

fn print_matrix<T: Element>(m: &Matrix<T>) {
    for i in 0..m.rows() {
        let row: Vec<String> = m.row(i).iter().map(|x| format!("{:8.2}", x)).collect();
        println!("  [{}]", row.join(", "));
    }
}
