//! Multiply two matrix text files on the default engine and write the product.
//!
//! Reads `A.txt` and `B.txt` from the working directory (override with
//! `BLOCKMM_A` / `BLOCKMM_B`) and writes `C.txt` (`BLOCKMM_C`).
//!
//! ```text
//! RUST_LOG=debug cargo run -p blockmm --example matmult_files
//! ```

use std::env;
use std::process::ExitCode;

use blockmm::{default_engine, write_matrix, ComputeDevice, EngineError};

fn path_from_env(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn run() -> Result<bool, EngineError> {
    let a_path = path_from_env("BLOCKMM_A", "A.txt");
    let b_path = path_from_env("BLOCKMM_B", "B.txt");
    let c_path = path_from_env("BLOCKMM_C", "C.txt");

    let engine = default_engine()?;
    let cap = engine.capability()?;
    println!("Device: {}", engine.device().name());
    println!("{}", cap);

    let out = engine.multiply_files::<f32>(&a_path, &b_path)?;
    println!(
        "{}x{} product, tile {} ({}x{} global)",
        out.result.rows(),
        out.result.cols(),
        out.tile.tile_edge,
        out.tile.global_x,
        out.tile.global_y
    );

    match &out.report {
        Some(report) => println!("{}", report),
        None => println!("verification disabled"),
    }

    write_matrix(&c_path, &out.result)?;
    println!("wrote {}", c_path);
    Ok(out.is_verified())
}

fn main() -> ExitCode {
    env_logger::init();

    match run() {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::from(2),
        Err(e) => {
            eprintln!("error: {}", e);
            ExitCode::FAILURE
        }
    }
}
