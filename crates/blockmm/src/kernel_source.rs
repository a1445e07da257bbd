//! Kernel source text and build-time tile injection.

use std::fs;
use std::path::Path;

use blockmm_core::ResourceError;
use blockmm_types::Precision;

use crate::device::KernelDialect;

/// Entry point every kernel source must export.
pub const KERNEL_ENTRY: &str = "matmult";

const MATMULT_F32_CL: &str = include_str!("../kernels/matmult_f32.cl");
const MATMULT_F64_CL: &str = include_str!("../kernels/matmult_f64.cl");
const MATMULT_F32_CU: &str = include_str!("../kernels/matmult_f32.cu");
const MATMULT_F64_CU: &str = include_str!("../kernels/matmult_f64.cu");

/// Kernel source plus where it came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KernelSource {
    origin: String,
    text: String,
}

impl KernelSource {
    /// Source from text. `origin` names it in logs.
    pub fn new(origin: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            origin: origin.into(),
            text: text.into(),
        }
    }

    /// Shipped kernel for a dialect and precision.
    pub fn builtin(dialect: KernelDialect, precision: Precision) -> Self {
        let (origin, text) = match (dialect, precision) {
            (KernelDialect::OpenClC, Precision::Single) => ("matmult_f32.cl", MATMULT_F32_CL),
            (KernelDialect::OpenClC, Precision::Double) => ("matmult_f64.cl", MATMULT_F64_CL),
            (KernelDialect::CudaC, Precision::Single) => ("matmult_f32.cu", MATMULT_F32_CU),
            (KernelDialect::CudaC, Precision::Double) => ("matmult_f64.cu", MATMULT_F64_CU),
        };
        Self::new(origin, text)
    }

    /// Load source from a file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ResourceError> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|source| ResourceError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(Self::new(path.display().to_string(), text))
    }

    pub fn origin(&self) -> &str {
        &self.origin
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    /// True if the source carries its own `#define BLOCK_SIZE`.
    pub fn defines_block_size(&self) -> bool {
        self.text.lines().any(is_block_size_define)
    }

    /// Source with `#define BLOCK_SIZE <tile_edge>` prepended.
    ///
    /// If the source already defines `BLOCK_SIZE`, a blank line of the same
    /// width is prepended instead, so build-log line numbers stay aligned
    /// either way.
    pub fn compile_unit(&self, tile_edge: usize) -> String {
        let define = format!("#define BLOCK_SIZE {}", tile_edge);
        let header = if self.defines_block_size() {
            log::debug!("{} defines BLOCK_SIZE itself; not injecting {}", self.origin, tile_edge);
            " ".repeat(define.len())
        } else {
            define
        };

        let mut unit = String::with_capacity(header.len() + 1 + self.text.len());
        unit.push_str(&header);
        unit.push('\n');
        unit.push_str(&self.text);
        unit
    }
}

fn is_block_size_define(line: &str) -> bool {
    block_size_define_value(line).is_some()
}

/// Value token of a `#define BLOCK_SIZE <value>` line, if `line` is one.
pub(crate) fn block_size_define_value(line: &str) -> Option<&str> {
    let rest = line.trim_start().strip_prefix('#')?;
    let rest = rest.trim_start().strip_prefix("define")?;
    if !rest.starts_with(char::is_whitespace) {
        return None;
    }
    let mut tokens = rest.split_whitespace();
    if tokens.next() != Some("BLOCK_SIZE") {
        return None;
    }
    Some(tokens.next().unwrap_or(""))
}
