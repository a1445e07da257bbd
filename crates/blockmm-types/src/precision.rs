use std::fmt;

/// Floating-point precision of a matrix or a compiled kernel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Precision {
    /// 32-bit IEEE-754 (`float`).
    Single,
    /// 64-bit IEEE-754 (`double`).
    Double,
}

impl Precision {
    /// Size of one element in bytes.
    pub const fn size_of(self) -> usize {
        match self {
            Precision::Single => 4,
            Precision::Double => 8,
        }
    }

    /// Default absolute tolerance when comparing against the CPU reference.
    pub const fn default_tolerance(self) -> f64 {
        match self {
            Precision::Single => 1e-3,
            Precision::Double => 1e-6,
        }
    }

    /// Element type name in OpenCL C and CUDA C.
    pub const fn c_type(self) -> &'static str {
        match self {
            Precision::Single => "float",
            Precision::Double => "double",
        }
    }
}

impl fmt::Display for Precision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Precision::Single => write!(f, "f32"),
            Precision::Double => write!(f, "f64"),
        }
    }
}
