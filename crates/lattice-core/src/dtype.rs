use std::fmt;

// DType — Element types understood by the runtime seam
//
// Buffers carry a DType so a runtime can store them at the right precision:
//
//   F16  — 16-bit IEEE half float
//   BF16 — 16-bit brain float
//   F32  — 32-bit float, the default
//   F64  — 64-bit float
//
// Host-side data always crosses the seam as f64; `quantize` rounds a value
// to what the dtype can actually represent.

/// Enum of all supported element data types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum DType {
    F16,
    BF16,
    #[default]
    F32,
    F64,
}

impl DType {
    /// Size of one element in bytes.
    pub fn size_in_bytes(&self) -> usize {
        match self {
            DType::F16 | DType::BF16 => 2,
            DType::F32 => 4,
            DType::F64 => 8,
        }
    }

    /// Round `v` to the nearest value representable in this dtype.
    pub fn quantize(&self, v: f64) -> f64 {
        match self {
            DType::F16 => half::f16::from_f64(v).to_f64(),
            DType::BF16 => half::bf16::from_f64(v).to_f64(),
            DType::F32 => v as f32 as f64,
            DType::F64 => v,
        }
    }

    /// The wider of two dtypes; used as the result type of binary kernels.
    pub fn promote(self, other: DType) -> DType {
        if self.size_in_bytes() >= other.size_in_bytes() {
            self
        } else {
            other
        }
    }
}

impl fmt::Display for DType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DType::F16 => "f16",
            DType::BF16 => "bf16",
            DType::F32 => "f32",
            DType::F64 => "f64",
        };
        write!(f, "{}", s)
    }
}
