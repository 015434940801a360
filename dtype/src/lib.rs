//! Type vocabulary shared by every kernlink crate.
//!
//! - [`DType`]: element types a buffer may hold.
//! - [`ParamType`] / [`ReturnType`]: the closed set of types a kernel declaration may use.
//! - [`DeviceSpec`] / [`Backend`]: where a buffer lives and which artifact serves it.

pub mod ext;

#[cfg(test)]
pub mod test;

pub use ext::HasDType;

/// The only element type kernel buffers are allowed to carry.
///
/// `IN` and `OUT` are typedefs for `const float*` and `float*` in the support header.
pub const KERNEL_ELEMENT: DType = DType::Float32;

/// Element data types a host buffer can report.
///
/// Only [`KERNEL_ELEMENT`] reaches a kernel; the rest exist so a rejected buffer can be
/// named precisely.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[derive(strum::Display, strum::VariantArray)]
pub enum DType {
    Bool,
    Int8,
    UInt8,
    Int16,
    UInt16,
    Int32,
    UInt32,
    Int64,
    UInt64,
    Float32,
    Float64,
}

/// Parameter types a kernel declaration may use.
///
/// The string forms are the exact tokens accepted in native source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[derive(strum::EnumString, strum::AsRefStr, strum::Display, strum::VariantArray)]
pub enum ParamType {
    /// Scalar `int`, passed by value.
    #[strum(serialize = "int")]
    Int,
    /// Scalar `float`, passed by value.
    #[strum(serialize = "float")]
    Float,
    /// Read-only buffer (`const float*`).
    #[strum(serialize = "IN")]
    In,
    /// Writable buffer (`float*`).
    #[strum(serialize = "OUT")]
    Out,
}

/// Return types a kernel declaration may use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[derive(strum::EnumString, strum::AsRefStr, strum::Display, strum::VariantArray)]
pub enum ReturnType {
    #[default]
    #[strum(serialize = "void")]
    Void,
    #[strum(serialize = "int")]
    Int,
    #[strum(serialize = "float")]
    Float,
}

/// Execution backend. One shared artifact is compiled per backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[derive(strum::EnumString, strum::AsRefStr, strum::Display, strum::VariantArray)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum Backend {
    Cpu,
    Cuda,
}

impl Backend {
    /// Suffix appended to the source base name to form the artifact name.
    pub const fn suffix(&self) -> &'static str {
        match self {
            Self::Cpu => "cpu",
            Self::Cuda => "cuda",
        }
    }

    /// Preprocessor define that selects this backend in the support header.
    pub const fn define(&self) -> &'static str {
        match self {
            Self::Cpu => "KERNLINK_USE_CPU",
            Self::Cuda => "KERNLINK_USE_CUDA",
        }
    }

    pub const fn is_accelerator(&self) -> bool {
        !matches!(self, Self::Cpu)
    }
}

/// Where a buffer lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum DeviceSpec {
    /// Host memory.
    #[default]
    Cpu,
    /// CUDA device memory on the given ordinal.
    Cuda { device_id: usize },
}

impl DeviceSpec {
    pub const fn backend(&self) -> Backend {
        match self {
            Self::Cpu => Backend::Cpu,
            Self::Cuda { .. } => Backend::Cuda,
        }
    }

    /// Accelerator ordinal, `None` for host memory.
    pub const fn device_id(&self) -> Option<usize> {
        match self {
            Self::Cpu => None,
            Self::Cuda { device_id } => Some(*device_id),
        }
    }
}

impl std::fmt::Display for DeviceSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Cpu => write!(f, "CPU"),
            Self::Cuda { device_id } => write!(f, "CUDA:{device_id}"),
        }
    }
}
