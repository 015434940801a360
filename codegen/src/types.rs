//! Types for declarations and generated code.

use std::path::PathBuf;

use kernlink_dtype::{ParamType, ReturnType};

use crate::INVOKE_PREFIX;

/// One typed parameter of a kernel declaration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Parameter {
    pub ty: ParamType,
    pub name: String,
}

impl Parameter {
    pub fn new(ty: ParamType, name: impl Into<String>) -> Self {
        Self { ty, name: name.into() }
    }
}

/// A kernel declaration discovered in native source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KernelDeclaration {
    /// Public function name (kernel name without the `_kernel` suffix).
    pub name: String,

    /// Name as declared in source.
    pub kernel_name: String,

    /// Parameters in declaration order.
    pub parameters: Vec<Parameter>,

    pub return_type: ReturnType,

    /// 1-based line the declaration starts on.
    pub line: usize,
}

impl KernelDeclaration {
    /// The parameter that sizes backend dispatch: always the first one.
    pub fn size_param(&self) -> Option<&Parameter> {
        self.parameters.first()
    }

    /// Symbol of the generated fixed-ABI trampoline.
    pub fn invoke_symbol(&self) -> String {
        format!("{INVOKE_PREFIX}{}", self.name)
    }

    pub fn param_types(&self) -> impl Iterator<Item = ParamType> + '_ {
        self.parameters.iter().map(|p| p.ty)
    }

    /// C-style signature, e.g. `void add_forward(IN a, IN b, OUT out)`.
    pub fn signature(&self) -> String {
        let params = self.parameters.iter().map(|p| format!("{} {}", p.ty, p.name)).collect::<Vec<_>>().join(", ");
        format!("{} {}({params})", self.return_type, self.name)
    }
}

/// Result of scanning one source file.
#[derive(Debug, Clone, Default)]
pub struct ScanOutput {
    /// Declarations in source order.
    pub declarations: Vec<KernelDeclaration>,

    /// Every line that was not part of a declaration, unchanged.
    pub passthrough: String,
}

/// Wrapper source ready to be written into the build directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedWrapper {
    /// Generated C++ text. Its exact content is the rebuild key.
    pub code: String,

    /// Where the wrapper belongs: `<source dir>/build/<stem>_wrapper.cpp`.
    pub path: PathBuf,

    /// xxh3 fingerprint of the native source the wrapper includes.
    pub source_fingerprint: u64,
}
