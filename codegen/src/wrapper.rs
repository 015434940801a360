//! C++ wrapper generation.
//!
//! For every declaration the wrapper contains two functions with C linkage:
//!
//! ```c
//! void add_forward(IN a, IN b, OUT out) {
//!     KERNEL_RUN(add_forward_kernel, a)(a, b, out);
//! }
//!
//! void kernlink_invoke_add_forward(void** args, void* ret) {
//!     (void)ret;
//!     add_forward(*static_cast<IN*>(args[0]), *static_cast<IN*>(args[1]), *static_cast<OUT*>(args[2]));
//! }
//! ```
//!
//! The first is the public forwarding function. The second gives the binder a single call
//! signature: `args[i]` points at the value of parameter `i` and `ret` at storage for the
//! return value.
//!
//! The native source is included by relative path rather than copied, and a fingerprint
//! of its content is recorded in a header comment so that editing a kernel body changes
//! the wrapper text.

use std::path::{Path, PathBuf};

use kernlink_dtype::ReturnType;

use crate::error::{MalformedDeclarationSnafu, Result};
use crate::{BUILD_DIR, GeneratedWrapper, KernelDeclaration, NAMESPACE, SUPPORT_HEADER};

/// Directory holding the generated wrapper and artifacts for `source`.
pub fn build_dir(source: &Path) -> PathBuf {
    source.parent().unwrap_or_else(|| Path::new("")).join(BUILD_DIR)
}

/// Base name used for every file generated from `source`.
pub fn source_stem(source: &Path) -> String {
    source.file_stem().map(|s| s.to_string_lossy().into_owned()).unwrap_or_default()
}

/// Location of the generated wrapper for `source`.
pub fn wrapper_path(source: &Path) -> PathBuf {
    build_dir(source).join(format!("{}_wrapper.cpp", source_stem(source)))
}

/// Content fingerprint of native source text.
pub fn fingerprint(source_text: &str) -> u64 {
    xxhash_rust::xxh3::xxh3_64(source_text.as_bytes())
}

/// Render the wrapper for `declarations` scanned out of `source`.
pub fn render(declarations: &[KernelDeclaration], source: &Path, source_text: &str) -> Result<GeneratedWrapper> {
    let source_name = source.file_name().map(|s| s.to_string_lossy().into_owned()).unwrap_or_default();
    let source_fingerprint = fingerprint(source_text);

    let mut code_lines: Vec<String> = Vec::new();

    code_lines.push(format!("// Generated by kernlink from {source_name}. Do not edit."));
    code_lines.push(format!("// source-fingerprint: {source_fingerprint:016x}"));
    code_lines.push(format!("#include \"{SUPPORT_HEADER}\""));
    code_lines.push(format!("#include \"../{source_name}\""));
    code_lines.push("".to_string());
    code_lines.push("extern \"C\" {".to_string());
    code_lines.push(format!("using namespace {NAMESPACE};"));

    for decl in declarations {
        code_lines.push("".to_string());
        render_forward(decl, &mut code_lines)?;
        code_lines.push("".to_string());
        render_invoke(decl, &mut code_lines);
    }

    code_lines.push("".to_string());
    code_lines.push("}".to_string());
    code_lines.push("".to_string());

    let code = code_lines.join("\n");
    let path = wrapper_path(source);

    tracing::debug!(
        wrapper.path = %path.display(),
        wrapper.kernels = declarations.len(),
        source.fingerprint = source_fingerprint,
        "rendered kernel wrapper"
    );

    Ok(GeneratedWrapper { code, path, source_fingerprint })
}

/// Public forwarding function: dispatches through `KERNEL_RUN`, sized by the first parameter.
fn render_forward(decl: &KernelDeclaration, code_lines: &mut Vec<String>) -> Result<()> {
    let size = decl.size_param().ok_or_else(|| {
        MalformedDeclarationSnafu {
            line: decl.line,
            reason: format!("kernel `{}` declares no parameters", decl.kernel_name),
        }
        .build()
    })?;

    let names = decl.parameters.iter().map(|p| p.name.as_str()).collect::<Vec<_>>().join(", ");
    let call = format!("KERNEL_RUN({}, {})({names})", decl.kernel_name, size.name);

    code_lines.push(format!("{} {{", decl.signature()));
    match decl.return_type {
        ReturnType::Void => code_lines.push(format!("    {call};")),
        _ => code_lines.push(format!("    return {call};")),
    }
    code_lines.push("}".to_string());
    Ok(())
}

/// Fixed-ABI trampoline that unpacks argument slots and calls the forwarding function.
fn render_invoke(decl: &KernelDeclaration, code_lines: &mut Vec<String>) {
    let args = decl
        .parameters
        .iter()
        .enumerate()
        .map(|(i, p)| format!("*static_cast<{}*>(args[{i}])", p.ty))
        .collect::<Vec<_>>()
        .join(", ");
    let call = format!("{}({args})", decl.name);

    code_lines.push(format!("void {}(void** args, void* ret) {{", decl.invoke_symbol()));
    match decl.return_type {
        ReturnType::Void => {
            code_lines.push("    (void)ret;".to_string());
            code_lines.push(format!("    {call};"));
        }
        ty => code_lines.push(format!("    *static_cast<{ty}*>(ret) = {call};")),
    }
    code_lines.push("}".to_string());
}
