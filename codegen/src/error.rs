//! Error types for declaration scanning and code generation.

use snafu::Snafu;

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Errors raised while scanning declarations or rendering wrappers.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum Error {
    /// A declaration that cannot be parsed: unterminated or unbalanced parentheses,
    /// missing names, or an unusable parameter list.
    #[snafu(display("line {line}: malformed kernel declaration: {reason}"))]
    MalformedDeclaration { line: usize, reason: String },

    /// Kernel name does not follow the `<name>_kernel` convention.
    #[snafu(display(
        "line {line}: the name of a kernel must end with `{suffix}`, e.g. add_forward{suffix}, got `{name}`"
    ))]
    MissingSuffix { line: usize, name: String, suffix: &'static str },

    /// Parameter or return type outside the supported set.
    #[snafu(display("line {line}: unsupported type: `{ty}`"))]
    UnsupportedType { line: usize, ty: String },
}

impl Error {
    /// Source line the error refers to.
    pub fn line(&self) -> usize {
        match self {
            Self::MalformedDeclaration { line, .. }
            | Self::MissingSuffix { line, .. }
            | Self::UnsupportedType { line, .. } => *line,
        }
    }
}
