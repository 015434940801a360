//! Error types for building, binding and calling kernels.

use std::path::PathBuf;

use kernlink_dtype::{Backend, DType, DeviceSpec, ParamType};
use snafu::Snafu;

/// Result type for runtime operations.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Errors that can occur while importing or calling kernels.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum Error {
    /// A file the source convention requires is absent.
    #[snafu(display("{what} not found: {}", path.display()))]
    MissingFile { what: &'static str, path: PathBuf },

    #[snafu(display("I/O error on {}: {source}", path.display()))]
    Io { path: PathBuf, source: std::io::Error },

    /// Scanning or wrapper generation failed.
    #[snafu(display("{}: {source}", path.display()))]
    Codegen { path: PathBuf, source: kernlink_codegen::Error },

    #[snafu(display("Failed to run {program}: {source}. Is it installed?"))]
    ToolchainSpawn { program: String, source: std::io::Error },

    /// The native toolchain rejected the sources.
    #[snafu(display("{backend} build of {} failed ({status}):\n{diagnostics}", artifact.display()))]
    BuildFailed { backend: Backend, artifact: PathBuf, status: String, diagnostics: String },

    /// Accelerator dispatch needs an `int` launch size as the first parameter.
    #[snafu(display(
        "kernel `{kernel}` cannot be built for {backend}: its first parameter `{param}` must be an `int` launch size"
    ))]
    LaunchSize { kernel: String, backend: Backend, param: String },

    #[snafu(display("Failed to lock build directory {}: {source}", path.display()))]
    Lock { path: PathBuf, source: std::io::Error },

    #[snafu(display("Failed to load shared library {}: {source}", path.display()))]
    LibraryLoad { path: PathBuf, source: libloading::Error },

    /// Function not found in a loaded artifact.
    #[snafu(display("Function '{name}' not found in {}: {source}", path.display()))]
    SymbolNotFound { name: String, path: PathBuf, source: libloading::Error },

    #[snafu(display("{function}() takes {expected} arguments, got {actual}"))]
    ArityMismatch { function: String, expected: usize, actual: usize },

    #[snafu(display("{function}(): argument {index} (`{param}`) expects {expected}, got {actual}"))]
    TypeMismatch { function: String, index: usize, param: String, expected: ParamType, actual: &'static str },

    #[snafu(display(
        "{function}(): argument {index} (`{param}`) holds {dtype} elements, only {supported} buffers are supported"
    ))]
    UnsupportedElement { function: String, index: usize, param: String, dtype: DType, supported: DType },

    /// Buffers passed to one call live on different devices.
    #[snafu(display("{function}(): `{first_param}` is on {first} but `{param}` is on {device}"))]
    DeviceMismatch { function: String, first_param: String, first: DeviceSpec, param: String, device: DeviceSpec },

    #[snafu(display("{function}(): no {backend} artifact was built, cannot run on {device}"))]
    BackendNotBuilt { function: String, backend: Backend, device: DeviceSpec },

    /// A binding was called with buffers that belong to another backend.
    #[snafu(display("{function}(): bound to the {backend} artifact but the buffers are on {device}"))]
    BackendMismatch { function: String, backend: Backend, device: DeviceSpec },

    /// The accelerator ordinal cannot be passed to `kernlink_set_device`.
    #[snafu(display("{function}(): device ordinal of {device} does not fit a C int"))]
    DeviceOrdinal { function: String, device: DeviceSpec },

    #[snafu(display("No function named `{name}` is bound (available: {available})"))]
    FunctionNotBound { name: String, available: String },

    #[snafu(display("Failed to parse operator description {}: {source}", path.display()))]
    CompanionParse { path: PathBuf, source: toml::de::Error },

    #[snafu(display("Operator `{operator}` refers to unknown function `{name}` (available: {available})"))]
    UnknownFunction { operator: String, name: String, available: String },

    #[snafu(display("Invalid configuration: {reason}"))]
    InvalidConfig { reason: String },
}
