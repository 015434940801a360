//! Kernel declaration scanning and wrapper generation.
//!
//! This crate turns native source into the text the build step compiles:
//!
//! - **Scanner** (`scan`): finds `KERNLINK_KERNEL` declarations and types their parameters
//! - **Wrapper** (`wrapper`): emits `extern "C"` forwarding functions plus a fixed-ABI
//!   invoke trampoline per kernel
//!
//! # Usage
//!
//! ```ignore
//! use kernlink_codegen::{scan, wrapper};
//!
//! let scanned = scan::scan(&source_text)?;
//! let generated = wrapper::render(&scanned.declarations, &source_path, &source_text)?;
//! ```

pub mod error;
pub mod scan;
pub mod types;
pub mod wrapper;


pub use error::*;
pub use scan::scan;
pub use types::*;

/// Token that opens a kernel declaration line.
pub const KERNEL_MARKER: &str = "KERNLINK_KERNEL";

/// Required suffix of every declared kernel name.
pub const KERNEL_SUFFIX: &str = "_kernel";

/// Prefix of the generated fixed-ABI trampoline for each kernel.
pub const INVOKE_PREFIX: &str = "kernlink_invoke_";

/// Namespace the support header opens and the wrapper imports.
pub const NAMESPACE: &str = "kernlink";

/// Support header included ahead of the kernel source.
pub const SUPPORT_HEADER: &str = "kernlink.h";

/// Build directory created next to each native source.
pub const BUILD_DIR: &str = "build";
