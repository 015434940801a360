//! Build and bind kernlink kernels.
//!
//! Takes the wrapper text produced by `kernlink-codegen`, compiles it into one shared
//! artifact per requested backend, loads the artifact, and exposes every kernel as a
//! typed, validated callable.
//!
//! # Pipeline
//!
//! ```ignore
//! use kernlink_runtime::{ArgValue, BuildConfig, Importer};
//!
//! let op = Importer::new(BuildConfig::from_env()).import("ops/add")?;
//! let (a, b, mut out) = (vec![1.0f32], vec![2.0f32], vec![0.0f32]);
//! unsafe { op.functions.call("add_forward", &[1.into(), (&a).into(), (&b).into(), (&mut out).into()])? };
//! ```
//!
//! # Incremental builds
//!
//! The generated wrapper doubles as the build record: an artifact is only recompiled when
//! the freshly generated wrapper differs from the one on disk, or when the artifact for a
//! requested backend is missing. Rewriting the embedded support sources also forces a
//! rebuild.

pub mod args;
pub mod binder;
pub mod builder;
pub mod config;
pub mod error;
pub mod library_cache;
pub mod lock;
pub mod operator;
pub mod pipeline;
pub mod support;
pub mod toolchain;


pub use args::{ArgValue, BufferArg, ScalarValue};
pub use binder::{Binder, BoundLibrary, FunctionBinding, FunctionTable, KernelFunction, UnboundFunction};
pub use builder::{BuildArtifact, BuildOutcome, Builder};
pub use config::BuildConfig;
pub use error::*;
pub use library_cache::LibraryCache;
pub use operator::OperatorDef;
pub use pipeline::{Compiled, ImportedOp, Importer, OpSources, import_op};
pub use toolchain::{CompileRequest, SystemToolchain, Toolchain};
