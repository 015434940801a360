//! Import pipeline: scan, generate, build, bind.
//!
//! An operator lives in a directory named after it:
//!
//! ```text
//! ops/add/
//! ├── add.cpp        native kernels (add.cu is accepted when add.cpp is absent)
//! ├── add.toml       companion operator description
//! └── build/         generated wrapper, artifacts, support sources, lock file
//! ```

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use kernlink_codegen::{GeneratedWrapper, KernelDeclaration, scan, wrapper};
use snafu::{OptionExt, ResultExt, ensure};

use crate::binder::{Binder, FunctionTable, UnboundFunction};
use crate::builder::{BuildArtifact, BuildOutcome, Builder};
use crate::config::BuildConfig;
use crate::error::{CodegenSnafu, Error, IoSnafu, MissingFileSnafu, Result};
use crate::library_cache::LibraryCache;
use crate::operator::OperatorDef;
use crate::toolchain::{SystemToolchain, Toolchain};

/// Native source extensions, in order of preference.
pub const NATIVE_EXTENSIONS: &[&str] = &["cpp", "cu"];

/// Companion description extension.
pub const COMPANION_EXTENSION: &str = "toml";

/// The files making up one operator directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpSources {
    pub name: String,
    pub dir: PathBuf,
    pub native: PathBuf,
    pub companion: PathBuf,
}

impl OpSources {
    /// Find the native source and companion description of the operator in `dir`.
    pub fn locate(dir: &Path) -> Result<Self> {
        ensure!(dir.is_dir(), MissingFileSnafu { what: "operator directory", path: dir });
        let dir = dir.canonicalize().context(IoSnafu { path: dir })?;
        let name = dir
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .context(MissingFileSnafu { what: "operator directory", path: &dir })?;

        let native = NATIVE_EXTENSIONS
            .iter()
            .map(|ext| dir.join(format!("{name}.{ext}")))
            .find(|path| path.is_file())
            .context(MissingFileSnafu { what: "native source", path: dir.join(format!("{name}.cpp")) })?;

        let companion = dir.join(format!("{name}.{COMPANION_EXTENSION}"));
        ensure!(companion.is_file(), MissingFileSnafu { what: "operator description", path: companion });

        Ok(Self { name, dir, native, companion })
    }
}

/// Output of the code generation and build steps for one native source.
#[derive(Debug, Clone)]
pub struct Compiled {
    pub declarations: Vec<KernelDeclaration>,
    pub wrapper: GeneratedWrapper,
    pub outcome: BuildOutcome,
}

/// A fully imported operator.
#[derive(Debug)]
pub struct ImportedOp {
    pub operator: OperatorDef,
    pub functions: FunctionTable,
    pub declarations: Vec<KernelDeclaration>,
    pub artifacts: Vec<BuildArtifact>,
    /// Declarations that failed to bind on some backend. The operator does not use them.
    pub unbound: Vec<UnboundFunction>,
}

/// Runs the import pipeline with one configuration, toolchain and library cache.
pub struct Importer<'c> {
    config: BuildConfig,
    toolchain: Arc<dyn Toolchain>,
    cache: &'c LibraryCache,
}

impl Importer<'static> {
    /// Importer using the system compilers and the process-wide library cache.
    pub fn new(config: BuildConfig) -> Self {
        let toolchain = Arc::new(SystemToolchain::new(&config));
        Self { config, toolchain, cache: LibraryCache::global() }
    }
}

impl<'c> Importer<'c> {
    pub fn with_toolchain(mut self, toolchain: Arc<dyn Toolchain>) -> Self {
        self.toolchain = toolchain;
        self
    }

    pub fn with_cache<'d>(self, cache: &'d LibraryCache) -> Importer<'d> {
        Importer { config: self.config, toolchain: self.toolchain, cache }
    }

    pub fn config(&self) -> &BuildConfig {
        &self.config
    }

    /// Scan `native`, generate its wrapper and bring its artifacts up to date.
    pub fn compile(&self, native: &Path) -> Result<Compiled> {
        ensure!(native.is_file(), MissingFileSnafu { what: "native source", path: native });
        let text = fs::read_to_string(native).context(IoSnafu { path: native })?;

        let scanned = scan(&text).context(CodegenSnafu { path: native })?;
        if scanned.declarations.is_empty() {
            tracing::warn!(source = %native.display(), "no kernel declarations found");
        }

        let wrapper = wrapper::render(&scanned.declarations, native, &text).context(CodegenSnafu { path: native })?;
        let builder = Builder::new(&self.config, self.toolchain.as_ref());
        let outcome = builder.build(native, &scanned.declarations, &wrapper)?;

        Ok(Compiled { declarations: scanned.declarations, wrapper, outcome })
    }

    /// Import the operator in `dir`.
    pub fn import(&self, dir: impl AsRef<Path>) -> Result<ImportedOp> {
        let sources = OpSources::locate(dir.as_ref())?;
        let operator = OperatorDef::load(&sources.companion, &sources.name)?;
        let compiled = self.compile(&sources.native)?;

        if compiled.outcome.rebuilt() > 0 {
            self.cache.prune();
        }

        let binder = Binder::new(self.cache);
        let mut functions = FunctionTable::new();
        let mut unbound = Vec::new();
        for artifact in &compiled.outcome.artifacts {
            let bound = binder.bind(artifact, &compiled.declarations)?;
            for binding in bound.bindings {
                functions.insert(binding);
            }
            unbound.extend(bound.errors);
        }

        if let Err(e) = operator.check(&functions) {
            // An entry point that failed to bind reports the binding failure.
            let failed = match &e {
                Error::UnknownFunction { name, .. } => unbound.iter().position(|u| &u.name == name),
                _ => None,
            };
            return Err(match failed {
                Some(i) => unbound.swap_remove(i).error,
                None => e,
            });
        }

        tracing::info!(
            operator = %operator.name,
            functions = functions.len(),
            unbound = unbound.len(),
            rebuilt = compiled.outcome.rebuilt(),
            "imported operator"
        );

        Ok(ImportedOp {
            operator,
            functions,
            declarations: compiled.declarations,
            artifacts: compiled.outcome.artifacts,
            unbound,
        })
    }
}

/// Import the operator in `dir` with configuration from the environment.
pub fn import_op(dir: impl AsRef<Path>) -> Result<ImportedOp> {
    Importer::new(BuildConfig::from_env()).import(dir)
}
