//! Incremental build orchestration.
//!
//! For one native source the orchestrator:
//!
//! 1. takes the build directory lock,
//! 2. materializes the support sources,
//! 3. compares the freshly generated wrapper with the one on disk,
//! 4. compiles every requested backend whose artifact is stale or missing.
//!
//! Artifacts are compiled to a temp file in the build directory and renamed into place,
//! so an interrupted or failed build never leaves a truncated library behind.
//!
//! The dynamic loader returns the already mapped image for a path it has loaded before,
//! so artifacts are never loaded from their build path. Each one is copied to an image
//! named after its content hash (`<stem>_<backend>-<xxh3>.<ext>`) and the binder loads that.

use std::env::consts::DLL_EXTENSION;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use kernlink_codegen::wrapper::{build_dir, source_stem};
use kernlink_codegen::{GeneratedWrapper, KernelDeclaration};
use kernlink_dtype::{Backend, ParamType};
use snafu::ResultExt;
use strum::VariantArray;
use xxhash_rust::xxh3::xxh3_64;

use crate::config::BuildConfig;
use crate::error::{IoSnafu, LaunchSizeSnafu, Result};
use crate::lock::BuildLock;
use crate::support;
use crate::toolchain::{CompileRequest, Toolchain};

/// A compiled shared library for one (source, backend) pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildArtifact {
    pub source: PathBuf,
    pub backend: Backend,
    pub path: PathBuf,
    /// Content-addressed copy of `path` that gets loaded.
    pub image: PathBuf,
    /// True when this build compiled the artifact, false when it was up to date.
    pub rebuilt: bool,
}

/// Result of building one source.
#[derive(Debug, Clone)]
pub struct BuildOutcome {
    pub wrapper: PathBuf,
    /// Whether the wrapper on disk was replaced.
    pub wrapper_changed: bool,
    /// One artifact per requested backend, in request order.
    pub artifacts: Vec<BuildArtifact>,
}

impl BuildOutcome {
    pub fn artifact(&self, backend: Backend) -> Option<&BuildArtifact> {
        self.artifacts.iter().find(|a| a.backend == backend)
    }

    /// Number of artifacts compiled by this build.
    pub fn rebuilt(&self) -> usize {
        self.artifacts.iter().filter(|a| a.rebuilt).count()
    }
}

/// Location of the artifact built from `source` for `backend`.
pub fn artifact_path(source: &Path, backend: Backend) -> PathBuf {
    build_dir(source).join(format!("{}_{}.{DLL_EXTENSION}", source_stem(source), backend.suffix()))
}

fn image_prefix(source: &Path, backend: Backend) -> String {
    format!("{}_{}-", source_stem(source), backend.suffix())
}

/// Drives wrapper persistence and compilation through a [`Toolchain`].
pub struct Builder<'a> {
    config: &'a BuildConfig,
    toolchain: &'a dyn Toolchain,
}

impl<'a> Builder<'a> {
    pub fn new(config: &'a BuildConfig, toolchain: &'a dyn Toolchain) -> Self {
        Self { config, toolchain }
    }

    /// Bring the artifacts of `source` up to date with `wrapper`.
    ///
    /// `declarations` are the ones `wrapper` was rendered from.
    pub fn build(
        &self,
        source: &Path,
        declarations: &[KernelDeclaration],
        wrapper: &GeneratedWrapper,
    ) -> Result<BuildOutcome> {
        self.config.validate()?;
        let backends = self.config.requested_backends();
        for backend in &backends {
            check_launch_size(declarations, *backend)?;
        }

        let dir = build_dir(source);
        fs::create_dir_all(&dir).context(IoSnafu { path: &dir })?;
        let _lock = BuildLock::acquire(&dir)?;

        let support = support::prepare(&dir, self.config.support_dir.as_deref())?;

        let wrapper_changed = support::write_if_changed(&wrapper.path, &wrapper.code)?;
        if wrapper_changed {
            tracing::debug!(wrapper = %wrapper.path.display(), "wrapper changed");
            remove_unrequested(source, &backends)?;
        }

        let mut sources = Vec::with_capacity(1 + support.sources.len());
        sources.push(wrapper.path.clone());
        sources.extend(support.sources.iter().cloned());
        let include_dirs = vec![support.include_dir.clone()];

        let mut artifacts = Vec::with_capacity(backends.len());
        for backend in backends {
            let path = artifact_path(source, backend);
            let stale = wrapper_changed || support.changed || !path.is_file();

            if stale {
                let request = CompileRequest { backend, sources: &sources, include_dirs: &include_dirs, output: &path };
                if let Err(e) = self.compile_atomic(&dir, &request) {
                    // Forget the wrapper so the next run compiles again instead of trusting it.
                    discard(&wrapper.path);
                    return Err(e);
                }
            } else {
                tracing::debug!(backend = %backend, artifact = %path.display(), "artifact up to date");
            }

            let image = stage_image(&dir, &path, &image_prefix(source, backend))?;
            artifacts.push(BuildArtifact { source: source.to_path_buf(), backend, path, image, rebuilt: stale });
        }

        Ok(BuildOutcome { wrapper: wrapper.path.clone(), wrapper_changed, artifacts })
    }

    /// Compile into a temp file inside `dir`, then rename it over `request.output`.
    fn compile_atomic(&self, dir: &Path, request: &CompileRequest<'_>) -> Result<()> {
        let tmp = tempfile::Builder::new()
            .prefix(".kernlink-")
            .suffix(&format!(".{DLL_EXTENSION}"))
            .tempfile_in(dir)
            .context(IoSnafu { path: dir })?
            .into_temp_path();

        self.toolchain.compile(&CompileRequest { output: &tmp, ..request.clone() })?;

        tmp.persist(request.output).map_err(|e| e.error).context(IoSnafu { path: request.output })?;
        tracing::info!(backend = %request.backend, artifact = %request.output.display(), "built kernel artifact");
        Ok(())
    }
}

/// Accelerator launches are sized by the first parameter, which must be an `int`.
fn check_launch_size(declarations: &[KernelDeclaration], backend: Backend) -> Result<()> {
    if !backend.is_accelerator() {
        return Ok(());
    }
    for decl in declarations {
        if let Some(first) = decl.size_param()
            && first.ty != ParamType::Int
        {
            return LaunchSizeSnafu { kernel: &decl.kernel_name, backend, param: &first.name }.fail();
        }
    }
    Ok(())
}

/// Copy `artifact` to `<prefix><xxh3 of its bytes>.<ext>` and remove older images.
fn stage_image(dir: &Path, artifact: &Path, prefix: &str) -> Result<PathBuf> {
    let bytes = fs::read(artifact).context(IoSnafu { path: artifact })?;
    let image = dir.join(format!("{prefix}{:016x}.{DLL_EXTENSION}", xxh3_64(&bytes)));

    if !image.is_file() {
        let mut tmp = tempfile::Builder::new().prefix(".kernlink-").tempfile_in(dir).context(IoSnafu { path: dir })?;
        tmp.write_all(&bytes).context(IoSnafu { path: tmp.path() })?;
        tmp.persist(&image).map_err(|e| e.error).context(IoSnafu { path: &image })?;
        tracing::debug!(artifact = %artifact.display(), image = %image.display(), "staged loadable image");
    }

    remove_images(dir, prefix, Some(&image));
    Ok(image)
}

/// Remove every image in `dir` named with `prefix` except `keep`.
///
/// Some platforms refuse to delete a mapped library; such an image stays on disk.
fn remove_images(dir: &Path, prefix: &str, keep: Option<&Path>) {
    let Ok(entries) = fs::read_dir(dir) else { return };
    for path in entries.filter_map(|e| e.ok()).map(|e| e.path()) {
        let matches = path.file_name().is_some_and(|n| n.to_string_lossy().starts_with(prefix));
        if !matches || keep == Some(path.as_path()) {
            continue;
        }
        match fs::remove_file(&path) {
            Ok(()) => tracing::debug!(image = %path.display(), "removed superseded image"),
            Err(e) => tracing::warn!(image = %path.display(), error = %e, "failed to remove superseded image"),
        }
    }
}

/// Remove artifacts of backends this run does not build; they no longer match the wrapper.
fn remove_unrequested(source: &Path, requested: &[Backend]) -> Result<()> {
    for backend in Backend::VARIANTS.iter().filter(|b| !requested.contains(b)) {
        remove_images(&build_dir(source), &image_prefix(source, *backend), None);
        let path = artifact_path(source, *backend);
        match fs::remove_file(&path) {
            Ok(()) => tracing::debug!(artifact = %path.display(), "removed stale artifact"),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(e).context(IoSnafu { path }),
        }
    }
    Ok(())
}

fn discard(path: &Path) {
    if let Err(e) = fs::remove_file(path)
        && e.kind() != io::ErrorKind::NotFound
    {
        tracing::warn!(path = %path.display(), error = %e, "failed to remove wrapper after failed build");
    }
}
