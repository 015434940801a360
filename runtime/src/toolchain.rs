//! Native toolchains.
//!
//! The build orchestrator only needs "compile these sources into this shared artifact for
//! this backend"; [`Toolchain`] is that seam. [`SystemToolchain`] shells out to a host C++
//! compiler for the CPU backend and to `nvcc` for CUDA.

use std::path::{Path, PathBuf};
use std::process::Command;

use kernlink_dtype::Backend;
use snafu::ResultExt;

use crate::config::BuildConfig;
use crate::error::{BuildFailedSnafu, Result, ToolchainSpawnSnafu};

/// One shared-library compilation.
#[derive(Debug, Clone)]
pub struct CompileRequest<'a> {
    pub backend: Backend,
    /// Translation units, the generated wrapper first.
    pub sources: &'a [PathBuf],
    pub include_dirs: &'a [PathBuf],
    /// Where the shared library must be written.
    pub output: &'a Path,
}

/// Compiles sources into a loadable shared library.
pub trait Toolchain: Send + Sync {
    /// Compile `request.sources` into `request.output`.
    ///
    /// On failure the returned error carries the toolchain's diagnostics.
    fn compile(&self, request: &CompileRequest<'_>) -> Result<()>;
}

/// Toolchain that invokes compilers found on the system.
#[derive(Debug, Clone)]
pub struct SystemToolchain {
    cxx: String,
    nvcc: String,
    cxx_flags: Vec<String>,
    nvcc_flags: Vec<String>,
}

impl SystemToolchain {
    pub fn new(config: &BuildConfig) -> Self {
        Self {
            cxx: config.cxx.clone(),
            nvcc: config.nvcc.clone(),
            cxx_flags: config.cxx_flags.clone(),
            nvcc_flags: config.nvcc_flags.clone(),
        }
    }

    /// Compiler program used for `backend`.
    pub fn program(&self, backend: Backend) -> &str {
        match backend {
            Backend::Cpu => &self.cxx,
            Backend::Cuda => &self.nvcc,
        }
    }

    /// Full command line for `request`.
    pub fn command(&self, request: &CompileRequest<'_>) -> Command {
        let mut cmd = Command::new(self.program(request.backend));

        match request.backend {
            Backend::Cpu => {
                cmd.args(["-shared", "-fPIC", "-O3", "-std=c++14"]);
                cmd.args(&self.cxx_flags);
            }
            Backend::Cuda => {
                cmd.args(["-shared", "-Xcompiler", "-fPIC", "-O3", "-std=c++14", "-x", "cu"]);
                cmd.args(&self.nvcc_flags);
            }
        }

        cmd.arg(format!("-D{}", request.backend.define()));
        for dir in request.include_dirs {
            cmd.arg("-I").arg(dir);
        }
        cmd.arg("-o").arg(request.output);
        cmd.args(request.sources);
        cmd
    }
}

impl Toolchain for SystemToolchain {
    fn compile(&self, request: &CompileRequest<'_>) -> Result<()> {
        let program = self.program(request.backend);
        let mut cmd = self.command(request);

        tracing::info!(
            backend = %request.backend,
            output = %request.output.display(),
            sources = request.sources.len(),
            "compiling kernel artifact"
        );
        tracing::debug!(command = ?cmd, "toolchain command");

        let output = cmd.output().context(ToolchainSpawnSnafu { program })?;

        if !output.status.success() {
            let mut diagnostics = String::from_utf8_lossy(&output.stderr).into_owned();
            let stdout = String::from_utf8_lossy(&output.stdout);
            if !stdout.trim().is_empty() {
                diagnostics.push_str(&stdout);
            }
            return BuildFailedSnafu {
                backend: request.backend,
                artifact: request.output,
                status: output.status.to_string(),
                diagnostics,
            }
            .fail();
        }

        Ok(())
    }
}

/// Whether `program` can be spawned at all.
pub fn is_available(program: &str) -> bool {
    Command::new(program).arg("--version").output().is_ok_and(|out| out.status.success())
}
