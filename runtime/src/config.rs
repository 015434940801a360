//! Build configuration.
//!
//! Provides typed configuration for the build orchestrator with a bon builder, plus
//! environment variable fallbacks for the native toolchains.

use std::path::PathBuf;
use std::str::FromStr;

use bon::bon;
use kernlink_dtype::Backend;

use crate::error::{InvalidConfigSnafu, Result};

/// Default host C++ compiler.
pub const DEFAULT_CXX: &str = "c++";

/// Default CUDA compiler driver.
pub const DEFAULT_NVCC: &str = "nvcc";

/// Settings shared by every build of a pipeline run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildConfig {
    /// Backends to build, in order. Artifacts of other backends are removed on rebuild.
    pub backends: Vec<Backend>,
    /// Host C++ compiler.
    pub cxx: String,
    /// CUDA compiler driver.
    pub nvcc: String,
    /// Extra flags passed to the host compiler.
    pub cxx_flags: Vec<String>,
    /// Extra flags passed to nvcc.
    pub nvcc_flags: Vec<String>,
    /// Directory holding `kernlink.h` and `context.cpp`. When unset the embedded copies are
    /// materialized into each build directory.
    pub support_dir: Option<PathBuf>,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            backends: vec![Backend::Cpu],
            cxx: DEFAULT_CXX.to_string(),
            nvcc: DEFAULT_NVCC.to_string(),
            cxx_flags: Vec::new(),
            nvcc_flags: Vec::new(),
            support_dir: None,
        }
    }
}

#[bon]
impl BuildConfig {
    /// Create a build configuration with builder pattern.
    #[builder]
    pub fn new(
        #[builder(default = vec![Backend::Cpu])] backends: Vec<Backend>,
        #[builder(default = DEFAULT_CXX.to_string())] cxx: String,
        #[builder(default = DEFAULT_NVCC.to_string())] nvcc: String,
        #[builder(default)] cxx_flags: Vec<String>,
        #[builder(default)] nvcc_flags: Vec<String>,
        support_dir: Option<PathBuf>,
    ) -> Self {
        Self { backends, cxx, nvcc, cxx_flags, nvcc_flags, support_dir }
    }

    /// Create configuration from environment variables.
    ///
    /// # Environment Variables
    ///
    /// * `KERNLINK_BACKENDS` - Comma separated backends, e.g. `cpu,cuda` (default: `cpu`)
    /// * `KERNLINK_CXX` - Host C++ compiler (default: `c++`)
    /// * `KERNLINK_NVCC` - CUDA compiler driver (default: `nvcc`)
    /// * `KERNLINK_CXXFLAGS` - Extra whitespace separated host compiler flags
    /// * `KERNLINK_NVCCFLAGS` - Extra whitespace separated nvcc flags
    /// * `KERNLINK_SUPPORT_DIR` - External directory with the support sources
    pub fn from_env() -> Self {
        let backends = std::env::var("KERNLINK_BACKENDS")
            .ok()
            .and_then(|s| match parse_backends(&s) {
                Ok(backends) => Some(backends),
                Err(e) => {
                    tracing::warn!(error = %e, "ignoring KERNLINK_BACKENDS");
                    None
                }
            })
            .unwrap_or_else(|| vec![Backend::Cpu]);
        let cxx = std::env::var("KERNLINK_CXX").unwrap_or_else(|_| DEFAULT_CXX.to_string());
        let nvcc = std::env::var("KERNLINK_NVCC").unwrap_or_else(|_| DEFAULT_NVCC.to_string());
        let cxx_flags = split_flags(std::env::var("KERNLINK_CXXFLAGS").ok());
        let nvcc_flags = split_flags(std::env::var("KERNLINK_NVCCFLAGS").ok());
        let support_dir = std::env::var_os("KERNLINK_SUPPORT_DIR").map(PathBuf::from);

        Self { backends, cxx, nvcc, cxx_flags, nvcc_flags, support_dir }
    }

    /// Requested backends with duplicates removed, first occurrence wins.
    pub fn requested_backends(&self) -> Vec<Backend> {
        let mut out: Vec<Backend> = Vec::with_capacity(self.backends.len());
        for backend in &self.backends {
            if !out.contains(backend) {
                out.push(*backend);
            }
        }
        out
    }

    /// Reject configurations no build could satisfy.
    pub fn validate(&self) -> Result<()> {
        if self.backends.is_empty() {
            return InvalidConfigSnafu { reason: "no backends requested" }.fail();
        }
        if self.cxx.trim().is_empty() {
            return InvalidConfigSnafu { reason: "host compiler is empty" }.fail();
        }
        if self.backends.contains(&Backend::Cuda) && self.nvcc.trim().is_empty() {
            return InvalidConfigSnafu { reason: "cuda backend requested but nvcc is empty" }.fail();
        }
        Ok(())
    }
}

/// Parse a comma separated backend list such as `cpu, CUDA`.
pub fn parse_backends(list: &str) -> Result<Vec<Backend>> {
    let backends = list
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            Backend::from_str(s).map_err(|_| InvalidConfigSnafu { reason: format!("unknown backend `{s}`") }.build())
        })
        .collect::<Result<Vec<_>>>()?;
    if backends.is_empty() {
        return InvalidConfigSnafu { reason: "empty backend list" }.fail();
    }
    Ok(backends)
}

fn split_flags(flags: Option<String>) -> Vec<String> {
    flags.map(|s| s.split_whitespace().map(str::to_string).collect()).unwrap_or_default()
}
