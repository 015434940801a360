//! Support sources compiled into every artifact.
//!
//! `kernlink.h` defines the declaration marker, the `IN`/`OUT` buffer types and the
//! `KERNEL_LOOP`/`KERNEL_RUN` dispatch macros for the selected backend. `context.cpp`
//! exports `kernlink_set_device`, which the binder calls before accelerator launches.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use kernlink_codegen::SUPPORT_HEADER;
use snafu::{ResultExt, ensure};

use crate::error::{IoSnafu, MissingFileSnafu, Result};

/// Subdirectory of the build directory the embedded sources are written to.
pub const SUPPORT_SUBDIR: &str = "support";

/// Symbol exported by `context.cpp`.
pub const SET_DEVICE_SYMBOL: &str = "kernlink_set_device";

/// A support file shipped inside the crate.
#[derive(Debug, Clone, Copy)]
pub struct SupportFile {
    pub name: &'static str,
    pub contents: &'static str,
}

pub const HEADER: SupportFile = SupportFile { name: SUPPORT_HEADER, contents: include_str!("../support/kernlink.h") };

/// Translation units compiled next to every wrapper.
pub const SOURCES: &[SupportFile] =
    &[SupportFile { name: "context.cpp", contents: include_str!("../support/context.cpp") }];

/// Support material for one build.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SupportFiles {
    /// Directory passed as an include path.
    pub include_dir: PathBuf,
    /// Sources compiled with the wrapper.
    pub sources: Vec<PathBuf>,
    /// True when any embedded file was (re)written by this call.
    pub changed: bool,
}

/// Make the support files available for a build in `build_dir`.
///
/// With `external` set the files are taken from there and must exist. Otherwise the
/// embedded copies are written to `<build_dir>/support/`, touching only files whose
/// content differs.
pub fn prepare(build_dir: &Path, external: Option<&Path>) -> Result<SupportFiles> {
    if let Some(dir) = external {
        let header = dir.join(HEADER.name);
        ensure!(header.is_file(), MissingFileSnafu { what: "support header", path: header });
        let sources = SOURCES
            .iter()
            .map(|file| {
                let path = dir.join(file.name);
                ensure!(path.is_file(), MissingFileSnafu { what: "support source", path: path.clone() });
                Ok(path)
            })
            .collect::<Result<Vec<_>>>()?;
        return Ok(SupportFiles { include_dir: dir.to_path_buf(), sources, changed: false });
    }

    let dir = build_dir.join(SUPPORT_SUBDIR);
    fs::create_dir_all(&dir).context(IoSnafu { path: &dir })?;

    let mut changed = write_if_changed(&dir.join(HEADER.name), HEADER.contents)?;
    let mut sources = Vec::with_capacity(SOURCES.len());
    for file in SOURCES {
        let path = dir.join(file.name);
        changed |= write_if_changed(&path, file.contents)?;
        sources.push(path);
    }

    if changed {
        tracing::debug!(support.dir = %dir.display(), "materialized support sources");
    }
    Ok(SupportFiles { include_dir: dir, sources, changed })
}

/// Write `contents` to `path` unless the file already holds exactly that text.
///
/// The new content is written to a sibling temp file and renamed into place, so readers
/// never observe a partially written file. Returns whether the file was written.
pub fn write_if_changed(path: &Path, contents: &str) -> Result<bool> {
    if fs::read_to_string(path).is_ok_and(|existing| existing == contents) {
        return Ok(false);
    }

    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let mut tmp = tempfile::NamedTempFile::new_in(dir).context(IoSnafu { path: dir })?;
    tmp.write_all(contents.as_bytes()).context(IoSnafu { path: tmp.path() })?;
    tmp.persist(path).map_err(|e| e.error).context(IoSnafu { path })?;
    Ok(true)
}
