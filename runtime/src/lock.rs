//! Per-directory build lock.
//!
//! Generating the wrapper and compiling the artifacts of one source must not interleave
//! with another process doing the same, so the whole sequence runs under an exclusive
//! advisory lock on `build/.kernlink.lock`.

use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

use fs2::FileExt;
use snafu::ResultExt;

use crate::error::{LockSnafu, Result};

/// Lock file name inside the build directory.
pub const LOCK_FILE: &str = ".kernlink.lock";

/// Exclusive lock on a build directory, released on drop.
#[derive(Debug)]
pub struct BuildLock {
    file: File,
    path: PathBuf,
}

impl BuildLock {
    /// Block until the lock for `build_dir` is held.
    pub fn acquire(build_dir: &Path) -> Result<Self> {
        let path = build_dir.join(LOCK_FILE);
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)
            .context(LockSnafu { path: &path })?;

        file.lock_exclusive().context(LockSnafu { path: &path })?;
        tracing::trace!(lock = %path.display(), "acquired build lock");

        Ok(Self { file, path })
    }

    /// Take the lock only if nobody else holds it.
    pub fn try_acquire(build_dir: &Path) -> Result<Option<Self>> {
        let path = build_dir.join(LOCK_FILE);
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)
            .context(LockSnafu { path: &path })?;

        match file.try_lock_exclusive() {
            Ok(()) => Ok(Some(Self { file, path })),
            Err(e) if e.kind() == fs2::lock_contended_error().kind() => Ok(None),
            Err(e) => Err(e).context(LockSnafu { path }),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for BuildLock {
    fn drop(&mut self) {
        if let Err(e) = FileExt::unlock(&self.file) {
            tracing::warn!(lock = %self.path.display(), error = %e, "failed to release build lock");
        }
    }
}
