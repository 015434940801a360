//! Process-wide cache of loaded kernel libraries.
//!
//! Loading the same image twice would map it twice and split any static state the
//! kernels keep, so every load goes through a [`LibraryCache`] keyed by the image's
//! canonical path. Uses papaya's lock-free HashMap for thread-safe access.
//!
//! Libraries live until the cache forgets them and the last binding holding them is dropped.

use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};

use libloading::Library;
use papaya::{Compute, HashMap, Operation};
use snafu::ResultExt;

use crate::error::{IoSnafu, LibraryLoadSnafu, Result};

/// Loaded shared libraries keyed by canonical path.
#[derive(Default)]
pub struct LibraryCache {
    libraries: HashMap<PathBuf, Arc<Library>>,
}

static GLOBAL: OnceLock<LibraryCache> = OnceLock::new();

impl LibraryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cache shared by every importer that was not given its own.
    pub fn global() -> &'static LibraryCache {
        GLOBAL.get_or_init(LibraryCache::new)
    }

    /// Get the library at `path`, loading it on first use.
    ///
    /// If multiple threads load the same path concurrently, one library wins and every
    /// caller receives it.
    pub fn get_or_load(&self, path: &Path) -> Result<Arc<Library>> {
        let key = path.canonicalize().context(IoSnafu { path })?;
        let guard = self.libraries.guard();

        // Fast path: library already loaded
        if let Some(lib) = self.libraries.get(&key, &guard) {
            return Ok(Arc::clone(lib));
        }

        // SAFETY: kernlink artifacts have no load-time initializers beyond the C++ runtime's.
        let loaded = Arc::new(unsafe { Library::new(&key) }.context(LibraryLoadSnafu { path: &key })?);
        tracing::debug!(library = %key.display(), "loaded kernel library");

        match self.libraries.compute(
            key,
            |entry| match entry {
                Some((_, existing)) => Operation::Abort(Arc::clone(existing)),
                None => Operation::Insert(Arc::clone(&loaded)),
            },
            &guard,
        ) {
            Compute::Inserted(_, lib) => Ok(Arc::clone(lib)),
            Compute::Aborted(lib) => Ok(lib),
            _ => Ok(loaded),
        }
    }

    /// Whether the library at `path` is loaded.
    pub fn contains(&self, path: &Path) -> bool {
        path.canonicalize().is_ok_and(|key| self.libraries.pin().contains_key(&key))
    }

    pub fn len(&self) -> usize {
        self.libraries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.libraries.is_empty()
    }

    /// Forget libraries whose file has been removed, returning how many were dropped.
    ///
    /// Existing bindings keep them mapped.
    pub fn prune(&self) -> usize {
        let mut pruned = 0;
        let guard = self.libraries.guard();
        self.libraries.retain(
            |path, _| {
                let keep = path.exists();
                if !keep {
                    tracing::debug!(library = %path.display(), "forgot removed kernel library");
                    pruned += 1;
                }
                keep
            },
            &guard,
        );
        pruned
    }

    /// Forget every loaded library.
    ///
    /// This is primarily useful for testing to ensure test isolation.
    pub fn clear(&self) {
        let guard = self.libraries.guard();
        self.libraries.clear(&guard);
    }
}
