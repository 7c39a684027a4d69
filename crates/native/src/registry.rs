use std::{
    collections::HashMap,
    fmt,
    path::{Path, PathBuf},
    sync::{Arc, OnceLock},
};

use libloading::Library;
use parking_lot::Mutex;

use crate::{error::LoadError, platform};

type Entries = Arc<Mutex<HashMap<PathBuf, Entry>>>;

struct Entry {
    library: Arc<Library>,
    users: usize,
}

/// Reference-counted table of mapped shared libraries.
///
/// A binary is mapped at most once per registry. Each [`acquire`] adds a
/// user, each [`release`] removes one, and the last release unmaps it.
/// Registries are cheap to clone; clones share the same table.
///
/// [`acquire`]: LibraryRegistry::acquire
/// [`release`]: LibraryRegistry::release
#[derive(Clone, Default)]
pub struct LibraryRegistry {
    entries: Entries,
}

impl LibraryRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The process-wide registry.
    pub fn global() -> &'static LibraryRegistry {
        static GLOBAL: OnceLock<LibraryRegistry> = OnceLock::new();
        GLOBAL.get_or_init(LibraryRegistry::new)
    }

    /// Maps the library at `path`, or adds a user to an existing mapping.
    ///
    /// # Errors
    ///
    /// Returns [`LoadError::Missing`] if nothing exists at `path`,
    /// [`LoadError::IncompatibleArchitecture`] if the binary targets another
    /// platform, or [`LoadError::Open`] if the loader rejects it.
    pub fn acquire(&self, path: impl AsRef<Path>) -> Result<LibraryHandle, LoadError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(LoadError::Missing {
                path: path.to_path_buf(),
            });
        }
        let key = path.canonicalize().unwrap_or_else(|_| path.to_path_buf());

        let mut entries = self.entries.lock();
        if let Some(entry) = entries.get_mut(&key) {
            entry.users += 1;
            tracing::debug!(path = %key.display(), users = entry.users, "library reused");
            return Ok(LibraryHandle {
                path: key,
                library: Some(entry.library.clone()),
                entries: self.entries.clone(),
            });
        }

        if let Some(found) = platform::foreign_architecture(&key) {
            return Err(LoadError::IncompatibleArchitecture {
                path: key,
                found,
                host: platform::platform_tuple(),
            });
        }

        // SAFETY: loading runs the library's initializers. Component binaries
        // are trusted to the same degree as any native plugin.
        let library = unsafe { Library::new(&key) }.map_err(|source| LoadError::Open {
            path: key.clone(),
            source,
        })?;
        let library = Arc::new(library);
        entries.insert(
            key.clone(),
            Entry {
                library: library.clone(),
                users: 1,
            },
        );
        tracing::debug!(path = %key.display(), "library mapped");

        Ok(LibraryHandle {
            path: key,
            library: Some(library),
            entries: self.entries.clone(),
        })
    }

    /// Drops one user of the handle's library. Releasing twice is a no-op.
    pub fn release(&self, handle: &mut LibraryHandle) {
        handle.release();
    }

    /// Number of live handles for `path`; zero if it is not mapped.
    #[must_use]
    pub fn refcount(&self, path: impl AsRef<Path>) -> usize {
        let path = path.as_ref();
        let key = path.canonicalize().unwrap_or_else(|_| path.to_path_buf());
        self.entries.lock().get(&key).map_or(0, |e| e.users)
    }
}

impl fmt::Debug for LibraryRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let entries = self.entries.lock();
        f.debug_map()
            .entries(entries.iter().map(|(path, e)| (path, e.users)))
            .finish()
    }
}

/// One user's claim on a mapped library.
///
/// Released explicitly through [`LibraryRegistry::release`] or on drop.
pub struct LibraryHandle {
    path: PathBuf,
    library: Option<Arc<Library>>,
    entries: Entries,
}

impl LibraryHandle {
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    #[must_use]
    pub fn is_released(&self) -> bool {
        self.library.is_none()
    }

    pub(crate) fn library(&self) -> Option<&Library> {
        self.library.as_deref()
    }

    fn release(&mut self) {
        let Some(library) = self.library.take() else {
            return;
        };
        let mut entries = self.entries.lock();
        if let Some(entry) = entries.get_mut(&self.path) {
            entry.users = entry.users.saturating_sub(1);
            if entry.users == 0 {
                entries.remove(&self.path);
                tracing::debug!(path = %self.path.display(), "library unmapped");
            }
        }
        drop(entries);
        drop(library);
    }
}

impl Drop for LibraryHandle {
    fn drop(&mut self) {
        self.release();
    }
}

impl fmt::Debug for LibraryHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LibraryHandle")
            .field("path", &self.path)
            .field("released", &self.is_released())
            .finish()
    }
}

/// The C library mapped into the running test process.
///
/// Read from `/proc/self/maps`, so it is present whenever the tests run on
/// Linux against glibc. Tests using it are ignored on other targets.
#[cfg(test)]
pub(crate) fn system_library() -> PathBuf {
    #[cfg(all(target_os = "linux", target_env = "gnu"))]
    let found = std::fs::read_to_string("/proc/self/maps")
        .ok()
        .and_then(|maps| {
            maps.lines()
                .filter_map(|line| line.split_whitespace().nth(5))
                .find(|path| {
                    path.rsplit('/')
                        .next()
                        .is_some_and(|name| name.starts_with("libc.so") || name.starts_with("libc-"))
                })
                .map(PathBuf::from)
        });
    #[cfg(not(all(target_os = "linux", target_env = "gnu")))]
    let found: Option<PathBuf> = None;

    found.expect("no C library is mapped into the test process")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_binary_is_reported() {
        let registry = LibraryRegistry::new();
        let err = registry.acquire("/no/such/library.so").unwrap_err();
        assert!(matches!(err, LoadError::Missing { .. }));
    }

    #[test]
    #[cfg_attr(
        not(all(target_os = "linux", target_env = "gnu")),
        ignore = "needs a file-backed C library in the test process"
    )]
    fn library_is_mapped_once_and_released_idempotently() {
        let path = system_library();
        let registry = LibraryRegistry::new();

        let mut first = registry.acquire(&path).unwrap();
        let mut second = registry.acquire(&path).unwrap();
        assert_eq!(registry.refcount(&path), 2);

        registry.release(&mut first);
        registry.release(&mut first);
        assert!(first.is_released());
        assert_eq!(registry.refcount(&path), 1);

        registry.release(&mut second);
        assert_eq!(registry.refcount(&path), 0);
    }

    #[test]
    #[cfg_attr(
        not(all(target_os = "linux", target_env = "gnu")),
        ignore = "needs a file-backed C library in the test process"
    )]
    fn dropping_a_handle_releases_it() {
        let path = system_library();
        let registry = LibraryRegistry::new();
        {
            let _handle = registry.acquire(&path).unwrap();
            assert_eq!(registry.refcount(&path), 1);
        }
        assert_eq!(registry.refcount(&path), 0);
    }
}
