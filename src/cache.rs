//! Library Cache
//!
//! Loads each distinct library name at most once. The whole
//! lookup-or-load sequence runs under one exclusive lock, so concurrent
//! first requests for the same name trigger a single platform load.
//! Entries are never removed.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, info};

use crate::error::{CalliError, CalliResult};
use crate::loader::{NativeLoader, NativeModule};

/// Opaque token for a loaded library.
///
/// Clones share the same module; two handles are equal when they refer to
/// the same loaded module.
#[derive(Clone)]
pub struct LibraryHandle {
    name: Arc<str>,
    module: Arc<dyn NativeModule>,
}

impl LibraryHandle {
    /// Name the library was requested under
    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn module(&self) -> &dyn NativeModule {
        self.module.as_ref()
    }
}

impl PartialEq for LibraryHandle {
    fn eq(&self, other: &Self) -> bool {
        std::ptr::addr_eq(Arc::as_ptr(&self.module), Arc::as_ptr(&other.module))
    }
}

impl Eq for LibraryHandle {}

impl fmt::Debug for LibraryHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LibraryHandle")
            .field("name", &self.name)
            .field("module", &Arc::as_ptr(&self.module).cast::<()>())
            .finish()
    }
}

/// Thread-safe, monotonic mapping from library name to loaded handle
pub struct LibraryCache {
    loader: Arc<dyn NativeLoader>,
    libraries: Mutex<HashMap<String, LibraryHandle>>,
    /// Emit load/bind diagnostics
    debug: AtomicBool,
}

impl LibraryCache {
    pub fn new(loader: Arc<dyn NativeLoader>) -> Self {
        Self {
            loader,
            libraries: Mutex::new(HashMap::new()),
            debug: AtomicBool::new(true),
        }
    }

    pub fn debug(&self) -> bool {
        self.debug.load(Ordering::Relaxed)
    }

    pub fn set_debug(&self, enabled: bool) {
        self.debug.store(enabled, Ordering::Relaxed);
    }

    /// Return the cached handle for `name`, loading the library on first use.
    ///
    /// A failed load is not cached; a later call retries the platform load.
    pub fn acquire(&self, name: &str) -> CalliResult<LibraryHandle> {
        if name.is_empty() {
            return Err(CalliError::empty_library_name());
        }

        let mut libraries = self.libraries.lock();

        if let Some(handle) = libraries.get(name) {
            debug!(library = name, "library cache hit");
            return Ok(handle.clone());
        }

        let module = self
            .loader
            .open(name)
            .map_err(|source| CalliError::LibraryNotFound {
                name: name.to_string(),
                source,
            })?;

        let handle = LibraryHandle {
            name: Arc::from(name),
            module,
        };
        libraries.insert(name.to_string(), handle.clone());

        if self.debug() {
            info!(library = name, "library loaded");
        }

        Ok(handle)
    }

    /// Cached handle for `name`, without loading
    pub fn get(&self, name: &str) -> Option<LibraryHandle> {
        self.libraries.lock().get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.libraries.lock().contains_key(name)
    }

    /// Names of all loaded libraries
    pub fn loaded_libraries(&self) -> Vec<String> {
        let mut names: Vec<String> = self.libraries.lock().keys().cloned().collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.libraries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.libraries.lock().is_empty()
    }
}

impl fmt::Debug for LibraryCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LibraryCache")
            .field("libraries", &self.loaded_libraries())
            .field("debug", &self.debug())
            .finish()
    }
}
