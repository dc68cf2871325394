//! Binder Context
//!
//! Owns the library cache and the debug flag for one binding domain. One
//! context per process gives the usual "each library loaded once"
//! guarantee; separate contexts are fully independent.

use std::sync::Arc;

use crate::cache::{LibraryCache, LibraryHandle};
use crate::config::CalliConfig;
use crate::error::CalliResult;
use crate::loader::{NativeLoader, SystemLoader};

/// Library cache plus diagnostics flag
#[derive(Debug)]
pub struct BindContext {
    cache: LibraryCache,
}

impl BindContext {
    /// Context over an arbitrary loader
    pub fn new(loader: Arc<dyn NativeLoader>) -> Self {
        Self {
            cache: LibraryCache::new(loader),
        }
    }

    /// Context over the platform loader with default search paths
    pub fn system() -> Self {
        Self::new(Arc::new(SystemLoader::new()))
    }

    /// Context over the platform loader configured from `calli.toml`
    pub fn from_config(config: &CalliConfig) -> Self {
        let mut loader = SystemLoader::new();
        for path in &config.loader.search_paths {
            loader.add_search_path(path);
        }
        for (name, target) in &config.libraries {
            loader.add_alias(name.clone(), target.clone());
        }

        let context = Self::new(Arc::new(loader));
        context.set_debug(config.debug);
        context
    }

    pub fn cache(&self) -> &LibraryCache {
        &self.cache
    }

    pub fn debug(&self) -> bool {
        self.cache.debug()
    }

    pub fn set_debug(&self, enabled: bool) {
        self.cache.set_debug(enabled);
    }

    /// Load a library into the cache without binding anything
    pub fn load_library(&self, name: &str) -> CalliResult<LibraryHandle> {
        self.cache.acquire(name)
    }
}

impl Default for BindContext {
    fn default() -> Self {
        Self::system()
    }
}
