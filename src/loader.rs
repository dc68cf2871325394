//! Dynamic Library Loader
//!
//! The two platform primitives the binder depends on: open a library by
//! name, and look up an exported symbol in an opened library.
//! [`SystemLoader`] implements them on top of libloading.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use libloading::Library;
use tracing::debug;

use crate::error::LoadFailure;
use crate::types::Address;

/// An opened native module.
pub trait NativeModule: Send + Sync {
    /// Address of the exported symbol `name`, or `None` if it is not exported.
    fn symbol(&self, name: &str) -> Option<Address>;
}

/// Platform dynamic-load primitive.
pub trait NativeLoader: Send + Sync {
    /// Open the library `name`.
    fn open(&self, name: &str) -> Result<Arc<dyn NativeModule>, LoadFailure>;
}

/// A library opened through libloading
pub struct SystemModule {
    /// Path or name the library was opened from
    origin: PathBuf,
    library: Library,
}

impl SystemModule {
    /// Open a library from a path or a bare name resolved by the platform
    pub fn open(origin: impl AsRef<Path>) -> Result<Self, libloading::Error> {
        let origin = origin.as_ref().to_path_buf();

        // Safety: opening a library runs its initialisers. The caller names
        // the library it trusts; nothing else is executed here.
        let library = unsafe { Library::new(&origin)? };

        Ok(Self { origin, library })
    }

    pub fn origin(&self) -> &Path {
        &self.origin
    }
}

impl NativeModule for SystemModule {
    fn symbol(&self, name: &str) -> Option<Address> {
        // Safety: the symbol is only read as an address here; its type is
        // asserted later by the trampoline that calls through it.
        let symbol = unsafe { self.library.get::<*const ()>(name.as_bytes()) }.ok()?;
        Address::from_ptr(*symbol)
    }
}

/// Library loader with search paths and name aliases
#[derive(Debug, Clone)]
pub struct SystemLoader {
    /// Directories tried after the platform's own search
    search_paths: Vec<PathBuf>,
    /// Requested name -> file to open instead
    aliases: HashMap<String, PathBuf>,
}

impl SystemLoader {
    /// Create a loader with the platform default search paths
    pub fn new() -> Self {
        Self {
            search_paths: default_search_paths(),
            aliases: HashMap::new(),
        }
    }

    /// Add a search path
    pub fn add_search_path(&mut self, path: impl AsRef<Path>) {
        self.search_paths.push(path.as_ref().to_path_buf());
    }

    /// Open `target` whenever `name` is requested
    pub fn add_alias(&mut self, name: impl Into<String>, target: impl Into<PathBuf>) {
        self.aliases.insert(name.into(), target.into());
    }

    pub fn search_paths(&self) -> &[PathBuf] {
        &self.search_paths
    }

    /// Candidate files for a requested name, in the order they are tried
    pub fn candidates(&self, name: &str) -> Vec<PathBuf> {
        let mut candidates = Vec::new();

        if let Some(target) = self.aliases.get(name) {
            candidates.push(target.clone());
        }

        // The name as given: an existing path, or a bare name the platform
        // resolves with its own search rules
        candidates.push(PathBuf::from(name));

        let file_name = libloading::library_filename(name);
        for search_path in &self.search_paths {
            candidates.push(search_path.join(name));
            if file_name.as_os_str() != name {
                candidates.push(search_path.join(&file_name));
            }
        }

        candidates
    }
}

impl Default for SystemLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl NativeLoader for SystemLoader {
    fn open(&self, name: &str) -> Result<Arc<dyn NativeModule>, LoadFailure> {
        let mut last_error: Option<libloading::Error> = None;

        for candidate in self.candidates(name) {
            debug!(library = name, candidate = %candidate.display(), "trying library candidate");
            match SystemModule::open(&candidate) {
                Ok(module) => return Ok(Arc::new(module)),
                Err(e) => last_error = Some(e),
            }
        }

        Err(match last_error {
            Some(e) => e.into(),
            None => format!("no candidate paths for `{}`", name).into(),
        })
    }
}

/// Get the default library search paths for this platform
fn default_search_paths() -> Vec<PathBuf> {
    let mut paths = Vec::new();

    // Current directory
    if let Ok(cwd) = std::env::current_dir() {
        paths.push(cwd);
    }

    #[cfg(target_os = "linux")]
    paths.extend(env_paths("LD_LIBRARY_PATH", ':'));

    #[cfg(target_os = "macos")]
    paths.extend(env_paths("DYLD_LIBRARY_PATH", ':'));

    #[cfg(target_os = "windows")]
    paths.extend(env_paths("PATH", ';'));

    paths
}

#[allow(dead_code)]
fn env_paths(var: &str, separator: char) -> Vec<PathBuf> {
    std::env::var(var)
        .map(|value| {
            value
                .split(separator)
                .filter(|p| !p.is_empty())
                .map(PathBuf::from)
                .collect()
        })
        .unwrap_or_default()
}
