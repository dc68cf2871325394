//! Shared fixtures for the integration tests
//!
//! A fake platform loader whose libraries export ordinary Rust
//! `extern "C"` functions, so bound trampolines really execute.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use calli::{Address, BindContext, LoadFailure, NativeLoader, NativeModule};
use parking_lot::Mutex;

pub extern "C" fn add_i32(a: i32, b: i32) -> i32 {
    a + b
}

pub extern "C" fn mul_i32(a: i32, b: i32) -> i32 {
    a * b
}

pub extern "C" fn add_by_ref(a: *mut i32, b: *mut i32) -> i32 {
    unsafe { *a + *b }
}

pub extern "C" fn square_f64(x: f64) -> f64 {
    x * x
}

pub extern "C" fn version() -> u32 {
    3
}

/// Exports of one fake library
#[derive(Debug, Clone, Default)]
pub struct FakeLibrary {
    exports: HashMap<String, usize>,
}

impl FakeLibrary {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn export(mut self, name: &str, address: usize) -> Self {
        self.exports.insert(name.to_string(), address);
        self
    }
}

struct FakeModule {
    exports: HashMap<String, usize>,
}

impl NativeModule for FakeModule {
    fn symbol(&self, name: &str) -> Option<Address> {
        self.exports.get(name).copied().and_then(Address::new)
    }
}

/// Loader over a fixed set of fake libraries, counting every open call
#[derive(Default)]
pub struct FakeLoader {
    libraries: HashMap<String, FakeLibrary>,
    opens: AtomicUsize,
    requested: Mutex<Vec<String>>,
    delay: Option<Duration>,
}

impl FakeLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_library(mut self, name: &str, library: FakeLibrary) -> Self {
        self.libraries.insert(name.to_string(), library);
        self
    }

    /// Sleep inside every open, widening race windows
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn open_count(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }

    /// Names passed to `open`, in call order
    pub fn requested(&self) -> Vec<String> {
        self.requested.lock().clone()
    }
}

impl NativeLoader for FakeLoader {
    fn open(&self, name: &str) -> Result<Arc<dyn NativeModule>, LoadFailure> {
        self.opens.fetch_add(1, Ordering::SeqCst);
        self.requested.lock().push(name.to_string());

        if let Some(delay) = self.delay {
            std::thread::sleep(delay);
        }

        match self.libraries.get(name) {
            Some(library) => Ok(Arc::new(FakeModule {
                exports: library.exports.clone(),
            })),
            None => Err(format!("fake loader has no library `{}`", name).into()),
        }
    }
}

/// `math.native` exports `add_i32`, `mul_i32`, `add_by_ref` and `square`;
/// `sys.native` exports `version`.
pub fn math_loader() -> FakeLoader {
    FakeLoader::new()
        .with_library(
            "math.native",
            FakeLibrary::new()
                .export("add_i32", add_i32 as usize)
                .export("mul_i32", mul_i32 as usize)
                .export("add_by_ref", add_by_ref as usize)
                .export("square", square_f64 as usize),
        )
        .with_library(
            "sys.native",
            FakeLibrary::new().export("version", version as usize),
        )
}

/// Context over `loader` with diagnostics off
pub fn quiet_context(loader: Arc<FakeLoader>) -> Arc<BindContext> {
    let context = BindContext::new(loader);
    context.set_debug(false);
    Arc::new(context)
}
