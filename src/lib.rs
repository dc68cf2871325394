//! Calli - Dynamic Native-Call Binder
//!
//! Binds statically declared call slots to functions exported by native
//! libraries at runtime. Each library is loaded once per [`BindContext`],
//! each export is resolved once per slot, and every bound slot holds a
//! [`Trampoline`] that jumps straight to the native address with the
//! declared calling convention and argument passing.
//!
//! # Features
//!
//! - **Monotonic library cache**: concurrent first requests trigger a single load
//! - **Compile-time trampolines**: one monomorphised call path per shape, up to eight arguments
//! - **By-value or by-reference passing**: uniform per binding
//! - **Tolerant binding**: a missing export leaves the slot unsupported, never aborts the pass
//! - **Static discovery**: slots declared with [`native_slot!`] are found by [`BindingRegistry::discover`]
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use calli::{native_slot, BindContext, BindingRegistry, NativeSlot};
//!
//! native_slot! {
//!     static COS: NativeSlot<(f64,), f64> = ("cos", "libm.so.6");
//! }
//!
//! let context = Arc::new(BindContext::system());
//! let report = BindingRegistry::discover(context).bind_all().unwrap();
//! assert!(report.is_complete());
//!
//! let value = unsafe { COS.try_call((0.0,)) }.unwrap();
//! assert_eq!(value, 1.0);
//! ```
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐
//! │ BindingRegistry │  bind_all / bind_library / load_library
//! └────────┬────────┘
//!          │
//!     ┌────┴──────────────┐
//!     ▼                   ▼
//! ┌──────────────┐  ┌───────────────────┐
//! │ LibraryCache │  │ BindingDescriptor │  per-slot lock + status
//! └──────┬───────┘  └─────────┬─────────┘
//!        │                    │
//!        ▼                    ▼
//! ┌──────────────┐  ┌───────────────────┐
//! │ NativeLoader │  │  SymbolResolver   │
//! └──────────────┘  └─────────┬─────────┘
//!                             │
//!                             ▼
//!                   ┌───────────────────┐
//!                   │    Trampoline     │  installed into the NativeSlot
//!                   └───────────────────┘
//! ```

#![warn(clippy::all)]

pub mod cache;
pub mod config;
pub mod context;
pub mod error;
pub mod loader;
pub mod registry;
pub mod slot;
pub mod symbol;
pub mod trampoline;
pub mod types;


pub use cache::{LibraryCache, LibraryHandle};
pub use config::{CalliConfig, ConfigError, ConfigResult, LoaderConfig};
pub use context::BindContext;
pub use error::{CalliError, CalliResult, LoadFailure};
pub use loader::{NativeLoader, NativeModule, SystemLoader, SystemModule};
pub use registry::{BindReport, BindingRegistry, UnsupportedBinding};
pub use slot::{
    registered_slots, BindableSlot, BindingDescriptor, BindingStatus, NativeSlot, Resolution,
    SlotOptions, SlotRegistration,
};
pub use symbol::SymbolResolver;
pub use trampoline::{Invoker, NativeArgs, Trampoline};
pub use types::{
    Address, CallingConvention, NativeReturn, NativeValue, PassMode, Signature, ValueKind,
    MAX_ARITY,
};

#[doc(hidden)]
pub use inventory;

/// Declare a `static` [`NativeSlot`] and register it for
/// [`BindingRegistry::discover`].
///
/// ```ignore
/// native_slot! {
///     /// Add two integers
///     pub static ADD: NativeSlot<(i32, i32), i32> = ("add_i32", "math.native");
///     static NEG: NativeSlot<(*mut i32,), ()> = (
///         "negate",
///         "math.native",
///         SlotOptions::new().entry_point("math_negate").convention(CallingConvention::C)
///     );
/// }
/// ```
///
/// The first string is the slot name, used as the entry point unless the
/// options override it. The scope is the declaring module path.
#[macro_export]
macro_rules! native_slot {
    () => {};
    (
        $(#[$meta:meta])*
        $vis:vis static $name:ident: $ty:ty = ($slot:expr, $lib:expr $(, $opts:expr)? $(,)?);
        $($rest:tt)*
    ) => {
        $(#[$meta])*
        $vis static $name: $ty = <$ty>::declare(
            ::core::module_path!(),
            $slot,
            $lib,
            $crate::__slot_options!($($opts)?),
        );

        $crate::inventory::submit! {
            $crate::SlotRegistration::new(&$name)
        }

        $crate::native_slot! { $($rest)* }
    };
}

#[doc(hidden)]
#[macro_export]
macro_rules! __slot_options {
    () => {
        $crate::SlotOptions::new()
    };
    ($opts:expr) => {
        $opts
    };
}
