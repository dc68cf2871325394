//! Native Slots and Binding Descriptors
//!
//! A slot is a write-once cell that receives a [`Trampoline`]. Each slot
//! carries a [`BindingDescriptor`] saying which library and export to bind
//! and how arguments are passed. Slots declared with
//! [`native_slot!`](crate::native_slot) are also collected into a
//! process-wide inventory so a registry can discover them.

use std::borrow::Cow;
use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};

use once_cell::sync::OnceCell;
use parking_lot::{const_mutex, Mutex};
use tracing::{info, warn};

use crate::cache::LibraryHandle;
use crate::error::{qualified_name, CalliError, CalliResult};
use crate::symbol::SymbolResolver;
use crate::trampoline::{NativeArgs, Trampoline};
use crate::types::{Address, CallingConvention, NativeReturn, PassMode, Signature};

/// Resolution state of one descriptor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum BindingStatus {
    /// Never attempted
    Unresolved = 0,
    /// A resolution attempt holds the descriptor lock
    Resolving = 1,
    /// A trampoline is installed; terminal
    Resolved = 2,
    /// The library has no such export; a later pass may retry
    Unsupported = 3,
}

impl BindingStatus {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => BindingStatus::Resolving,
            2 => BindingStatus::Resolved,
            3 => BindingStatus::Unsupported,
            _ => BindingStatus::Unresolved,
        }
    }
}

impl fmt::Display for BindingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BindingStatus::Unresolved => f.write_str("unresolved"),
            BindingStatus::Resolving => f.write_str("resolving"),
            BindingStatus::Resolved => f.write_str("resolved"),
            BindingStatus::Unsupported => f.write_str("unsupported"),
        }
    }
}

/// What one [`BindingDescriptor::resolve`] call did
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Resolution {
    /// This call installed the trampoline
    Installed,
    /// The descriptor was already resolved when the lock was taken
    AlreadyResolved,
    /// The library has no such export
    Unsupported,
}

/// Declaration-time options for a slot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlotOptions {
    /// Exported symbol name; defaults to the slot name
    pub entry_point: Option<&'static str>,
    pub pass_mode: PassMode,
    pub convention: CallingConvention,
}

impl SlotOptions {
    pub const fn new() -> Self {
        Self {
            entry_point: None,
            pass_mode: PassMode::ByValue,
            convention: CallingConvention::System,
        }
    }

    pub const fn entry_point(mut self, name: &'static str) -> Self {
        self.entry_point = Some(name);
        self
    }

    pub const fn pass_mode(mut self, pass_mode: PassMode) -> Self {
        self.pass_mode = pass_mode;
        self
    }

    pub const fn convention(mut self, convention: CallingConvention) -> Self {
        self.convention = convention;
        self
    }
}

impl Default for SlotOptions {
    fn default() -> Self {
        Self::new()
    }
}

/// How one slot is resolved and bound
pub struct BindingDescriptor {
    library: Cow<'static, str>,
    pass_mode: PassMode,
    convention: CallingConvention,
    /// Entry point, filled from the slot name on first resolution. The mutex
    /// is also the descriptor's resolution lock.
    entry_point: Mutex<Option<Cow<'static, str>>>,
    status: AtomicU8,
}

impl BindingDescriptor {
    /// Descriptor for a statically declared slot
    pub const fn declared(library: &'static str, options: SlotOptions) -> Self {
        let entry_point = match options.entry_point {
            Some(name) => Some(Cow::Borrowed(name)),
            None => None,
        };
        Self {
            library: Cow::Borrowed(library),
            pass_mode: options.pass_mode,
            convention: options.convention,
            entry_point: const_mutex(entry_point),
            status: AtomicU8::new(BindingStatus::Unresolved as u8),
        }
    }

    /// Descriptor built at runtime
    pub fn new(library: impl Into<String>) -> Self {
        Self {
            library: Cow::Owned(library.into()),
            pass_mode: PassMode::default(),
            convention: CallingConvention::default(),
            entry_point: Mutex::new(None),
            status: AtomicU8::new(BindingStatus::Unresolved as u8),
        }
    }

    pub fn with_entry_point(mut self, entry_point: impl Into<String>) -> Self {
        *self.entry_point.get_mut() = Some(Cow::Owned(entry_point.into()));
        self
    }

    pub fn with_pass_mode(mut self, pass_mode: PassMode) -> Self {
        self.pass_mode = pass_mode;
        self
    }

    pub fn with_convention(mut self, convention: CallingConvention) -> Self {
        self.convention = convention;
        self
    }

    pub fn library(&self) -> &str {
        &self.library
    }

    /// Explicit or already defaulted entry point
    pub fn entry_point(&self) -> Option<String> {
        self.entry_point.lock().as_ref().map(|e| e.to_string())
    }

    pub fn pass_mode(&self) -> PassMode {
        self.pass_mode
    }

    pub fn convention(&self) -> CallingConvention {
        self.convention
    }

    pub fn status(&self) -> BindingStatus {
        BindingStatus::from_u8(self.status.load(Ordering::Acquire))
    }

    pub fn is_resolved(&self) -> bool {
        self.status() == BindingStatus::Resolved
    }

    fn set_status(&self, status: BindingStatus) {
        self.status.store(status as u8, Ordering::Release);
    }

    /// Resolve `slot` against `handle` and install its trampoline.
    ///
    /// Runs under the descriptor lock: a concurrent attempt on the same
    /// descriptor waits, then returns [`Resolution::AlreadyResolved`]
    /// without installing twice. A missing export yields
    /// [`Resolution::Unsupported`], not an error.
    pub fn resolve(
        &self,
        slot: &dyn BindableSlot,
        handle: &LibraryHandle,
        debug: bool,
    ) -> CalliResult<Resolution> {
        let mut guard = self.entry_point.lock();

        let previous = self.status();
        if previous == BindingStatus::Resolved {
            return Ok(Resolution::AlreadyResolved);
        }
        self.set_status(BindingStatus::Resolving);

        let entry_point = guard.get_or_insert_with(|| Cow::Owned(slot.name().to_string()));

        let resolution = match SymbolResolver::resolve(handle, entry_point) {
            Some(address) => {
                if let Err(e) = slot.install(address) {
                    self.set_status(previous);
                    return Err(e);
                }
                if debug {
                    info!(
                        slot = %qualified_name(slot.scope(), slot.name()),
                        entry_point = %entry_point,
                        library = handle.name(),
                        signature = %slot.signature(),
                        "native entry point bound"
                    );
                }
                self.set_status(BindingStatus::Resolved);
                Resolution::Installed
            }
            None => {
                warn!(
                    slot = %qualified_name(slot.scope(), slot.name()),
                    entry_point = %entry_point,
                    library = %self.library,
                    "native entry point not found"
                );
                self.set_status(BindingStatus::Unsupported);
                Resolution::Unsupported
            }
        };

        Ok(resolution)
    }
}

impl fmt::Debug for BindingDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BindingDescriptor")
            .field("library", &self.library)
            .field("entry_point", &self.entry_point())
            .field("pass_mode", &self.pass_mode)
            .field("convention", &self.convention)
            .field("status", &self.status())
            .finish()
    }
}

/// Object-safe view of a slot, as seen by the registry
pub trait BindableSlot: Send + Sync {
    /// Declared name; the default entry point
    fn name(&self) -> &str;

    /// Declaring module path, empty if unknown
    fn scope(&self) -> &str;

    fn descriptor(&self) -> &BindingDescriptor;

    /// Shape the trampoline must have
    fn signature(&self) -> Signature;

    fn is_bound(&self) -> bool;

    /// Build a trampoline for `address` and store it in the slot.
    ///
    /// Called by [`BindingDescriptor::resolve`] under the descriptor lock.
    fn install(&self, address: Address) -> CalliResult<()>;
}

/// Write-once cell holding the trampoline for one native function.
///
/// `Args` is the parameter tuple and `R` the return type, as the Rust side
/// sees them; with [`PassMode::ByReference`] the native side receives
/// pointers to each argument instead.
pub struct NativeSlot<Args, R> {
    scope: &'static str,
    name: &'static str,
    descriptor: BindingDescriptor,
    trampoline: OnceCell<Trampoline<Args, R>>,
}

impl<Args, R> NativeSlot<Args, R> {
    pub const fn new(name: &'static str, library: &'static str) -> Self {
        Self::declare("", name, library, SlotOptions::new())
    }

    pub const fn with_options(name: &'static str, library: &'static str, options: SlotOptions) -> Self {
        Self::declare("", name, library, options)
    }

    pub const fn declare(
        scope: &'static str,
        name: &'static str,
        library: &'static str,
        options: SlotOptions,
    ) -> Self {
        Self {
            scope,
            name,
            descriptor: BindingDescriptor::declared(library, options),
            trampoline: OnceCell::new(),
        }
    }

    pub fn status(&self) -> BindingStatus {
        self.descriptor.status()
    }

    /// The installed trampoline, if binding succeeded
    pub fn get(&self) -> Option<&Trampoline<Args, R>> {
        self.trampoline.get()
    }
}

impl<Args: NativeArgs, R: NativeReturn> NativeSlot<Args, R> {
    /// Invoke the bound native function.
    ///
    /// # Safety
    ///
    /// Same contract as [`Trampoline::call`].
    pub unsafe fn try_call(&self, args: Args) -> CalliResult<R> {
        match self.trampoline.get() {
            Some(trampoline) => Ok(trampoline.call(args)),
            None => Err(CalliError::NotBound {
                slot: qualified_name(self.scope, self.name),
            }),
        }
    }
}

impl<Args: NativeArgs, R: NativeReturn> BindableSlot for NativeSlot<Args, R> {
    fn name(&self) -> &str {
        self.name
    }

    fn scope(&self) -> &str {
        self.scope
    }

    fn descriptor(&self) -> &BindingDescriptor {
        &self.descriptor
    }

    fn signature(&self) -> Signature {
        Signature::of::<Args, R>()
    }

    fn is_bound(&self) -> bool {
        self.trampoline.get().is_some()
    }

    fn install(&self, address: Address) -> CalliResult<()> {
        let trampoline = Trampoline::build(
            address,
            self.descriptor.convention(),
            self.descriptor.pass_mode(),
            &self.signature(),
        )?;
        // The descriptor lock admits a single writer
        let _ = self.trampoline.set(trampoline);
        Ok(())
    }
}

impl<Args, R> fmt::Debug for NativeSlot<Args, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NativeSlot")
            .field("scope", &self.scope)
            .field("name", &self.name)
            .field("descriptor", &self.descriptor)
            .field("bound", &self.trampoline.get().is_some())
            .finish()
    }
}

/// Inventory record for a statically declared slot
pub struct SlotRegistration {
    slot: &'static dyn BindableSlot,
}

impl SlotRegistration {
    pub const fn new(slot: &'static dyn BindableSlot) -> Self {
        Self { slot }
    }

    pub fn slot(&self) -> &'static dyn BindableSlot {
        self.slot
    }
}

inventory::collect!(SlotRegistration);

/// Every slot declared with [`native_slot!`](crate::native_slot) in the process
pub fn registered_slots() -> Vec<&'static dyn BindableSlot> {
    inventory::iter::<SlotRegistration>
        .into_iter()
        .map(SlotRegistration::slot)
        .collect()
}
