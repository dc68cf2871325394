//! Binding Registry
//!
//! Drives the cache, the resolver and the trampoline generator over an
//! ordered set of slots. Missing exports are tolerated: the slot is left
//! empty, marked unsupported, and the pass carries on.

use std::sync::Arc;

use tracing::info;

use crate::cache::LibraryHandle;
use crate::context::BindContext;
use crate::error::{qualified_name, CalliError, CalliResult};
use crate::slot::{registered_slots, BindableSlot, BindingStatus, Resolution};

/// A slot left unbound by a pass because its library lacks the export
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnsupportedBinding {
    pub scope: String,
    pub slot: String,
    pub entry_point: String,
    pub library: String,
}

/// Outcome of one binding pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BindReport {
    /// Qualified names of slots bound by this pass
    pub bound: Vec<String>,
    /// Slots whose export was not found
    pub unsupported: Vec<UnsupportedBinding>,
    /// Slots found bound by an earlier or concurrent pass
    pub already_bound: usize,
}

impl BindReport {
    /// Every slot visited by the pass is bound
    pub fn is_complete(&self) -> bool {
        self.unsupported.is_empty()
    }

    fn record(&mut self, slot: &dyn BindableSlot, resolution: Resolution) {
        match resolution {
            Resolution::Installed => self.bound.push(qualified_name(slot.scope(), slot.name())),
            Resolution::AlreadyResolved => self.already_bound += 1,
            Resolution::Unsupported => self.unsupported.push(UnsupportedBinding {
                scope: slot.scope().to_string(),
                slot: slot.name().to_string(),
                entry_point: slot
                    .descriptor()
                    .entry_point()
                    .unwrap_or_else(|| slot.name().to_string()),
                library: slot.descriptor().library().to_string(),
            }),
        }
    }
}

/// Ordered set of slots bound against one [`BindContext`]
pub struct BindingRegistry<'s> {
    context: Arc<BindContext>,
    slots: Vec<&'s dyn BindableSlot>,
}

impl<'s> BindingRegistry<'s> {
    /// Empty registry over `context`
    pub fn new(context: Arc<BindContext>) -> Self {
        Self {
            context,
            slots: Vec::new(),
        }
    }

    /// Registry over an explicit slot sequence, bound in the given order
    pub fn with_slots<I>(context: Arc<BindContext>, slots: I) -> Self
    where
        I: IntoIterator<Item = &'s dyn BindableSlot>,
    {
        Self {
            context,
            slots: slots.into_iter().collect(),
        }
    }

    pub fn register(&mut self, slot: &'s dyn BindableSlot) -> &mut Self {
        self.slots.push(slot);
        self
    }

    pub fn context(&self) -> &Arc<BindContext> {
        &self.context
    }

    pub fn slots(&self) -> &[&'s dyn BindableSlot] {
        &self.slots
    }

    /// Load a library into the context's cache without binding anything
    pub fn load_library(&self, name: &str) -> CalliResult<LibraryHandle> {
        self.context.load_library(name)
    }

    /// Bind every slot, whichever library it names.
    ///
    /// A slot with no library name fails the pass with `MisconfiguredSlot`
    /// before the cache is consulted; a library that cannot be opened fails
    /// it with `LibraryNotFound`. Slots bound before the failure stay bound.
    pub fn bind_all(&self) -> CalliResult<BindReport> {
        let mut report = BindReport::default();

        for &slot in &self.slots {
            let descriptor = slot.descriptor();
            if descriptor.library().is_empty() {
                return Err(CalliError::misconfigured(
                    slot.scope(),
                    slot.name(),
                    "native slot declares no library",
                ));
            }
            if descriptor.is_resolved() {
                report.already_bound += 1;
                continue;
            }

            let handle = self.context.cache().acquire(descriptor.library())?;
            let resolution = descriptor.resolve(slot, &handle, self.context.debug())?;
            report.record(slot, resolution);
        }

        self.summarize("*", &report);
        Ok(report)
    }

    /// Bind only the slots naming `library`; no other library is loaded.
    pub fn bind_library(&self, library: &str) -> CalliResult<BindReport> {
        if library.is_empty() {
            return Err(CalliError::empty_library_name());
        }

        let handle = self.context.cache().acquire(library)?;
        let mut report = BindReport::default();

        for &slot in self.slots.iter().filter(|s| s.descriptor().library() == library) {
            let descriptor = slot.descriptor();
            if descriptor.is_resolved() {
                report.already_bound += 1;
                continue;
            }
            let resolution = descriptor.resolve(slot, &handle, self.context.debug())?;
            report.record(slot, resolution);
        }

        self.summarize(library, &report);
        Ok(report)
    }

    /// Slots whose last resolution found no export
    pub fn unsupported(&self) -> Vec<&'s dyn BindableSlot> {
        self.slots
            .iter()
            .copied()
            .filter(|s| s.descriptor().status() == BindingStatus::Unsupported)
            .collect()
    }

    fn summarize(&self, scope: &str, report: &BindReport) {
        if self.context.debug() {
            info!(
                library = scope,
                bound = report.bound.len(),
                unsupported = report.unsupported.len(),
                already_bound = report.already_bound,
                "binding pass complete"
            );
        }
    }
}

impl BindingRegistry<'static> {
    /// Registry over every slot declared with [`native_slot!`](crate::native_slot)
    pub fn discover(context: Arc<BindContext>) -> Self {
        Self::with_slots(context, registered_slots())
    }
}

impl std::fmt::Debug for BindingRegistry<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BindingRegistry")
            .field("context", &self.context)
            .field(
                "slots",
                &self
                    .slots
                    .iter()
                    .map(|s| qualified_name(s.scope(), s.name()))
                    .collect::<Vec<_>>(),
            )
            .finish()
    }
}
