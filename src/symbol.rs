//! Symbol Resolver

use tracing::trace;

use crate::cache::LibraryHandle;
use crate::types::Address;

/// Resolves exported names against a loaded library.
///
/// A pure query: nothing is cached here, and absence is an ordinary outcome
/// rather than an error.
#[derive(Debug, Clone, Copy, Default)]
pub struct SymbolResolver;

impl SymbolResolver {
    pub fn resolve(handle: &LibraryHandle, entry_point: &str) -> Option<Address> {
        if entry_point.is_empty() || entry_point.contains('\0') {
            trace!(library = handle.name(), entry_point, "unresolvable entry point name");
            return None;
        }
        handle.module().symbol(entry_point)
    }
}
