//! Binder Errors
//!
//! A missing symbol is not an error: it is recorded on the descriptor as
//! [`BindingStatus::Unsupported`](crate::BindingStatus::Unsupported).

use thiserror::Error;

use crate::types::Signature;

/// Boxed reason reported by a [`NativeLoader`](crate::NativeLoader).
pub type LoadFailure = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Error type for binder operations
#[derive(Debug, Error)]
pub enum CalliError {
    /// Empty or absent library name where one is required
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The platform loader could not open the library
    #[error("library `{name}` not found: {source}")]
    LibraryNotFound {
        name: String,
        #[source]
        source: LoadFailure,
    },

    /// Native address width is neither 32 nor 64 bits
    #[error("unsupported platform: {pointer_width}-bit native addresses")]
    UnsupportedPlatform { pointer_width: u32 },

    /// A slot declaration is missing required configuration
    #[error("{} (at {})", .message, qualified_name(.scope, .slot))]
    MisconfiguredSlot {
        scope: String,
        slot: String,
        message: String,
    },

    /// The signature handed to the generator does not match the slot's shape
    #[error("signature mismatch: slot expects `{expected}`, got `{found}`")]
    SignatureMismatch {
        expected: Signature,
        found: Signature,
    },

    /// The signature cannot be transmitted by a trampoline
    #[error("invalid signature: {0}")]
    InvalidSignature(String),

    /// The slot was invoked before a trampoline was installed
    #[error("native slot `{slot}` is not bound")]
    NotBound { slot: String },
}

/// `scope::slot`, or the bare slot name for slots declared without a scope.
pub(crate) fn qualified_name(scope: &str, slot: &str) -> String {
    if scope.is_empty() {
        slot.to_string()
    } else {
        format!("{scope}::{slot}")
    }
}

/// Result type for binder operations.
pub type CalliResult<T> = Result<T, CalliError>;

impl CalliError {
    pub(crate) fn empty_library_name() -> Self {
        CalliError::InvalidArgument("library name is null or empty".to_string())
    }

    pub(crate) fn misconfigured(scope: &str, slot: &str, message: impl Into<String>) -> Self {
        CalliError::MisconfiguredSlot {
            scope: scope.to_string(),
            slot: slot.to_string(),
            message: message.into(),
        }
    }
}
