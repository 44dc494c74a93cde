//! Cross-provider message compiler.
//!
//! [`compile`] takes a message object authored in either provider's schema
//! and renders it in the target schema. Translations are pure structural
//! mappings with explicit capacity limits. When a message cannot be shown on
//! the target channel the compiler fails with
//! [`CompileError::UnsupportedTranslation`] instead of dropping content. The
//! one defined lossy rule is the quick-reply fallback: more than
//! [`QUICK_REPLY_BUTTONS_THRESHOLD`] choices become plain LINE text.

pub mod facebook;
pub mod format;
pub mod line;

use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use crate::provider::Provider;

pub use format::{identify, MessageFormat, MessageKind};

/// Maximum actions in a LINE buttons template.
pub const LINE_BUTTONS_MAX_ACTIONS: usize = 4;

/// Maximum actions in one LINE carousel column.
pub const LINE_COLUMN_MAX_ACTIONS: usize = 3;

/// Maximum columns in a LINE carousel template.
pub const LINE_CAROUSEL_MAX_COLUMNS: usize = 10;

/// Maximum buttons in a Facebook button template or generic element.
pub const FACEBOOK_BUTTONS_MAX: usize = 3;

/// Maximum elements in a Facebook generic template.
pub const FACEBOOK_GENERIC_MAX_ELEMENTS: usize = 10;

/// Largest Facebook choice set that still compiles to a LINE buttons template.
pub const QUICK_REPLY_BUTTONS_THRESHOLD: usize = LINE_BUTTONS_MAX_ACTIONS;

/// Errors from message format detection and compilation.
#[derive(Debug, thiserror::Error)]
pub enum CompileError {
    /// The message shape matches no known provider schema.
    #[error("cannot identify the provider format of this message object")]
    UnidentifiableFormat,

    /// No translation rule exists, or the message exceeds a structural limit
    /// of the target schema.
    #[error("compiling {kind} message from {from} to {to} is not supported: {reason}")]
    UnsupportedTranslation {
        /// Kind of the source message.
        kind: MessageKind,
        /// Provider schema of the source message.
        from: Provider,
        /// Requested target provider.
        to: Provider,
        /// What exactly could not be expressed.
        reason: String,
    },

    /// The message was identified but is missing required fields.
    #[error("malformed {provider} {kind} message: {error}")]
    Malformed {
        /// Kind the message was identified as.
        kind: MessageKind,
        /// Schema the message was identified as.
        provider: Provider,
        /// Underlying deserialization error.
        #[source]
        error: serde_json::Error,
    },
}

impl CompileError {
    pub(crate) fn unsupported(
        kind: MessageKind,
        from: Provider,
        to: Provider,
        reason: impl Into<String>,
    ) -> Self {
        Self::UnsupportedTranslation {
            kind,
            from,
            to,
            reason: reason.into(),
        }
    }
}

/// Deserialize an identified message into its typed schema.
pub(crate) fn parse<T: DeserializeOwned>(
    kind: MessageKind,
    provider: Provider,
    message: &Value,
) -> Result<T, CompileError> {
    <T as Deserialize>::deserialize(message).map_err(|error| CompileError::Malformed {
        kind,
        provider,
        error,
    })
}

/// Compile `message` into the schema of `target`.
///
/// A message already in the target schema is returned unchanged. The input
/// is never mutated; the result is always a fresh value.
///
/// # Errors
///
/// Returns [`CompileError::UnidentifiableFormat`] when the source schema
/// cannot be detected, [`CompileError::UnsupportedTranslation`] when no rule
/// covers the message or a target limit would be exceeded, and
/// [`CompileError::Malformed`] when required fields are missing.
pub fn compile(message: &Value, target: Provider) -> Result<Value, CompileError> {
    let format = identify(message)?;
    if format.provider == target {
        return Ok(message.clone());
    }

    debug!(
        from = %format.provider,
        to = %target,
        kind = %format.kind,
        "compiling message"
    );
    match target {
        Provider::Line => line::from_facebook(format.kind, message),
        Provider::Facebook => facebook::from_line(format.kind, message),
    }
}

/// Compile every message in `messages`, stopping at the first failure.
///
/// # Errors
///
/// Returns the first [`CompileError`] encountered.
pub fn compile_all(messages: &[Value], target: Provider) -> Result<Vec<Value>, CompileError> {
    messages.iter().map(|m| compile(m, target)).collect()
}
