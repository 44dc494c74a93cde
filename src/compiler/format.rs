//! Structural format detection for message objects.
//!
//! A message object never carries its provider explicitly. The provider and
//! message kind are inferred from which discriminating keys are present:
//!
//! | shape                                  | provider | kind              |
//! |----------------------------------------|----------|-------------------|
//! | has string `type`                      | LINE     | value of `type`   |
//! | has `text` and `quick_replies`         | Facebook | `quick_reply`     |
//! | has `text`                             | Facebook | `text`            |
//! | has `attachment.type`                  | Facebook | attachment type   |
//!
//! Every other shape is an [`CompileError::UnidentifiableFormat`].

use std::fmt;

use serde_json::Value;

use super::CompileError;
use crate::provider::Provider;

/// Message kinds across both provider schemas.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageKind {
    /// Plain text.
    Text,
    /// Facebook text message with a `quick_replies` choice set.
    QuickReply,
    /// Image.
    Image,
    /// Video.
    Video,
    /// Audio.
    Audio,
    /// Generic file.
    File,
    /// LINE location.
    Location,
    /// LINE sticker.
    Sticker,
    /// LINE imagemap.
    Imagemap,
    /// Structured template (buttons, confirm, carousel, generic, ...).
    Template,
}

impl MessageKind {
    /// Wire tag of this kind.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::QuickReply => "quick_reply",
            Self::Image => "image",
            Self::Video => "video",
            Self::Audio => "audio",
            Self::File => "file",
            Self::Location => "location",
            Self::Sticker => "sticker",
            Self::Imagemap => "imagemap",
            Self::Template => "template",
        }
    }

    fn from_line_tag(tag: &str) -> Option<Self> {
        match tag {
            "text" => Some(Self::Text),
            "image" => Some(Self::Image),
            "video" => Some(Self::Video),
            "audio" => Some(Self::Audio),
            "file" => Some(Self::File),
            "location" => Some(Self::Location),
            "sticker" => Some(Self::Sticker),
            "imagemap" => Some(Self::Imagemap),
            "template" => Some(Self::Template),
            _ => None,
        }
    }

    fn from_facebook_attachment(tag: &str) -> Option<Self> {
        match tag {
            "image" => Some(Self::Image),
            "video" => Some(Self::Video),
            "audio" => Some(Self::Audio),
            "file" => Some(Self::File),
            "template" => Some(Self::Template),
            _ => None,
        }
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Detected `(provider, kind)` pair of a message object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MessageFormat {
    /// Schema the message is authored in.
    pub provider: Provider,
    /// Kind of message within that schema.
    pub kind: MessageKind,
}

/// Identify the provider schema and kind of a message object.
///
/// # Errors
///
/// Returns [`CompileError::UnidentifiableFormat`] when the shape matches no
/// known provider/kind combination.
pub fn identify(message: &Value) -> Result<MessageFormat, CompileError> {
    let object = message
        .as_object()
        .ok_or(CompileError::UnidentifiableFormat)?;

    if let Some(tag) = object.get("type") {
        let kind = tag
            .as_str()
            .and_then(MessageKind::from_line_tag)
            .ok_or(CompileError::UnidentifiableFormat)?;
        return Ok(MessageFormat {
            provider: Provider::Line,
            kind,
        });
    }

    let has_text = object.get("text").is_some_and(Value::is_string);
    if has_text && object.get("quick_replies").is_some_and(Value::is_array) {
        return Ok(MessageFormat {
            provider: Provider::Facebook,
            kind: MessageKind::QuickReply,
        });
    }
    if has_text {
        return Ok(MessageFormat {
            provider: Provider::Facebook,
            kind: MessageKind::Text,
        });
    }

    let kind = object
        .get("attachment")
        .and_then(|a| a.get("type"))
        .and_then(Value::as_str)
        .and_then(MessageKind::from_facebook_attachment)
        .ok_or(CompileError::UnidentifiableFormat)?;
    Ok(MessageFormat {
        provider: Provider::Facebook,
        kind,
    })
}
