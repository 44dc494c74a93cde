//! Event normalizer: provider webhook payloads to provider-agnostic events.
//!
//! Each provider module parses its own webhook body into [`Event`]s that share
//! a fixed type vocabulary ([`EventType`]). Native event objects are kept on
//! the event so the transport can reply to them and skills can inspect them.

mod facebook;
mod line;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::provider::Provider;

/// Fixed vocabulary of event types every provider maps onto.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    /// The user sent a message (text or attachment).
    Message,
    /// The user tapped a postback button.
    Postback,
    /// The user added the bot.
    Follow,
    /// The user blocked or removed the bot.
    Unfollow,
    /// The bot joined a group or room.
    Join,
    /// The bot left a group or room.
    Leave,
    /// The user entered or left a beacon's range.
    Beacon,
    /// The user picked a quick reply.
    QuickReply,
    /// Proactive send synthesized by the application.
    Push,
}

impl EventType {
    /// Wire tag of this event type.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Message => "message",
            Self::Postback => "postback",
            Self::Follow => "follow",
            Self::Unfollow => "unfollow",
            Self::Join => "join",
            Self::Leave => "leave",
            Self::Beacon => "beacon",
            Self::QuickReply => "quick_reply",
            Self::Push => "push",
        }
    }
}

impl std::fmt::Display for EventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Recognised beacon sub-types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BeaconKind {
    /// The user entered the beacon's range.
    Enter,
    /// The user left the beacon's range.
    Leave,
}

impl BeaconKind {
    /// Wire tag of this beacon kind.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Enter => "enter",
            Self::Leave => "leave",
        }
    }
}

/// A provider-agnostic inbound event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// Provider the event came from (and replies go to).
    pub provider: Provider,
    /// Normalized event type.
    pub event_type: EventType,
    /// Stable per-conversation identifier used as the session store key.
    pub session_id: String,
    /// Identifier of the user who caused the event.
    pub sender_id: String,
    /// Parameter payload: text, postback/quick-reply payload, or the raw
    /// message object for attachments.
    pub raw_value: Option<Value>,
    /// The native provider event.
    pub native: Value,
}

impl Event {
    /// Synthesize a push event that proactively starts `intent` for
    /// `recipient_id`, with some parameters already known.
    pub fn push(
        provider: Provider,
        recipient_id: impl Into<String>,
        intent: impl Into<String>,
        parameters: Map<String, Value>,
    ) -> Self {
        let recipient_id = recipient_id.into();
        let intent = intent.into();
        Self {
            provider,
            event_type: EventType::Push,
            session_id: recipient_id.clone(),
            sender_id: recipient_id.clone(),
            raw_value: None,
            native: json!({
                "type": "push",
                "to": recipient_id,
                "intent": {"name": intent},
                "parameters": parameters,
            }),
        }
    }

    /// Intent named by a push event.
    pub fn push_intent(&self) -> Option<&str> {
        if self.event_type != EventType::Push {
            return None;
        }
        self.native.pointer("/intent/name").and_then(Value::as_str)
    }

    /// Parameters carried by a push event.
    pub fn push_parameters(&self) -> Map<String, Value> {
        self.native
            .get("parameters")
            .and_then(Value::as_object)
            .cloned()
            .unwrap_or_default()
    }

    /// The native message object, if the event carries one.
    pub fn message(&self) -> Option<&Value> {
        self.native.get("message")
    }

    /// Text of the event: message text, postback data or quick-reply payload.
    pub fn message_text(&self) -> Option<String> {
        match self.provider {
            Provider::Line => line::message_text(&self.native),
            Provider::Facebook => facebook::message_text(&self.native),
        }
    }

    /// Whether the event is a plain text message from the user.
    pub fn is_text_message(&self) -> bool {
        match self.event_type {
            EventType::Message => match self.provider {
                Provider::Line => {
                    self.native.pointer("/message/type").and_then(Value::as_str) == Some("text")
                }
                Provider::Facebook => self
                    .native
                    .pointer("/message/text")
                    .is_some_and(Value::is_string),
            },
            EventType::QuickReply => true,
            _ => false,
        }
    }

    /// Beacon sub-type, when the event is a recognised beacon event.
    pub fn beacon_kind(&self) -> Option<BeaconKind> {
        if self.event_type != EventType::Beacon {
            return None;
        }
        match self.provider {
            Provider::Line => line::beacon_kind(&self.native),
            Provider::Facebook => None,
        }
    }
}

/// Result of normalizing one webhook payload.
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    /// The provider is verifying the webhook endpoint; nothing to process.
    VerificationProbe,
    /// Normalized events, in payload order.
    Events(Vec<Event>),
}

/// Errors from payload normalization.
#[derive(Debug, thiserror::Error)]
pub enum NormalizeError {
    /// The payload lacks the top-level event container.
    #[error("{provider} payload has no {field} array")]
    MissingContainer {
        /// Provider the payload was parsed as.
        provider: Provider,
        /// Name of the missing container.
        field: &'static str,
    },

    /// An event lacks a field every event of its type must carry.
    #[error("{provider} event has no {field}")]
    MissingField {
        /// Provider the payload was parsed as.
        provider: Provider,
        /// Name of the missing field.
        field: &'static str,
    },

    /// An event does not match the provider's event shape.
    #[error("malformed {provider} event: {source}")]
    Malformed {
        /// Provider the payload was parsed as.
        provider: Provider,
        /// Underlying deserialization error.
        source: serde_json::Error,
    },
}

/// Normalize a provider webhook payload into events.
///
/// Native events outside the [`EventType`] vocabulary (delivery receipts,
/// echoes, read markers, ...) are dropped.
///
/// # Errors
///
/// Returns [`NormalizeError`] if the payload or one of its events is
/// missing required structure.
pub fn classify(provider: Provider, payload: &Value) -> Result<Inbound, NormalizeError> {
    match provider {
        Provider::Line => line::classify(payload),
        Provider::Facebook => facebook::classify(payload),
    }
}

/// Signature header LINE sends.
pub const LINE_SIGNATURE_HEADER: &str = "x-line-signature";

/// Signature header Facebook sends (HMAC-SHA256).
pub const FACEBOOK_SIGNATURE_HEADER: &str = "x-hub-signature-256";

/// Legacy Facebook signature header (HMAC-SHA1).
pub const FACEBOOK_LEGACY_SIGNATURE_HEADER: &str = "x-hub-signature";

/// Work out which provider sent a webhook request, returning the provider
/// and its signature header value.
///
/// `headers` must have lowercase names. LINE requests carry
/// `X-Line-Signature` and an `events` array; Facebook page requests carry
/// `X-Hub-Signature-256` (or the legacy `X-Hub-Signature`) and
/// `"object": "page"`. Anything else yields `None`.
pub fn detect_provider<'h>(
    headers: &'h BTreeMap<String, String>,
    payload: &Value,
) -> Option<(Provider, &'h str)> {
    if let Some(signature) = headers.get(LINE_SIGNATURE_HEADER) {
        if payload.get("events").is_some() {
            return Some((Provider::Line, signature.as_str()));
        }
    }
    let signature = headers
        .get(FACEBOOK_SIGNATURE_HEADER)
        .or_else(|| headers.get(FACEBOOK_LEGACY_SIGNATURE_HEADER))?;
    (payload.get("object").and_then(Value::as_str) == Some("page"))
        .then_some((Provider::Facebook, signature.as_str()))
}
