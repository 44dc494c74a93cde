//! Facebook Messenger webhook payloads (`{"object": "page", "entry": [...]}`).

use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use super::{Event, EventType, Inbound, NormalizeError};
use crate::provider::Provider;

/// One `entry` of a page webhook.
#[derive(Debug, Deserialize)]
struct FacebookEntry {
    #[serde(default)]
    messaging: Vec<Value>,
}

/// Messaging event (subset of fields we use).
#[derive(Debug, Deserialize)]
struct FacebookMessaging {
    sender: FacebookSender,
    message: Option<FacebookInboundMessage>,
    postback: Option<FacebookPostback>,
}

#[derive(Debug, Deserialize)]
struct FacebookSender {
    id: String,
}

#[derive(Debug, Deserialize)]
struct FacebookInboundMessage {
    #[serde(default)]
    is_echo: bool,
    text: Option<String>,
    quick_reply: Option<FacebookQuickReplyPayload>,
    attachments: Option<Vec<Value>>,
}

#[derive(Debug, Deserialize)]
struct FacebookQuickReplyPayload {
    payload: String,
}

#[derive(Debug, Deserialize)]
struct FacebookPostback {
    payload: String,
}

pub(super) fn classify(payload: &Value) -> Result<Inbound, NormalizeError> {
    let entries = payload
        .get("entry")
        .and_then(Value::as_array)
        .ok_or(NormalizeError::MissingContainer {
            provider: Provider::Facebook,
            field: "entry",
        })?;

    let mut events = Vec::new();
    for entry in entries {
        let entry = FacebookEntry::deserialize(entry).map_err(malformed)?;
        for native in entry.messaging {
            let parsed = FacebookMessaging::deserialize(&native).map_err(malformed)?;
            let Some((event_type, raw_value)) = classify_messaging(&parsed, &native) else {
                debug!(sender = %parsed.sender.id, "skipping unsupported Facebook event");
                continue;
            };
            events.push(Event {
                provider: Provider::Facebook,
                event_type,
                session_id: parsed.sender.id.clone(),
                sender_id: parsed.sender.id,
                raw_value,
                native,
            });
        }
    }
    Ok(Inbound::Events(events))
}

fn malformed(source: serde_json::Error) -> NormalizeError {
    NormalizeError::Malformed {
        provider: Provider::Facebook,
        source,
    }
}

fn classify_messaging(
    parsed: &FacebookMessaging,
    native: &Value,
) -> Option<(EventType, Option<Value>)> {
    if let Some(message) = &parsed.message {
        if message.is_echo {
            return None;
        }
        if let Some(quick_reply) = &message.quick_reply {
            return Some((
                EventType::QuickReply,
                Some(Value::String(quick_reply.payload.clone())),
            ));
        }
        if message.attachments.is_some() {
            return Some((EventType::Message, native.get("message").cloned()));
        }
        if let Some(text) = &message.text {
            return Some((EventType::Message, Some(Value::String(text.clone()))));
        }
        return None;
    }
    parsed
        .postback
        .as_ref()
        .map(|postback| (EventType::Postback, Some(Value::String(postback.payload.clone()))))
}

pub(super) fn message_text(native: &Value) -> Option<String> {
    native
        .pointer("/message/quick_reply/payload")
        .or_else(|| native.pointer("/message/text"))
        .or_else(|| native.pointer("/postback/payload"))
        .and_then(Value::as_str)
        .map(str::to_owned)
}
