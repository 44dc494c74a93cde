//! LINE webhook payloads (`{"events": [...]}`).

use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use super::{BeaconKind, Event, EventType, Inbound, NormalizeError};
use crate::provider::Provider;

/// Reply tokens LINE sends when the console verifies the webhook URL.
const VERIFICATION_REPLY_TOKENS: [&str; 2] = [
    "00000000000000000000000000000000",
    "ffffffffffffffffffffffffffffffff",
];

/// LINE webhook event (subset of fields we use).
#[derive(Debug, Deserialize)]
struct LineEvent {
    #[serde(rename = "type")]
    kind: String,
    #[serde(rename = "replyToken")]
    reply_token: Option<String>,
    source: Option<LineSource>,
    message: Option<Value>,
    postback: Option<LinePostback>,
}

/// Event source: a user, a group or a room.
#[derive(Debug, Deserialize)]
struct LineSource {
    #[serde(rename = "userId")]
    user_id: Option<String>,
    #[serde(rename = "groupId")]
    group_id: Option<String>,
    #[serde(rename = "roomId")]
    room_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct LinePostback {
    data: String,
}

fn event_type(kind: &str) -> Option<EventType> {
    match kind {
        "message" => Some(EventType::Message),
        "postback" => Some(EventType::Postback),
        "follow" => Some(EventType::Follow),
        "unfollow" => Some(EventType::Unfollow),
        "join" => Some(EventType::Join),
        "leave" => Some(EventType::Leave),
        "beacon" => Some(EventType::Beacon),
        _ => None,
    }
}

pub(super) fn classify(payload: &Value) -> Result<Inbound, NormalizeError> {
    let natives = payload
        .get("events")
        .and_then(Value::as_array)
        .ok_or(NormalizeError::MissingContainer {
            provider: Provider::Line,
            field: "events",
        })?;

    let mut events = Vec::with_capacity(natives.len());
    for native in natives {
        let parsed = LineEvent::deserialize(native).map_err(|source| NormalizeError::Malformed {
            provider: Provider::Line,
            source,
        })?;

        if parsed
            .reply_token
            .as_deref()
            .is_some_and(|token| VERIFICATION_REPLY_TOKENS.contains(&token))
        {
            debug!("LINE webhook verification request");
            return Ok(Inbound::VerificationProbe);
        }

        let Some(event_type) = event_type(&parsed.kind) else {
            debug!(kind = %parsed.kind, "skipping unsupported LINE event");
            continue;
        };

        let source = parsed.source.ok_or(NormalizeError::MissingField {
            provider: Provider::Line,
            field: "source",
        })?;
        // Group and room events (join/leave) may not name a user.
        let sender_id = source
            .user_id
            .or(source.group_id)
            .or(source.room_id)
            .ok_or(NormalizeError::MissingField {
                provider: Provider::Line,
                field: "source.userId",
            })?;

        let raw_value = match event_type {
            EventType::Message => parsed.message.as_ref().map(|message| {
                match message.get("type").and_then(Value::as_str) {
                    Some("text") => message.get("text").cloned().unwrap_or(Value::Null),
                    _ => message.clone(),
                }
            }),
            EventType::Postback => parsed.postback.map(|p| Value::String(p.data)),
            _ => None,
        };

        events.push(Event {
            provider: Provider::Line,
            event_type,
            session_id: sender_id.clone(),
            sender_id,
            raw_value,
            native: native.clone(),
        });
    }
    Ok(Inbound::Events(events))
}

pub(super) fn message_text(native: &Value) -> Option<String> {
    match native.get("type").and_then(Value::as_str)? {
        "message" => native.pointer("/message/text"),
        "postback" => native.pointer("/postback/data"),
        _ => None,
    }
    .and_then(Value::as_str)
    .map(str::to_owned)
}

pub(super) fn beacon_kind(native: &Value) -> Option<BeaconKind> {
    match native.pointer("/beacon/type").and_then(Value::as_str)? {
        "enter" => Some(BeaconKind::Enter),
        "leave" => Some(BeaconKind::Leave),
        _ => None,
    }
}
