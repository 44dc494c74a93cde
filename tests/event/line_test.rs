//! LINE webhook normalization.

use serde_json::{json, Value};
use switchboard::event::{classify, BeaconKind, Event, EventType, Inbound, NormalizeError};
use switchboard::provider::Provider;

fn events(payload: &Value) -> Vec<Event> {
    match classify(Provider::Line, payload).expect("classify") {
        Inbound::Events(events) => events,
        Inbound::VerificationProbe => panic!("unexpected verification probe"),
    }
}

#[test]
fn verification_tokens_are_probes() {
    for token in [
        "00000000000000000000000000000000",
        "ffffffffffffffffffffffffffffffff",
    ] {
        let payload = json!({"events": [{
            "type": "message",
            "replyToken": token,
            "source": {"type": "user", "userId": "Udeadbeef"},
            "message": {"type": "text", "id": "1", "text": "test"}
        }]});
        assert_eq!(
            classify(Provider::Line, &payload).expect("classify"),
            Inbound::VerificationProbe
        );
    }
}

#[test]
fn text_message_carries_text_as_raw_value() {
    let payload = json!({"events": [{
        "type": "message",
        "replyToken": "r1",
        "source": {"type": "user", "userId": "U1"},
        "message": {"type": "text", "id": "1", "text": "hello"}
    }]});
    let events = events(&payload);
    assert_eq!(events.len(), 1);
    let event = &events[0];
    assert_eq!(event.provider, Provider::Line);
    assert_eq!(event.event_type, EventType::Message);
    assert_eq!(event.session_id, "U1");
    assert_eq!(event.sender_id, "U1");
    assert_eq!(event.raw_value, Some(json!("hello")));
    assert_eq!(event.message_text().as_deref(), Some("hello"));
    assert!(event.is_text_message());
    assert_eq!(event.native, payload["events"][0]);
}

#[test]
fn non_text_message_carries_whole_message() {
    let sticker = json!({"type": "sticker", "id": "2", "packageId": "1", "stickerId": "1"});
    let payload = json!({"events": [{
        "type": "message",
        "replyToken": "r1",
        "source": {"type": "user", "userId": "U1"},
        "message": sticker
    }]});
    let event = &events(&payload)[0];
    assert_eq!(event.raw_value, Some(sticker));
    assert!(!event.is_text_message());
    assert_eq!(event.message_text(), None);
}

#[test]
fn postback_carries_data() {
    let payload = json!({"events": [{
        "type": "postback",
        "replyToken": "r1",
        "source": {"type": "user", "userId": "U1"},
        "postback": {"data": "size=large"}
    }]});
    let event = &events(&payload)[0];
    assert_eq!(event.event_type, EventType::Postback);
    assert_eq!(event.raw_value, Some(json!("size=large")));
    assert_eq!(event.message_text().as_deref(), Some("size=large"));
    assert!(!event.is_text_message());
}

#[test]
fn lifecycle_and_beacon_types_are_mapped() {
    let payload = json!({"events": [
        {"type": "follow", "replyToken": "a", "source": {"type": "user", "userId": "U1"}},
        {"type": "unfollow", "source": {"type": "user", "userId": "U1"}},
        {"type": "join", "replyToken": "b", "source": {"type": "group", "groupId": "G1"}},
        {"type": "leave", "source": {"type": "room", "roomId": "R1"}},
        {"type": "beacon", "replyToken": "c", "source": {"type": "user", "userId": "U2"},
         "beacon": {"hwid": "d41d8cd98f", "type": "enter"}}
    ]});
    let events = events(&payload);
    let types: Vec<EventType> = events.iter().map(|e| e.event_type).collect();
    assert_eq!(
        types,
        vec![
            EventType::Follow,
            EventType::Unfollow,
            EventType::Join,
            EventType::Leave,
            EventType::Beacon
        ]
    );
    assert_eq!(events[2].session_id, "G1");
    assert_eq!(events[3].session_id, "R1");
    assert_eq!(events[4].beacon_kind(), Some(BeaconKind::Enter));
    assert_eq!(events[0].beacon_kind(), None);
    assert!(events.iter().all(|e| e.raw_value.is_none()));
}

#[test]
fn user_id_wins_over_group_id() {
    let payload = json!({"events": [{
        "type": "message",
        "replyToken": "r1",
        "source": {"type": "group", "groupId": "G1", "userId": "U9"},
        "message": {"type": "text", "id": "1", "text": "hi all"}
    }]});
    assert_eq!(events(&payload)[0].session_id, "U9");
}

#[test]
fn unsupported_event_types_are_dropped() {
    let payload = json!({"events": [
        {"type": "memberJoined", "replyToken": "a", "source": {"type": "group", "groupId": "G1"}},
        {"type": "follow", "replyToken": "b", "source": {"type": "user", "userId": "U1"}}
    ]});
    let events = events(&payload);
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].event_type, EventType::Follow);
}

#[test]
fn empty_events_array_yields_no_events() {
    assert!(events(&json!({"destination": "x", "events": []})).is_empty());
}

#[test]
fn missing_container_is_an_error() {
    let err = classify(Provider::Line, &json!({"destination": "x"})).expect_err("no events");
    assert!(matches!(
        err,
        NormalizeError::MissingContainer { provider: Provider::Line, field: "events" }
    ));
}

#[test]
fn missing_source_is_an_error() {
    let payload = json!({"events": [{"type": "follow", "replyToken": "a"}]});
    let err = classify(Provider::Line, &payload).expect_err("no source");
    assert!(matches!(err, NormalizeError::MissingField { field: "source", .. }));
}
