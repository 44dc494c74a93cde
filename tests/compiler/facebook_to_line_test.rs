//! Facebook schema compiled for LINE.

use serde_json::{json, Value};
use switchboard::compiler::{compile, CompileError, MessageKind};
use switchboard::provider::Provider;

fn quick_replies(count: usize) -> Value {
    let replies: Vec<Value> = (1..=count)
        .map(|i| json!({"content_type": "text", "title": format!("Choice {i}"), "payload": format!("c{i}")}))
        .collect();
    json!({"text": "Pick one", "quick_replies": replies})
}

fn assert_unsupported(result: Result<Value, CompileError>, expected_kind: MessageKind) {
    match result {
        Err(CompileError::UnsupportedTranslation { kind, from, to, .. }) => {
            assert_eq!(kind, expected_kind);
            assert_eq!(from, Provider::Facebook);
            assert_eq!(to, Provider::Line);
        }
        other => panic!("expected UnsupportedTranslation, got {other:?}"),
    }
}

#[test]
fn text_is_copied() {
    assert_eq!(
        compile(&json!({"text": "hello"}), Provider::Line).expect("compile"),
        json!({"type": "text", "text": "hello"})
    );
}

#[test]
fn four_quick_replies_become_buttons_template() {
    let compiled = compile(&quick_replies(4), Provider::Line).expect("compile");
    assert_eq!(compiled["type"], "template");
    assert_eq!(compiled["altText"], "Pick one");
    assert_eq!(compiled["template"]["type"], "buttons");
    assert_eq!(compiled["template"]["text"], "Pick one");
    let actions = compiled["template"]["actions"].as_array().expect("actions");
    assert_eq!(actions.len(), 4);
    assert_eq!(
        actions[3],
        json!({"type": "postback", "label": "Choice 4", "data": "c4"})
    );
}

#[test]
fn five_quick_replies_fall_back_to_plain_text() {
    let compiled = compile(&quick_replies(5), Provider::Line).expect("compile");
    assert_eq!(compiled, json!({"type": "text", "text": "Pick one"}));
}

#[test]
fn empty_quick_replies_compile_to_plain_text() {
    let compiled = compile(&quick_replies(0), Provider::Line).expect("compile");
    assert_eq!(compiled, json!({"type": "text", "text": "Pick one"}));
}

#[test]
fn location_quick_reply_is_unsupported() {
    let message = json!({"text": "Where?", "quick_replies": [{"content_type": "location"}]});
    assert_unsupported(compile(&message, Provider::Line), MessageKind::QuickReply);
}

#[test]
fn image_uses_url_for_preview() {
    let message = json!({"attachment": {"type": "image", "payload": {"url": "https://x/a.png"}}});
    assert_eq!(
        compile(&message, Provider::Line).expect("compile"),
        json!({
            "type": "image",
            "originalContentUrl": "https://x/a.png",
            "previewImageUrl": "https://x/a.png"
        })
    );
}

#[test]
fn audio_without_duration_is_unsupported() {
    let message = json!({"attachment": {"type": "audio", "payload": {"url": "https://x/a.mp3"}}});
    assert_unsupported(compile(&message, Provider::Line), MessageKind::Audio);
}

#[test]
fn video_and_file_are_unsupported() {
    let video = json!({"attachment": {"type": "video", "payload": {"url": "https://x/v.mp4"}}});
    assert_unsupported(compile(&video, Provider::Line), MessageKind::Video);
    let file = json!({"attachment": {"type": "file", "payload": {"url": "https://x/f.pdf"}}});
    assert_unsupported(compile(&file, Provider::Line), MessageKind::File);
}

#[test]
fn button_template_maps_each_button() {
    let message = json!({"attachment": {"type": "template", "payload": {
        "template_type": "button",
        "text": "What next?",
        "buttons": [
            {"type": "postback", "title": "Order", "payload": "order"},
            {"type": "web_url", "title": "Menu", "url": "https://x/menu"}
        ]
    }}});
    let compiled = compile(&message, Provider::Line).expect("compile");
    assert_eq!(
        compiled,
        json!({
            "type": "template",
            "altText": "What next?",
            "template": {
                "type": "buttons",
                "text": "What next?",
                "actions": [
                    {"type": "postback", "label": "Order", "data": "order"},
                    {"type": "uri", "label": "Menu", "uri": "https://x/menu"}
                ]
            }
        })
    );
}

#[test]
fn unknown_button_type_is_unsupported() {
    let message = json!({"attachment": {"type": "template", "payload": {
        "template_type": "button",
        "text": "Call us",
        "buttons": [{"type": "phone_number", "title": "Call", "payload": "+100"}]
    }}});
    assert_unsupported(compile(&message, Provider::Line), MessageKind::Template);
}

#[test]
fn generic_template_becomes_carousel() {
    let message = json!({"attachment": {"type": "template", "payload": {
        "template_type": "generic",
        "elements": [
            {
                "title": "Margherita",
                "subtitle": "Tomato and basil",
                "image_url": "https://x/m.png",
                "buttons": [{"type": "postback", "title": "Order", "payload": "m"}]
            },
            {
                "title": "Marinara",
                "buttons": [{"type": "postback", "title": "Order", "payload": "n"}]
            }
        ]
    }}});
    let compiled = compile(&message, Provider::Line).expect("compile");
    assert_eq!(compiled["altText"], "Margherita");
    let columns = compiled["template"]["columns"].as_array().expect("columns");
    assert_eq!(columns.len(), 2);
    assert_eq!(columns[0]["title"], "Margherita");
    assert_eq!(columns[0]["text"], "Tomato and basil");
    assert_eq!(columns[0]["thumbnailImageUrl"], "https://x/m.png");
    assert!(columns[1].get("title").is_none());
    assert_eq!(columns[1]["text"], "Marinara");
}

#[test]
fn generic_element_with_four_buttons_is_unsupported() {
    let buttons: Vec<Value> = (1..=4)
        .map(|i| json!({"type": "postback", "title": format!("B{i}"), "payload": format!("b{i}")}))
        .collect();
    let message = json!({"attachment": {"type": "template", "payload": {
        "template_type": "generic",
        "elements": [{"title": "Too many", "buttons": buttons}]
    }}});
    assert_unsupported(compile(&message, Provider::Line), MessageKind::Template);
}

#[test]
fn receipt_template_error_names_the_template() {
    let message = json!({"attachment": {"type": "template", "payload": {"template_type": "receipt"}}});
    let err = compile(&message, Provider::Line).expect_err("unsupported");
    assert!(err.to_string().contains("receipt"), "{err}");
}
