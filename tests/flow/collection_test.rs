//! Parameter collection across turns: reply and btw flows.

use serde_json::json;
use switchboard::config::{ScriptedSkillConfig, SkillsConfig};
use switchboard::context::{Context, Speaker};
use switchboard::flow::{FlowEngine, FlowError, FlowKind};
use switchboard::provider::Provider;
use switchboard::skill::SkillRegistry;
use switchboard::transport::{DeliveryKind, DryRunTransport};

use std::sync::Arc;

use crate::support::{
    engine, line_payload, line_postback, line_sticker, line_text, single_event, text,
    FixedResolver,
};

async fn started(flows: &FlowEngine, transport: &DryRunTransport) -> Context {
    let event = single_event(Provider::Line, &line_payload(vec![line_text("U1", "start")]));
    let context = flows
        .run(&event, None, transport)
        .await
        .expect("run")
        .expect("asking");
    transport.take_deliveries().await;
    context
}

#[tokio::test]
async fn valid_answer_completes_conversation() {
    let flows = engine(Some("age"), SkillsConfig::default());
    let transport = DryRunTransport::new(Provider::Line);
    let context = started(&flows, &transport).await;

    let answer = single_event(Provider::Line, &line_payload(vec![line_text("U1", "30")]));
    assert_eq!(flows.route(&answer, Some(&context)).expect("route").flow, FlowKind::Reply);

    let outcome = flows.run(&answer, Some(context), &transport).await.expect("run");
    assert!(outcome.is_none(), "conversation should be over");

    let deliveries = transport.deliveries().await;
    assert_eq!(deliveries.len(), 1);
    assert_eq!(deliveries[0].kind, DeliveryKind::Reply);
    assert_eq!(deliveries[0].messages, vec![text("You are 30")]);
}

#[tokio::test]
async fn invalid_answer_asks_again() {
    let flows = engine(Some("age"), SkillsConfig::default());
    let transport = DryRunTransport::new(Provider::Line);
    let context = started(&flows, &transport).await;

    let answer = single_event(Provider::Line, &line_payload(vec![line_text("U1", "old")]));
    let context = flows
        .run(&answer, Some(context), &transport)
        .await
        .expect("run")
        .expect("still asking");
    assert_eq!(context.flow, FlowKind::Reply);
    assert_eq!(context.confirming.as_deref(), Some("age"));
    assert!(context.confirmed.is_empty());
    assert!(context.to_confirm_named("age").is_some());
    assert_eq!(
        transport.deliveries().await[0].messages,
        vec![text("How old are you?")]
    );
}

#[tokio::test]
async fn out_of_range_answer_asks_again() {
    let flows = engine(Some("age"), SkillsConfig::default());
    let transport = DryRunTransport::new(Provider::Line);
    let context = started(&flows, &transport).await;

    let answer = single_event(Provider::Line, &line_payload(vec![line_text("U1", "200")]));
    let context = flows
        .run(&answer, Some(context), &transport)
        .await
        .expect("run")
        .expect("still asking");
    assert_eq!(context.confirming.as_deref(), Some("age"));
}

#[tokio::test]
async fn sticker_answer_asks_again() {
    let flows = engine(Some("age"), SkillsConfig::default());
    let transport = DryRunTransport::new(Provider::Line);
    let context = started(&flows, &transport).await;

    let sticker = single_event(Provider::Line, &line_payload(vec![line_sticker("U1")]));
    let context = flows
        .run(&sticker, Some(context), &transport)
        .await
        .expect("run")
        .expect("still asking");
    assert_eq!(context.confirming.as_deref(), Some("age"));
    assert_eq!(transport.deliveries().await.len(), 1);
}

#[tokio::test]
async fn postback_answers_the_pending_question() {
    let flows = engine(Some("age"), SkillsConfig::default());
    let transport = DryRunTransport::new(Provider::Line);
    let context = started(&flows, &transport).await;

    let postback = single_event(Provider::Line, &line_payload(vec![line_postback("U1", "42")]));
    assert!(flows
        .run(&postback, Some(context), &transport)
        .await
        .expect("run")
        .is_none());
    assert_eq!(
        transport.deliveries().await[0].messages,
        vec![text("You are 42")]
    );
}

#[tokio::test]
async fn turns_are_recorded_in_order() {
    let flows = engine(Some("age"), SkillsConfig::default());
    let transport = DryRunTransport::new(Provider::Line);
    let context = started(&flows, &transport).await;

    let turns = &context.previous.message;
    assert_eq!(turns.len(), 2);
    assert_eq!(turns[0].from, Speaker::User);
    assert_eq!(turns[0].message["text"], "start");
    assert_eq!(turns[1].from, Speaker::Bot);
    assert_eq!(turns[1].message, text("How old are you?"));
}

#[tokio::test]
async fn confirming_without_descriptor_is_an_error() {
    let flows = engine(Some("age"), SkillsConfig::default());
    let transport = DryRunTransport::new(Provider::Line);
    let mut context = Context::new(FlowKind::StartConversation, "age");
    context.confirming = Some("height".to_owned());

    let answer = single_event(Provider::Line, &line_payload(vec![line_text("U1", "180")]));
    let err = flows
        .run(&answer, Some(context), &transport)
        .await
        .expect_err("inconsistent");
    assert!(matches!(err, FlowError::UnknownParameter(ref name) if name == "height"));
}

#[tokio::test]
async fn btw_switches_intent_and_keeps_history() {
    let flows = engine(Some("age"), SkillsConfig::default());
    let transport = DryRunTransport::new(Provider::Line);
    let mut paused = Context::new(FlowKind::StartConversation, "pausing");
    paused.record(Speaker::User, json!("report"));
    paused.sender_language = Some("ja".to_owned());

    let event = single_event(Provider::Line, &line_payload(vec![line_text("U1", "by the way")]));
    assert_eq!(flows.route(&event, Some(&paused)).expect("route").flow, FlowKind::Btw);

    let context = flows
        .run(&event, Some(paused), &transport)
        .await
        .expect("run")
        .expect("asking for age");
    assert_eq!(context.flow, FlowKind::Btw);
    assert_eq!(context.intent.name, "age");
    assert_eq!(context.confirming.as_deref(), Some("age"));
    assert_eq!(context.sender_language.as_deref(), Some("ja"));
    assert_eq!(context.previous.message[0].message, json!("report"));
    assert_eq!(context.previous.message.len(), 3);
}

#[tokio::test]
async fn btw_without_new_intent_resumes_current_skill() {
    let flows = engine(Some("pausing"), SkillsConfig::default());
    let transport = DryRunTransport::new(Provider::Line);
    let paused = Context::new(FlowKind::StartConversation, "pausing");

    let event = single_event(Provider::Line, &line_payload(vec![line_text("U1", "done yet?")]));
    let outcome = flows.run(&event, Some(paused), &transport).await.expect("run");
    assert!(outcome.is_none());
    assert_eq!(transport.deliveries().await[0].messages, vec![text("Done")]);
}

#[tokio::test]
async fn btw_ignores_non_text_events() {
    let flows = engine(Some("age"), SkillsConfig::default());
    let transport = DryRunTransport::new(Provider::Line);
    let paused = Context::new(FlowKind::StartConversation, "pausing");

    let sticker = single_event(Provider::Line, &line_payload(vec![line_sticker("U1")]));
    assert!(flows
        .run(&sticker, Some(paused), &transport)
        .await
        .expect_err("skip")
        .is_skip());
}

#[tokio::test]
async fn scripted_skill_collects_in_order_and_fills_reply() {
    let config: ScriptedSkillConfig = toml::from_str(
        r#"
name = "order"
reply = { type = "text", text = "{count} x {size}, coming up" }

[[parameters]]
name = "size"
pattern = "^(small|large)$"
[parameters.message_to_confirm.line]
type = "text"
text = "Which size?"

[[parameters]]
name = "count"
pattern = "^[0-9]+$"
[parameters.message_to_confirm.line]
text = "How many?"
"#,
    )
    .expect("parse");
    let skills = SkillRegistry::from_config(&[config]).expect("skills");
    let flows = FlowEngine::new(
        Arc::new(skills),
        Arc::new(FixedResolver(Some("order"))),
        SkillsConfig::default(),
    );
    let transport = DryRunTransport::new(Provider::Line);

    let context = started(&flows, &transport).await;
    assert_eq!(context.confirming.as_deref(), Some("size"));

    let wrong = single_event(Provider::Line, &line_payload(vec![line_text("U1", "medium")]));
    let context = flows
        .run(&wrong, Some(context), &transport)
        .await
        .expect("run")
        .expect("asks again");
    assert_eq!(context.confirming.as_deref(), Some("size"));
    transport.take_deliveries().await;

    let size = single_event(Provider::Line, &line_payload(vec![line_text("U1", "large")]));
    let context = flows
        .run(&size, Some(context), &transport)
        .await
        .expect("run")
        .expect("asks for count");
    assert_eq!(context.confirming.as_deref(), Some("count"));
    assert_eq!(context.confirmed["size"], "large");
    assert_eq!(context.previous.confirmed, vec!["size".to_owned()]);
    // The count question is written in Facebook schema; it is compiled for LINE.
    assert_eq!(
        transport.take_deliveries().await[0].messages,
        vec![text("How many?")]
    );

    let count = single_event(Provider::Line, &line_payload(vec![line_text("U1", "2")]));
    assert!(flows
        .run(&count, Some(context), &transport)
        .await
        .expect("run")
        .is_none());
    assert_eq!(
        transport.deliveries().await[0].messages,
        vec![text("2 x large, coming up")]
    );
}
