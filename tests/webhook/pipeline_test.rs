//! End-to-end request handling: detection, signatures, persistence.

use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Map, Value};
use switchboard::config::{Config, SkillsConfig};
use switchboard::context::Context;
use switchboard::event::Event;
use switchboard::flow::{FlowError, FlowKind};
use switchboard::provider::Provider;
use switchboard::store::{MemoryStore, StoreError};
use switchboard::transport::line::{self, LineCredentials, LineTransport};
use switchboard::transport::{DryRunTransport, Transport};
use switchboard::webhook::{
    EventOutcome, Webhook, WebhookError, WebhookOutcome, WebhookRequest,
};

use crate::support::{
    engine, facebook_payload, facebook_text, line_follow, line_payload, line_text, text,
    FailingTransport, ObservedStore, StoreOp,
};

const RETENTION: Duration = Duration::from_secs(600);

struct Harness {
    webhook: Arc<Webhook>,
    store: ObservedStore,
    line: DryRunTransport,
    facebook: DryRunTransport,
}

fn harness(intent: Option<&'static str>, bindings: SkillsConfig) -> Harness {
    let store = ObservedStore::default();
    let line = DryRunTransport::new(Provider::Line);
    let facebook = DryRunTransport::new(Provider::Facebook);
    let webhook = Webhook::new(engine(intent, bindings), Arc::new(store.clone()), RETENTION)
        .with_transport(Arc::new(line.clone()))
        .with_transport(Arc::new(facebook.clone()));
    Harness {
        webhook: Arc::new(webhook),
        store,
        line,
        facebook,
    }
}

fn line_request(payload: &Value) -> WebhookRequest {
    WebhookRequest::new(payload.to_string()).header("X-Line-Signature", "dry-run")
}

fn facebook_request(payload: &Value) -> WebhookRequest {
    WebhookRequest::new(payload.to_string()).header("X-Hub-Signature-256", "sha256=dry-run")
}

fn processed(outcome: WebhookOutcome) -> Vec<EventOutcome> {
    match outcome {
        WebhookOutcome::Processed { events, .. } => events,
        other => panic!("expected processed events, got {other:?}"),
    }
}

#[tokio::test]
async fn unrecognised_request_is_ignored() {
    let h = harness(Some("age"), SkillsConfig::default());

    let unsigned = WebhookRequest::new(line_payload(vec![line_text("U1", "hi")]).to_string());
    assert_eq!(
        h.webhook.handle(&unsigned).await.expect("handle"),
        WebhookOutcome::Ignored
    );

    let wrong_body = WebhookRequest::new(json!({"hello": "world"}).to_string())
        .header("x-line-signature", "dry-run");
    assert_eq!(
        h.webhook.handle(&wrong_body).await.expect("handle"),
        WebhookOutcome::Ignored
    );
    assert!(h.store.ops().await.is_empty());
}

#[tokio::test]
async fn non_json_body_is_rejected() {
    let h = harness(Some("age"), SkillsConfig::default());
    let request = WebhookRequest::new("not json").header("x-line-signature", "sig");
    assert!(matches!(
        h.webhook.handle(&request).await,
        Err(WebhookError::InvalidBody(_))
    ));
}

#[tokio::test]
async fn signature_is_checked_with_provider_secret() {
    let store = ObservedStore::default();
    let transport = LineTransport::new(LineCredentials {
        channel_secret: "channel-secret".to_owned(),
        access_token: "token".to_owned(),
    });
    let webhook = Arc::new(
        Webhook::new(
            engine(None, SkillsConfig::default()),
            Arc::new(store.clone()),
            RETENTION,
        )
        .with_transport(Arc::new(transport)),
    );
    let body = line_payload(vec![line_follow("U1")]).to_string();

    let forged = WebhookRequest::new(body.clone()).header("x-line-signature", "AAAA");
    assert!(matches!(
        webhook.handle(&forged).await,
        Err(WebhookError::InvalidSignature(Provider::Line))
    ));
    assert!(store.ops().await.is_empty());

    let signature = line::sign("channel-secret", body.as_bytes()).expect("sign");
    let genuine = WebhookRequest::new(body).header("x-line-signature", signature);
    // No follow skill is bound, so the event is skipped without any delivery.
    let events = processed(webhook.handle(&genuine).await.expect("handle"));
    assert!(matches!(events[0], EventOutcome::Skipped { .. }));
}

#[tokio::test]
async fn provider_without_transport_is_unsupported() {
    let webhook = Arc::new(
        Webhook::new(
            engine(None, SkillsConfig::default()),
            Arc::new(ObservedStore::default()),
            RETENTION,
        )
        .with_transport(Arc::new(DryRunTransport::new(Provider::Line))),
    );
    let request = facebook_request(&facebook_payload(vec![facebook_text("PSID1", "hi")]));
    assert!(matches!(
        webhook.handle(&request).await,
        Err(WebhookError::UnsupportedPlatform(Provider::Facebook))
    ));
}

#[tokio::test]
async fn verification_probe_touches_nothing() {
    let h = harness(Some("age"), SkillsConfig::default());
    let payload = line_payload(vec![json!({
        "type": "message",
        "replyToken": "00000000000000000000000000000000",
        "source": {"type": "user", "userId": "Udeadbeefdeadbeefdeadbeefdeadbeef"},
        "message": {"id": "100001", "type": "text", "text": "Hello, world"}
    })]);

    let outcome = h.webhook.handle(&line_request(&payload)).await.expect("handle");
    assert_eq!(outcome, WebhookOutcome::VerificationProbe);
    assert!(h.store.ops().await.is_empty());
    assert!(h.line.deliveries().await.is_empty());
}

#[tokio::test]
async fn conversation_is_persisted_then_cleared() {
    let h = harness(Some("age"), SkillsConfig::default());

    let first = line_request(&line_payload(vec![line_text("U1", "sign me up")]));
    let events = processed(h.webhook.handle(&first).await.expect("handle"));
    assert_eq!(
        events,
        vec![EventOutcome::Persisted {
            session_id: "U1".to_owned(),
            flow: FlowKind::StartConversation,
            confirming: Some("age".to_owned()),
        }]
    );
    let stored = h.store.peek("U1").await.expect("stored");
    assert_eq!(stored.confirming.as_deref(), Some("age"));

    let second = line_request(&line_payload(vec![line_text("U1", "30")]));
    let events = processed(h.webhook.handle(&second).await.expect("handle"));
    assert_eq!(
        events,
        vec![EventOutcome::Completed {
            session_id: "U1".to_owned()
        }]
    );
    assert!(h.store.peek("U1").await.is_none());
    assert_eq!(
        h.store.writes().await,
        vec![StoreOp::Put("U1".to_owned()), StoreOp::Del("U1".to_owned())]
    );

    let deliveries = h.line.deliveries().await;
    assert_eq!(deliveries.len(), 2);
    assert_eq!(deliveries[1].messages, vec![text("You are 30")]);
}

#[tokio::test]
async fn skipped_event_leaves_store_untouched() {
    let h = harness(Some("age"), SkillsConfig::default());
    let mut existing = Context::new(FlowKind::StartConversation, "pausing");
    existing.sender_language = Some("en".to_owned());
    h.store.seed("U1", &existing).await;

    let request = line_request(&line_payload(vec![line_follow("U1")]));
    let events = processed(h.webhook.handle(&request).await.expect("handle"));
    assert!(matches!(
        &events[0],
        EventOutcome::Skipped { session_id, .. } if session_id == "U1"
    ));
    assert!(h.store.writes().await.is_empty());
    assert_eq!(h.store.peek("U1").await, Some(existing));
}

#[tokio::test]
async fn failing_skill_clears_context() {
    let h = harness(Some("failing"), SkillsConfig::default());
    let mut stale = Context::new(FlowKind::StartConversation, "pausing");
    stale.sender_language = Some("en".to_owned());
    h.store.seed("U1", &stale).await;

    // The stored context is paused with nothing asked, so the text resolves a
    // new intent through the btw flow, whose skill then fails.
    let request = line_request(&line_payload(vec![line_text("U1", "help")]));
    let err = h.webhook.handle(&request).await.expect_err("aborted");
    match err {
        WebhookError::AbnormalTermination { session_id, source } => {
            assert_eq!(session_id, "U1");
            assert!(matches!(source, FlowError::Skill(_)));
        }
        other => panic!("expected abnormal termination, got {other}"),
    }
    assert!(h.store.peek("U1").await.is_none());
    assert_eq!(h.store.writes().await, vec![StoreOp::Del("U1".to_owned())]);
}

#[tokio::test]
async fn uncompilable_reply_clears_context() {
    let h = harness(Some("overfull"), SkillsConfig::default());
    let request = facebook_request(&facebook_payload(vec![facebook_text("PSID1", "menu")]));

    let err = h.webhook.handle(&request).await.expect_err("aborted");
    assert!(matches!(
        err,
        WebhookError::AbnormalTermination { source: FlowError::Compile(_), .. }
    ));
    assert!(h.facebook.deliveries().await.is_empty());
    assert_eq!(h.store.writes().await, vec![StoreOp::Del("PSID1".to_owned())]);
}

#[tokio::test]
async fn delivery_failure_clears_context() {
    let store = ObservedStore::default();
    let webhook = Arc::new(
        Webhook::new(
            engine(Some("age"), SkillsConfig::default()),
            Arc::new(store.clone()),
            RETENTION,
        )
        .with_transport(Arc::new(FailingTransport(Provider::Line))),
    );
    let request = line_request(&line_payload(vec![line_text("U1", "hi")]));

    let err = webhook.handle(&request).await.expect_err("aborted");
    assert!(matches!(
        err,
        WebhookError::AbnormalTermination { source: FlowError::Transport(_), .. }
    ));
    assert_eq!(store.writes().await, vec![StoreOp::Del("U1".to_owned())]);
}

#[tokio::test]
async fn failed_cleanup_returns_store_error() {
    let store = ObservedStore::with_failing_deletes();
    let webhook = Arc::new(
        Webhook::new(
            engine(Some("age"), SkillsConfig::default()),
            Arc::new(store.clone()),
            RETENTION,
        )
        .with_transport(Arc::new(FailingTransport(Provider::Line))),
    );
    let request = line_request(&line_payload(vec![line_text("U1", "hi")]));

    let err = webhook.handle(&request).await.expect_err("store failure");
    assert!(matches!(
        err,
        WebhookError::Store(StoreError::Database(sqlx::Error::PoolClosed))
    ));
    assert_eq!(store.writes().await, vec![StoreOp::Del("U1".to_owned())]);
}

#[tokio::test]
async fn events_are_reported_in_payload_order() {
    let bindings = SkillsConfig {
        follow: Some("greet".to_owned()),
        ..SkillsConfig::default()
    };
    let h = harness(Some("age"), bindings);
    let payload = line_payload(vec![
        line_text("U1", "hi"),
        line_follow("U2"),
        line_text("U3", "hello"),
    ]);

    let events = processed(h.webhook.handle(&line_request(&payload)).await.expect("handle"));
    let sessions: Vec<&str> = events
        .iter()
        .map(|outcome| match outcome {
            EventOutcome::Persisted { session_id, .. }
            | EventOutcome::Completed { session_id }
            | EventOutcome::Skipped { session_id, .. } => session_id.as_str(),
        })
        .collect();
    assert_eq!(sessions, vec!["U1", "U2", "U3"]);
    assert!(matches!(events[1], EventOutcome::Completed { .. }));
    assert_eq!(h.line.deliveries().await.len(), 3);
}

#[tokio::test]
async fn facebook_request_uses_facebook_transport() {
    let h = harness(Some("age"), SkillsConfig::default());
    let request = facebook_request(&facebook_payload(vec![facebook_text("PSID1", "hi")]));

    let outcome = h.webhook.handle(&request).await.expect("handle");
    assert!(matches!(
        outcome,
        WebhookOutcome::Processed { provider: Provider::Facebook, .. }
    ));
    assert!(h.line.deliveries().await.is_empty());
    assert_eq!(
        h.facebook.deliveries().await[0].messages,
        vec![json!({"text": "How old are you?"})]
    );
}

#[tokio::test]
async fn push_starts_conversation_proactively() {
    let h = harness(None, SkillsConfig::default());
    let event = Event::push(Provider::Line, "U7", "age", Map::new());

    let outcome = h.webhook.push(event).await.expect("push");
    assert_eq!(
        outcome,
        EventOutcome::Persisted {
            session_id: "U7".to_owned(),
            flow: FlowKind::Push,
            confirming: Some("age".to_owned()),
        }
    );
    let deliveries = h.line.deliveries().await;
    assert_eq!(deliveries[0].recipients, vec!["U7".to_owned()]);
    assert_eq!(h.line.provider(), Provider::Line);
}

#[test]
fn from_config_rejects_unbound_skill_names() {
    let config: Config = toml::from_str(
        r#"
[skills]
default = "hello"

[[intents]]
pattern = "(?i)pizza"
skill = "order"

[[scripted_skills]]
name = "hello"
reply = { text = "Hi" }
"#,
    )
    .expect("parse");
    let err = match Webhook::from_config(&config, Arc::new(MemoryStore::new())) {
        Ok(_) => panic!("unknown skill should be rejected"),
        Err(err) => err.to_string(),
    };
    assert!(err.contains("`order`"), "{err}");
    assert!(err.contains("[hello]"), "{err}");

    let config: Config = toml::from_str(
        "[skills]\ndefault = \"hello\"\n\n[[scripted_skills]]\nname = \"hello\"\nreply = { text = \"Hi\" }\n",
    )
    .expect("parse");
    assert!(Webhook::from_config(&config, Arc::new(MemoryStore::new())).is_ok());
}
