//! LINE Messaging API transport.

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use hmac::{Hmac, Mac};
use serde_json::{json, Value};
use sha2::Sha256;
use tracing::{debug, warn};

use super::{check_response, Transport, TransportError};
use crate::event::Event;
use crate::provider::Provider;

/// Production API origin.
pub const LINE_API_BASE: &str = "https://api.line.me";

/// Messages LINE accepts in one reply or push request.
pub const LINE_MAX_MESSAGES_PER_REQUEST: usize = 5;

/// Recipients LINE accepts in one multicast request.
pub const LINE_MAX_MULTICAST_RECIPIENTS: usize = 500;

/// Channel credentials.
#[derive(Clone)]
pub struct LineCredentials {
    /// Channel secret, used to verify webhook signatures.
    pub channel_secret: String,
    /// Channel access token, used to call the API.
    pub access_token: String,
}

impl std::fmt::Debug for LineCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LineCredentials")
            .field("channel_secret", &"__REDACTED__")
            .field("access_token", &"__REDACTED__")
            .finish()
    }
}

/// Compute the `X-Line-Signature` value LINE sends for `raw_body`.
pub fn sign(channel_secret: &str, raw_body: &[u8]) -> Option<String> {
    let mut mac = Hmac::<Sha256>::new_from_slice(channel_secret.as_bytes()).ok()?;
    mac.update(raw_body);
    Some(STANDARD.encode(mac.finalize().into_bytes()))
}

/// Verify an `X-Line-Signature` header: base64 of HMAC-SHA256 of the body
/// keyed with the channel secret.
pub fn verify_signature(channel_secret: &str, signature: &str, raw_body: &[u8]) -> bool {
    let Ok(expected) = STANDARD.decode(signature.trim()) else {
        return false;
    };
    let Ok(mut mac) = Hmac::<Sha256>::new_from_slice(channel_secret.as_bytes()) else {
        return false;
    };
    mac.update(raw_body);
    mac.verify_slice(&expected).is_ok()
}

/// Sends through the LINE Messaging API.
pub struct LineTransport {
    client: reqwest::Client,
    api_base: String,
    credentials: LineCredentials,
}

impl LineTransport {
    /// Create a transport against the production API.
    pub fn new(credentials: LineCredentials) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_base: LINE_API_BASE.to_owned(),
            credentials,
        }
    }

    /// Point the transport at another API origin.
    #[must_use]
    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into();
        self
    }

    async fn post(&self, path: &str, body: &Value) -> Result<(), TransportError> {
        let url = format!("{}{path}", self.api_base.trim_end_matches('/'));
        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.credentials.access_token)
            .json(body)
            .send()
            .await?;
        check_response(Provider::Line, response).await?;
        Ok(())
    }

    async fn push_chunks(&self, to: &str, messages: &[Value]) -> Result<(), TransportError> {
        for chunk in messages.chunks(LINE_MAX_MESSAGES_PER_REQUEST) {
            self.post("/v2/bot/message/push", &json!({"to": to, "messages": chunk}))
                .await?;
        }
        Ok(())
    }
}

#[async_trait]
impl Transport for LineTransport {
    fn provider(&self) -> Provider {
        Provider::Line
    }

    async fn send(
        &self,
        recipient_id: &str,
        messages: &[Value],
        language: Option<&str>,
    ) -> Result<(), TransportError> {
        if let Some(language) = language {
            debug!(recipient_id, language, "LINE push does not localise");
        }
        self.push_chunks(recipient_id, messages).await
    }

    async fn reply(&self, event: &Event, messages: &[Value]) -> Result<(), TransportError> {
        let token = event
            .native
            .get("replyToken")
            .and_then(Value::as_str)
            .ok_or(TransportError::MissingReplyToken(Provider::Line))?;

        let split = messages.len().min(LINE_MAX_MESSAGES_PER_REQUEST);
        let (now, rest) = messages.split_at(split);
        self.post(
            "/v2/bot/message/reply",
            &json!({"replyToken": token, "messages": now}),
        )
        .await?;
        if !rest.is_empty() {
            // A reply token is single-use; overflow goes out as a push.
            warn!(
                overflow = rest.len(),
                "reply exceeds LINE message limit, pushing remainder"
            );
            self.push_chunks(&event.session_id, rest).await?;
        }
        Ok(())
    }

    async fn multicast(
        &self,
        recipient_ids: &[String],
        messages: &[Value],
    ) -> Result<(), TransportError> {
        for recipients in recipient_ids.chunks(LINE_MAX_MULTICAST_RECIPIENTS) {
            for chunk in messages.chunks(LINE_MAX_MESSAGES_PER_REQUEST) {
                self.post(
                    "/v2/bot/message/multicast",
                    &json!({"to": recipients, "messages": chunk}),
                )
                .await?;
            }
        }
        Ok(())
    }

    fn validate_signature(&self, signature: &str, raw_body: &[u8]) -> bool {
        verify_signature(&self.credentials.channel_secret, signature, raw_body)
    }
}
