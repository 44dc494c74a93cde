//! Facebook Messenger Send API transport.

use async_trait::async_trait;
use hmac::{Hmac, Mac};
use serde_json::{json, Value};
use sha2::Sha256;
use tracing::debug;

use super::{check_response, Transport, TransportError};
use crate::event::Event;
use crate::provider::Provider;

/// Production Graph API origin, including the version segment.
pub const FACEBOOK_GRAPH_BASE: &str = "https://graph.facebook.com/v19.0";

/// Page credentials.
#[derive(Clone)]
pub struct FacebookCredentials {
    /// App secret, used to verify webhook signatures.
    pub app_secret: String,
    /// Page access token, used to call the Send API.
    pub page_access_token: String,
}

impl std::fmt::Debug for FacebookCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FacebookCredentials")
            .field("app_secret", &"__REDACTED__")
            .field("page_access_token", &"__REDACTED__")
            .finish()
    }
}

/// Compute the `X-Hub-Signature-256` value Facebook sends for `raw_body`.
pub fn sign(app_secret: &str, raw_body: &[u8]) -> Option<String> {
    let mut mac = Hmac::<Sha256>::new_from_slice(app_secret.as_bytes()).ok()?;
    mac.update(raw_body);
    Some(format!("sha256={}", hex::encode(mac.finalize().into_bytes())))
}

/// Verify an `X-Hub-Signature-256` header (`sha256=<hex>`): HMAC-SHA256 of
/// the body keyed with the app secret. Legacy `sha1=` signatures are rejected.
pub fn verify_signature(app_secret: &str, signature: &str, raw_body: &[u8]) -> bool {
    let Some(digest_hex) = signature.trim().strip_prefix("sha256=") else {
        return false;
    };
    let Ok(expected) = hex::decode(digest_hex) else {
        return false;
    };
    let Ok(mut mac) = Hmac::<Sha256>::new_from_slice(app_secret.as_bytes()) else {
        return false;
    };
    mac.update(raw_body);
    mac.verify_slice(&expected).is_ok()
}

/// Sends through the Messenger Send API, one request per message.
pub struct FacebookTransport {
    client: reqwest::Client,
    api_base: String,
    credentials: FacebookCredentials,
}

impl FacebookTransport {
    /// Create a transport against the production Graph API.
    pub fn new(credentials: FacebookCredentials) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_base: FACEBOOK_GRAPH_BASE.to_owned(),
            credentials,
        }
    }

    /// Point the transport at another Graph API origin.
    #[must_use]
    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into();
        self
    }

    async fn deliver(
        &self,
        recipient_id: &str,
        messages: &[Value],
        messaging_type: &str,
    ) -> Result<(), TransportError> {
        let url = format!("{}/me/messages", self.api_base.trim_end_matches('/'));
        for message in messages {
            let response = self
                .client
                .post(&url)
                .query(&[("access_token", self.credentials.page_access_token.as_str())])
                .json(&json!({
                    "recipient": {"id": recipient_id},
                    "messaging_type": messaging_type,
                    "message": message,
                }))
                .send()
                .await?;
            check_response(Provider::Facebook, response).await?;
        }
        Ok(())
    }
}

#[async_trait]
impl Transport for FacebookTransport {
    fn provider(&self) -> Provider {
        Provider::Facebook
    }

    async fn send(
        &self,
        recipient_id: &str,
        messages: &[Value],
        language: Option<&str>,
    ) -> Result<(), TransportError> {
        if let Some(language) = language {
            debug!(recipient_id, language, "Messenger send does not localise");
        }
        self.deliver(recipient_id, messages, "UPDATE").await
    }

    async fn reply(&self, event: &Event, messages: &[Value]) -> Result<(), TransportError> {
        self.deliver(&event.sender_id, messages, "RESPONSE").await
    }

    fn validate_signature(&self, signature: &str, raw_body: &[u8]) -> bool {
        verify_signature(&self.credentials.app_secret, signature, raw_body)
    }
}
