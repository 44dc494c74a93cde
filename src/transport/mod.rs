//! Outbound delivery to messaging providers.
//!
//! A [`Transport`] sends already-compiled messages in its provider's schema
//! and verifies webhook signatures with the provider's secret. Flows never
//! talk to a provider API directly.

pub mod dry_run;
pub mod facebook;
pub mod line;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

use crate::event::Event;
use crate::provider::Provider;

pub use dry_run::{Delivery, DeliveryKind, DryRunTransport};
pub use facebook::FacebookTransport;
pub use line::LineTransport;

/// Longest provider error body kept in [`TransportError::Api`].
const MAX_ERROR_BODY_CHARS: usize = 256;

/// Delivery errors.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The HTTP request could not be sent or its response read.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The provider API rejected the request.
    #[error("{provider} API returned HTTP {status}: {body}")]
    Api {
        /// Provider whose API answered.
        provider: Provider,
        /// HTTP status code.
        status: u16,
        /// Response body, whitespace-collapsed and truncated.
        body: String,
    },

    /// A reply was requested for an event the provider cannot reply to.
    #[error("{0} event carries no reply token")]
    MissingReplyToken(Provider),
}

/// Sends messages to one provider.
#[async_trait]
pub trait Transport: Send + Sync {
    /// The provider this transport talks to.
    fn provider(&self) -> Provider;

    /// Push `messages` to `recipient_id`. `language` is the recipient's
    /// language when known, for transports that localise.
    async fn send(
        &self,
        recipient_id: &str,
        messages: &[Value],
        language: Option<&str>,
    ) -> Result<(), TransportError>;

    /// Reply to the user who caused `event`.
    async fn reply(&self, event: &Event, messages: &[Value]) -> Result<(), TransportError>;

    /// Send the same `messages` to every recipient.
    async fn multicast(
        &self,
        recipient_ids: &[String],
        messages: &[Value],
    ) -> Result<(), TransportError> {
        for recipient_id in recipient_ids {
            self.send(recipient_id, messages, None).await?;
        }
        Ok(())
    }

    /// Check a webhook signature header against the raw request body.
    fn validate_signature(&self, signature: &str, raw_body: &[u8]) -> bool;
}

/// Turn a non-success response into [`TransportError::Api`].
pub(crate) async fn check_response(
    provider: Provider,
    response: reqwest::Response,
) -> Result<String, TransportError> {
    let status = response.status();
    let body = response.text().await?;
    if !status.is_success() {
        return Err(TransportError::Api {
            provider,
            status: status.as_u16(),
            body: shorten(&body),
        });
    }
    Ok(body)
}

fn shorten(raw: &str) -> String {
    let collapsed = raw.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.chars().count() > MAX_ERROR_BODY_CHARS {
        let mut shortened: String = collapsed.chars().take(MAX_ERROR_BODY_CHARS).collect();
        shortened.push_str("...");
        return shortened;
    }
    collapsed
}
