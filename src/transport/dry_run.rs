//! A transport that records deliveries instead of calling provider APIs.
//!
//! Used by `switchboard replay` and by tests. Every signature is accepted.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::info;

use super::{Transport, TransportError};
use crate::event::Event;
use crate::provider::Provider;

/// How a recorded delivery was requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryKind {
    /// Reply to an inbound event.
    Reply,
    /// Push to one recipient.
    Push,
    /// Same messages to several recipients.
    Multicast,
}

/// One recorded delivery.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Delivery {
    /// How the delivery was requested.
    pub kind: DeliveryKind,
    /// Recipient identifiers.
    pub recipients: Vec<String>,
    /// Messages, in the transport provider's schema.
    pub messages: Vec<Value>,
    /// Recipient language hint, for pushes.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
}

/// Recording transport for one provider.
#[derive(Clone)]
pub struct DryRunTransport {
    provider: Provider,
    deliveries: Arc<Mutex<Vec<Delivery>>>,
}

impl DryRunTransport {
    /// Create a transport that records deliveries for `provider`.
    pub fn new(provider: Provider) -> Self {
        Self {
            provider,
            deliveries: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Everything delivered so far, oldest first.
    pub async fn deliveries(&self) -> Vec<Delivery> {
        self.deliveries.lock().await.clone()
    }

    /// Remove and return everything delivered so far.
    pub async fn take_deliveries(&self) -> Vec<Delivery> {
        std::mem::take(&mut *self.deliveries.lock().await)
    }

    async fn record(&self, delivery: Delivery) {
        info!(
            provider = %self.provider,
            kind = ?delivery.kind,
            recipients = ?delivery.recipients,
            messages = delivery.messages.len(),
            "dry-run delivery"
        );
        self.deliveries.lock().await.push(delivery);
    }
}

#[async_trait]
impl Transport for DryRunTransport {
    fn provider(&self) -> Provider {
        self.provider
    }

    async fn send(
        &self,
        recipient_id: &str,
        messages: &[Value],
        language: Option<&str>,
    ) -> Result<(), TransportError> {
        self.record(Delivery {
            kind: DeliveryKind::Push,
            recipients: vec![recipient_id.to_owned()],
            messages: messages.to_vec(),
            language: language.map(str::to_owned),
        })
        .await;
        Ok(())
    }

    async fn reply(&self, event: &Event, messages: &[Value]) -> Result<(), TransportError> {
        self.record(Delivery {
            kind: DeliveryKind::Reply,
            recipients: vec![event.sender_id.clone()],
            messages: messages.to_vec(),
            language: None,
        })
        .await;
        Ok(())
    }

    async fn multicast(
        &self,
        recipient_ids: &[String],
        messages: &[Value],
    ) -> Result<(), TransportError> {
        self.record(Delivery {
            kind: DeliveryKind::Multicast,
            recipients: recipient_ids.to_vec(),
            messages: messages.to_vec(),
            language: None,
        })
        .await;
        Ok(())
    }

    fn validate_signature(&self, _signature: &str, _raw_body: &[u8]) -> bool {
        true
    }
}
