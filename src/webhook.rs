//! Webhook pipeline.
//!
//! One request: detect the provider, verify the signature, normalize the
//! payload, then run every event concurrently. Each event's own steps are
//! sequential: load context, run the flow, persist or clear the context.
//!
//! Events for the same session are not serialized against each other.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use tokio::task::JoinSet;
use tracing::{debug, error, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::config::Config;
use crate::event::{self, Event, Inbound, NormalizeError};
use crate::flow::{FlowEngine, FlowError, FlowKind};
use crate::intent::RuleResolver;
use crate::provider::Provider;
use crate::skill::SkillRegistry;
use crate::store::{SessionStore, StoreError};
use crate::transport::Transport;

/// Webhook pipeline errors.
#[derive(Debug, Error)]
pub enum WebhookError {
    /// No transport is configured for the detected provider.
    #[error("no transport configured for {0}")]
    UnsupportedPlatform(Provider),

    /// The signature header does not match the body.
    #[error("{0} webhook signature is invalid")]
    InvalidSignature(Provider),

    /// The body is not JSON.
    #[error("webhook body is not JSON: {0}")]
    InvalidBody(#[from] serde_json::Error),

    /// The payload could not be normalized.
    #[error(transparent)]
    Normalize(#[from] NormalizeError),

    /// The session store failed.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// A flow failed; the session's context has been deleted.
    #[error("conversation aborted for session {session_id}: {source}")]
    AbnormalTermination {
        /// Session whose context was cleared.
        session_id: String,
        /// The flow failure.
        #[source]
        source: FlowError,
    },

    /// An event task panicked or was cancelled.
    #[error("event task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// An inbound HTTP request, reduced to what the pipeline reads.
#[derive(Debug, Clone, Default)]
pub struct WebhookRequest {
    headers: BTreeMap<String, String>,
    body: Vec<u8>,
}

impl WebhookRequest {
    /// A request with `body` and no headers.
    pub fn new(body: impl Into<Vec<u8>>) -> Self {
        Self {
            headers: BTreeMap::new(),
            body: body.into(),
        }
    }

    /// Add a header. Names are case-insensitive.
    #[must_use]
    pub fn header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.insert(name.to_ascii_lowercase(), value.into());
        self
    }

    /// Headers with lowercase names.
    pub fn headers(&self) -> &BTreeMap<String, String> {
        &self.headers
    }

    /// Raw body bytes, as signed by the provider.
    pub fn body(&self) -> &[u8] {
        &self.body
    }
}

/// What happened to one event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum EventOutcome {
    /// The conversation continues; its context was stored.
    Persisted {
        /// Session key.
        session_id: String,
        /// Flow that handled the event.
        flow: FlowKind,
        /// Parameter now being asked for.
        confirming: Option<String>,
    },
    /// The conversation finished; its context was deleted.
    Completed {
        /// Session key.
        session_id: String,
    },
    /// No flow handled the event; stored context is unchanged.
    Skipped {
        /// Session key.
        session_id: String,
        /// Why the event was skipped.
        reason: String,
    },
}

/// What happened to one request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum WebhookOutcome {
    /// No provider recognised the request.
    Ignored,
    /// The provider was verifying the endpoint; nothing was processed.
    VerificationProbe,
    /// Events were processed, in payload order.
    Processed {
        /// Provider that sent the request.
        provider: Provider,
        /// Per-event outcomes.
        events: Vec<EventOutcome>,
    },
}

/// The webhook pipeline: store, flows and one transport per provider.
pub struct Webhook {
    flows: FlowEngine,
    store: Arc<dyn SessionStore>,
    transports: BTreeMap<Provider, Arc<dyn Transport>>,
    retention: Duration,
}

impl Webhook {
    /// Create a pipeline with no transports.
    pub fn new(flows: FlowEngine, store: Arc<dyn SessionStore>, retention: Duration) -> Self {
        Self {
            flows,
            store,
            transports: BTreeMap::new(),
            retention,
        }
    }

    /// Build the flows from `config`: scripted skills, intent rules and
    /// skill bindings.
    ///
    /// # Errors
    ///
    /// Returns an error if a pattern in the config does not compile or a
    /// binding or intent rule names an undeclared skill.
    pub fn from_config(config: &Config, store: Arc<dyn SessionStore>) -> anyhow::Result<Self> {
        let skills = SkillRegistry::from_config(&config.scripted_skills)
            .map_err(|e| anyhow::anyhow!("invalid scripted skill pattern: {e}"))?;
        let resolver = RuleResolver::new(&config.intents)
            .map_err(|e| anyhow::anyhow!("invalid intent pattern: {e}"))?;
        if let Some(name) = config
            .referenced_skills()
            .find(|name| !skills.contains(name))
        {
            anyhow::bail!(
                "config refers to unknown skill `{name}` (declared: [{}])",
                skills.names().join(", ")
            );
        }
        info!(
            providers = ?config.providers.configured(),
            skills = ?skills.names(),
            "webhook configured"
        );
        let flows = FlowEngine::new(
            Arc::new(skills),
            Arc::new(resolver),
            config.skills.clone(),
        );
        Ok(Self::new(flows, store, config.store.retention()))
    }

    /// Register the transport for its provider, replacing any previous one.
    #[must_use]
    pub fn with_transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transports.insert(transport.provider(), transport);
        self
    }

    fn transport(&self, provider: Provider) -> Result<&Arc<dyn Transport>, WebhookError> {
        self.transports
            .get(&provider)
            .ok_or(WebhookError::UnsupportedPlatform(provider))
    }

    /// Handle one webhook request.
    ///
    /// Every event runs to completion even when another fails; the first
    /// failure is then returned.
    ///
    /// # Errors
    ///
    /// Returns [`WebhookError`] for unparseable or unauthenticated requests,
    /// store failures and abnormal flow terminations.
    pub async fn handle(
        self: &Arc<Self>,
        request: &WebhookRequest,
    ) -> Result<WebhookOutcome, WebhookError> {
        let payload: Value = serde_json::from_slice(request.body())?;
        let Some((provider, signature)) = event::detect_provider(request.headers(), &payload)
        else {
            debug!("request matches no provider, ignoring");
            return Ok(WebhookOutcome::Ignored);
        };

        if !self
            .transport(provider)?
            .validate_signature(signature, request.body())
        {
            warn!(%provider, "webhook signature mismatch");
            return Err(WebhookError::InvalidSignature(provider));
        }

        let events = match event::classify(provider, &payload)? {
            Inbound::VerificationProbe => {
                info!(%provider, "webhook verification probe");
                return Ok(WebhookOutcome::VerificationProbe);
            }
            Inbound::Events(events) => events,
        };
        debug!(%provider, count = events.len(), "processing events");

        let mut tasks = JoinSet::new();
        for (index, event) in events.into_iter().enumerate() {
            let this = Arc::clone(self);
            let span = info_span!(
                "event",
                trace_id = %Uuid::new_v4(),
                session_id = %event.session_id,
                %provider,
            );
            tasks.spawn(async move { (index, this.process(event).await) }.instrument(span));
        }

        let mut outcomes = Vec::new();
        let mut first_error = None;
        while let Some(joined) = tasks.join_next().await {
            let failure = match joined {
                Ok((index, Ok(outcome))) => {
                    outcomes.push((index, outcome));
                    continue;
                }
                Ok((_, Err(err))) => err,
                Err(join) => WebhookError::Task(join),
            };
            if first_error.is_none() {
                first_error = Some(failure);
            } else {
                error!(error = %failure, "additional event failure");
            }
        }
        if let Some(err) = first_error {
            return Err(err);
        }

        outcomes.sort_by_key(|(index, _)| *index);
        Ok(WebhookOutcome::Processed {
            provider,
            events: outcomes.into_iter().map(|(_, outcome)| outcome).collect(),
        })
    }

    /// Run one event through load, flow and persist.
    ///
    /// # Errors
    ///
    /// Returns [`WebhookError::Store`] on store failure, including failure to
    /// delete the context after a flow error, and
    /// [`WebhookError::AbnormalTermination`] when the flow fails; in the
    /// latter case the session's context has been deleted.
    pub async fn process(&self, event: Event) -> Result<EventOutcome, WebhookError> {
        let transport = self.transport(event.provider)?;
        let session_id = event.session_id.clone();
        let context = self.store.get(&session_id).await?;

        match self.flows.run(&event, context, transport.as_ref()).await {
            Ok(Some(context)) => {
                self.store.put(&session_id, &context, self.retention).await?;
                debug!(%session_id, flow = %context.flow, "context stored");
                Ok(EventOutcome::Persisted {
                    session_id,
                    flow: context.flow,
                    confirming: context.confirming,
                })
            }
            Ok(None) => {
                self.store.del(&session_id).await?;
                debug!(%session_id, "conversation complete, context cleared");
                Ok(EventOutcome::Completed { session_id })
            }
            Err(FlowError::Skip(reason)) => {
                debug!(%session_id, %reason, "event skipped");
                Ok(EventOutcome::Skipped { session_id, reason })
            }
            Err(source) => {
                warn!(%session_id, error = %source, "flow failed, clearing context");
                if let Err(err) = self.store.del(&session_id).await {
                    error!(%session_id, error = %err, "failed to clear context after flow failure");
                    return Err(err.into());
                }
                Err(WebhookError::AbnormalTermination { session_id, source })
            }
        }
    }

    /// Start a proactive conversation from a push event
    /// (see [`Event::push`]).
    ///
    /// # Errors
    ///
    /// As [`Webhook::process`].
    pub async fn push(&self, event: Event) -> Result<EventOutcome, WebhookError> {
        info!(session_id = %event.session_id, provider = %event.provider, "push");
        self.process(event).await
    }
}
