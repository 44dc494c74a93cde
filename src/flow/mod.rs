//! Flow state machine.
//!
//! Every inbound event is routed to exactly one flow variant ([`FlowKind`])
//! by [`select_flow`]. The selected flow runs the skill's three phases (begin,
//! collect parameters, finish) through a [`Bot`](crate::toolkit::Bot) and
//! yields the context to persist, or `None` when the conversation is over.

mod conversation;
mod select;
mod variants;

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::compiler::CompileError;
use crate::config::SkillsConfig;
use crate::context::Context;
use crate::event::Event;
use crate::intent::IntentResolver;
use crate::provider::Provider;
use crate::skill::SkillRegistry;
use crate::transport::{Transport, TransportError};

pub use select::{select_flow, Route};

/// The flow variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlowKind {
    /// The user added the bot.
    Follow,
    /// The user blocked the bot.
    Unfollow,
    /// The bot joined a group or room.
    Join,
    /// The bot left a group or room.
    Leave,
    /// The user entered or left a beacon's range.
    Beacon,
    /// Proactive conversation started by the application.
    Push,
    /// Fresh dialogue with no stored context.
    StartConversation,
    /// Answer to the parameter being asked for.
    Reply,
    /// Utterance on top of a conversation with nothing pending.
    Btw,
}

impl FlowKind {
    /// Wire tag of this flow.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Follow => "follow",
            Self::Unfollow => "unfollow",
            Self::Join => "join",
            Self::Leave => "leave",
            Self::Beacon => "beacon",
            Self::Push => "push",
            Self::StartConversation => "start_conversation",
            Self::Reply => "reply",
            Self::Btw => "btw",
        }
    }
}

impl fmt::Display for FlowKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors raised inside a flow.
#[derive(Debug, Error)]
pub enum FlowError {
    /// The event is deliberately not handled. Stored context is untouched.
    #[error("event skipped: {0}")]
    Skip(String),

    /// A collected value failed the skill's validation. The reply flow asks
    /// again instead of failing.
    #[error("invalid value for parameter {parameter}: {reason}")]
    InvalidParameter {
        /// Parameter being collected.
        parameter: String,
        /// Why the value was rejected.
        reason: String,
    },

    /// The parameter has no question for the event's provider.
    #[error("parameter {parameter} has no message_to_confirm for {provider}")]
    MissingConfirmationMessage {
        /// Parameter being collected.
        parameter: String,
        /// Provider the question was needed for.
        provider: Provider,
    },

    /// The named parameter is not awaiting collection.
    #[error("parameter {0} is not in to_confirm")]
    UnknownParameter(String),

    /// No skill is registered under the name.
    #[error("no skill registered as {0}")]
    UnknownSkill(String),

    /// The intent resolver failed.
    #[error("intent resolution failed: {0}")]
    IntentResolution(#[source] anyhow::Error),

    /// A message could not be compiled for the provider.
    #[error(transparent)]
    Compile(#[from] CompileError),

    /// Delivery failed.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// Skill business logic failed.
    #[error("skill failed: {0}")]
    Skill(#[from] anyhow::Error),
}

impl FlowError {
    /// Shorthand for [`FlowError::Skip`].
    pub fn skip(reason: impl Into<String>) -> Self {
        Self::Skip(reason.into())
    }

    /// Shorthand for [`FlowError::InvalidParameter`].
    pub fn invalid(parameter: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidParameter {
            parameter: parameter.into(),
            reason: reason.into(),
        }
    }

    /// Whether this is a skip signal rather than a failure.
    pub fn is_skip(&self) -> bool {
        matches!(self, Self::Skip(_))
    }
}

/// Routes events to flows and runs them against registered skills.
#[derive(Clone)]
pub struct FlowEngine {
    skills: Arc<SkillRegistry>,
    resolver: Arc<dyn IntentResolver>,
    bindings: SkillsConfig,
}

impl FlowEngine {
    /// Create an engine over `skills`, resolving new intents with `resolver`
    /// and lifecycle/beacon/default skills from `bindings`.
    pub fn new(
        skills: Arc<SkillRegistry>,
        resolver: Arc<dyn IntentResolver>,
        bindings: SkillsConfig,
    ) -> Self {
        Self {
            skills,
            resolver,
            bindings,
        }
    }

    /// Select the flow for `event` given the stored context.
    ///
    /// # Errors
    ///
    /// Returns [`FlowError::Skip`] for events no flow handles.
    pub fn route(&self, event: &Event, context: Option<&Context>) -> Result<Route, FlowError> {
        select_flow(event, context, &self.bindings)
    }

    /// Run the flow for `event` and return the context to persist, or `None`
    /// when the conversation is over.
    ///
    /// # Errors
    ///
    /// Returns [`FlowError::Skip`] when the event is not handled (the stored
    /// context must be left alone) and any other [`FlowError`] on abnormal
    /// termination.
    pub async fn run(
        &self,
        event: &Event,
        context: Option<Context>,
        transport: &dyn Transport,
    ) -> Result<Option<Context>, FlowError> {
        let route = self.route(event, context.as_ref())?;
        debug!(
            session_id = %event.session_id,
            provider = %event.provider,
            flow = %route.flow,
            "flow selected"
        );
        let run = variants::FlowRun {
            skills: &self.skills,
            resolver: self.resolver.as_ref(),
            bindings: &self.bindings,
            event,
            transport,
        };
        run.execute(route, context).await
    }
}
