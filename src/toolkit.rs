//! Skill toolkit.
//!
//! A [`Bot`] is what skill code sees during one flow run: it owns the
//! session's [`Context`] for the duration of the run, delivers messages
//! through the event's transport and drives parameter collection. Outbound
//! messages may be written in either provider's schema; they are compiled
//! for the event's provider before delivery.

use serde_json::Value;
use tracing::debug;

use crate::compiler::{self, CompileError, MessageFormat};
use crate::context::{Context, Parameter, Speaker};
use crate::event::{Event, EventType};
use crate::flow::FlowError;
use crate::provider::Provider;
use crate::transport::Transport;

/// Toolkit handed to skills for one event.
pub struct Bot<'a> {
    event: &'a Event,
    transport: &'a dyn Transport,
    context: Context,
    paused: bool,
    replied: bool,
}

impl<'a> Bot<'a> {
    pub(crate) fn new(event: &'a Event, context: Context, transport: &'a dyn Transport) -> Self {
        Self {
            event,
            transport,
            context,
            paused: false,
            replied: false,
        }
    }

    /// Provider of the event being handled; replies are compiled for it.
    pub fn provider(&self) -> Provider {
        self.event.provider
    }

    /// The event being handled.
    pub fn event(&self) -> &Event {
        self.event
    }

    /// The session context.
    pub fn context(&self) -> &Context {
        &self.context
    }

    /// Mutable access to the session context.
    pub fn context_mut(&mut self) -> &mut Context {
        &mut self.context
    }

    /// Reply to the event with `messages`, preceded by any queued messages.
    ///
    /// Push events have no reply token, so their replies are sent to the
    /// session instead. A second reply in the same run is also sent, since
    /// reply tokens are single-use.
    ///
    /// # Errors
    ///
    /// Returns [`FlowError::Compile`] if a message cannot be shown on this
    /// provider and [`FlowError::Transport`] if delivery fails.
    pub async fn reply(&mut self, messages: &[Value]) -> Result<(), FlowError> {
        let compiled = compiler::compile_all(messages, self.provider())?;
        let mut outgoing = std::mem::take(&mut self.context.message_queue);
        outgoing.extend(compiled);
        if outgoing.is_empty() {
            return Ok(());
        }

        if self.event.event_type == EventType::Push || self.replied {
            self.transport
                .send(
                    &self.event.session_id,
                    &outgoing,
                    self.context.sender_language.as_deref(),
                )
                .await?;
        } else {
            self.transport.reply(self.event, &outgoing).await?;
            self.replied = true;
        }
        for message in outgoing {
            self.context.record(Speaker::Bot, message);
        }
        Ok(())
    }

    /// Push `messages` to `recipient_id` on this provider.
    ///
    /// # Errors
    ///
    /// Returns [`FlowError::Compile`] or [`FlowError::Transport`].
    pub async fn send(
        &self,
        recipient_id: &str,
        messages: &[Value],
        language: Option<&str>,
    ) -> Result<(), FlowError> {
        let compiled = compiler::compile_all(messages, self.provider())?;
        self.transport
            .send(recipient_id, &compiled, language)
            .await
            .map_err(FlowError::from)
    }

    /// Send `messages` to every recipient on this provider.
    ///
    /// # Errors
    ///
    /// Returns [`FlowError::Compile`] or [`FlowError::Transport`].
    pub async fn multicast(
        &self,
        recipient_ids: &[String],
        messages: &[Value],
    ) -> Result<(), FlowError> {
        let compiled = compiler::compile_all(messages, self.provider())?;
        self.transport
            .multicast(recipient_ids, &compiled)
            .await
            .map_err(FlowError::from)
    }

    /// Hold `messages` until the next [`Bot::reply`].
    ///
    /// # Errors
    ///
    /// Returns [`FlowError::Compile`]; nothing is queued on failure.
    pub fn queue(&mut self, messages: &[Value]) -> Result<(), FlowError> {
        let compiled = compiler::compile_all(messages, self.provider())?;
        self.context.message_queue.extend(compiled);
        Ok(())
    }

    /// Stop automatic parameter collection and completion for this run. The
    /// context is kept so the conversation can resume on a later event.
    pub fn pause(&mut self) {
        debug!(session_id = %self.event.session_id, "flow paused");
        self.paused = true;
    }

    /// Whether [`Bot::pause`] was called during this run.
    pub fn is_paused(&self) -> bool {
        self.paused
    }

    /// Ask for `parameter` now: merge it into `to_confirm`, mark it as the
    /// one being confirmed and send its question.
    ///
    /// # Errors
    ///
    /// Returns [`FlowError::MissingConfirmationMessage`] when the parameter
    /// has no question for the event's provider, plus compile and transport
    /// failures.
    pub async fn collect(&mut self, parameter: Parameter) -> Result<(), FlowError> {
        let name = parameter.name.clone();
        self.context.merge_to_confirm(parameter);
        self.ask(&name).await
    }

    /// Ask for a parameter that is already in `to_confirm`.
    ///
    /// # Errors
    ///
    /// Returns [`FlowError::UnknownParameter`] if no such parameter is
    /// pending, otherwise as [`Bot::collect`].
    pub async fn collect_by_name(&mut self, name: &str) -> Result<(), FlowError> {
        self.ask(name).await
    }

    /// Replace the question for a pending parameter on this provider.
    ///
    /// # Errors
    ///
    /// Returns [`FlowError::UnknownParameter`] if no such parameter is
    /// pending.
    pub fn change_message_to_confirm(
        &mut self,
        parameter: &str,
        message: Value,
    ) -> Result<(), FlowError> {
        let provider = self.provider();
        let descriptor = self
            .context
            .to_confirm
            .iter_mut()
            .find(|p| p.name == parameter)
            .ok_or_else(|| FlowError::UnknownParameter(parameter.to_owned()))?;
        descriptor.message_to_confirm.insert(provider, message);
        Ok(())
    }

    pub(crate) async fn ask(&mut self, name: &str) -> Result<(), FlowError> {
        let provider = self.provider();
        let question = self
            .context
            .to_confirm_named(name)
            .ok_or_else(|| FlowError::UnknownParameter(name.to_owned()))?
            .question_for(provider)
            .cloned()
            .ok_or_else(|| FlowError::MissingConfirmationMessage {
                parameter: name.to_owned(),
                provider,
            })?;
        self.context.confirming = Some(name.to_owned());
        debug!(session_id = %self.event.session_id, parameter = name, "asking for parameter");
        self.reply(&[question]).await
    }

    pub(crate) fn record_user_turn(&mut self) {
        let message = self
            .event
            .message()
            .cloned()
            .or_else(|| self.event.raw_value.clone());
        if let Some(message) = message {
            self.context.record(Speaker::User, message);
        }
    }

    /// The context to persist: kept while paused or waiting for an answer,
    /// dropped once the conversation is complete.
    pub(crate) fn into_outcome(self) -> Option<Context> {
        if self.paused || self.context.confirming.is_some() {
            Some(self.context)
        } else {
            None
        }
    }

    /// The native message object carried by `event`.
    pub fn extract_message<'e>(&self, event: &'e Event) -> Option<&'e Value> {
        event.message()
    }

    /// Message text, postback data or quick-reply payload of `event`.
    pub fn extract_message_text(&self, event: &Event) -> Option<String> {
        event.message_text()
    }

    /// Identifier of the user who caused `event`.
    pub fn extract_sender_id<'e>(&self, event: &'e Event) -> &'e str {
        &event.sender_id
    }

    /// Session key of `event`.
    pub fn extract_session_id<'e>(&self, event: &'e Event) -> &'e str {
        &event.session_id
    }

    /// Normalized type of `event`.
    pub fn identify_event_type(&self, event: &Event) -> EventType {
        event.event_type
    }

    /// Provider schema and kind of `message`.
    ///
    /// # Errors
    ///
    /// Returns [`CompileError::UnidentifiableFormat`].
    pub fn identify_message_type(&self, message: &Value) -> Result<MessageFormat, CompileError> {
        compiler::identify(message)
    }

    /// Compile `message` for `target`, or for this event's provider.
    ///
    /// # Errors
    ///
    /// Returns the [`CompileError`] from the compiler.
    pub fn compile_message(
        &self,
        message: &Value,
        target: Option<Provider>,
    ) -> Result<Value, CompileError> {
        compiler::compile(message, target.unwrap_or(self.provider()))
    }
}
