//! The flow variants.

use tracing::debug;

use crate::config::SkillsConfig;
use crate::context::Context;
use crate::event::{Event, EventType};
use crate::intent::IntentResolver;
use crate::skill::SkillRegistry;
use crate::toolkit::Bot;
use crate::transport::Transport;

use super::conversation::{advance, open};
use super::{FlowError, FlowKind, Route};

/// Everything one flow run needs.
pub(super) struct FlowRun<'a> {
    pub(super) skills: &'a SkillRegistry,
    pub(super) resolver: &'a dyn IntentResolver,
    pub(super) bindings: &'a SkillsConfig,
    pub(super) event: &'a Event,
    pub(super) transport: &'a dyn Transport,
}

impl FlowRun<'_> {
    pub(super) async fn execute(
        &self,
        route: Route,
        context: Option<Context>,
    ) -> Result<Option<Context>, FlowError> {
        match route.flow {
            FlowKind::Follow
            | FlowKind::Unfollow
            | FlowKind::Join
            | FlowKind::Leave
            | FlowKind::Beacon
            | FlowKind::Push => {
                let skill = route
                    .skill
                    .ok_or_else(|| FlowError::skip(format!("no skill bound to {}", route.flow)))?;
                self.bound(route.flow, &skill).await
            }
            FlowKind::StartConversation => self.start_conversation().await,
            FlowKind::Reply => {
                let context = context.ok_or_else(|| FlowError::skip("no context to reply to"))?;
                self.reply(context).await
            }
            FlowKind::Btw => {
                let context = context.ok_or_else(|| FlowError::skip("no conversation to resume"))?;
                self.btw(context).await
            }
        }
    }

    async fn resolve_intent(&self) -> Result<Option<String>, FlowError> {
        self.resolver
            .resolve(self.event)
            .await
            .map_err(FlowError::IntentResolution)
    }

    /// Lifecycle, beacon and push flows: a fresh conversation with a skill
    /// chosen before the flow runs. Push events pre-fill `confirmed`.
    async fn bound(&self, flow: FlowKind, intent: &str) -> Result<Option<Context>, FlowError> {
        let skill = self.skills.get(intent)?;
        let mut context = Context::new(flow, intent);
        if flow == FlowKind::Push {
            context.confirmed = self.event.push_parameters();
        }

        let mut bot = Bot::new(self.event, context, self.transport);
        bot.record_user_turn();
        open(skill.as_ref(), &mut bot).await?;
        Ok(bot.into_outcome())
    }

    async fn start_conversation(&self) -> Result<Option<Context>, FlowError> {
        if !self.event.is_text_message() {
            return Err(FlowError::skip(format!(
                "start_conversation does not handle {} {} events",
                self.event.provider, self.event.event_type
            )));
        }

        let intent = match self.resolve_intent().await? {
            Some(intent) => intent,
            None => self
                .bindings
                .default
                .clone()
                .ok_or_else(|| FlowError::skip("no intent matched and no default skill"))?,
        };
        debug!(session_id = %self.event.session_id, intent = %intent, "starting conversation");

        let skill = self.skills.get(&intent)?;
        let mut bot = Bot::new(
            self.event,
            Context::new(FlowKind::StartConversation, intent),
            self.transport,
        );
        bot.record_user_turn();
        open(skill.as_ref(), &mut bot).await?;
        Ok(bot.into_outcome())
    }

    async fn reply(&self, mut context: Context) -> Result<Option<Context>, FlowError> {
        let skill = self.skills.get(&context.intent.name)?;
        let name = context
            .confirming
            .clone()
            .ok_or_else(|| FlowError::skip("nothing is being confirmed"))?;
        if context.pending().is_none() {
            return Err(FlowError::UnknownParameter(name));
        }
        context.flow = FlowKind::Reply;

        let mut bot = Bot::new(self.event, context, self.transport);
        bot.record_user_turn();

        let answer = match self.event.event_type {
            EventType::Message | EventType::Postback | EventType::QuickReply => {
                self.event.raw_value.as_ref()
            }
            _ => None,
        };
        let Some(answer) = answer else {
            debug!(
                session_id = %self.event.session_id,
                event_type = %self.event.event_type,
                parameter = %name,
                "event cannot answer a parameter, asking again"
            );
            bot.ask(&name).await?;
            return Ok(bot.into_outcome());
        };

        match skill.parse_parameter(&name, answer, &mut bot).await {
            Ok(value) => {
                debug!(session_id = %self.event.session_id, parameter = %name, "parameter confirmed");
                bot.context_mut().confirm(&name, value);
            }
            Err(FlowError::InvalidParameter { reason, .. }) => {
                debug!(
                    session_id = %self.event.session_id,
                    parameter = %name,
                    reason = %reason,
                    "parameter rejected, asking again"
                );
                bot.ask(&name).await?;
                return Ok(bot.into_outcome());
            }
            Err(err) => return Err(err),
        }

        advance(skill.as_ref(), &mut bot).await?;
        Ok(bot.into_outcome())
    }

    /// An utterance while nothing is being asked: switch to a newly resolved
    /// intent, keeping the history, or resume the current skill.
    async fn btw(&self, mut context: Context) -> Result<Option<Context>, FlowError> {
        if !self.event.is_text_message() {
            return Err(FlowError::skip(format!(
                "btw does not handle {} {} events",
                self.event.provider, self.event.event_type
            )));
        }

        let switched = self
            .resolve_intent()
            .await?
            .filter(|intent| *intent != context.intent.name);

        match switched {
            Some(intent) => {
                debug!(
                    session_id = %self.event.session_id,
                    from = %context.intent.name,
                    to = %intent,
                    "switching intent"
                );
                let skill = self.skills.get(&intent)?;
                let mut next = Context::new(FlowKind::Btw, intent);
                next.previous = context.previous;
                next.message_queue = context.message_queue;
                next.sender_language = context.sender_language;
                next.translation = context.translation;

                let mut bot = Bot::new(self.event, next, self.transport);
                bot.record_user_turn();
                open(skill.as_ref(), &mut bot).await?;
                Ok(bot.into_outcome())
            }
            None => {
                let skill = self.skills.get(&context.intent.name)?;
                context.flow = FlowKind::Btw;
                let mut bot = Bot::new(self.event, context, self.transport);
                bot.record_user_turn();
                advance(skill.as_ref(), &mut bot).await?;
                Ok(bot.into_outcome())
            }
        }
    }
}
