//! Skills: the conversation-specific business logic flows run.
//!
//! A skill declares the parameters it needs and implements up to three
//! phases. Flows call [`Skill::begin`] once when a conversation starts,
//! [`Skill::parse_parameter`] for each answer, and [`Skill::finish`] when
//! nothing is left to collect.

pub mod scripted;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::config::ScriptedSkillConfig;
use crate::context::Parameter;
use crate::flow::FlowError;
use crate::toolkit::Bot;

pub use scripted::ScriptedSkill;

/// Conversation logic plugged into the flows.
#[async_trait]
pub trait Skill: Send + Sync {
    /// Parameters to collect before [`Skill::finish`], in asking order.
    fn required_parameters(&self) -> Vec<Parameter> {
        Vec::new()
    }

    /// Called once when the conversation starts, before any collection.
    async fn begin(&self, _bot: &mut Bot<'_>) -> Result<(), FlowError> {
        Ok(())
    }

    /// Validate and coerce the answer for `name`.
    ///
    /// Return [`FlowError::InvalidParameter`] to have the question asked
    /// again; any other error ends the conversation.
    async fn parse_parameter(
        &self,
        _name: &str,
        value: &Value,
        _bot: &mut Bot<'_>,
    ) -> Result<Value, FlowError> {
        Ok(value.clone())
    }

    /// Called when every required parameter is confirmed.
    async fn finish(&self, bot: &mut Bot<'_>) -> Result<(), FlowError>;
}

/// Skills by intent name.
#[derive(Clone, Default)]
pub struct SkillRegistry {
    skills: HashMap<String, Arc<dyn Skill>>,
}

impl SkillRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a registry holding the scripted skills declared in config.
    ///
    /// # Errors
    ///
    /// Returns [`regex::Error`] if a parameter pattern does not compile.
    pub fn from_config(scripted: &[ScriptedSkillConfig]) -> Result<Self, regex::Error> {
        let mut registry = Self::new();
        for config in scripted {
            registry.register(config.name.clone(), ScriptedSkill::from_config(config)?);
        }
        Ok(registry)
    }

    /// Register `skill` under `name`, replacing any previous registration.
    pub fn register(&mut self, name: impl Into<String>, skill: impl Skill + 'static) {
        self.skills.insert(name.into(), Arc::new(skill));
    }

    /// Look up the skill for `name`.
    ///
    /// # Errors
    ///
    /// Returns [`FlowError::UnknownSkill`].
    pub fn get(&self, name: &str) -> Result<Arc<dyn Skill>, FlowError> {
        self.skills
            .get(name)
            .cloned()
            .ok_or_else(|| FlowError::UnknownSkill(name.to_owned()))
    }

    /// Whether a skill is registered under `name`.
    pub fn contains(&self, name: &str) -> bool {
        self.skills.contains_key(name)
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.skills.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}
