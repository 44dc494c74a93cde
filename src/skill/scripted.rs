//! Skills declared in the config file.
//!
//! A scripted skill collects its parameters (optionally checking each answer
//! against a regex) and then replies with a fixed message in which
//! `{parameter}` placeholders are filled from the confirmed values.

use async_trait::async_trait;
use regex::Regex;
use serde_json::{Map, Value};

use super::Skill;
use crate::config::ScriptedSkillConfig;
use crate::context::Parameter;
use crate::flow::FlowError;
use crate::toolkit::Bot;

struct ScriptedParameter {
    parameter: Parameter,
    pattern: Option<Regex>,
}

/// Declarative skill built from [`ScriptedSkillConfig`].
pub struct ScriptedSkill {
    parameters: Vec<ScriptedParameter>,
    reply: Vec<Value>,
}

impl ScriptedSkill {
    /// Build the skill from its config entry.
    ///
    /// # Errors
    ///
    /// Returns [`regex::Error`] if a parameter pattern does not compile.
    pub fn from_config(config: &ScriptedSkillConfig) -> Result<Self, regex::Error> {
        let parameters = config
            .parameters
            .iter()
            .map(|p| {
                Ok(ScriptedParameter {
                    parameter: Parameter {
                        name: p.name.clone(),
                        message_to_confirm: p.message_to_confirm.clone(),
                    },
                    pattern: p.pattern.as_deref().map(Regex::new).transpose()?,
                })
            })
            .collect::<Result<Vec<_>, regex::Error>>()?;
        let reply = match &config.reply {
            None => Vec::new(),
            Some(Value::Array(messages)) => messages.clone(),
            Some(message) => vec![message.clone()],
        };
        Ok(Self { parameters, reply })
    }
}

#[async_trait]
impl Skill for ScriptedSkill {
    fn required_parameters(&self) -> Vec<Parameter> {
        self.parameters.iter().map(|p| p.parameter.clone()).collect()
    }

    async fn parse_parameter(
        &self,
        name: &str,
        value: &Value,
        _bot: &mut Bot<'_>,
    ) -> Result<Value, FlowError> {
        let text = value
            .as_str()
            .ok_or_else(|| FlowError::invalid(name, "expected a text answer"))?
            .trim();
        if text.is_empty() {
            return Err(FlowError::invalid(name, "answer is empty"));
        }
        let pattern = self
            .parameters
            .iter()
            .find(|p| p.parameter.name == name)
            .and_then(|p| p.pattern.as_ref());
        if let Some(pattern) = pattern {
            if !pattern.is_match(text) {
                return Err(FlowError::invalid(
                    name,
                    format!("{text:?} does not match {}", pattern.as_str()),
                ));
            }
        }
        Ok(Value::String(text.to_owned()))
    }

    async fn finish(&self, bot: &mut Bot<'_>) -> Result<(), FlowError> {
        let messages: Vec<Value> = self
            .reply
            .iter()
            .map(|message| fill(message, &bot.context().confirmed))
            .collect();
        bot.reply(&messages).await
    }
}

/// Replace `{name}` in every string of `template` with the confirmed value.
fn fill(template: &Value, confirmed: &Map<String, Value>) -> Value {
    match template {
        Value::String(text) => {
            let mut filled = text.clone();
            for (name, value) in confirmed {
                let rendered = match value {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                };
                filled = filled.replace(&format!("{{{name}}}"), &rendered);
            }
            Value::String(filled)
        }
        Value::Array(items) => Value::Array(items.iter().map(|v| fill(v, confirmed)).collect()),
        Value::Object(fields) => Value::Object(
            fields
                .iter()
                .map(|(k, v)| (k.clone(), fill(v, confirmed)))
                .collect(),
        ),
        other => other.clone(),
    }
}
