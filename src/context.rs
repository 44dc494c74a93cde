//! Per-session conversation state.
//!
//! A [`Context`] lives in the session store between webhook calls. It records
//! which flow and intent are active, what parameters have been collected,
//! which one the bot is currently asking for, and the turn-by-turn history of
//! the conversation.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::flow::FlowKind;
use crate::provider::Provider;

/// The intent a conversation is fulfilling.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Intent {
    /// Skill name the intent resolves to.
    pub name: String,
}

/// A parameter a skill needs, with the question to ask for it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Parameter {
    /// Parameter name, unique within a conversation.
    pub name: String,
    /// Question message per provider. Either schema may be used for either
    /// provider; the question is compiled for the event's provider at ask time.
    #[serde(default)]
    pub message_to_confirm: BTreeMap<Provider, Value>,
}

impl Parameter {
    /// Build a parameter with a single question used on every provider.
    pub fn new(name: impl Into<String>, question: Value) -> Self {
        let message_to_confirm = Provider::ALL
            .iter()
            .map(|provider| (*provider, question.clone()))
            .collect();
        Self {
            name: name.into(),
            message_to_confirm,
        }
    }

    /// The question registered for `provider`, if any.
    pub fn question_for(&self, provider: Provider) -> Option<&Value> {
        self.message_to_confirm.get(&provider)
    }
}

/// Who produced a turn of the conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Speaker {
    /// The end user.
    User,
    /// The bot.
    Bot,
}

/// One entry of the conversation audit trail.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Turn {
    /// Who spoke.
    pub from: Speaker,
    /// The native message (user) or compiled message (bot).
    pub message: Value,
}

/// History carried through the conversation, including intent switches.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Previous {
    /// Names of confirmed parameters, oldest first.
    #[serde(default)]
    pub confirmed: Vec<String>,
    /// Turn-by-turn audit trail.
    #[serde(default)]
    pub message: Vec<Turn>,
}

/// Conversation state for one session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Context {
    /// Flow that last handled the session.
    pub flow: FlowKind,
    /// Active intent.
    pub intent: Intent,
    /// Collected parameter values.
    #[serde(default)]
    pub confirmed: Map<String, Value>,
    /// Parameters still to collect, in asking order.
    #[serde(default)]
    pub to_confirm: Vec<Parameter>,
    /// Parameter the bot is waiting for an answer to.
    #[serde(default)]
    pub confirming: Option<String>,
    /// Conversation history.
    #[serde(default)]
    pub previous: Previous,
    /// Compiled messages waiting to go out with the next reply.
    #[serde(default)]
    pub message_queue: Vec<Value>,
    /// Language detected for the sender, when a translator is configured.
    #[serde(default)]
    pub sender_language: Option<String>,
    /// Translation state owned by the translator, opaque to the flows.
    #[serde(default)]
    pub translation: Option<Value>,
}

impl Context {
    /// Fresh context for `intent` handled by `flow`.
    pub fn new(flow: FlowKind, intent: impl Into<String>) -> Self {
        Self {
            flow,
            intent: Intent {
                name: intent.into(),
            },
            confirmed: Map::new(),
            to_confirm: Vec::new(),
            confirming: None,
            previous: Previous::default(),
            message_queue: Vec::new(),
            sender_language: None,
            translation: None,
        }
    }

    /// The parameter currently being asked for.
    pub fn pending(&self) -> Option<&Parameter> {
        let name = self.confirming.as_deref()?;
        self.to_confirm.iter().find(|p| p.name == name)
    }

    /// Look up an uncollected parameter by name.
    pub fn to_confirm_named(&self, name: &str) -> Option<&Parameter> {
        self.to_confirm.iter().find(|p| p.name == name)
    }

    /// Add `parameter` to the collection list. A parameter with the same
    /// name is replaced in place; otherwise it is appended.
    pub fn merge_to_confirm(&mut self, parameter: Parameter) {
        match self.to_confirm.iter_mut().find(|p| p.name == parameter.name) {
            Some(existing) => *existing = parameter,
            None => self.to_confirm.push(parameter),
        }
    }

    /// Queue the skill's required parameters that are not yet confirmed.
    pub fn require(&mut self, parameters: Vec<Parameter>) {
        for parameter in parameters {
            if !self.confirmed.contains_key(&parameter.name) {
                self.merge_to_confirm(parameter);
            }
        }
    }

    /// Record a collected value: moves the parameter from `to_confirm` into
    /// `confirmed` and clears `confirming` if it named this parameter.
    pub fn confirm(&mut self, name: &str, value: Value) {
        self.confirmed.insert(name.to_owned(), value);
        self.to_confirm.retain(|p| p.name != name);
        self.previous.confirmed.push(name.to_owned());
        if self.confirming.as_deref() == Some(name) {
            self.confirming = None;
        }
    }

    /// Append a turn to the audit trail.
    pub fn record(&mut self, from: Speaker, message: Value) {
        self.previous.message.push(Turn { from, message });
    }
}
