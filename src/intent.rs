//! Intent resolution: which skill a fresh utterance asks for.

use async_trait::async_trait;
use regex::Regex;

use crate::config::IntentRule;
use crate::event::Event;

/// Maps an event to a skill name.
#[async_trait]
pub trait IntentResolver: Send + Sync {
    /// The skill `event` asks for, or `None` when nothing matches.
    ///
    /// # Errors
    ///
    /// Returns an error if the resolver's backend fails.
    async fn resolve(&self, event: &Event) -> anyhow::Result<Option<String>>;
}

/// Regex rules over the event text; the first match wins.
#[derive(Debug, Default)]
pub struct RuleResolver {
    rules: Vec<(Regex, String)>,
}

impl RuleResolver {
    /// Compile `rules` in order.
    ///
    /// # Errors
    ///
    /// Returns [`regex::Error`] for the first pattern that does not compile.
    pub fn new(rules: &[IntentRule]) -> Result<Self, regex::Error> {
        let rules = rules
            .iter()
            .map(|rule| Ok((Regex::new(&rule.pattern)?, rule.skill.clone())))
            .collect::<Result<Vec<_>, regex::Error>>()?;
        Ok(Self { rules })
    }

    /// The skill for `text`, if a rule matches.
    pub fn match_text(&self, text: &str) -> Option<&str> {
        self.rules
            .iter()
            .find(|(pattern, _)| pattern.is_match(text))
            .map(|(_, skill)| skill.as_str())
    }
}

#[async_trait]
impl IntentResolver for RuleResolver {
    async fn resolve(&self, event: &Event) -> anyhow::Result<Option<String>> {
        Ok(event
            .message_text()
            .and_then(|text| self.match_text(&text).map(str::to_owned)))
    }
}
