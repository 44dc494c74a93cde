//! Configuration loading and validation.
//!
//! The config file names skills, intent rules and the environment variables
//! holding provider credentials. Secrets never live in the file itself.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use serde_json::Value;

use crate::event::{BeaconKind, EventType};
use crate::provider::Provider;
use crate::transport::facebook::FacebookCredentials;
use crate::transport::line::LineCredentials;

/// Top-level configuration.
#[derive(Debug, Default, Deserialize)]
pub struct Config {
    /// Session store settings.
    #[serde(default)]
    pub store: StoreConfig,

    /// Provider credentials.
    #[serde(default)]
    pub providers: ProvidersConfig,

    /// Skill bindings for lifecycle, beacon and unmatched events.
    #[serde(default)]
    pub skills: SkillsConfig,

    /// Regex intent rules, first match wins.
    #[serde(default)]
    pub intents: Vec<IntentRule>,

    /// Skills declared in the file.
    #[serde(default)]
    pub scripted_skills: Vec<ScriptedSkillConfig>,
}

impl Config {
    /// Skill names the bindings and intent rules refer to.
    pub fn referenced_skills(&self) -> impl Iterator<Item = &str> {
        self.skills
            .bound()
            .chain(self.intents.iter().map(|rule| rule.skill.as_str()))
    }
}

/// Session store settings.
#[derive(Debug, Deserialize)]
pub struct StoreConfig {
    /// How long a context outlives its last update, in seconds.
    #[serde(default = "default_retention_secs")]
    pub retention_secs: u64,

    /// SQLite database file. Contexts are kept in memory when absent.
    #[serde(default)]
    pub sqlite_path: Option<PathBuf>,
}

impl StoreConfig {
    /// Context retention as a [`Duration`].
    pub fn retention(&self) -> Duration {
        Duration::from_secs(self.retention_secs)
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            retention_secs: default_retention_secs(),
            sqlite_path: None,
        }
    }
}

/// Per-provider credential settings.
#[derive(Debug, Default, Deserialize)]
pub struct ProvidersConfig {
    /// LINE channel settings.
    #[serde(default)]
    pub line: Option<LineConfig>,

    /// Facebook page settings.
    #[serde(default)]
    pub facebook: Option<FacebookConfig>,
}

impl ProvidersConfig {
    /// Providers with a config section.
    pub fn configured(&self) -> Vec<Provider> {
        let mut providers = Vec::new();
        if self.line.is_some() {
            providers.push(Provider::Line);
        }
        if self.facebook.is_some() {
            providers.push(Provider::Facebook);
        }
        providers
    }
}

/// LINE channel settings.
#[derive(Debug, Deserialize)]
pub struct LineConfig {
    /// Environment variable holding the channel secret.
    #[serde(default = "default_line_secret_env")]
    pub channel_secret_env: String,

    /// Environment variable holding the channel access token.
    #[serde(default = "default_line_token_env")]
    pub access_token_env: String,
}

impl LineConfig {
    /// Read the channel credentials from the environment.
    ///
    /// # Errors
    ///
    /// Returns an error naming the first variable that is unset or empty.
    pub fn credentials(&self) -> anyhow::Result<LineCredentials> {
        Ok(LineCredentials {
            channel_secret: required_env(Provider::Line, &self.channel_secret_env)?,
            access_token: required_env(Provider::Line, &self.access_token_env)?,
        })
    }
}

/// Facebook page settings.
#[derive(Debug, Deserialize)]
pub struct FacebookConfig {
    /// Environment variable holding the app secret.
    #[serde(default = "default_facebook_secret_env")]
    pub app_secret_env: String,

    /// Environment variable holding the page access token.
    #[serde(default = "default_facebook_token_env")]
    pub page_access_token_env: String,
}

impl FacebookConfig {
    /// Read the page credentials from the environment.
    ///
    /// # Errors
    ///
    /// Returns an error naming the first variable that is unset or empty.
    pub fn credentials(&self) -> anyhow::Result<FacebookCredentials> {
        Ok(FacebookCredentials {
            app_secret: required_env(Provider::Facebook, &self.app_secret_env)?,
            page_access_token: required_env(Provider::Facebook, &self.page_access_token_env)?,
        })
    }
}

fn required_env(provider: Provider, name: &str) -> anyhow::Result<String> {
    match std::env::var(name) {
        Ok(value) if !value.trim().is_empty() => Ok(value),
        _ => Err(anyhow::anyhow!(
            "required option missing for {provider}: environment variable {name} is not set"
        )),
    }
}

/// Which skill handles events outside a conversation.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SkillsConfig {
    /// Skill for text that matches no intent rule.
    #[serde(default)]
    pub default: Option<String>,

    /// Skill run when a user adds the bot.
    #[serde(default)]
    pub follow: Option<String>,

    /// Skill run when a user blocks the bot.
    #[serde(default)]
    pub unfollow: Option<String>,

    /// Skill run when the bot joins a group or room.
    #[serde(default)]
    pub join: Option<String>,

    /// Skill run when the bot leaves a group or room.
    #[serde(default)]
    pub leave: Option<String>,

    /// Skills for beacon events.
    #[serde(default)]
    pub beacon: BeaconSkills,
}

impl SkillsConfig {
    /// Skill bound to a lifecycle event type.
    pub fn lifecycle(&self, event_type: EventType) -> Option<&str> {
        match event_type {
            EventType::Follow => self.follow.as_deref(),
            EventType::Unfollow => self.unfollow.as_deref(),
            EventType::Join => self.join.as_deref(),
            EventType::Leave => self.leave.as_deref(),
            _ => None,
        }
    }

    /// Skill bound to a beacon sub-type.
    pub fn beacon_skill(&self, kind: BeaconKind) -> Option<&str> {
        match kind {
            BeaconKind::Enter => self.beacon.enter.as_deref(),
            BeaconKind::Leave => self.beacon.leave.as_deref(),
        }
    }

    /// Every skill name bound here.
    pub fn bound(&self) -> impl Iterator<Item = &str> {
        [
            &self.default,
            &self.follow,
            &self.unfollow,
            &self.join,
            &self.leave,
            &self.beacon.enter,
            &self.beacon.leave,
        ]
        .into_iter()
        .filter_map(Option::as_deref)
    }
}

/// Skills per beacon sub-type.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct BeaconSkills {
    /// Skill run when the user enters a beacon's range.
    #[serde(default)]
    pub enter: Option<String>,

    /// Skill run when the user leaves a beacon's range.
    #[serde(default)]
    pub leave: Option<String>,
}

/// One regex intent rule.
#[derive(Debug, Clone, Deserialize)]
pub struct IntentRule {
    /// Pattern tested against the event text.
    pub pattern: String,

    /// Skill to run on a match.
    pub skill: String,
}

/// A skill declared in the config file.
#[derive(Debug, Clone, Deserialize)]
pub struct ScriptedSkillConfig {
    /// Skill (intent) name.
    pub name: String,

    /// Parameters to collect, in asking order.
    #[serde(default)]
    pub parameters: Vec<ScriptedParameterConfig>,

    /// Message, or array of messages, sent when every parameter is known.
    #[serde(default)]
    pub reply: Option<Value>,
}

/// A parameter of a scripted skill.
#[derive(Debug, Clone, Deserialize)]
pub struct ScriptedParameterConfig {
    /// Parameter name.
    pub name: String,

    /// Question per provider.
    #[serde(default)]
    pub message_to_confirm: BTreeMap<Provider, Value>,

    /// Pattern an answer must match.
    #[serde(default)]
    pub pattern: Option<String>,
}

fn default_retention_secs() -> u64 {
    600
}
fn default_line_secret_env() -> String {
    "LINE_CHANNEL_SECRET".to_owned()
}
fn default_line_token_env() -> String {
    "LINE_ACCESS_TOKEN".to_owned()
}
fn default_facebook_secret_env() -> String {
    "FACEBOOK_APP_SECRET".to_owned()
}
fn default_facebook_token_env() -> String {
    "FACEBOOK_PAGE_ACCESS_TOKEN".to_owned()
}

/// Load the config from a TOML file.
///
/// # Errors
///
/// Returns an error if the file cannot be read or parsed.
pub fn load_config(path: &Path) -> anyhow::Result<Config> {
    let contents = std::fs::read_to_string(path)
        .map_err(|e| anyhow::anyhow!("failed to read config at {}: {e}", path.display()))?;
    let config: Config = toml::from_str(&contents)
        .map_err(|e| anyhow::anyhow!("failed to parse config at {}: {e}", path.display()))?;
    Ok(config)
}

/// Resolve the default config directory (`~/.switchboard/`).
///
/// # Errors
///
/// Returns an error if the home directory cannot be determined.
pub fn config_dir() -> anyhow::Result<PathBuf> {
    let home = directories::BaseDirs::new()
        .ok_or_else(|| anyhow::anyhow!("cannot determine home directory"))?;
    Ok(home.home_dir().join(".switchboard"))
}
