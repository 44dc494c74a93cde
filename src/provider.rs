//! Messaging providers known to the middleware.
//!
//! The set is closed: every per-provider behaviour (event extraction, message
//! compilation, transport) is an exhaustive `match` over [`Provider`].

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// A messaging platform and the wire schema it speaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Provider {
    /// LINE Messaging API.
    Line,
    /// Facebook Messenger Platform.
    Facebook,
}

impl Provider {
    /// Every supported provider, in declaration order.
    pub const ALL: [Provider; 2] = [Provider::Line, Provider::Facebook];

    /// Stable lowercase tag, as used in config files and persisted contexts.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Line => "line",
            Self::Facebook => "facebook",
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned when a provider tag is not recognised.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown provider: {0}")]
pub struct UnknownProvider(pub String);

impl FromStr for Provider {
    type Err = UnknownProvider;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "line" => Ok(Self::Line),
            "facebook" | "messenger" => Ok(Self::Facebook),
            other => Err(UnknownProvider(other.to_owned())),
        }
    }
}
