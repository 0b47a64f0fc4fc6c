use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
/// Upstream chat provider a route forwards to.
pub enum Provider {
    Anthropic,
    #[serde(rename = "openai")]
    OpenAi,
    Google,
}

impl Provider {
    pub const ALL: [Provider; 3] = [Provider::Anthropic, Provider::OpenAi, Provider::Google];

    /// Path segment and configuration key for this provider.
    pub fn as_str(self) -> &'static str {
        match self {
            Provider::Anthropic => "anthropic",
            Provider::OpenAi => "openai",
            Provider::Google => "google",
        }
    }

    /// Framework label reported by the health and descriptor endpoints.
    pub fn framework(self) -> &'static str {
        match self {
            Provider::Anthropic => "anthropic-raw",
            Provider::OpenAi => "openai-raw",
            Provider::Google => "gemini-raw",
        }
    }

    /// Code attached to `RUN_ERROR` events raised while streaming from this provider.
    pub fn error_code(self) -> &'static str {
        match self {
            Provider::Anthropic => "ANTHROPIC_ERROR",
            Provider::OpenAi => "OPENAI_ERROR",
            Provider::Google => "GEMINI_ERROR",
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unsupported provider '{0}' (expected anthropic, openai, or google)")]
pub struct ProviderParseError(pub String);

impl FromStr for Provider {
    type Err = ProviderParseError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "anthropic" | "claude" => Ok(Provider::Anthropic),
            "openai" => Ok(Provider::OpenAi),
            "google" | "gemini" => Ok(Provider::Google),
            _ => Err(ProviderParseError(raw.to_string())),
        }
    }
}
