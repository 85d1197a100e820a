// Secrets are never stored in config.toml; they come from the process
// environment, optionally seeded from a `.env` file.

use std::fmt;

use super::ConfigError;

pub const DISCORD_TOKEN_VAR: &str = "DISCORD_BOT_TOKEN";
pub const GOOGLE_API_KEY_VAR: &str = "GOOGLE_API_KEY";
pub const GITHUB_ACCESS_TOKEN_VAR: &str = "GITHUB_ACCESS_TOKEN";
pub const GITHUB_TOKEN_VAR: &str = "GITHUB_TOKEN";

/// Read a variable, treating unset and blank values alike
#[inline]
pub fn optional_env(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

#[inline]
pub fn require_env(name: &'static str) -> Result<String, ConfigError> {
    optional_env(name).ok_or(ConfigError::MissingEnv(name))
}

/// Optional token used for the release lookup
#[inline]
pub fn github_token() -> Option<String> {
    optional_env(GITHUB_TOKEN_VAR)
}

/// Credentials needed to run the chat bot
#[derive(Clone)]
pub struct BotSecrets {
    pub discord_token: String,
    pub google_api_key: String,
}

impl BotSecrets {
    #[inline]
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            discord_token: require_env(DISCORD_TOKEN_VAR)?,
            google_api_key: require_env(GOOGLE_API_KEY_VAR)?,
        })
    }
}

impl fmt::Debug for BotSecrets {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BotSecrets")
            .field("discord_token", &"[REDACTED]")
            .field("google_api_key", &"[REDACTED]")
            .finish()
    }
}

/// Credentials needed by the ingestion pipeline
#[derive(Clone)]
pub struct IngestSecrets {
    pub github_access_token: String,
}

impl IngestSecrets {
    #[inline]
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            github_access_token: require_env(GITHUB_ACCESS_TOKEN_VAR)?,
        })
    }
}

impl fmt::Debug for IngestSecrets {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IngestSecrets")
            .field("github_access_token", &"[REDACTED]")
            .finish()
    }
}
