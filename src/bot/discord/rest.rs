// Discord REST v10 calls the bot needs

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Serialize;
use tracing::debug;

use super::DiscordMessage;
use crate::HelperError;
use crate::bot::{ChatTransport, InboundMessage};

pub const DEFAULT_API_BASE: &str = "https://discord.com/api/v10";
const REQUEST_TIMEOUT_SECONDS: u64 = 30;
/// Discord caps `limit` on the channel messages endpoint
const MAX_HISTORY_PAGE: usize = 100;

#[derive(Clone)]
pub struct RestClient {
    api_base: String,
    token: String,
    agent: ureq::Agent,
}

impl std::fmt::Debug for RestClient {
    #[inline]
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RestClient")
            .field("api_base", &self.api_base)
            .field("token", &"[REDACTED]")
            .finish_non_exhaustive()
    }
}

#[derive(Serialize)]
struct CreateMessage<'a> {
    content: &'a str,
}

impl RestClient {
    #[inline]
    pub fn new(token: impl Into<String>) -> Self {
        Self::with_api_base(DEFAULT_API_BASE, token)
    }

    #[inline]
    pub fn with_api_base(api_base: &str, token: impl Into<String>) -> Self {
        let agent = ureq::Agent::config_builder()
            .timeout_global(Some(Duration::from_secs(REQUEST_TIMEOUT_SECONDS)))
            .user_agent(concat!(
                "DiscordBot (https://github.com/GbotemiB/pypsa-helper-bot, ",
                env!("CARGO_PKG_VERSION"),
                ")"
            ))
            .build()
            .into();

        Self {
            api_base: api_base.trim_end_matches('/').to_string(),
            token: token.into(),
            agent,
        }
    }

    fn auth_header(&self) -> String {
        format!("Bot {}", self.token)
    }

    fn transport_error(action: &str, error: &ureq::Error) -> anyhow::Error {
        HelperError::Transport(format!("{} failed: {}", action, error)).into()
    }

    #[inline]
    pub fn create_message_blocking(&self, channel_id: &str, content: &str) -> Result<()> {
        let body = serde_json::to_string(&CreateMessage { content })?;
        self.agent
            .post(&format!("{}/channels/{}/messages", self.api_base, channel_id))
            .header("Authorization", &self.auth_header())
            .header("Content-Type", "application/json")
            .send(&body)
            .map_err(|e| Self::transport_error("Create message", &e))?;
        Ok(())
    }

    /// Messages before `before_id`, newest first as Discord returns them
    #[inline]
    pub fn list_messages_blocking(
        &self,
        channel_id: &str,
        before_id: &str,
        limit: usize,
    ) -> Result<Vec<DiscordMessage>> {
        let limit = limit.clamp(1, MAX_HISTORY_PAGE).to_string();
        let body = self
            .agent
            .get(&format!("{}/channels/{}/messages", self.api_base, channel_id))
            .query("before", before_id)
            .query("limit", &limit)
            .header("Authorization", &self.auth_header())
            .call()
            .and_then(|mut resp| resp.body_mut().read_to_string())
            .map_err(|e| Self::transport_error("List messages", &e))?;

        serde_json::from_str(&body).context("Failed to parse channel messages")
    }

    #[inline]
    pub fn trigger_typing_blocking(&self, channel_id: &str) -> Result<()> {
        self.agent
            .post(&format!("{}/channels/{}/typing", self.api_base, channel_id))
            .header("Authorization", &self.auth_header())
            .send_empty()
            .map_err(|e| Self::transport_error("Trigger typing", &e))?;
        Ok(())
    }
}

#[async_trait]
impl ChatTransport for RestClient {
    async fn send_message(&self, channel_id: &str, content: &str) -> Result<()> {
        let client = self.clone();
        let (channel_id, content) = (channel_id.to_string(), content.to_string());
        tokio::task::spawn_blocking(move || client.create_message_blocking(&channel_id, &content))
            .await
            .context("Send task panicked")?
    }

    async fn history_before(
        &self,
        channel_id: &str,
        before_id: &str,
        limit: usize,
    ) -> Result<Vec<InboundMessage>> {
        if limit == 0 {
            return Ok(Vec::new());
        }
        let client = self.clone();
        let (channel_id, before_id) = (channel_id.to_string(), before_id.to_string());
        let messages = tokio::task::spawn_blocking(move || {
            client.list_messages_blocking(&channel_id, &before_id, limit)
        })
        .await
        .context("History task panicked")??;

        debug!("Fetched {} history messages", messages.len());
        let mut history: Vec<InboundMessage> = messages.into_iter().map(Into::into).collect();
        history.reverse();
        Ok(history)
    }

    async fn trigger_typing(&self, channel_id: &str) -> Result<()> {
        let client = self.clone();
        let channel_id = channel_id.to_string();
        tokio::task::spawn_blocking(move || client.trigger_typing_blocking(&channel_id))
            .await
            .context("Typing task panicked")?
    }
}
