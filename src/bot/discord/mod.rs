// Discord transport
// Gateway events in, REST calls out

pub mod gateway;
pub mod rest;


use serde::Deserialize;

pub use gateway::{GatewayEvent, spawn_gateway};
pub use rest::RestClient;

use super::InboundMessage;

/// Message object shared by the gateway `MESSAGE_CREATE` payload and the REST API
#[derive(Debug, Clone, Deserialize)]
pub struct DiscordMessage {
    pub id: String,
    pub channel_id: String,
    #[serde(default)]
    pub content: String,
    pub author: DiscordUser,
    #[serde(default)]
    pub mentions: Vec<DiscordUser>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DiscordUser {
    pub id: String,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub bot: bool,
}

impl From<DiscordMessage> for InboundMessage {
    #[inline]
    fn from(message: DiscordMessage) -> Self {
        Self {
            id: message.id,
            channel_id: message.channel_id,
            author_id: message.author.id,
            content: message.content,
            mention_ids: message.mentions.into_iter().map(|user| user.id).collect(),
        }
    }
}
