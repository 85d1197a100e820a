// Answering service
// Turns bot mentions into retrieval-augmented answers posted back to the channel

pub mod chain;
pub mod discord;


use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::{Semaphore, mpsc};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::config::BotConfig;
use crate::llm::ChatTurn;

pub use chain::{ChainAnswer, IndexRetriever, RetrievalChain, Retriever};
pub use discord::GatewayEvent;

/// Discord shows a typing indicator for about ten seconds per trigger
const TYPING_REFRESH: Duration = Duration::from_secs(8);
const FAILURE_REPLY: &str =
    "Sorry, I ran into a problem while answering that. Please try again in a moment.";

/// A channel message as the handler sees it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    pub id: String,
    pub channel_id: String,
    pub author_id: String,
    pub content: String,
    pub mention_ids: Vec<String>,
}

impl InboundMessage {
    #[inline]
    pub fn mentions(&self, user_id: &str) -> bool {
        self.mention_ids.iter().any(|id| id == user_id)
            || self.content.contains(&format!("<@{}>", user_id))
            || self.content.contains(&format!("<@!{}>", user_id))
    }
}

/// Outbound side of the chat platform
#[async_trait]
pub trait ChatTransport: Send + Sync {
    async fn send_message(&self, channel_id: &str, content: &str) -> Result<()>;

    /// Up to `limit` messages preceding `before_id`, oldest first
    async fn history_before(
        &self,
        channel_id: &str,
        before_id: &str,
        limit: usize,
    ) -> Result<Vec<InboundMessage>>;

    async fn trigger_typing(&self, channel_id: &str) -> Result<()>;
}

/// Everything a handler needs, built once at startup
pub struct BotContext {
    chain: RetrievalChain,
    transport: Arc<dyn ChatTransport>,
    config: BotConfig,
    permits: Arc<Semaphore>,
}

impl BotContext {
    #[inline]
    pub fn new(chain: RetrievalChain, transport: Arc<dyn ChatTransport>, config: BotConfig) -> Self {
        let permits = Arc::new(Semaphore::new(config.max_concurrent_answers.max(1)));
        Self {
            chain,
            transport,
            config,
            permits,
        }
    }

    #[inline]
    pub fn config(&self) -> &BotConfig {
        &self.config
    }
}

/// Remove `<@id>` and `<@!id>` mention markup for `user_id` and trim
#[inline]
pub fn strip_mention(content: &str, user_id: &str) -> String {
    content
        .replace(&format!("<@!{}>", user_id), "")
        .replace(&format!("<@{}>", user_id), "")
        .trim()
        .to_string()
}

/// Split `text` into consecutive pieces of at most `limit` characters
#[inline]
pub fn split_message(text: &str, limit: usize) -> Vec<String> {
    let limit = limit.max(1);
    let chars: Vec<char> = text.chars().collect();
    chars
        .chunks(limit)
        .map(|piece| piece.iter().collect())
        .collect()
}

/// Preceding messages as chat turns; the bot's own messages become assistant turns
#[inline]
pub fn history_turns(history: &[InboundMessage], bot_user_id: &str) -> Vec<ChatTurn> {
    history
        .iter()
        .map(|message| {
            if message.author_id == bot_user_id {
                ChatTurn::assistant(message.content.clone())
            } else {
                ChatTurn::user(message.content.clone())
            }
        })
        .collect()
}

/// Handle one inbound message; returns whether the chain was invoked
#[inline]
pub async fn handle_message(
    ctx: &BotContext,
    bot_user_id: &str,
    message: &InboundMessage,
) -> Result<bool> {
    if message.author_id == bot_user_id || !message.mentions(bot_user_id) {
        return Ok(false);
    }

    let question = strip_mention(&message.content, bot_user_id);
    if question.is_empty() {
        debug!("Mention without a question in channel {}", message.channel_id);
        return Ok(false);
    }

    let typing = tokio::spawn(keep_typing(
        Arc::clone(&ctx.transport),
        message.channel_id.clone(),
    ));
    let answer = answer_question(ctx, bot_user_id, message, &question).await;
    typing.abort();

    let reply = match answer {
        Ok(answer) => answer,
        Err(e) => {
            error!("Failed to answer question: {:#}", e);
            FAILURE_REPLY.to_string()
        }
    };

    for segment in split_message(&reply, ctx.config.message_limit) {
        ctx.transport
            .send_message(&message.channel_id, &segment)
            .await?;
    }

    Ok(true)
}

async fn answer_question(
    ctx: &BotContext,
    bot_user_id: &str,
    message: &InboundMessage,
    question: &str,
) -> Result<String> {
    let history = ctx
        .transport
        .history_before(&message.channel_id, &message.id, ctx.config.history_limit)
        .await?;
    let turns = history_turns(&history, bot_user_id);

    info!("Invoking QA chain for question: '{}'", question);
    let result = ctx.chain.invoke(question, &turns).await?;
    Ok(result.answer)
}

async fn keep_typing(transport: Arc<dyn ChatTransport>, channel_id: String) {
    // Runs until the handler aborts it or a trigger fails
    while transport.trigger_typing(&channel_id).await.is_ok() {
        tokio::time::sleep(TYPING_REFRESH).await;
    }
    debug!("Typing indicator stopped for channel {}", channel_id);
}

/// Dispatch gateway events until the stream ends
///
/// Each mention is answered on its own task. A permit is taken before the
/// task is spawned, so at most `max_concurrent_answers` tasks exist and
/// further events stay queued in the gateway channel.
#[inline]
pub async fn run(ctx: Arc<BotContext>, mut events: mpsc::Receiver<GatewayEvent>) {
    let mut bot_user_id: Option<String> = None;
    let mut tasks = JoinSet::new();

    while let Some(event) = events.recv().await {
        match event {
            GatewayEvent::Ready { user_id, username } => {
                info!("{} has connected to Discord!", username);
                info!("Ready to answer questions about PyPSA.");
                bot_user_id = Some(user_id);
            }
            GatewayEvent::MessageCreate(message) => {
                let Some(user_id) = bot_user_id.clone() else {
                    debug!("Message received before READY, ignoring");
                    continue;
                };
                if message.author_id == user_id || !message.mentions(&user_id) {
                    continue;
                }

                let Ok(permit) = Arc::clone(&ctx.permits).acquire_owned().await else {
                    break;
                };
                let ctx = Arc::clone(&ctx);
                tasks.spawn(async move {
                    let _permit = permit;
                    if let Err(e) = handle_message(&ctx, &user_id, &message).await {
                        warn!("Failed to deliver answer: {:#}", e);
                    }
                });
            }
        }

        while let Some(finished) = tasks.try_join_next() {
            if let Err(e) = finished {
                error!("Answer task panicked: {}", e);
            }
        }
    }

    while let Some(finished) = tasks.join_next().await {
        if let Err(e) = finished {
            error!("Answer task panicked: {}", e);
        }
    }
    info!("Gateway event stream ended");
}
