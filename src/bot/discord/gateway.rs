// Gateway v10 session: identify, heartbeat, dispatch, reconnect

use std::time::Duration;

use anyhow::{Context, Result, bail};
use futures::{SinkExt, Stream, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tracing::{debug, info, warn};

use super::{DiscordMessage, DiscordUser};
use crate::bot::InboundMessage;

const GATEWAY_URL: &str = "wss://gateway.discord.gg/?v=10&encoding=json";
const RECONNECT_DELAY: Duration = Duration::from_secs(5);
const DEFAULT_HEARTBEAT_MS: u64 = 41_250;

// GUILD_MESSAGES (1 << 9) | DIRECT_MESSAGES (1 << 12) | MESSAGE_CONTENT (1 << 15)
pub const INTENTS: u64 = (1 << 9) | (1 << 12) | (1 << 15);

const OP_DISPATCH: u64 = 0;
const OP_HEARTBEAT: u64 = 1;
const OP_IDENTIFY: u8 = 2;
const OP_RECONNECT: u64 = 7;
const OP_INVALID_SESSION: u64 = 9;
const OP_HELLO: u64 = 10;

/// What the gateway hands to the bot
#[derive(Debug, Clone)]
pub enum GatewayEvent {
    Ready { user_id: String, username: String },
    MessageCreate(InboundMessage),
}

#[derive(Serialize)]
struct Identify<'a> {
    op: u8,
    d: IdentifyData<'a>,
}

#[derive(Serialize)]
struct IdentifyData<'a> {
    token: &'a str,
    intents: u64,
    properties: IdentifyProperties,
}

#[derive(Serialize)]
struct IdentifyProperties {
    os: &'static str,
    browser: &'static str,
    device: &'static str,
}

#[derive(Serialize)]
struct Heartbeat {
    op: u64,
    d: Option<u64>,
}

#[derive(Deserialize)]
struct ReadyData {
    user: DiscordUser,
}

/// Connect in the background and stream events until the receiver is dropped
#[inline]
#[must_use]
pub fn spawn_gateway(token: String) -> mpsc::Receiver<GatewayEvent> {
    let (tx, rx) = mpsc::channel(64);
    tokio::spawn(gateway_loop(token, tx));
    rx
}

async fn gateway_loop(token: String, tx: mpsc::Sender<GatewayEvent>) {
    while !tx.is_closed() {
        match run_session(&token, &tx).await {
            Ok(()) => info!("Discord gateway session ended, reconnecting"),
            Err(e) => {
                warn!(
                    "Discord gateway error: {:#}, reconnecting in {:?}",
                    e, RECONNECT_DELAY
                );
                tokio::time::sleep(RECONNECT_DELAY).await;
            }
        }
    }
    debug!("Gateway receiver dropped, stopping");
}

async fn run_session(token: &str, tx: &mpsc::Sender<GatewayEvent>) -> Result<()> {
    let (ws_stream, _) = connect_async(GATEWAY_URL)
        .await
        .context("Failed to connect to the Discord gateway")?;
    let (mut write, mut read) = ws_stream.split();

    let hello: Value = serde_json::from_str(&read_next_text(&mut read).await?)?;
    let op = hello.get("op").and_then(Value::as_u64).unwrap_or_default();
    if op != OP_HELLO {
        bail!("expected Hello (op {}), got op {}", OP_HELLO, op);
    }
    let heartbeat_ms = hello
        .get("d")
        .and_then(|d| d.get("heartbeat_interval"))
        .and_then(Value::as_u64)
        .unwrap_or(DEFAULT_HEARTBEAT_MS);

    let identify = Identify {
        op: OP_IDENTIFY,
        d: IdentifyData {
            token,
            intents: INTENTS,
            properties: IdentifyProperties {
                os: std::env::consts::OS,
                browser: "pypsa-helper-bot",
                device: "pypsa-helper-bot",
            },
        },
    };
    write
        .send(WsMessage::Text(serde_json::to_string(&identify)?.into()))
        .await?;

    let period = Duration::from_millis(heartbeat_ms);
    let mut heartbeat = tokio::time::interval_at(Instant::now() + period, period);
    let mut sequence: Option<u64> = None;

    loop {
        tokio::select! {
            _ = heartbeat.tick() => {
                let beat = serde_json::to_string(&Heartbeat { op: OP_HEARTBEAT, d: sequence })?;
                write.send(WsMessage::Text(beat.into())).await?;
            }
            frame = read.next() => {
                let Some(frame) = frame else { return Ok(()) };
                let text = match frame? {
                    WsMessage::Text(text) => text,
                    WsMessage::Close(reason) => {
                        debug!("Gateway closed: {:?}", reason);
                        return Ok(());
                    }
                    _ => continue,
                };

                let payload: Value = serde_json::from_str(text.as_str())?;
                if let Some(s) = payload.get("s").and_then(Value::as_u64) {
                    sequence = Some(s);
                }

                match payload.get("op").and_then(Value::as_u64) {
                    Some(OP_DISPATCH) => {
                        if let Some(event) = parse_dispatch(&payload) {
                            if tx.send(event).await.is_err() {
                                return Ok(());
                            }
                        }
                    }
                    Some(OP_HEARTBEAT) => {
                        let beat = serde_json::to_string(&Heartbeat { op: OP_HEARTBEAT, d: sequence })?;
                        write.send(WsMessage::Text(beat.into())).await?;
                    }
                    Some(OP_RECONNECT | OP_INVALID_SESSION) => return Ok(()),
                    _ => {}
                }
            }
        }
    }
}

/// Turn a dispatch payload (op 0) into an event the bot cares about
#[inline]
pub fn parse_dispatch(payload: &Value) -> Option<GatewayEvent> {
    let data = payload.get("d")?.clone();
    match payload.get("t")?.as_str()? {
        "READY" => {
            let ready: ReadyData = serde_json::from_value(data).ok()?;
            Some(GatewayEvent::Ready {
                user_id: ready.user.id,
                username: ready.user.username,
            })
        }
        "MESSAGE_CREATE" => match serde_json::from_value::<DiscordMessage>(data) {
            Ok(message) => Some(GatewayEvent::MessageCreate(message.into())),
            Err(e) => {
                debug!("Ignoring malformed MESSAGE_CREATE: {}", e);
                None
            }
        },
        _ => None,
    }
}

async fn read_next_text<S>(read: &mut S) -> Result<String>
where
    S: Stream<Item = Result<WsMessage, tokio_tungstenite::tungstenite::Error>> + Unpin,
{
    loop {
        let Some(frame) = read.next().await else {
            bail!("gateway connection closed");
        };
        match frame? {
            WsMessage::Text(text) => return Ok(text.to_string()),
            WsMessage::Close(_) => bail!("gateway closed during handshake"),
            _ => {}
        }
    }
}
