//! Discord Gateway
//!
//! Keeps a websocket session open, publishes every `MESSAGE_CREATE` into the
//! client's message hub and forwards it to the bot's event channel.

use futures::stream::StreamExt;
use futures::{Sink, SinkExt};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, Mutex};
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tracing::{debug, error, info, warn};

use super::rest::DiscordClient;
use super::types::{display_name, GatewayPayload, Message};
use crate::platform::{PlatformError, SourceMessage};
use crate::Result;

/// GUILDS | GUILD_MESSAGES | MESSAGE_CONTENT
pub const DEFAULT_INTENTS: u64 = 1 | 512 | 32768;

const OP_DISPATCH: u8 = 0;
const OP_HEARTBEAT: u8 = 1;
const OP_IDENTIFY: u8 = 2;
const OP_RECONNECT: u8 = 7;
const OP_INVALID_SESSION: u8 = 9;
const OP_HELLO: u8 = 10;
const OP_HEARTBEAT_ACK: u8 = 11;

const DEFAULT_HEARTBEAT_MS: u64 = 41250;

/// Gateway connection driver
pub struct GatewayClient {
    client: Arc<DiscordClient>,
    intents: u64,
    reconnect_delay: Duration,
}

impl GatewayClient {
    pub fn new(client: Arc<DiscordClient>, intents: u64, reconnect_delay: Duration) -> Self {
        Self {
            client,
            intents,
            reconnect_delay,
        }
    }

    /// Run gateway sessions until shutdown, reconnecting after each drop
    pub async fn run(
        &self,
        events: mpsc::Sender<SourceMessage>,
        mut shutdown_rx: broadcast::Receiver<()>,
    ) -> Result<()> {
        loop {
            tokio::select! {
                result = self.run_session(&events) => {
                    match result {
                        Ok(()) => info!("Discord gateway connection ended"),
                        Err(e) => warn!(error = %e, "Discord gateway connection failed"),
                    }
                }
                _ = shutdown_rx.recv() => {
                    info!("Gateway received shutdown signal");
                    return Ok(());
                }
            }

            if events.is_closed() {
                return Ok(());
            }

            debug!("Reconnecting to Discord gateway in {:?}", self.reconnect_delay);
            tokio::select! {
                _ = tokio::time::sleep(self.reconnect_delay) => {}
                _ = shutdown_rx.recv() => return Ok(()),
            }
        }
    }

    async fn run_session(&self, events: &mpsc::Sender<SourceMessage>) -> Result<()> {
        let gateway_url = self.client.gateway_url().await?;
        info!("Connecting to Discord Gateway: {}", gateway_url);

        let (ws_stream, _) = tokio_tungstenite::connect_async(gateway_url.as_str()).await?;
        let (ws_write, mut ws_read) = ws_stream.split();
        let writer = Arc::new(Mutex::new(ws_write));

        let heartbeat_interval = match ws_read.next().await {
            Some(Ok(msg)) => {
                let payload = parse_frame(&msg);
                match payload {
                    Some(p) if p.op == OP_HELLO => p.d["heartbeat_interval"]
                        .as_u64()
                        .unwrap_or(DEFAULT_HEARTBEAT_MS),
                    _ => {
                        warn!("Expected Hello (op 10) from Discord Gateway");
                        DEFAULT_HEARTBEAT_MS
                    }
                }
            }
            _ => {
                return Err(PlatformError::Gateway("no Hello from Discord Gateway".to_string()).into());
            }
        };
        debug!("Discord heartbeat interval: {}ms", heartbeat_interval);

        send_json(&*writer, &identify_payload(self.client.token(), self.intents)).await?;

        let sequence = Arc::new(AtomicU64::new(0));
        let acked = Arc::new(AtomicBool::new(true));
        let mut heartbeat = AbortOnDrop(tokio::spawn(heartbeat_loop(
            Arc::clone(&writer),
            Arc::clone(&sequence),
            Arc::clone(&acked),
            Duration::from_millis(heartbeat_interval),
        )));

        loop {
            let frame = tokio::select! {
                frame = ws_read.next() => frame,
                _ = &mut heartbeat.0 => {
                    warn!("Discord heartbeat stopped; dropping gateway session");
                    break;
                }
            };
            let Some(frame) = frame else {
                break;
            };
            let msg = match frame {
                Ok(m) => m,
                Err(e) => {
                    warn!("Discord WebSocket error: {}", e);
                    break;
                }
            };
            if msg.is_close() {
                debug!("Discord Gateway closed the connection");
                break;
            }
            let Some(payload) = parse_frame(&msg) else {
                continue;
            };
            if let Some(s) = payload.s {
                sequence.store(s, Ordering::Relaxed);
            }

            match payload.op {
                OP_DISPATCH => {
                    if !self.handle_dispatch(payload, events).await {
                        debug!("Event channel closed; leaving gateway session");
                        break;
                    }
                }
                OP_HEARTBEAT => {
                    send_json(&*writer, &heartbeat_payload(&sequence)).await?;
                }
                OP_RECONNECT | OP_INVALID_SESSION => {
                    info!(op = payload.op, "Discord Gateway requested a new session");
                    break;
                }
                OP_HEARTBEAT_ACK => acked.store(true, Ordering::SeqCst),
                other => debug!(op = other, "Ignoring gateway opcode"),
            }
        }

        Ok(())
    }

    /// Handle a dispatch event. Returns `false` once the event channel is gone.
    async fn handle_dispatch(
        &self,
        payload: GatewayPayload,
        events: &mpsc::Sender<SourceMessage>,
    ) -> bool {
        match payload.t.as_deref() {
            Some("READY") => {
                let name = payload.d["user"]["username"].as_str().unwrap_or("unknown");
                info!("Discord gateway ready as {}", name);
                true
            }
            Some("MESSAGE_CREATE") => {
                let message: Message = match serde_json::from_value(payload.d) {
                    Ok(m) => m,
                    Err(e) => {
                        warn!(error = %e, "Failed to decode MESSAGE_CREATE");
                        return true;
                    }
                };

                if let Some(guild_id) = message.guild_id.as_deref() {
                    for mention in &message.mentions {
                        let name = display_name(mention.member.as_ref(), &mention.user);
                        self.client.remember_member_name(guild_id, &mention.user.id, name);
                    }
                }

                let source = SourceMessage::from(message);
                self.client.hub().publish(&source);
                events.send(source).await.is_ok()
            }
            _ => true,
        }
    }
}

struct AbortOnDrop(tokio::task::JoinHandle<()>);

impl Drop for AbortOnDrop {
    fn drop(&mut self) {
        self.0.abort();
    }
}

fn parse_frame(msg: &WsMessage) -> Option<GatewayPayload> {
    let text = msg.to_text().ok()?;
    serde_json::from_str(text).ok()
}

fn identify_payload(token: &str, intents: u64) -> Value {
    json!({
        "op": OP_IDENTIFY,
        "d": {
            "token": token,
            "intents": intents,
            "properties": {
                "os": std::env::consts::OS,
                "browser": "relaybot",
                "device": "relaybot"
            }
        }
    })
}

fn heartbeat_payload(sequence: &AtomicU64) -> Value {
    let seq = sequence.load(Ordering::Relaxed);
    if seq == 0 {
        json!({ "op": OP_HEARTBEAT, "d": null })
    } else {
        json!({ "op": OP_HEARTBEAT, "d": seq })
    }
}

async fn send_json<S>(writer: &Mutex<S>, payload: &Value) -> Result<()>
where
    S: Sink<WsMessage> + Unpin,
    S::Error: std::error::Error + Send + Sync + 'static,
{
    writer
        .lock()
        .await
        .send(WsMessage::Text(payload.to_string().into()))
        .await?;
    Ok(())
}

/// Send heartbeats until one goes unacknowledged for a full period or a
/// send fails. Returning ends the gateway session.
async fn heartbeat_loop<S>(
    writer: Arc<Mutex<S>>,
    sequence: Arc<AtomicU64>,
    acked: Arc<AtomicBool>,
    period: Duration,
) where
    S: Sink<WsMessage> + Unpin,
    S::Error: std::error::Error + Send + Sync + 'static,
{
    let mut interval = tokio::time::interval(period);
    // The first tick completes immediately.
    interval.tick().await;
    loop {
        interval.tick().await;
        if !acked.swap(false, Ordering::SeqCst) {
            warn!("Discord heartbeat was not acknowledged; connection looks dead");
            break;
        }
        if let Err(e) = send_json(&*writer, &heartbeat_payload(&sequence)).await {
            error!("Discord heartbeat failed: {}", e);
            break;
        }
    }
}
