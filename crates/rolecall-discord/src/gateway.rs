use futures_util::{SinkExt, StreamExt};
use parking_lot::RwLock;
use rolecall_core::{Result, UserId};
use serde_json::{Value, json};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::{mpsc, watch};
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tracing::{debug, error, info, warn};

use crate::events::{GatewayEvent, parse_dispatch};

/// Discord Gateway opcodes.
const OP_DISPATCH: u64 = 0;
const OP_HEARTBEAT: u64 = 1;
const OP_IDENTIFY: u64 = 2;
const OP_RESUME: u64 = 6;
const OP_RECONNECT: u64 = 7;
const OP_INVALID_SESSION: u64 = 9;
const OP_HELLO: u64 = 10;
const OP_HEARTBEAT_ACK: u64 = 11;

const DISCORD_GATEWAY_URL: &str = "wss://gateway.discord.gg/?v=10&encoding=json";

/// GUILDS | GUILD_MEMBERS | GUILD_MESSAGES | DIRECT_MESSAGES | MESSAGE_CONTENT
pub const INTENTS: u64 = (1 << 0) | (1 << 1) | (1 << 9) | (1 << 12) | (1 << 15);

const MAX_BACKOFF_SECS: u64 = 60;

/// What a dropped connection needs to RESUME instead of identifying again,
/// so dispatches sent during the gap are replayed.
#[derive(Debug, Clone, PartialEq, Eq)]
struct ResumeState {
    session_id: String,
    resume_url: String,
    sequence: Option<u64>,
}

impl ResumeState {
    fn from_ready(d: &Value) -> Option<Self> {
        let session_id = d["session_id"].as_str()?.to_string();
        let resume_url = d["resume_gateway_url"]
            .as_str()
            .map(|u| format!("{}/?v=10&encoding=json", u.trim_end_matches('/')))
            .unwrap_or_else(|| DISCORD_GATEWAY_URL.to_string());
        Some(Self {
            session_id,
            resume_url,
            sequence: None,
        })
    }
}

fn connect_url(resume: Option<&ResumeState>) -> &str {
    resume.map_or(DISCORD_GATEWAY_URL, |r| r.resume_url.as_str())
}

fn handshake_payload(token: &str, resume: Option<&ResumeState>) -> Value {
    match resume {
        Some(r) => json!({
            "op": OP_RESUME,
            "d": {
                "token": token,
                "session_id": r.session_id,
                "seq": r.sequence,
            }
        }),
        None => json!({
            "op": OP_IDENTIFY,
            "d": {
                "token": token,
                "intents": INTENTS,
                "properties": {
                    "os": std::env::consts::OS,
                    "browser": "rolecall",
                    "device": "rolecall"
                }
            }
        }),
    }
}

/// Gateway WebSocket client.
///
/// The privileged "Server Members" and "Message Content" intents must be
/// enabled for the application in the developer portal.
pub struct DiscordGateway {
    token: String,
    connected: Arc<AtomicBool>,
    shutdown_tx: Option<watch::Sender<bool>>,
    bot_user_id: Arc<RwLock<Option<UserId>>>,
}

impl DiscordGateway {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            connected: Arc::new(AtomicBool::new(false)),
            shutdown_tx: None,
            bot_user_id: Arc::new(RwLock::new(None)),
        }
    }

    /// Spawn the gateway loop and return the event stream.
    pub fn start(&mut self) -> Result<mpsc::Receiver<GatewayEvent>> {
        let (event_tx, event_rx) = mpsc::channel(256);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        self.shutdown_tx = Some(shutdown_tx);

        let token = self.token.clone();
        let connected = self.connected.clone();
        let bot_user_id = self.bot_user_id.clone();

        tokio::spawn(async move {
            gateway_loop(token, event_tx, shutdown_rx, connected, bot_user_id).await;
        });

        Ok(event_rx)
    }

    pub fn stop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(true);
        }
        self.connected.store(false, Ordering::SeqCst);
        info!("Discord gateway stopped");
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    pub fn bot_user_id(&self) -> Option<UserId> {
        *self.bot_user_id.read()
    }
}

/// Connect, identify (or resume), heartbeat and forward dispatches until
/// shutdown, reconnecting with exponential backoff.
async fn gateway_loop(
    token: String,
    event_tx: mpsc::Sender<GatewayEvent>,
    mut shutdown_rx: watch::Receiver<bool>,
    connected: Arc<AtomicBool>,
    bot_user_id: Arc<RwLock<Option<UserId>>>,
) {
    let mut backoff = 1u64;
    let mut resume: Option<ResumeState> = None;

    loop {
        if *shutdown_rx.borrow() {
            break;
        }

        info!(resuming = resume.is_some(), "Discord: connecting to Gateway...");

        let ws_stream = match tokio_tungstenite::connect_async(connect_url(resume.as_ref())).await {
            Ok((stream, _)) => stream,
            Err(e) => {
                error!(error = %e, "Discord Gateway connection failed");
                tokio::time::sleep(std::time::Duration::from_secs(backoff)).await;
                backoff = (backoff * 2).min(MAX_BACKOFF_SECS);
                continue;
            }
        };

        let (mut write, mut read) = ws_stream.split();

        let heartbeat_interval = match read.next().await {
            Some(Ok(msg)) => {
                let payload: Value = msg
                    .to_text()
                    .ok()
                    .and_then(|t| serde_json::from_str(t).ok())
                    .unwrap_or_default();
                if payload["op"].as_u64() == Some(OP_HELLO) {
                    payload["d"]["heartbeat_interval"].as_u64().unwrap_or(41250)
                } else {
                    warn!("Discord: expected HELLO, got op={}", payload["op"]);
                    41250
                }
            }
            _ => {
                error!("Discord: no HELLO received");
                tokio::time::sleep(std::time::Duration::from_secs(backoff)).await;
                backoff = (backoff * 2).min(MAX_BACKOFF_SECS);
                continue;
            }
        };

        let handshake = handshake_payload(&token, resume.as_ref());
        if let Err(e) = write
            .send(WsMessage::Text(handshake.to_string().into()))
            .await
        {
            error!(error = %e, "Discord: failed to send IDENTIFY/RESUME");
            tokio::time::sleep(std::time::Duration::from_secs(backoff)).await;
            backoff = (backoff * 2).min(MAX_BACKOFF_SECS);
            continue;
        }

        backoff = 1;
        connected.store(true, Ordering::SeqCst);
        let _ = event_tx.send(GatewayEvent::Connected).await;
        info!(heartbeat_ms = heartbeat_interval, "Discord Gateway connected");

        let mut sequence: Option<u64> = resume.as_ref().and_then(|r| r.sequence);
        let mut heartbeat_timer =
            tokio::time::interval(std::time::Duration::from_millis(heartbeat_interval));
        heartbeat_timer.tick().await; // consume initial tick

        loop {
            tokio::select! {
                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        info!("Discord: shutdown signal received");
                        let _ = write.close().await;
                        return;
                    }
                }
                _ = heartbeat_timer.tick() => {
                    let hb = json!({ "op": OP_HEARTBEAT, "d": sequence });
                    if let Err(e) = write.send(WsMessage::Text(hb.to_string().into())).await {
                        warn!(error = %e, "Discord: heartbeat send failed");
                        break;
                    }
                }
                msg = read.next() => {
                    match msg {
                        Some(Ok(ws_msg)) => {
                            if ws_msg.is_close() {
                                info!("Discord: server closed connection");
                                break;
                            }
                            let Ok(text) = ws_msg.to_text() else { continue };
                            let Ok(payload) = serde_json::from_str::<Value>(text) else { continue };

                            if let Some(s) = payload["s"].as_u64() {
                                sequence = Some(s);
                                if let Some(r) = resume.as_mut() {
                                    r.sequence = sequence;
                                }
                            }

                            match payload["op"].as_u64().unwrap_or(999) {
                                OP_DISPATCH => {
                                    let event_name = payload["t"].as_str().unwrap_or("");
                                    match event_name {
                                        "READY" => {
                                            resume = ResumeState::from_ready(&payload["d"]);
                                            if let Some(r) = resume.as_mut() {
                                                r.sequence = sequence;
                                            }
                                        }
                                        "RESUMED" => info!("Discord: session resumed"),
                                        _ => {}
                                    }
                                    let own_id = *bot_user_id.read();
                                    let Some(event) = parse_dispatch(event_name, &payload["d"], own_id) else {
                                        debug!(event = %event_name, "Discord: ignored dispatch");
                                        continue;
                                    };
                                    if let GatewayEvent::Ready { bot_user_id: id, .. } = &event {
                                        *bot_user_id.write() = Some(*id);
                                        info!(bot_id = %id, "Discord bot ready");
                                    }
                                    if event_tx.send(event).await.is_err() {
                                        warn!("Discord: event channel closed");
                                        return;
                                    }
                                }
                                OP_HEARTBEAT_ACK => {
                                    debug!("Discord: heartbeat ACK");
                                }
                                OP_HEARTBEAT => {
                                    let hb = json!({ "op": OP_HEARTBEAT, "d": sequence });
                                    let _ = write.send(WsMessage::Text(hb.to_string().into())).await;
                                }
                                OP_RECONNECT => {
                                    info!("Discord: server requested reconnect");
                                    break;
                                }
                                OP_INVALID_SESSION => {
                                    if !payload["d"].as_bool().unwrap_or(false) {
                                        resume = None;
                                    }
                                    info!(resumable = resume.is_some(), "Discord: invalid session");
                                    break;
                                }
                                op => {
                                    debug!(op = op, "Discord: unhandled opcode");
                                }
                            }
                        }
                        Some(Err(e)) => {
                            error!(error = %e, "Discord WebSocket error");
                            break;
                        }
                        None => {
                            info!("Discord: WebSocket stream ended");
                            break;
                        }
                    }
                }
            }
        }

        connected.store(false, Ordering::SeqCst);
        let _ = event_tx
            .send(GatewayEvent::Disconnected(Some("Gateway connection lost".into())))
            .await;

        if *shutdown_rx.borrow() {
            break;
        }

        info!(retry_in = backoff, "Discord: reconnecting...");
        tokio::time::sleep(std::time::Duration::from_secs(backoff)).await;
        backoff = (backoff * 2).min(MAX_BACKOFF_SECS);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ready_payload_gives_resume_state() {
        let d = json!({
            "session_id": "abc123",
            "resume_gateway_url": "wss://gateway-us-east1-b.discord.gg",
            "user": { "id": "1000" }
        });
        let state = ResumeState::from_ready(&d).unwrap();
        assert_eq!(state.session_id, "abc123");
        assert_eq!(
            state.resume_url,
            "wss://gateway-us-east1-b.discord.gg/?v=10&encoding=json"
        );
        assert!(ResumeState::from_ready(&json!({})).is_none());
    }

    #[test]
    fn test_handshake_identifies_without_session() {
        let hello = handshake_payload("tok", None);
        assert_eq!(hello["op"], OP_IDENTIFY);
        assert_eq!(hello["d"]["intents"], INTENTS);
        assert_eq!(connect_url(None), DISCORD_GATEWAY_URL);
    }

    #[test]
    fn test_handshake_resumes_with_last_sequence() {
        let state = ResumeState {
            session_id: "abc123".into(),
            resume_url: "wss://resume.example/?v=10&encoding=json".into(),
            sequence: Some(42),
        };
        let resume = handshake_payload("tok", Some(&state));
        assert_eq!(resume["op"], OP_RESUME);
        assert_eq!(resume["d"]["session_id"], "abc123");
        assert_eq!(resume["d"]["seq"], 42);
        assert_eq!(connect_url(Some(&state)), "wss://resume.example/?v=10&encoding=json");
    }
}
