// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Optional WebSocket control channel.
//!
//! Receives `config_update` pushes and `command` requests, answers `ping`
//! with `pong`, and reconnects with a fixed 5 s backoff. Event shipment
//! never uses this channel.

use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use std::time::Duration;
use sw_core::ShutdownSignal;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};

const RECONNECT_DELAY: Duration = Duration::from_secs(5);

/// Control messages surfaced to the supervisor.
#[derive(Debug, Clone)]
pub enum WsEvent {
    ConfigUpdate(Value),
    Command(Value),
}

/// Spawn the channel task against `{endpoint}/ws` (scheme rewritten to ws/wss).
pub fn spawn_ws_channel(
    endpoint: &str,
    agent_id: &str,
    events: mpsc::Sender<WsEvent>,
    shutdown: ShutdownSignal,
) -> tokio::task::JoinHandle<()> {
    let url = format!(
        "{}/ws",
        endpoint
            .replacen("https://", "wss://", 1)
            .replacen("http://", "ws://", 1)
    );
    let agent_id = agent_id.to_string();

    tokio::spawn(async move {
        while !shutdown.is_shutdown() {
            match connect(&url, &agent_id).await {
                Ok(stream) => {
                    info!(url = %url, "websocket channel connected");
                    run_channel(stream, &events, &shutdown).await;
                    if shutdown.is_shutdown() {
                        break;
                    }
                    warn!("websocket channel dropped, reconnecting");
                }
                Err(e) => {
                    debug!(error = %e, "websocket connect failed");
                }
            }
            if shutdown.sleep(RECONNECT_DELAY).await {
                break;
            }
        }
        debug!("websocket channel stopped");
    })
}

type WsStream =
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

async fn connect(url: &str, agent_id: &str) -> Result<WsStream, String> {
    let mut request = url.into_client_request().map_err(|e| e.to_string())?;
    let headers = request.headers_mut();
    headers.insert("X-Agent-ID", agent_id.parse().map_err(|_| "invalid agent id")?);
    headers.insert(
        "User-Agent",
        format!("SecureWatch-Agent/{agent_id}").parse().map_err(|_| "invalid agent id")?,
    );

    let (stream, _) = tokio_tungstenite::connect_async(request)
        .await
        .map_err(|e| e.to_string())?;
    Ok(stream)
}

async fn run_channel(mut stream: WsStream, events: &mpsc::Sender<WsEvent>, shutdown: &ShutdownSignal) {
    loop {
        tokio::select! {
            message = stream.next() => match message {
                Some(Ok(Message::Text(text))) => {
                    match serde_json::from_str::<Value>(&text) {
                        Ok(data) => handle_message(&mut stream, data, events).await,
                        Err(e) => warn!(error = %e, "invalid JSON on websocket channel"),
                    }
                }
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    warn!(error = %e, "websocket read failed");
                    break;
                }
            },
            _ = shutdown.wait() => {
                let _ = stream.close(None).await;
                break;
            }
        }
    }
}

async fn handle_message(stream: &mut WsStream, data: Value, events: &mpsc::Sender<WsEvent>) {
    match data.get("type").and_then(Value::as_str) {
        Some("config_update") => {
            info!("received configuration update over websocket");
            let _ = events.send(WsEvent::ConfigUpdate(data)).await;
        }
        Some("command") => {
            info!(command = ?data.get("command"), "received command over websocket");
            let _ = events.send(WsEvent::Command(data)).await;
        }
        Some("ping") => {
            let pong = json!({"type": "pong", "timestamp": chrono::Utc::now().timestamp()});
            if let Err(e) = stream.send(Message::Text(pong.to_string().into())).await {
                warn!(error = %e, "failed to answer ping");
            }
        }
        other => warn!(message_type = ?other, "unknown websocket message type"),
    }
}

#[cfg(test)]
#[path = "ws_tests.rs"]
mod tests;
