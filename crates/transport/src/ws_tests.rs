// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpListener;

/// Accept one websocket connection and drive a scripted exchange.
async fn one_shot_server(listener: TcpListener, script: Vec<Value>) -> Vec<Value> {
    let (stream, _) = listener.accept().await.unwrap();
    let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();

    let mut replies = Vec::new();
    for message in script {
        ws.send(Message::Text(message.to_string().into())).await.unwrap();
        if message["type"] == "ping" {
            // Wait for the pong
            while let Some(Ok(reply)) = ws.next().await {
                if let Message::Text(text) = reply {
                    replies.push(serde_json::from_str(&text).unwrap());
                    break;
                }
            }
        }
    }
    let _ = ws.close(None).await;
    replies
}

#[tokio::test]
async fn ping_is_answered_with_pong() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let server = tokio::spawn(one_shot_server(listener, vec![json!({"type": "ping"})]));

    let (tx, _rx) = mpsc::channel(8);
    let shutdown = ShutdownSignal::new();
    // The channel connects to {endpoint}/ws; tungstenite's server side
    // accepts any path.
    let task = spawn_ws_channel(&format!("http://127.0.0.1:{port}"), "agent-1", tx, shutdown.clone());

    let replies = tokio::time::timeout(Duration::from_secs(5), server)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(replies.len(), 1);
    assert_eq!(replies[0]["type"], "pong");

    shutdown.trigger();
    let _ = tokio::time::timeout(Duration::from_secs(5), task).await;
}

#[tokio::test]
async fn config_updates_are_forwarded() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let server = tokio::spawn(one_shot_server(
        listener,
        vec![json!({"type": "config_update", "config": {"debug_mode": true}})],
    ));

    let (tx, mut rx) = mpsc::channel(8);
    let shutdown = ShutdownSignal::new();
    let task = spawn_ws_channel(&format!("http://127.0.0.1:{port}"), "agent-1", tx, shutdown.clone());

    let event = tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .unwrap()
        .unwrap();
    match event {
        WsEvent::ConfigUpdate(data) => assert_eq!(data["config"]["debug_mode"], true),
        other => panic!("expected config update, got {other:?}"),
    }

    shutdown.trigger();
    let _ = server.await;
    let _ = tokio::time::timeout(Duration::from_secs(5), task).await;
}
