use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use futures_util::{SinkExt, StreamExt};
use tracing::{info, warn};
use uuid::Uuid;

use parley_types::events::GatewayEvent;

use crate::dispatcher::Dispatcher;

/// Heartbeat interval: server sends a Ping every 15 seconds.
/// If 2 consecutive Pongs are missed (~30s), the connection is dropped.
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(15);

/// Handle a WebSocket connection whose session credential was already
/// validated at the HTTP upgrade layer.
pub async fn handle_connection(socket: WebSocket, dispatcher: Dispatcher, user_id: Uuid) {
    let (mut sender, mut receiver) = socket.split();

    info!("{} connected", user_id);

    let ready = GatewayEvent::Ready { user_id };
    let Ok(text) = serde_json::to_string(&ready) else {
        return;
    };
    if sender.send(Message::Text(text.into())).await.is_err() {
        return;
    }

    // This task exclusively owns the user's registry entry from here until
    // the identity-checked unregister below.
    let (conn_id, mut event_rx) = dispatcher.register(user_id).await;

    let pong_received = Arc::new(AtomicBool::new(true));
    let pong_flag_send = pong_received.clone();
    let pong_flag_recv = pong_received.clone();

    // Forward targeted events -> client, with heartbeat.
    let mut send_task = tokio::spawn(async move {
        let mut heartbeat = tokio::time::interval(HEARTBEAT_INTERVAL);
        heartbeat.tick().await;
        let mut missed_heartbeats: u8 = 0;

        loop {
            tokio::select! {
                event = event_rx.recv() => {
                    let Some(event) = event else { break };
                    let text = match serde_json::to_string(&event) {
                        Ok(text) => text,
                        Err(e) => {
                            warn!("failed to encode gateway event: {}", e);
                            continue;
                        }
                    };
                    if sender.send(Message::Text(text.into())).await.is_err() {
                        break;
                    }
                }
                _ = heartbeat.tick() => {
                    if pong_flag_send.swap(false, Ordering::Acquire) {
                        missed_heartbeats = 0;
                    } else {
                        missed_heartbeats += 1;
                        if missed_heartbeats >= 2 {
                            warn!("heartbeat timeout for {}, dropping connection", user_id);
                            break;
                        }
                    }
                    if sender.send(Message::Ping(vec![].into())).await.is_err() {
                        break;
                    }
                }
            }
        }
    });

    // The wire is push-only; inbound frames only matter for liveness.
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            match msg {
                Message::Pong(_) => {
                    pong_flag_recv.store(true, Ordering::Release);
                }
                Message::Close(_) => break,
                _ => {}
            }
        }
    });

    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }

    dispatcher.unregister(user_id, conn_id).await;
    info!("{} disconnected", user_id);
}
