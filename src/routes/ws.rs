// WebSocket push of the current snapshot

use axum::{
    extract::{
        State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::IntoResponse,
};
use bytes::Bytes;
use std::sync::Arc;
use tokio::time::{Duration, timeout};

use super::AppState;
use crate::activity::ActivityTracker;
use crate::store::SnapshotStore;

pub(super) const WS_PING_INTERVAL: Duration = Duration::from_secs(30);
pub(super) const WS_SEND_TIMEOUT: Duration = Duration::from_secs(10);

pub(super) async fn ws_metrics(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
) -> impl IntoResponse {
    let store = state.store.clone();
    let activity = state.activity.clone();
    let every = state.config.sampling.active_interval();
    ws.on_upgrade(move |socket| async move {
        if let Err(e) = stream_metrics(socket, store, activity, every).await {
            tracing::info!("Metrics stream error: {}", e);
        }
    })
}

/// A connected client is someone watching: every push counts as activity, which
/// keeps the worker active for as long as the socket is open.
async fn stream_metrics(
    mut socket: WebSocket,
    store: Arc<SnapshotStore>,
    activity: Arc<ActivityTracker>,
    every: Duration,
) -> anyhow::Result<()> {
    tracing::info!("Client connected to metrics stream");
    let mut tick = tokio::time::interval(every);
    tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    let mut ping_interval = tokio::time::interval(WS_PING_INTERVAL);
    ping_interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    loop {
        tokio::select! {
            _ = tick.tick() => {
                activity.touch();
                let json = serde_json::to_string(&*store.read())?;
                let r = timeout(WS_SEND_TIMEOUT, socket.send(Message::Text(json.into()))).await;
                if !matches!(r, Ok(Ok(()))) {
                    break;
                }
            }
            _ = ping_interval.tick() => {
                let r = timeout(WS_SEND_TIMEOUT, socket.send(Message::Ping(Bytes::new()))).await;
                if !matches!(r, Ok(Ok(()))) {
                    break;
                }
            }
            msg = socket.recv() => {
                match msg {
                    Some(Ok(Message::Close(_))) | None | Some(Err(_)) => break,
                    Some(Ok(_)) => {}
                }
            }
        }
    }
    tracing::info!("Client disconnected from metrics stream");
    Ok(())
}
