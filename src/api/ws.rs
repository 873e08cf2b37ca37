//! Live-update WebSocket.
//!
//! Client → server: `{"action": "join" | "leave", "topic": "tables" | "reservations"}`
//! Server → client: `{"topic": ..., "data": [...]}` full snapshots, or
//! `{"error": ...}` for a command it can't honor.

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::broadcast;
use tokio::time::Duration;
use ulid::Ulid;

use crate::engine::Engine;
use crate::notify::Topic;
use crate::observability::{BROADCAST_LAGGED_TOTAL, WS_CONNECTIONS_ACTIVE};

use super::AppState;

const PING_INTERVAL: Duration = Duration::from_secs(30);

type Frames = broadcast::Receiver<Arc<str>>;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "lowercase")]
enum Action {
    Join,
    Leave,
}

#[derive(Debug, Deserialize)]
struct ClientCommand {
    action: Action,
    topic: String,
}

#[derive(Default)]
struct Subscriptions {
    tables: Option<Frames>,
    reservations: Option<Frames>,
}

impl Subscriptions {
    fn slot(&mut self, topic: Topic) -> &mut Option<Frames> {
        match topic {
            Topic::Tables => &mut self.tables,
            Topic::Reservations => &mut self.reservations,
        }
    }
}

/// GET /ws
pub async fn upgrade(State(state): State<AppState>, ws: WebSocketUpgrade) -> impl IntoResponse {
    ws.on_upgrade(move |socket| session(socket, state.engine))
}

/// Pends forever when not subscribed, so the select arm stays idle.
async fn next_frame(rx: &mut Option<Frames>) -> Result<Arc<str>, broadcast::error::RecvError> {
    match rx {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

async fn session(socket: WebSocket, engine: Arc<Engine>) {
    let conn = Ulid::new();
    let (mut sink, mut stream) = socket.split();
    let mut subs = Subscriptions::default();

    metrics::gauge!(WS_CONNECTIONS_ACTIVE).increment(1.0);
    tracing::info!(%conn, "WS connected");

    let mut ping_interval = tokio::time::interval(PING_INTERVAL);
    ping_interval.tick().await; // skip immediate

    loop {
        let (topic, frame) = tokio::select! {
            _ = ping_interval.tick() => {
                if sink.send(Message::Ping(Vec::new().into())).await.is_err() {
                    break;
                }
                continue;
            }

            frame = next_frame(&mut subs.tables) => (Topic::Tables, frame),
            frame = next_frame(&mut subs.reservations) => (Topic::Reservations, frame),

            msg = stream.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        let reply = handle_command(&engine, &mut subs, text.as_str());
                        if let Some(reply) = reply
                            && send_text(&mut sink, &reply).await.is_err()
                        {
                            break;
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(_)) => break,
                    _ => {}
                }
                continue;
            }
        };

        match frame {
            Ok(frame) => {
                if send_text(&mut sink, &frame).await.is_err() {
                    break;
                }
            }
            Err(broadcast::error::RecvError::Lagged(n)) => {
                tracing::warn!(%conn, topic = topic.name(), lagged = n, "WS subscriber lagged, resending snapshot");
                metrics::counter!(BROADCAST_LAGGED_TOTAL).increment(n);
                *subs.slot(topic) = Some(engine.notify.subscribe(topic));
                if let Some(frame) = snapshot(&engine, topic)
                    && send_text(&mut sink, &frame).await.is_err()
                {
                    break;
                }
            }
            Err(broadcast::error::RecvError::Closed) => {
                *subs.slot(topic) = None;
            }
        }
    }

    metrics::gauge!(WS_CONNECTIONS_ACTIVE).decrement(1.0);
    tracing::info!(%conn, "WS disconnected");
}

/// Apply a client command. Returns the frame to send back, if any. A join
/// always answers with a fresh snapshot.
fn handle_command(engine: &Engine, subs: &mut Subscriptions, text: &str) -> Option<Arc<str>> {
    let cmd = match serde_json::from_str::<ClientCommand>(text) {
        Ok(cmd) => cmd,
        Err(e) => return Some(error_frame(&format!("invalid command: {e}"))),
    };
    let Some(topic) = Topic::parse(&cmd.topic) else {
        return Some(error_frame(&format!("unknown topic: {}", cmd.topic)));
    };
    match cmd.action {
        Action::Join => {
            let slot = subs.slot(topic);
            if slot.is_none() {
                *slot = Some(engine.notify.subscribe(topic));
            }
            snapshot(engine, topic)
        }
        Action::Leave => {
            *subs.slot(topic) = None;
            None
        }
    }
}

fn snapshot(engine: &Engine, topic: Topic) -> Option<Arc<str>> {
    match engine.snapshot_frame(topic) {
        Ok(frame) => Some(frame),
        Err(e) => {
            tracing::warn!(topic = topic.name(), "snapshot encoding failed: {e}");
            None
        }
    }
}

fn error_frame(message: &str) -> Arc<str> {
    Arc::from(serde_json::json!({ "error": message }).to_string())
}

async fn send_text<S>(sink: &mut S, text: &str) -> Result<(), ()>
where
    S: futures::Sink<Message, Error = axum::Error> + Unpin,
{
    sink.send(Message::Text(text.into())).await.map_err(|_| ())
}
