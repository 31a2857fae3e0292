use actix_web::{http::header, HttpRequest};
use actix_ws::{CloseReason, Message, MessageStream, Session};
use futures_util::StreamExt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::chat::ChatSession;
use crate::state::AppState;

/// Whether the request asks to switch to the WebSocket protocol
pub fn is_upgrade_request(req: &HttpRequest) -> bool {
    req.headers()
        .get(header::UPGRADE)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.eq_ignore_ascii_case("websocket"))
        .unwrap_or(false)
}

/// Whether a client silent since `last_heartbeat` has outlived `client_timeout`
fn client_timed_out(last_heartbeat: Instant, now: Instant, client_timeout: Duration) -> bool {
    now.saturating_duration_since(last_heartbeat) > client_timeout
}

/// Drive one chat connection until the client leaves or stops answering pings
///
/// Frames are handled one at a time, so replies keep request order.
pub async fn run_session(state: Arc<AppState>, mut session: Session, mut stream: MessageStream) {
    let connection = Uuid::new_v4();
    let heartbeat_interval = Duration::from_secs(state.config.heartbeat_interval_secs.max(1));
    let client_timeout = Duration::from_secs(state.config.client_timeout_secs);

    info!("WebSocket client connected: {}", connection);

    let mut chat = ChatSession::new();
    let mut last_heartbeat = Instant::now();
    let mut interval = tokio::time::interval(heartbeat_interval);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    let reason: Option<CloseReason> = loop {
        tokio::select! {
            // Queued frames (pongs included) are drained before the timeout check
            biased;

            frame = stream.next() => {
                let frame = match frame {
                    Some(Ok(frame)) => frame,
                    Some(Err(e)) => {
                        warn!("WebSocket protocol error on {}: {}", connection, e);
                        break None;
                    }
                    None => break None,
                };
                last_heartbeat = Instant::now();

                let text = match frame {
                    Message::Text(text) => text.to_string(),
                    Message::Binary(bytes) => match String::from_utf8(bytes.to_vec()) {
                        Ok(text) => text,
                        Err(_) => {
                            debug!("Ignoring non UTF-8 binary frame on {}", connection);
                            continue;
                        }
                    },
                    Message::Ping(bytes) => {
                        if session.pong(&bytes).await.is_err() {
                            break None;
                        }
                        continue;
                    }
                    Message::Close(reason) => break reason,
                    _ => continue,
                };

                debug!("received on {}: {}", connection, text);
                let reply = chat.handle(&state, &text).await;
                // Pongs wait unread while a slow answer is computed
                last_heartbeat = Instant::now();
                if session.text(reply.to_json()).await.is_err() {
                    break None;
                }
            }
            _ = interval.tick() => {
                if client_timed_out(last_heartbeat, Instant::now(), client_timeout) {
                    info!("WebSocket client {} timed out", connection);
                    break None;
                }
                if session.ping(b"").await.is_err() {
                    break None;
                }
            }
        }
    };

    let _ = session.close(reason).await;
    info!("WebSocket client disconnected: {}", connection);
}
