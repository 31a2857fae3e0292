//! Chat message protocol shared by every WebSocket connection
//!
//! Clients send `{"message": "...", "id": ...}` to ask a question, or
//! `{"action": "regenerate" | "flag up" | "flag down", "id": ...}` to act on
//! an earlier answer. Replies are `{"response": "...", "id": ...}` or
//! `{"error": "..."}`.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use tracing::{debug, warn};

use crate::feedback::{FeedbackKind, FeedbackRecord};
use crate::state::AppState;

pub const FEEDBACK_ACK: &str = "Thanks for your feedback!";
const PROCESSING_FAILED: &str = "Failed to process query";

/// Incoming client frame
#[derive(Debug, Deserialize)]
struct ClientMessage {
    #[serde(default)]
    message: Option<Value>,
    #[serde(default)]
    action: Option<String>,
    #[serde(default)]
    id: Value,
}

/// Outgoing server frame
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ServerMessage {
    Response { response: String, id: Value },
    Error { error: String },
}

impl ServerMessage {
    fn error(message: impl Into<String>) -> Self {
        Self::Error {
            error: message.into(),
        }
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| format!(r#"{{"error":"{}"}}"#, PROCESSING_FAILED))
    }
}

/// Last question and answer sent for a message id
#[derive(Debug, Clone)]
struct Exchange {
    query: String,
    answer: String,
}

/// Per-connection chat state
#[derive(Debug, Default)]
pub struct ChatSession {
    previous: HashMap<String, Exchange>,
}

impl ChatSession {
    pub fn new() -> Self {
        Self::default()
    }

    /// Handle one raw text frame and produce the reply
    pub async fn handle(&mut self, state: &AppState, raw: &str) -> ServerMessage {
        let incoming: ClientMessage = match serde_json::from_str(raw) {
            Ok(incoming) => incoming,
            Err(e) => {
                debug!("Unparseable chat frame: {}", e);
                return ServerMessage::error("Invalid message format");
            }
        };

        match (incoming.action.as_deref(), incoming.message) {
            (Some(action), _) => self.handle_action(state, action, incoming.id).await,
            (None, Some(Value::String(query))) => self.ask(state, query, incoming.id).await,
            (None, _) => ServerMessage::error("Message must be a string"),
        }
    }

    async fn ask(&mut self, state: &AppState, query: String, id: Value) -> ServerMessage {
        match state.engine.answer(&query).await {
            Ok(answer) => {
                if let Some(key) = id_key(&id) {
                    self.previous.insert(
                        key,
                        Exchange {
                            query,
                            answer: answer.text.clone(),
                        },
                    );
                }
                ServerMessage::Response {
                    response: answer.text,
                    id,
                }
            }
            Err(e) => {
                warn!("Error processing query: {}", e);
                ServerMessage::error(PROCESSING_FAILED)
            }
        }
    }

    async fn handle_action(&mut self, state: &AppState, action: &str, id: Value) -> ServerMessage {
        let Some(key) = id_key(&id) else {
            return ServerMessage::error("Action requires a message id");
        };

        match action.trim().to_lowercase().as_str() {
            "regenerate" => self.regenerate(state, key, id).await,
            "flag up" => self.flag(state, key, id, FeedbackKind::Up).await,
            "flag down" => self.flag(state, key, id, FeedbackKind::Down).await,
            other => ServerMessage::error(format!("Unknown action '{}'", other)),
        }
    }

    /// Best-ranked corpus answer that differs from the last one sent
    async fn regenerate(&mut self, state: &AppState, key: String, id: Value) -> ServerMessage {
        let Some(exchange) = self.previous.get_mut(&key) else {
            return ServerMessage::error(format!("No previous query for id {}", key));
        };

        let ranked = match state.engine.ranked(&exchange.query).await {
            Ok(ranked) => ranked,
            Err(e) => {
                warn!("Error regenerating answer: {}", e);
                return ServerMessage::error(PROCESSING_FAILED);
            }
        };

        match ranked.into_iter().find(|a| a.text != exchange.answer) {
            Some(answer) => {
                exchange.answer = answer.text.clone();
                ServerMessage::Response {
                    response: answer.text,
                    id,
                }
            }
            None => ServerMessage::error("No alternative answer available"),
        }
    }

    async fn flag(&self, state: &AppState, key: String, id: Value, kind: FeedbackKind) -> ServerMessage {
        let mut record = FeedbackRecord::new(key, kind);
        if let Some(exchange) = self.previous.get(&record.id) {
            record.query = Some(exchange.query.clone());
            record.answer = Some(exchange.answer.clone());
        }
        state.feedback.push(record).await;

        ServerMessage::Response {
            response: FEEDBACK_ACK.to_string(),
            id,
        }
    }
}

/// Map a JSON id to a lookup key; `null` and containers have none
fn id_key(id: &Value) -> Option<String> {
    match id {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}
