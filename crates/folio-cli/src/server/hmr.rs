// Copyright 2019-2026 Maravilla Labs, operated by SOLUTAS GmbH, Switzerland
// SPDX-License-Identifier: Apache-2.0
// SPDX-License-Identifier: MIT

//! Hot reload notifications over WebSocket.
//!
//! Every message is a JSON object `{ "type": ..., "error"?: ..., "timestamp": ... }`.

use axum::extract::ws::{Message, WebSocket};
use folio::ErrorPayload;
use serde::Serialize;
use tokio::sync::broadcast;
use tracing::debug;

/// Notification kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum HmrKind {
    /// Reload the page.
    Reload,
    /// A rebuild started.
    Building,
    /// Modules changed in place.
    Update,
    /// A rebuild or request failed; `error` carries the details.
    Error,
    /// Dismiss any error overlay.
    ClearErrors,
}

/// One HMR wire message.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HmrMessage {
    /// Notification kind.
    #[serde(rename = "type")]
    pub kind: HmrKind,
    /// Error details for [`HmrKind::Error`].
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorPayload>,
    /// Milliseconds since the Unix epoch.
    pub timestamp: i64,
}

impl HmrMessage {
    fn new(kind: HmrKind, error: Option<ErrorPayload>) -> Self {
        Self {
            kind,
            error,
            timestamp: chrono::Utc::now().timestamp_millis(),
        }
    }

    /// `reload`
    pub fn reload() -> Self {
        Self::new(HmrKind::Reload, None)
    }

    /// `building`
    pub fn building() -> Self {
        Self::new(HmrKind::Building, None)
    }

    /// `update`
    pub fn update() -> Self {
        Self::new(HmrKind::Update, None)
    }

    /// `error` with its payload.
    pub fn error(payload: ErrorPayload) -> Self {
        Self::new(HmrKind::Error, Some(payload))
    }

    /// `clear-errors`
    pub fn clear_errors() -> Self {
        Self::new(HmrKind::ClearErrors, None)
    }

    /// JSON text frame.
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| r#"{"type":"reload"}"#.to_string())
    }
}

/// Fans HMR messages out to every connected client.
#[derive(Debug, Clone)]
pub struct HmrHub {
    tx: broadcast::Sender<HmrMessage>,
}

impl Default for HmrHub {
    fn default() -> Self {
        Self::new()
    }
}

impl HmrHub {
    /// Creates a hub with room for a short backlog per client.
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(32);
        Self { tx }
    }

    /// Sends `message` to all clients. Having none is not an error.
    pub fn send(&self, message: HmrMessage) {
        let kind = message.kind;
        match self.tx.send(message) {
            Ok(clients) => debug!(?kind, clients, "hmr broadcast"),
            Err(_) => debug!(?kind, "hmr broadcast with no clients"),
        }
    }

    /// A receiver for messages sent from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<HmrMessage> {
        self.tx.subscribe()
    }
}

/// Forwards hub messages to one WebSocket client until either side closes.
pub async fn handle_websocket(mut socket: WebSocket, mut rx: broadcast::Receiver<HmrMessage>) {
    loop {
        tokio::select! {
            result = rx.recv() => {
                match result {
                    Ok(message) => {
                        if socket.send(Message::Text(message.to_json())).await.is_err() {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                    // Missed messages are superseded by the next one.
                    Err(broadcast::error::RecvError::Lagged(_)) => continue,
                }
            }
            msg = socket.recv() => {
                match msg {
                    Some(Ok(Message::Close(_))) | None | Some(Err(_)) => break,
                    Some(Ok(Message::Ping(data))) => {
                        if socket.send(Message::Pong(data)).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(_)) => {}
                }
            }
        }
    }
}
