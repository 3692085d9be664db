//! Per-connection WebSocket plumbing: origin enforcement, the
//! challenge event, frame decode, and request dispatch.

use std::sync::Arc;

use axum::extract::ws::{close_code, CloseFrame, Message, Utf8Bytes, WebSocket};
use axum::extract::{State, WebSocketUpgrade};
use axum::http::HeaderMap;
use axum::response::Response;
use futures_util::stream::StreamExt;
use futures_util::SinkExt;
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use opgate_protocol::{events, unix_ms, ChallengePayload, Frame};

use crate::dispatch::ConnContext;
use crate::server::AppState;

const WRITE_QUEUE_DEPTH: usize = 256;

pub(crate) async fn ws_handler(
    ws: WebSocketUpgrade,
    headers: HeaderMap,
    State(state): State<AppState>,
) -> Response {
    let origin = headers
        .get("origin")
        .and_then(|v| v.to_str().ok())
        .map(|v| v.to_string());
    ws.on_upgrade(move |socket| handle_connection(socket, state, origin))
}

async fn handle_connection(socket: WebSocket, state: AppState, origin: Option<String>) {
    let (mut sender, mut receiver) = socket.split();

    if !origin_allowed(&state.config.allowed_origins, origin.as_deref()) {
        warn!(origin = origin.as_deref().unwrap_or("<none>"), "rejecting connection from disallowed origin");
        let _ = sender
            .send(Message::Close(Some(CloseFrame {
                code: close_code::POLICY,
                reason: Utf8Bytes::from_static("origin not allowed"),
            })))
            .await;
        return;
    }

    let conn_id: Arc<str> = Arc::from(mint_conn_id());
    info!(conn = %conn_id, "operator connected");

    // Single writer task owns the sink; handlers and the challenge
    // below enqueue through the channel so responses never interleave
    // mid-frame.
    let (tx, mut rx) = mpsc::channel::<Message>(WRITE_QUEUE_DEPTH);
    let write_task = tokio::spawn(async move {
        while let Some(message) = rx.recv().await {
            if sender.send(message).await.is_err() {
                break;
            }
        }
    });

    if let Err(err) = send_challenge(&tx).await {
        warn!(conn = %conn_id, error = %err, "failed to send challenge");
    }

    while let Some(message) = receiver.next().await {
        let message = match message {
            Ok(message) => message,
            Err(err) => {
                debug!(conn = %conn_id, error = %err, "websocket read failed");
                break;
            }
        };
        match message {
            Message::Text(text) => match Frame::decode(text.as_str()) {
                Some(Frame::Request { id, method, params }) => {
                    dispatch_request(&state, &conn_id, &tx, id, method, params);
                }
                Some(other) => {
                    debug!(conn = %conn_id, frame = ?other, "dropping non-request frame");
                }
                None => {
                    debug!(conn = %conn_id, "dropping undecodable frame");
                }
            },
            Message::Close(_) => break,
            // Binary payloads are not part of the protocol; pings and
            // pongs are handled by the transport.
            _ => {}
        }
    }

    write_task.abort();
    info!(conn = %conn_id, "operator disconnected");
}

/// Run one request to completion on its own task and enqueue exactly
/// one response frame for its id, whatever the handler does.
fn dispatch_request(
    state: &AppState,
    conn_id: &Arc<str>,
    tx: &mpsc::Sender<Message>,
    id: String,
    method: String,
    params: Option<Value>,
) {
    let handler = state.registry.get(&method);
    let ctx = ConnContext {
        conn_id: conn_id.clone(),
    };
    let tx = tx.clone();
    tokio::spawn(async move {
        let frame = match handler {
            None => Frame::response_err(id, format!("Unknown method: {method}")),
            Some(handler) => {
                // Run the handler on its own task so a panic turns
                // into a JoinError instead of killing the connection.
                let outcome = tokio::spawn(handler.call(params, ctx)).await;
                match outcome {
                    Ok(Ok(payload)) => Frame::response_ok(id, payload),
                    Ok(Err(err)) => Frame::response_err(id, err.to_string()),
                    Err(err) => Frame::response_err(id, format!("handler failed: {err}")),
                }
            }
        };
        match frame.encode() {
            Ok(text) => {
                let _ = tx.send(Message::Text(Utf8Bytes::from(text))).await;
            }
            Err(err) => warn!(error = %err, "failed to encode response frame"),
        }
    });
}

async fn send_challenge(tx: &mpsc::Sender<Message>) -> anyhow::Result<()> {
    let payload = ChallengePayload {
        nonce: Uuid::new_v4().to_string(),
        ts: unix_ms(),
    };
    let frame = Frame::event(
        events::CONNECT_CHALLENGE,
        Some(serde_json::to_value(payload)?),
    );
    let text = frame.encode()?;
    tx.send(Message::Text(Utf8Bytes::from(text))).await?;
    Ok(())
}

/// Exact string match against the allow-list, with `*` admitting any
/// origin. A connection without an Origin header is a non-browser
/// client and is always admitted; the handshake credential gates
/// those.
pub(crate) fn origin_allowed(allowed: &[String], origin: Option<&str>) -> bool {
    match origin {
        None => true,
        Some(origin) => allowed
            .iter()
            .any(|candidate| candidate == "*" || candidate == origin),
    }
}

fn mint_conn_id() -> String {
    let suffix = Uuid::new_v4().simple().to_string();
    format!("conn_{}_{}", unix_ms(), &suffix[..8])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_origin_is_admitted() {
        let allowed = vec!["http://localhost:5173".to_string()];
        assert!(origin_allowed(&allowed, None));
    }

    #[test]
    fn listed_origin_is_admitted() {
        let allowed = vec![
            "http://localhost:5173".to_string(),
            "http://127.0.0.1:5173".to_string(),
        ];
        assert!(origin_allowed(&allowed, Some("http://127.0.0.1:5173")));
    }

    #[test]
    fn wildcard_admits_any_origin() {
        let allowed = vec!["*".to_string()];
        assert!(origin_allowed(&allowed, Some("http://anything.example")));
    }

    #[test]
    fn unlisted_origin_is_rejected() {
        let allowed = vec!["http://localhost:5173".to_string()];
        assert!(!origin_allowed(&allowed, Some("http://evil.example")));
        // Matching is exact, not prefix or host based.
        assert!(!origin_allowed(&allowed, Some("http://localhost:5173/app")));
        assert!(!origin_allowed(&allowed, Some("https://localhost:5173")));
    }

    #[test]
    fn conn_ids_are_unique() {
        let a = mint_conn_id();
        let b = mint_conn_id();
        assert!(a.starts_with("conn_"));
        assert_ne!(a, b);
    }
}
