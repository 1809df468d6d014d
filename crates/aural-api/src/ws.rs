//! WebSocket signaling endpoint.
//!
//! One socket per client session. Incoming frames carry signaling messages;
//! outgoing frames carry answers, errors and the session's latest detection
//! results.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::rejection::WebSocketUpgradeRejection;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::time::interval;
use tracing::{debug, info, warn};

use aural_models::{ClientMessage, ServerMessage, SessionId};

use crate::error::{ApiError, ApiResult, SessionError};
use crate::metrics;
use crate::session::SessionManager;
use crate::state::AppState;

/// Global counter for active WebSocket connections.
static ACTIVE_WS_CONNECTIONS: AtomicI64 = AtomicI64::new(0);

/// Configuration for WebSocket backpressure.
const WS_SEND_BUFFER_SIZE: usize = 32;
const WS_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);

/// Queue a server message for the writer task. Returns `false` once the
/// client is gone.
async fn send_ws_message(tx: &mpsc::Sender<Message>, msg: &ServerMessage) -> bool {
    let json = match serde_json::to_string(msg) {
        Ok(j) => j,
        Err(e) => {
            warn!(error = %e, "Failed to serialize server message");
            return true;
        }
    };
    match tx.try_send(Message::Text(json)) {
        Ok(()) => {}
        Err(mpsc::error::TrySendError::Full(message)) => {
            debug!("WebSocket send buffer full, applying backpressure");
            if tx.send(message).await.is_err() {
                return false;
            }
        }
        Err(mpsc::error::TrySendError::Closed(_)) => return false,
    }
    metrics::record_ws_message_sent(msg.event_name());
    true
}

/// Signaling endpoint.
///
/// A session slot is reserved before the upgrade and held until the socket
/// handler returns, so concurrent upgrades cannot exceed the limit.
pub async fn ws_signaling(
    State(state): State<AppState>,
    ws: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> ApiResult<impl IntoResponse> {
    let Some(slot) = state.limit.try_reserve() else {
        warn!(
            limit = state.config.max_sessions,
            "Rejecting WebSocket upgrade, session limit reached"
        );
        return Err(ApiError::unavailable("session limit reached"));
    };
    let ws = ws.map_err(|rejection| ApiError::bad_request(rejection.body_text()))?;

    let count = ACTIVE_WS_CONNECTIONS.fetch_add(1, Ordering::SeqCst) + 1;
    metrics::set_ws_active_connections(count);
    metrics::record_ws_connection();

    Ok(ws.on_upgrade(move |socket| async move {
        handle_socket(socket, state.sessions).await;
        drop(slot);
        let count = ACTIVE_WS_CONNECTIONS.fetch_sub(1, Ordering::SeqCst) - 1;
        metrics::set_ws_active_connections(count);
    }))
}

/// Drive one client connection until either side closes it.
async fn handle_socket(socket: WebSocket, sessions: Arc<SessionManager>) {
    let (ws_sender, mut receiver) = socket.split();

    // Create a bounded channel for backpressure
    let (tx, mut rx) = mpsc::channel::<Message>(WS_SEND_BUFFER_SIZE);

    let send_task = tokio::spawn(async move {
        let mut ws_sender = ws_sender;
        while let Some(msg) = rx.recv().await {
            if ws_sender.send(msg).await.is_err() {
                break;
            }
        }
        let _ = ws_sender.close().await;
    });

    let (session_id, mut results) = sessions.connect().await;
    if !send_ws_message(
        &tx,
        &ServerMessage::Connected {
            sid: session_id.clone(),
        },
    )
    .await
    {
        sessions.disconnect(&session_id).await;
        return;
    }

    let mut heartbeat = interval(WS_HEARTBEAT_INTERVAL);
    heartbeat.tick().await;
    let mut results_open = true;

    loop {
        tokio::select! {
            // Latest detection result for this session
            result = results.next(), if results_open => {
                match result {
                    Some(result) => {
                        if !send_ws_message(&tx, &ServerMessage::DetectionResults(result)).await {
                            debug!(session_id = %session_id, "Client gone while sending results");
                            break;
                        }
                    }
                    // Session record removed; keep the socket for renegotiation errors
                    None => results_open = false,
                }
            }
            // Heartbeat to keep connection alive
            _ = heartbeat.tick() => {
                if tx.send(Message::Ping(Vec::new())).await.is_err() {
                    warn!(session_id = %session_id, "Heartbeat failed, client disconnected");
                    break;
                }
            }
            client_msg = receiver.next() => {
                match client_msg {
                    Some(Ok(Message::Text(text))) => {
                        if !handle_client_text(&sessions, &session_id, &text, &tx).await {
                            break;
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        info!(session_id = %session_id, "Client closed connection");
                        break;
                    }
                    Some(Err(e)) => {
                        debug!(session_id = %session_id, error = %e, "WebSocket receive error");
                        break;
                    }
                    _ => {}
                }
            }
        }
    }

    sessions.disconnect(&session_id).await;
    drop(tx);
    let _ = send_task.await;
}

/// Handle one text frame. Returns `false` once the client is gone.
async fn handle_client_text(
    sessions: &Arc<SessionManager>,
    session_id: &SessionId,
    text: &str,
    tx: &mpsc::Sender<Message>,
) -> bool {
    let message: ClientMessage = match serde_json::from_str(text) {
        Ok(message) => message,
        Err(e) => {
            metrics::record_ws_message_received("invalid");
            debug!(session_id = %session_id, error = %e, "Malformed client message");
            return send_ws_message(tx, &ServerMessage::error(format!("Invalid message: {}", e))).await;
        }
    };

    let event = message.event_name();
    metrics::record_ws_message_received(event);

    match message {
        ClientMessage::Offer(offer) => match sessions.handle_offer(session_id, offer).await {
            Ok(answer) => send_ws_message(tx, &ServerMessage::Answer(answer)).await,
            Err(e) => {
                warn!(session_id = %session_id, error = %e, "Offer negotiation failed");
                send_ws_message(tx, &ServerMessage::error(e.to_string())).await
            }
        },
        ClientMessage::Answer(answer) => {
            let outcome = sessions.handle_answer(session_id, answer).await;
            report(tx, session_id, event, outcome, true).await
        }
        ClientMessage::IceCandidate(candidate) => {
            let outcome = sessions.handle_ice_candidate(session_id, candidate).await;
            report(tx, session_id, event, outcome, false).await
        }
    }
}

/// Log the outcome of an answer or candidate. Stale-session errors are
/// dropped; other failures reach the client only when `notify` is set.
async fn report(
    tx: &mpsc::Sender<Message>,
    session_id: &SessionId,
    event: &'static str,
    outcome: Result<(), SessionError>,
    notify: bool,
) -> bool {
    match outcome {
        Ok(()) => true,
        Err(e) if e.is_stale() => {
            metrics::record_stale_message(event);
            debug!(session_id = %session_id, event, error = %e, "Ignoring message for stale session");
            true
        }
        Err(e) => {
            warn!(session_id = %session_id, event, error = %e, "Failed to apply client message");
            if notify {
                send_ws_message(tx, &ServerMessage::error(e.to_string())).await
            } else {
                true
            }
        }
    }
}
