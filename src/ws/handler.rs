//! WebSocket upgrade handler

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    response::{IntoResponse, Response},
};
use futures::{
    stream::{SplitSink, SplitStream},
    SinkExt, StreamExt,
};
use serde::Deserialize;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::app::AppState;
use crate::game::{InputKind, SimInput};
use crate::http::middleware::verify_jwt;
use crate::util::rate_limit::ConnectionRateLimiter;
use crate::util::time::unix_millis;
use crate::ws::hub::Frame;
use crate::ws::protocol::{ClientMsg, ServerMsg};

/// Query parameters for WebSocket connection
#[derive(Debug, Deserialize)]
pub struct WsQuery {
    /// JWT issued by the auth service
    pub token: String,
}

/// WebSocket upgrade handler. Identity is established before the upgrade.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(query): Query<WsQuery>,
    State(state): State<AppState>,
) -> Response {
    match verify_jwt(&query.token, &state.config.auth_jwt_secret) {
        Ok(claims) => {
            let username = claims.display_name();
            info!(user_id = %claims.sub, username = %username, "WebSocket upgrade for authenticated user");
            ws.on_upgrade(move |socket| handle_socket(socket, claims.sub, username, state))
        }
        Err(e) => {
            warn!(error = %e, "WebSocket auth failed");
            e.into_response()
        }
    }
}

/// Handle the upgraded WebSocket connection
async fn handle_socket(socket: WebSocket, user_id: Uuid, username: String, state: AppState) {
    let (mut ws_sink, ws_stream) = socket.split();

    let welcome = ServerMsg::Welcome {
        user_id,
        server_time: unix_millis(),
    };
    if let Err(e) = send_msg(&mut ws_sink, &welcome).await {
        error!(user_id = %user_id, error = %e, "Failed to send welcome");
        return;
    }

    // Register before announcing so the room replay reaches this connection
    let (conn_id, frame_rx) = state.hub.register(user_id);
    info!(user_id = %user_id, conn_id, "New WebSocket connection");

    let connect = SimInput {
        user_id,
        kind: InputKind::Connect { username },
        received_at: unix_millis(),
    };
    if state.input_tx.send(connect).await.is_err() {
        error!(user_id = %user_id, "Simulation is not running");
        state.hub.unregister(user_id, conn_id);
        return;
    }

    run_session(user_id, ws_sink, ws_stream, &state.input_tx, frame_rx).await;

    // Signal disconnect to the simulation
    let _ = state
        .input_tx
        .send(SimInput {
            user_id,
            kind: InputKind::Disconnect,
            received_at: unix_millis(),
        })
        .await;
    state.hub.unregister(user_id, conn_id);

    info!(user_id = %user_id, conn_id, "WebSocket connection closed");
}

/// Run the WebSocket session with read/write split
async fn run_session(
    user_id: Uuid,
    mut ws_sink: SplitSink<WebSocket, Message>,
    mut ws_stream: SplitStream<WebSocket>,
    input_tx: &mpsc::Sender<SimInput>,
    mut frame_rx: mpsc::Receiver<Frame>,
) {
    let rate_limiter = ConnectionRateLimiter::new();

    // Writer task: hub frames -> WebSocket
    let writer_handle = tokio::spawn(async move {
        while let Some(frame) = frame_rx.recv().await {
            if let Err(e) = ws_sink.send(Message::Text(frame.to_string())).await {
                debug!(user_id = %user_id, error = %e, "WebSocket send failed");
                break;
            }
        }
    });

    // Reader loop: WebSocket -> simulation
    while let Some(result) = ws_stream.next().await {
        match result {
            Ok(Message::Text(text)) => {
                let client_msg = match serde_json::from_str::<ClientMsg>(&text) {
                    Ok(msg) => msg,
                    Err(e) => {
                        warn!(user_id = %user_id, error = %e, "Failed to parse client message");
                        continue;
                    }
                };

                let allowed = match client_msg {
                    ClientMsg::Control { .. } | ClientMsg::Hover { .. } | ClientMsg::Ping { .. } => {
                        rate_limiter.check_input()
                    }
                    _ => rate_limiter.check_room(),
                };
                if !allowed {
                    warn!(user_id = %user_id, "Rate limited client message");
                    continue;
                }

                let input = SimInput {
                    user_id,
                    kind: InputKind::Client(client_msg),
                    received_at: unix_millis(),
                };
                if input_tx.send(input).await.is_err() {
                    debug!(user_id = %user_id, "Input channel closed");
                    break;
                }
            }
            Ok(Message::Binary(_)) => {
                warn!(user_id = %user_id, "Received binary message, ignoring");
            }
            Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => {}
            Ok(Message::Close(_)) => {
                info!(user_id = %user_id, "Client initiated close");
                break;
            }
            Err(e) => {
                debug!(user_id = %user_id, error = %e, "WebSocket error");
                break;
            }
        }
    }

    writer_handle.abort();
}

/// Send a message over WebSocket
async fn send_msg(sink: &mut SplitSink<WebSocket, Message>, msg: &ServerMsg) -> Result<(), String> {
    let json = serde_json::to_string(msg).map_err(|e| e.to_string())?;
    sink.send(Message::Text(json)).await.map_err(|e| e.to_string())
}
