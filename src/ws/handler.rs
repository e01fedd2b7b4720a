//! WebSocket upgrade handler

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
};
use futures::{SinkExt, StreamExt};
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, error, info, warn};

use crate::app::AppState;
use crate::game::{create_match, ControllerId, PlayerInput, StartedMatch};
use crate::util::rate_limit::InputRateLimiter;
use crate::util::time::unix_millis;
use crate::ws::protocol::{ClientMsg, ServerMsg};

/// WebSocket upgrade handler
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    let controller = ControllerId::new_v4();
    info!(%controller, "WebSocket upgrade");
    ws.on_upgrade(move |socket| handle_socket(socket, controller, state))
}

/// Handle the upgraded WebSocket connection
async fn handle_socket(socket: WebSocket, controller: ControllerId, state: AppState) {
    info!(%controller, "New WebSocket connection");

    let (mut ws_sink, ws_stream) = socket.split();

    // Send welcome message
    let welcome = ServerMsg::Welcome {
        user_id: controller.0,
        server_time: unix_millis(),
    };

    if let Err(e) = send_msg(&mut ws_sink, &welcome).await {
        error!(%controller, error = %e, "Failed to send welcome");
        return;
    }

    // Every connection plays its own match
    let StartedMatch {
        handle,
        pawn,
        snapshots: snapshot_rx,
    } = create_match(
        &state.match_registry,
        &state.config.match_settings,
        controller,
    );

    let started = ServerMsg::MatchStarted {
        match_id: handle.id,
        seed: handle.seed,
        tick: 0,
        pawn,
    };
    if let Err(e) = send_msg(&mut ws_sink, &started).await {
        error!(%controller, error = %e, "Failed to send match start");
    }

    // Run the session with split read/write
    run_session(controller, ws_sink, ws_stream, handle.input_tx.clone(), snapshot_rx).await;

    info!(%controller, match_id = %handle.id, "WebSocket connection closed");
}

/// Run the WebSocket session with read/write split
async fn run_session(
    controller: ControllerId,
    mut ws_sink: futures::stream::SplitSink<WebSocket, Message>,
    mut ws_stream: futures::stream::SplitStream<WebSocket>,
    input_tx: mpsc::Sender<PlayerInput>,
    mut snapshot_rx: broadcast::Receiver<ServerMsg>,
) {
    let rate_limiter = InputRateLimiter::new();

    // Spawn writer task: broadcast snapshots -> WebSocket
    let writer_handle = tokio::spawn(async move {
        loop {
            match snapshot_rx.recv().await {
                Ok(msg) => {
                    if let Err(e) = send_msg(&mut ws_sink, &msg).await {
                        debug!(%controller, error = %e, "WebSocket send failed");
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!(%controller, lagged_count = n, "Client lagged, skipping {} snapshots", n);
                    // Continue - don't disconnect for lag
                }
                Err(broadcast::error::RecvError::Closed) => {
                    debug!(%controller, "Snapshot channel closed");
                    break;
                }
            }
        }
    });

    // Reader loop: WebSocket -> match loop
    while let Some(result) = ws_stream.next().await {
        match result {
            Ok(Message::Text(text)) => {
                if !rate_limiter.check_input() {
                    warn!(%controller, "Rate limited input message");
                    continue;
                }

                match serde_json::from_str::<ClientMsg>(&text) {
                    Ok(msg) => {
                        let leaving = matches!(msg, ClientMsg::LeaveMatch);
                        let input = PlayerInput {
                            controller,
                            msg,
                            received_at: unix_millis(),
                        };

                        if input_tx.send(input).await.is_err() {
                            debug!(%controller, "Input channel closed");
                            break;
                        }
                        if leaving {
                            break;
                        }
                    }
                    Err(e) => {
                        warn!(%controller, error = %e, "Failed to parse client message");
                    }
                }
            }
            Ok(Message::Binary(_)) => {
                warn!(%controller, "Received binary message, ignoring");
            }
            Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => {
                debug!(%controller, "Received ping/pong");
            }
            Ok(Message::Close(_)) => {
                info!(%controller, "Client initiated close");
                break;
            }
            Err(e) => {
                error!(%controller, error = %e, "WebSocket error");
                break;
            }
        }
    }

    // Signal disconnect to match loop
    let _ = input_tx
        .send(PlayerInput {
            controller,
            msg: ClientMsg::LeaveMatch,
            received_at: unix_millis(),
        })
        .await;

    // Abort writer task
    writer_handle.abort();
}

/// Send a message over WebSocket
async fn send_msg(
    sink: &mut futures::stream::SplitSink<WebSocket, Message>,
    msg: &ServerMsg,
) -> Result<(), String> {
    let json = serde_json::to_string(msg).map_err(|e| e.to_string())?;
    sink.send(Message::Text(json))
        .await
        .map_err(|e| e.to_string())
}
