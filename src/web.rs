use axum::{
    Json, Router,
    extract::{
        Path, State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tower_http::trace::TraceLayer;

use crate::config::ServerConfig;
use crate::game::{MoveRequest, PublicState, RejectionKind};
use crate::piece::Player;
use crate::session::{Lobby, MatchId, Seat, Session, SessionError};

#[derive(Clone)]
pub struct AppState {
    lobby: Arc<Lobby>,
}

impl AppState {
    /// Opens the default match so `/api/state` has something to report
    /// before anyone connects
    pub fn new(config: &ServerConfig) -> Self {
        let lobby = Lobby::new(config.channel_capacity, config.max_matches);
        if let Err(e) = lobby.open(&MatchId::default()) {
            tracing::warn!("could not open the default match: {}", e);
        }
        AppState {
            lobby: Arc::new(lobby),
        }
    }

    pub fn lobby(&self) -> &Lobby {
        &self.lobby
    }
}

/// Frames the server writes to a participant
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    Welcome { slot: Player, state: PublicState },
    State { state: PublicState },
    Rejected { reason: String, kind: RejectionKind },
    Full,
    /// The server hosts too many matches to open another
    Unavailable { reason: String },
}

/// Decode one inbound frame and submit it. Accepted moves come back to every
/// participant through the broadcast, so only rejections produce a reply.
pub fn handle_frame(session: &Session, slot: Player, frame: &[u8]) -> Option<ServerMessage> {
    let request: MoveRequest = match serde_json::from_slice(frame) {
        Ok(request) => request,
        Err(e) => {
            tracing::debug!(match_id = %session.id(), slot = slot.index(), "undecodable frame: {}", e);
            return Some(ServerMessage::Rejected {
                reason: format!("Malformed move: {}", e),
                kind: RejectionKind::Malformed,
            });
        }
    };

    match session.submit(slot, &request) {
        Ok(_) => None,
        Err(e) => Some(ServerMessage::Rejected {
            reason: e.to_string(),
            kind: e.kind(),
        }),
    }
}

async fn send(socket: &mut WebSocket, message: &ServerMessage) -> Result<(), axum::Error> {
    let text = match serde_json::to_string(message) {
        Ok(text) => text,
        Err(e) => {
            tracing::error!("failed to encode server message: {}", e);
            return Ok(());
        }
    };
    socket.send(Message::Text(text)).await
}

async fn play(mut socket: WebSocket, lobby: Arc<Lobby>, match_id: MatchId) {
    let (session, seat) = match lobby.join(&match_id) {
        Ok(joined) => joined,
        Err(e) => {
            tracing::info!(match_id = %match_id, "{}", e);
            let refusal = match &e {
                SessionError::Full(_) => ServerMessage::Full,
                SessionError::TooManyMatches(_) => ServerMessage::Unavailable {
                    reason: e.to_string(),
                },
            };
            let _ = send(&mut socket, &refusal).await;
            let _ = socket.send(Message::Close(None)).await;
            return;
        }
    };
    let Seat {
        slot,
        state,
        mut updates,
    } = seat;

    let welcomed = send(&mut socket, &ServerMessage::Welcome { slot, state })
        .await
        .is_ok();

    if welcomed {
        loop {
            tokio::select! {
                inbound = socket.recv() => {
                    let frame = match inbound {
                        Some(Ok(frame)) => frame,
                        Some(Err(e)) => {
                            tracing::warn!(match_id = %session.id(), slot = slot.index(), "read error: {}", e);
                            break;
                        }
                        None => break,
                    };

                    let reply = match frame {
                        Message::Text(text) => handle_frame(&session, slot, text.as_bytes()),
                        Message::Binary(bytes) => handle_frame(&session, slot, &bytes),
                        Message::Close(_) => break,
                        Message::Ping(_) | Message::Pong(_) => None,
                    };

                    if let Some(reply) = reply {
                        if send(&mut socket, &reply).await.is_err() {
                            break;
                        }
                    }
                }
                update = updates.recv() => {
                    let state = match update {
                        Ok(state) => state,
                        Err(RecvError::Lagged(skipped)) => {
                            // The next recv yields the oldest state still buffered
                            tracing::warn!(match_id = %session.id(), slot = slot.index(), skipped, "connection lagging");
                            continue;
                        }
                        Err(RecvError::Closed) => break,
                    };

                    if send(&mut socket, &ServerMessage::State { state }).await.is_err() {
                        break;
                    }
                }
            }
        }
    }

    tracing::info!(match_id = %session.id(), slot = slot.index(), "participant disconnected");
    drop(updates);
    lobby.prune();
}

#[axum::debug_handler]
async fn join_default(ws: WebSocketUpgrade, State(app_state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| play(socket, app_state.lobby, MatchId::default()))
}

#[axum::debug_handler]
async fn join_match(
    ws: WebSocketUpgrade,
    Path(match_id): Path<String>,
    State(app_state): State<AppState>,
) -> Response {
    let match_id = MatchId::new(match_id);
    ws.on_upgrade(move |socket| play(socket, app_state.lobby, match_id))
}

fn match_state(lobby: &Lobby, match_id: &MatchId) -> Response {
    match lobby.get(match_id) {
        Some(session) => Json(session.snapshot()).into_response(),
        None => (
            StatusCode::NOT_FOUND,
            Json(serde_json::json!({
                "error": format!("No match named {}", match_id)
            })),
        )
            .into_response(),
    }
}

async fn get_game_state(State(app_state): State<AppState>) -> Response {
    match_state(&app_state.lobby, &MatchId::default())
}

async fn get_match_state(
    Path(match_id): Path<String>,
    State(app_state): State<AppState>,
) -> Response {
    match_state(&app_state.lobby, &MatchId::new(match_id))
}

pub fn router(app_state: AppState) -> Router {
    Router::new()
        .route("/ws", get(join_default))
        .route("/ws/:match_id", get(join_match))
        .route("/api/state", get(get_game_state))
        .route("/api/matches/:match_id/state", get(get_match_state))
        .layer(TraceLayer::new_for_http())
        .with_state(app_state)
}

pub async fn run_server(config: ServerConfig) -> Result<(), Box<dyn std::error::Error>> {
    let app = router(AppState::new(&config));

    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    tracing::info!("listening on {}", listener.local_addr()?);

    axum::serve(listener, app).await?;
    Ok(())
}
