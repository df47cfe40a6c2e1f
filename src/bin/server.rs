use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use cellclaim_server::constants::TICK_MS;
use cellclaim_server::game::Game;
use cellclaim_server::server_protocol::{parse_client_message, ParsedClientMessage};
use cellclaim_server::server_utils::{normalize_seed, sanitize_name};
use cellclaim_server::types::GameConfig;
use futures_util::{SinkExt, StreamExt};
use rand::Rng;
use serde_json::{json, Value};
use tokio::sync::{mpsc, Mutex};
use tower_http::services::{ServeDir, ServeFile};

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

type SharedState = Arc<Mutex<ServerState>>;

#[derive(Clone, Debug)]
enum OutboundMessage {
    Text(String),
    Close { code: u16, reason: String },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum QueuePolicy {
    DropOnFull,
    DisconnectOnFull,
}

/// One connected client: its outbound queue and its own single-player
/// game. Sessions are fully independent; there is no lobby.
struct SessionInternal {
    tx: mpsc::Sender<OutboundMessage>,
    name: String,
    game: Option<Game>,
}

struct ServerState {
    sessions: HashMap<String, SessionInternal>,
}

impl ServerState {
    fn new() -> Self {
        Self {
            sessions: HashMap::new(),
        }
    }
}

#[tokio::main]
async fn main() {
    let port = std::env::var("PORT")
        .ok()
        .and_then(|value| value.parse::<u16>().ok())
        .unwrap_or(8080);

    let state = Arc::new(Mutex::new(ServerState::new()));
    start_tick_loop(state.clone());

    let app = Router::new()
        .route("/healthz", get(healthz))
        .route("/ws", get(ws_handler))
        .with_state(state);

    let app = if let Some(static_dir) = resolve_static_dir() {
        let index_file = static_dir.join("index.html");
        println!(
            "[server] static file root: {}",
            static_dir.to_string_lossy()
        );
        app.fallback_service(
            ServeDir::new(static_dir).not_found_service(ServeFile::new(index_file)),
        )
    } else {
        eprintln!("[server] static file root not found; serving the websocket API only.");
        app
    };

    let bind_addr = format!("0.0.0.0:{port}");
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .expect("failed to bind server socket");

    println!("[server] listening on :{port}");
    axum::serve(listener, app)
        .await
        .expect("server runtime failed");
}

fn resolve_static_dir() -> Option<PathBuf> {
    if let Ok(raw) = std::env::var("STATIC_DIR") {
        let path = PathBuf::from(raw);
        if path.join("index.html").is_file() {
            return Some(path);
        }
    }

    let candidates = [PathBuf::from("dist/client"), PathBuf::from("../client")];
    candidates
        .into_iter()
        .find(|path| path.join("index.html").is_file())
}

async fn healthz() -> impl IntoResponse {
    Json(json!({ "ok": true }))
}

async fn ws_handler(ws: WebSocketUpgrade, State(state): State<SharedState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(state, socket))
}

async fn handle_socket(state: SharedState, socket: WebSocket) {
    let session_id = make_id("session");
    let (tx, mut rx) = mpsc::channel::<OutboundMessage>(256);

    {
        let mut guard = state.lock().await;
        guard.sessions.insert(
            session_id.clone(),
            SessionInternal {
                tx: tx.clone(),
                name: "Player".to_string(),
                game: None,
            },
        );
    }

    let (mut ws_sender, mut ws_receiver) = socket.split();
    let writer = tokio::spawn(async move {
        while let Some(outbound) = rx.recv().await {
            let should_close = matches!(outbound, OutboundMessage::Close { .. });
            let result = match outbound {
                OutboundMessage::Text(payload) => {
                    ws_sender.send(Message::Text(payload.into())).await
                }
                OutboundMessage::Close { code, reason } => {
                    let frame = CloseFrame {
                        code,
                        reason: reason.into(),
                    };
                    ws_sender.send(Message::Close(Some(frame))).await
                }
            };
            if result.is_err() || should_close {
                break;
            }
        }
    });

    while let Some(received) = ws_receiver.next().await {
        let Ok(message) = received else {
            break;
        };

        match message {
            Message::Text(raw) => {
                handle_client_message(state.clone(), &session_id, raw.to_string()).await;
            }
            Message::Binary(raw) => {
                if let Ok(text) = String::from_utf8(raw.to_vec()) {
                    handle_client_message(state.clone(), &session_id, text).await;
                } else {
                    send_error(&state, &session_id, "invalid utf8 message").await;
                }
            }
            Message::Close(_) => break,
            _ => {}
        }
    }

    {
        let mut guard = state.lock().await;
        guard.sessions.remove(&session_id);
    }
    drop(tx);
    let _ = writer.await;
}

async fn handle_client_message(state: SharedState, session_id: &str, raw: String) {
    let Some(message) = parse_client_message(&raw) else {
        send_error(&state, session_id, "invalid message").await;
        return;
    };

    match message {
        ParsedClientMessage::Hello { name, seed } => {
            handle_hello(state, session_id, name, seed).await;
        }
        ParsedClientMessage::Input { dir } => {
            let Some(dir) = dir else {
                // Not a movement key; deliberately ignored.
                return;
            };
            let mut guard = state.lock().await;
            if let Some(level) = guard
                .sessions
                .get_mut(session_id)
                .and_then(|session| session.game.as_mut())
                .and_then(Game::level_mut)
            {
                level.set_player_direction(dir);
            }
        }
        ParsedClientMessage::Restart { seed } => {
            handle_restart(state, session_id, seed).await;
        }
        ParsedClientMessage::Ping { t } => {
            let mut guard = state.lock().await;
            send_to_session(
                &mut guard,
                session_id,
                &json!({ "type": "pong", "t": t }),
                QueuePolicy::DisconnectOnFull,
            );
        }
    }
}

async fn handle_hello(
    state: SharedState,
    session_id: &str,
    requested_name: Option<String>,
    seed: Option<u64>,
) {
    let game = match Game::new(GameConfig::default()) {
        Ok(game) => game,
        Err(error) => {
            send_error(&state, session_id, &error.to_string()).await;
            return;
        }
    };

    let seed = resolve_seed(seed);

    let mut guard = state.lock().await;
    let Some(session) = guard.sessions.get_mut(session_id) else {
        return;
    };
    session.name = sanitize_name(requested_name.as_deref().unwrap_or(""));
    session.game = Some(game);

    let (name, config, init, snapshot) = {
        let name = session.name.clone();
        let game = session.game.as_mut().expect("game was just created");
        let config = *game.config();
        let level = game.start_level(seed);
        (
            name,
            config,
            level.build_board_init(),
            level.build_snapshot(true),
        )
    };

    send_to_session(
        &mut guard,
        session_id,
        &json!({ "type": "welcome", "name": name, "seed": seed, "config": config }),
        QueuePolicy::DisconnectOnFull,
    );
    send_to_session(
        &mut guard,
        session_id,
        &json!({ "type": "init", "board": init }),
        QueuePolicy::DisconnectOnFull,
    );
    send_to_session(
        &mut guard,
        session_id,
        &json!({ "type": "state", "snapshot": snapshot }),
        QueuePolicy::DisconnectOnFull,
    );
}

async fn handle_restart(state: SharedState, session_id: &str, seed: Option<u64>) {
    let seed = resolve_seed(seed);
    let mut guard = state.lock().await;
    let Some(session) = guard.sessions.get_mut(session_id) else {
        return;
    };
    let Some(game) = session.game.as_mut() else {
        drop(guard);
        send_error(&state, session_id, "send hello first").await;
        return;
    };

    let (init, snapshot) = {
        let level = game.start_level(seed);
        (level.build_board_init(), level.build_snapshot(true))
    };
    send_to_session(
        &mut guard,
        session_id,
        &json!({ "type": "init", "board": init, "seed": seed }),
        QueuePolicy::DisconnectOnFull,
    );
    send_to_session(
        &mut guard,
        session_id,
        &json!({ "type": "state", "snapshot": snapshot }),
        QueuePolicy::DisconnectOnFull,
    );
}

fn resolve_seed(requested: Option<u64>) -> u32 {
    match requested {
        Some(seed) => normalize_seed(seed),
        None => rand::rng().random::<u32>(),
    }
}

fn start_tick_loop(state: SharedState) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_millis(TICK_MS));
        loop {
            interval.tick().await;
            let mut guard = state.lock().await;
            tick_sessions(&mut guard);
        }
    });
}

/// Advances every running level one tick and pushes the snapshot to its
/// client. Stopped levels are left alone until the client restarts; the
/// level itself also ignores stray steps, so a race here is harmless.
fn tick_sessions(state: &mut ServerState) {
    let session_ids: Vec<String> = state.sessions.keys().cloned().collect();
    for session_id in session_ids {
        let payloads = {
            let Some(session) = state.sessions.get_mut(&session_id) else {
                continue;
            };
            let Some(level) = session.game.as_mut().and_then(Game::level_mut) else {
                continue;
            };
            if !level.is_running() {
                continue;
            }

            level.step();
            let snapshot = level.build_snapshot(true);
            let finished = !level.is_running();
            let mut payloads = vec![json!({ "type": "state", "snapshot": snapshot })];
            if finished {
                payloads.push(json!({ "type": "game_over", "state": level.state() }));
            }
            payloads
        };

        for payload in payloads {
            send_to_session(state, &session_id, &payload, QueuePolicy::DropOnFull);
        }
    }
}

fn send_to_session(
    state: &mut ServerState,
    session_id: &str,
    payload: &Value,
    policy: QueuePolicy,
) {
    let Some(session) = state.sessions.get(session_id) else {
        return;
    };
    let tx = session.tx.clone();
    let text = payload.to_string();
    if tx.try_send(OutboundMessage::Text(text)).is_err() {
        match policy {
            QueuePolicy::DropOnFull => {}
            QueuePolicy::DisconnectOnFull => {
                let _ = tx.try_send(OutboundMessage::Close {
                    code: 1008,
                    reason: "outbound queue overflow".to_string(),
                });
                let _ = state.sessions.remove(session_id);
            }
        }
    }
}

async fn send_error(state: &SharedState, session_id: &str, message: &str) {
    let mut guard = state.lock().await;
    send_to_session(
        &mut guard,
        session_id,
        &json!({ "type": "error", "message": message }),
        QueuePolicy::DisconnectOnFull,
    );
}

fn make_id(prefix: &str) -> String {
    let id = NEXT_ID.fetch_add(1, Ordering::Relaxed);
    format!("{prefix}_{id}")
}
