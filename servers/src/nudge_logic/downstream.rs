use crate::nudge_logic::config::Config;
use crate::nudge_logic::model::{self, ClientMessage};
use crate::nudge_logic::state::AppState;
use axum::{
    Json, Router,
    extract::{
        ConnectInfo, Path, State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::IntoResponse,
    routing::{get, post},
};
use axum_server::tls_rustls::RustlsConfig;
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use lib_common::core::{ConnectionHandle, PushFrame};
use lib_common::rules::{Nudge, UserContext};
use serde_json::json;
use std::net::SocketAddr;
use std::time::Duration;
use tower_http::cors::{Any, CorsLayer};
use tracing::{debug, info, warn};

pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any);

    Router::new()
        .route("/ws", get(ws_handler))
        .route("/health", get(health_handler))
        .route("/presence", get(presence_handler))
        .route(
            "/notifications/{user_id}",
            get(list_notifications_handler).delete(clear_notifications_handler),
        )
        .route("/nudges/evaluate", post(evaluate_handler))
        .layer(cors)
        .with_state(state)
}

pub async fn run(config: Config, state: AppState) -> anyhow::Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], config.port()));
    let shutdown = state.shutdown.clone();
    let app = router(state).into_make_service_with_connect_info::<SocketAddr>();

    if let Some((cert_path, key_path)) = config.tls_paths() {
        let tls_config = RustlsConfig::from_pem_file(&cert_path, &key_path)
            .await
            .map_err(|e| anyhow::anyhow!("TLS Configuration Error: {}", e))?;

        let handle = axum_server::Handle::new();
        let signal_handle = handle.clone();
        tokio::spawn(async move {
            shutdown.cancelled().await;
            signal_handle.graceful_shutdown(Some(Duration::from_secs(10)));
        });

        info!("Nudge server listening on wss://{}", addr);
        axum_server::bind_rustls(addr, tls_config)
            .handle(handle)
            .serve(app)
            .await?;
    } else {
        let listener = tokio::net::TcpListener::bind(&addr).await?;
        info!("Nudge server listening on ws://{}", addr);
        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                shutdown.cancelled().await;
                info!("Nudge server shutting down.");
            })
            .await?;
    }

    Ok(())
}

async fn ws_handler(
    ws: WebSocketUpgrade,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    State(state): State<AppState>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state, addr))
}

async fn health_handler() -> &'static str {
    "OK"
}

async fn presence_handler(State(state): State<AppState>) -> Json<Vec<String>> {
    Json(state.registry.list_active())
}

async fn list_notifications_handler(
    Path(user_id): Path<String>,
    State(state): State<AppState>,
) -> impl IntoResponse {
    Json(state.store.list(&user_id))
}

async fn clear_notifications_handler(
    Path(user_id): Path<String>,
    State(state): State<AppState>,
) -> impl IntoResponse {
    let cleared = state.store.clear(&user_id);
    Json(json!({ "cleared": cleared }))
}

/// Dry run of the rule set for one snapshot. Nothing is dispatched.
async fn evaluate_handler(
    State(state): State<AppState>,
    Json(context): Json<UserContext>,
) -> Json<Vec<Nudge>> {
    let context = match context.now {
        Some(_) => context,
        None => context.at(state.now()),
    };
    Json(state.dispatcher.rules().evaluate(&context))
}

async fn send_frame(sender: &mut SplitSink<WebSocket, Message>, frame: &PushFrame) -> bool {
    match serde_json::to_string(frame) {
        Ok(json_str) => sender.send(Message::Text(json_str.into())).await.is_ok(),
        Err(e) => {
            warn!("Failed to serialize '{}' frame: {}", frame.event, e);
            true
        }
    }
}

/// One client session.
///
/// The session owns a push channel for its whole life. The client binds it to
/// a user with a `register` frame; from then on nudges dispatched to that user
/// arrive on `rx` and are forwarded. Whatever ends the loop (close frame, read
/// error, failed send, server shutdown), the connection is unregistered.
async fn handle_socket(socket: WebSocket, state: AppState, addr: SocketAddr) {
    let (handle, mut rx) = ConnectionHandle::open();
    let connection = handle.id();
    let (mut sender, mut receiver) = socket.split();
    info!("Client {} connected as {}", addr, connection);

    loop {
        tokio::select! {
            incoming = receiver.next() => {
                match incoming {
                    Some(Ok(Message::Text(text))) => {
                        let reply = match serde_json::from_str::<ClientMessage>(text.as_str()) {
                            Ok(ClientMessage::Register { user_id }) if !user_id.is_empty() => {
                                state.registry.register(&user_id, handle.clone());
                                info!("{} registered as '{}'", connection, user_id);
                                model::registered(&user_id)
                            }
                            Ok(ClientMessage::Register { .. }) => model::error("userId must not be empty"),
                            Ok(ClientMessage::Ping) => model::pong(),
                            Err(e) => {
                                debug!("Unreadable frame from {}: {}", connection, e);
                                model::error("unrecognized message")
                            }
                        };
                        if !send_frame(&mut sender, &reply).await {
                            break;
                        }
                    }
                    Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                    Some(Ok(_)) => {}
                }
            }
            pushed = rx.recv() => {
                match pushed {
                    Some(frame) => {
                        if !send_frame(&mut sender, &frame).await {
                            break; // client disconnected
                        }
                    }
                    None => break,
                }
            }
            _ = state.shutdown.cancelled() => {
                let _ = sender.send(Message::Close(None)).await;
                break;
            }
        }
    }

    match state.registry.unregister(connection) {
        Some(user_id) => info!("Client {} ({}) disconnected; '{}' offline", addr, connection, user_id),
        None => info!("Client {} ({}) disconnected", addr, connection),
    }
}
