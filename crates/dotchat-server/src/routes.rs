use axum::{
    Json, Router,
    extract::{State, WebSocketUpgrade},
    response::IntoResponse,
    routing::get,
};
use serde_json::{Value, json};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use dotchat_gateway::{Dispatcher, Heartbeat};
use dotchat_gateway::connection;

/// Path clients connect to.
pub const WS_PATH: &str = "/ws";

#[derive(Clone)]
pub struct RelayState {
    pub dispatcher: Dispatcher,
    pub shutdown: CancellationToken,
    /// Tracks live connection tasks so shutdown can wait for them.
    pub connections: TaskTracker,
    pub heartbeat: Heartbeat,
}

pub fn router(state: RelayState) -> Router {
    Router::new()
        .route(WS_PATH, get(ws_upgrade))
        .route("/health", get(health))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health() -> Json<Value> {
    Json(json!({ "ok": true }))
}

async fn ws_upgrade(State(state): State<RelayState>, ws: WebSocketUpgrade) -> impl IntoResponse {
    ws.on_upgrade(move |socket| {
        state
            .connections
            .track_future(connection::handle_connection(
                socket,
                state.dispatcher,
                state.shutdown,
                state.heartbeat,
            ))
    })
}
