mod thread;
mod ws;

use axum::{
    routing::{get, post},
    Router,
};

use crate::AppState;

/// Thread bookkeeping, mounted under `/api/chat`.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/thread", post(thread::create_thread))
        .route("/thread/{stream_id}/messages", get(thread::thread_messages))
        .route("/thread/{stream_id}/close", post(thread::close_thread))
}

pub fn ws_router() -> Router<AppState> {
    Router::new().route("/ws/chat/{stream_id}", get(ws::chat_ws))
}
