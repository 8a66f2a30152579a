use std::sync::Arc;

use axum::{
    debug_handler,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Deserialize;
use serde_json::json;
use tracing::info;

use crate::{auth::AuthUser, store::MessageStore, AppResult};

const MESSAGE_PAGE: u32 = 100;

#[derive(Debug, Deserialize)]
pub(crate) struct NewThreadQuery {
    #[serde(default)]
    stream_id: String,
}

#[debug_handler(state = crate::AppState)]
pub(crate) async fn create_thread(
    AuthUser(user_id): AuthUser,
    State(store): State<Arc<dyn MessageStore>>,

    Json(NewThreadQuery { stream_id }): Json<NewThreadQuery>,
) -> AppResult<Response> {
    let stream_id = stream_id.trim();
    if stream_id.is_empty() {
        return Ok((StatusCode::BAD_REQUEST, "stream_id required").into_response());
    }

    let thread = store.create_thread(stream_id).await?;
    info!(stream = %thread.stream_id, thread = %thread.id, user = %user_id, "thread opened");

    Ok(Json(json!({ "ws_url": format!("/ws/chat/{}", thread.stream_id) })).into_response())
}

#[debug_handler(state = crate::AppState)]
pub(crate) async fn thread_messages(
    AuthUser(_): AuthUser,
    State(store): State<Arc<dyn MessageStore>>,
    Path(stream_id): Path<String>,
) -> AppResult<Response> {
    let messages = store.fetch_recent_messages(&stream_id, MESSAGE_PAGE).await?;
    Ok(Json(messages).into_response())
}

#[debug_handler(state = crate::AppState)]
pub(crate) async fn close_thread(
    AuthUser(user_id): AuthUser,
    State(store): State<Arc<dyn MessageStore>>,
    Path(stream_id): Path<String>,
) -> AppResult<Response> {
    if store.close_thread(&stream_id).await? {
        info!(stream = %stream_id, user = %user_id, "thread closed");
    }
    Ok(Json(json!({ "status": "closed" })).into_response())
}
