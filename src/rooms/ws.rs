use std::sync::Arc;

use axum::{
    debug_handler,
    extract::{OriginalUri, Path, State, WebSocketUpgrade},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use tracing::{debug, warn};

use crate::{auth::JwtAuth, config::Config, profiles::DisplayNames, realtime::{AdmitError, Hub}};

#[debug_handler(state = crate::AppState)]
pub(crate) async fn chat_ws(
    Path(stream_id): Path<String>,
    State(hub): State<Arc<Hub>>,
    State(auth): State<JwtAuth>,
    State(display_names): State<DisplayNames>,
    State(config): State<Arc<Config>>,
    OriginalUri(uri): OriginalUri,
    headers: HeaderMap,

    ws: WebSocketUpgrade,
) -> Result<Response, AdmitError> {
    hub.ensure_active(&stream_id).await.inspect_err(|err| {
        debug!(room = %stream_id, error = %err, "connection refused");
    })?;
    let user_id = auth.authenticate(&headers, &uri).inspect_err(|err| {
        debug!(room = %stream_id, error = %err, "connection refused");
    })?;

    if !origin_allowed(&headers, &config.cors_origins) {
        debug!(room = %stream_id, user = %user_id, "origin refused");
        return Ok((StatusCode::FORBIDDEN, "origin not allowed").into_response());
    }

    let display_name = display_names.resolve(&user_id).await;
    let max_message_bytes = hub.limits().max_message_bytes;

    Ok(ws
        .max_message_size(max_message_bytes)
        .max_frame_size(max_message_bytes)
        .on_upgrade(move |socket| async move {
            if let Err(err) = hub.admit(&stream_id, user_id, display_name, socket).await {
                warn!(room = %stream_id, error = %err, "admission failed after upgrade");
            }
        }))
}

/// Requests without an `Origin` header are not from a browser and pass.
fn origin_allowed(headers: &HeaderMap, allowed: &[String]) -> bool {
    let Some(origin) = headers.get(header::ORIGIN) else {
        return true;
    };
    let Ok(origin) = origin.to_str() else {
        return false;
    };
    allowed.iter().any(|a| a == "*" || a == origin)
}
