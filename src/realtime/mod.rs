//! Live delivery: rooms, the connections inside them, and the frames
//! passed between the two.
//!
//! | Module | Purpose |
//! |--------|---------|
//! | `hub` | Room directory and connection admission |
//! | `room` | Per-room actor owning membership and fan-out |
//! | `client` | Per-connection read and write pumps |
//! | `history` | Backlog replay for newly admitted connections |
//! | `frame` | Wire frames and content rules |
//!
//! Within a room every register, unregister and broadcast is applied in
//! the order the room receives it. Nothing is ordered across rooms.

pub mod client;
pub mod frame;
pub mod history;
pub mod hub;
pub mod room;

pub use hub::Hub;
pub use room::RoomHandle;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;
use tracing::error;

use crate::{auth::AuthError, store::StoreError};

pub type ClientId = uuid::Uuid;

#[derive(Debug, Error)]
pub enum AdmitError {
    #[error("stream {0} not found")]
    RoomNotFound(String),

    #[error(transparent)]
    Unauthorized(#[from] AuthError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl IntoResponse for AdmitError {
    fn into_response(self) -> Response {
        match self {
            AdmitError::RoomNotFound(_) => (StatusCode::NOT_FOUND, "Stream not found").into_response(),
            AdmitError::Unauthorized(err) => err.into_response(),
            AdmitError::Store(err) => {
                error!(error = %err, "admission check failed");
                (StatusCode::INTERNAL_SERVER_ERROR, "store unavailable").into_response()
            }
        }
    }
}
