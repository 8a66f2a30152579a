pub mod auth;
pub mod config;
pub mod profiles;
pub mod realtime;
pub mod rooms;
pub mod store;

#[cfg(test)]
pub(crate) mod testutil;

use std::sync::Arc;

use axum::{
    extract::FromRef,
    http::{header, HeaderValue, Method, StatusCode},
    response::{IntoResponse, Response},
    Router,
};
use tower_http::{
    cors::{AllowOrigin, Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::error;

use crate::{
    auth::JwtAuth,
    config::Config,
    profiles::DisplayNames,
    realtime::Hub,
    store::{MessageStore, StoreError},
};

#[derive(Clone, FromRef)]
pub struct AppState {
    pub hub: Arc<Hub>,
    pub store: Arc<dyn MessageStore>,
    pub auth: JwtAuth,
    pub display_names: DisplayNames,
    pub config: Arc<Config>,
}

impl AppState {
    pub fn new(config: Config, store: Arc<dyn MessageStore>) -> AppResult<AppState> {
        Ok(AppState {
            hub: Arc::new(Hub::new(Arc::clone(&store), config.realtime)),
            auth: JwtAuth::new(&config.jwt_secret),
            display_names: DisplayNames::new(config.channel_api_base.clone())?,
            store,
            config: Arc::new(config),
        })
    }
}

pub fn app(state: AppState) -> Router {
    let cors = cors_layer(&state.config);

    Router::new()
        .nest("/api/chat", rooms::router())
        .merge(rooms::ws_router())
        .with_state(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}

fn cors_layer(config: &Config) -> CorsLayer {
    let layer = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION]);

    if config.allows_any_origin() {
        return layer.allow_origin(Any);
    }

    let origins: Vec<HeaderValue> = config
        .cors_origins
        .iter()
        .filter_map(|origin| HeaderValue::from_str(origin).ok())
        .collect();
    layer
        .allow_origin(AllowOrigin::list(origins))
        .allow_credentials(config.cors_allow_credentials)
}

pub type AppResult<T> = Result<T, AppError>;
#[derive(Debug)]
pub struct AppError(pub anyhow::Error);

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        error!(error = ?self.0, "request failed");
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("{}", self.0),
        )
            .into_response()
    }
}

macro_rules! apperr_impl {
    ($E:ty) => {
        impl From<$E> for AppError {
            fn from(err: $E) -> Self {
                Self(anyhow::Error::from(err))
            }
        }
    };
}

apperr_impl!(StoreError);
apperr_impl!(reqwest::Error);
