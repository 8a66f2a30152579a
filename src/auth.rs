use axum::{
    extract::{FromRef, FromRequestParts, Query},
    http::{header, request::Parts, HeaderMap, StatusCode, Uri},
    response::{IntoResponse, Response},
};
use jsonwebtoken::{Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use thiserror::Error;

const ACCESS_TOKEN_COOKIE: &str = "access_token";

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("missing bearer token")]
    MissingToken,

    #[error("invalid token: {0}")]
    InvalidToken(#[from] jsonwebtoken::errors::Error),

    #[error("claims missing user_id")]
    MissingUserId,
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        (StatusCode::UNAUTHORIZED, format!("Unauthorized: {self}")).into_response()
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    #[serde(default)]
    pub user_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exp: Option<u64>,
}

#[derive(Deserialize)]
struct TokenQuery {
    token: Option<String>,
}

/// Verifies HS256 bearer tokens issued by the auth service.
#[derive(Clone)]
pub struct JwtAuth {
    key: DecodingKey,
    validation: Validation,
}

impl JwtAuth {
    pub fn new(secret: &str) -> JwtAuth {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 10;
        // exp is checked when present but tokens without one are accepted
        validation.set_required_spec_claims::<&str>(&[]);

        JwtAuth {
            key: DecodingKey::from_secret(secret.as_bytes()),
            validation,
        }
    }

    /// Resolves the caller's user id from the `Authorization` header, the
    /// `access_token` cookie or the `token` query parameter, in that order.
    pub fn authenticate(&self, headers: &HeaderMap, uri: &Uri) -> Result<String, AuthError> {
        let token = bearer_token(headers)
            .or_else(|| cookie(headers, ACCESS_TOKEN_COOKIE))
            .or_else(|| {
                Query::<TokenQuery>::try_from_uri(uri)
                    .ok()
                    .and_then(|Query(q)| q.token)
                    .filter(|t| !t.is_empty())
            })
            .ok_or(AuthError::MissingToken)?;

        let claims = jsonwebtoken::decode::<Claims>(&token, &self.key, &self.validation)?.claims;
        if claims.user_id.is_empty() {
            return Err(AuthError::MissingUserId);
        }
        Ok(claims.user_id)
    }
}

fn bearer_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get(header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::to_owned)
}

fn cookie(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, value)| *key == name && !value.is_empty())
        .map(|(_, value)| value.to_owned())
}

/// The authenticated caller of a REST endpoint.
pub struct AuthUser(pub String);

impl<S> FromRequestParts<S> for AuthUser
where
    JwtAuth: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        JwtAuth::from_ref(state)
            .authenticate(&parts.headers, &parts.uri)
            .map(AuthUser)
    }
}
