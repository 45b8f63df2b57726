//! HTTP handlers.

pub mod chat;
pub mod health;

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum::http::StatusCode;
use axum::Json;
use serde::Serialize;

use oikos_core::UserId;

pub use chat::{chat_clear_history, chat_history, chat_send};
pub use health::health;

/// Header carrying the acting user's id, set by the authenticating proxy.
pub const USER_ID_HEADER: &str = "x-user-id";

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

pub type ApiError = (StatusCode, Json<ErrorResponse>);

pub fn api_error(status: StatusCode, error: impl Into<String>) -> ApiError {
    (status, Json(ErrorResponse { error: error.into() }))
}

/// The user a request acts for.
pub struct CurrentUser(pub UserId);

impl<S: Send + Sync> FromRequestParts<S> for CurrentUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .headers
            .get(USER_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<UserId>().ok())
            .map(CurrentUser)
            .ok_or_else(|| {
                api_error(
                    StatusCode::UNAUTHORIZED,
                    format!("missing or invalid {USER_ID_HEADER} header"),
                )
            })
    }
}
