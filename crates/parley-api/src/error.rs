use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use thiserror::Error;
use tracing::error;

/// Error taxonomy at the HTTP boundary. Every response body is a
/// single-field `{"error": ...}` object; internal causes are logged
/// server-side and never leak to the client.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Malformed or out-of-range input.
    #[error("{0}")]
    Validation(&'static str),

    /// Duplicate username.
    #[error("Username already exists")]
    Conflict,

    /// Bad credentials. The message is identical whether the user is absent
    /// or the password is wrong, so nothing enumerates usernames.
    #[error("Invalid username or password")]
    Auth,

    /// Missing or invalid session credential on a protected route.
    #[error("Unauthorized - Invalid or missing token")]
    Unauthorized,

    /// Anti-forgery token missing or mismatched.
    #[error("Invalid CSRF token")]
    Forbidden,

    /// Storage unreachable.
    #[error("Service unavailable")]
    Unavailable,

    /// Catch-all. The cause is logged where the conversion happens.
    #[error("Internal Server Error")]
    Internal,
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::Validation(_) | ApiError::Conflict | ApiError::Auth => {
                StatusCode::BAD_REQUEST
            }
            ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden => StatusCode::FORBIDDEN,
            ApiError::Unavailable => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status(), Json(json!({ "error": self.to_string() }))).into_response()
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        if err.downcast_ref::<parley_db::StorageUnavailable>().is_some() {
            error!("storage unavailable: {:#}", err);
            return ApiError::Unavailable;
        }
        error!("internal error: {:#}", err);
        ApiError::Internal
    }
}
