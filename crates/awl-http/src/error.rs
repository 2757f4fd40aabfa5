//! API error type and its JSON wire form.

use awl_engine::EngineError;
use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

/// Errors returned by the volume server's HTTP handlers.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// A query parameter or header could not be parsed.
    #[error("bad request: {0}")]
    BadRequest(String),

    /// An error from the mutation engine.
    #[error(transparent)]
    Engine(#[from] EngineError),
}

impl ApiError {
    /// Map to an HTTP status code.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Engine(e) => match e {
                EngineError::Unauthorized => StatusCode::UNAUTHORIZED,
                EngineError::MalformedObject(_)
                | EngineError::SizeLimitExceeded { .. }
                | EngineError::CookieMismatch(_) => StatusCode::BAD_REQUEST,
                EngineError::UnknownVolume(_) => StatusCode::NOT_FOUND,
                EngineError::MalformedManifest(_)
                | EngineError::CascadeDeletionFailed { .. }
                | EngineError::ReplicationFailed { .. }
                | EngineError::Backend(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
        }
    }
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        } else {
            tracing::debug!(error = %self, %status, "request rejected");
        }
        (
            status,
            Json(ErrorBody {
                error: self.to_string(),
            }),
        )
            .into_response()
    }
}
