use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

use flatchat_store::ChatError;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error(transparent)]
    Chat(#[from] ChatError),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let (status, code, message, relogin) = match &self {
            ServerError::Chat(err) => {
                let status = match err {
                    ChatError::EmptyNickname | ChatError::EmptyMessage => StatusCode::BAD_REQUEST,
                    ChatError::DuplicateNickname(_) => StatusCode::CONFLICT,
                    ChatError::NotAuthenticated | ChatError::SessionExpired => {
                        StatusCode::UNAUTHORIZED
                    }
                    ChatError::StoreUnavailable(source) => {
                        tracing::warn!(error = %source, "Chat store unavailable");
                        StatusCode::SERVICE_UNAVAILABLE
                    }
                };
                let message = match err {
                    ChatError::StoreUnavailable(_) => "Chat store unavailable".to_string(),
                    other => other.to_string(),
                };
                (status, err.code(), message, err.requires_relogin())
            }
            ServerError::Internal(detail) => {
                tracing::error!(error = %detail, "Internal error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal",
                    "Internal server error".to_string(),
                    false,
                )
            }
        };

        let body = serde_json::json!({
            "error": code,
            "message": message,
            "relogin": relogin,
        });

        (status, axum::Json(body)).into_response()
    }
}
