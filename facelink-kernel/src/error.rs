//! Erreurs de l'API REST du kernel.
//!
//! Toutes les erreurs sont des rejets d'entrée (pas de retry côté appelant) :
//! le body reste `{ "accepted": false, "error": "…" }` pour que l'UI et
//! l'agent n'aient qu'une forme à lire.

use crate::models::UnknownCommand;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

pub type ApiResult<T> = Result<T, ApiError>;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("No {0} provided")]
    MissingField(&'static str),

    #[error("Unknown command {0}")]
    UnknownCommand(String),

    #[error("Invalid payload: {0}")]
    InvalidPayload(String),

    #[error("Invalid device id '{0}'")]
    InvalidDeviceId(String),

    #[error("Missing or invalid API key")]
    Unauthorized,
}

impl From<UnknownCommand> for ApiError {
    fn from(err: UnknownCommand) -> Self {
        ApiError::UnknownCommand(format!("'{}'", err.0))
    }
}

impl ApiError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
            _ => StatusCode::BAD_REQUEST,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let message = self.to_string();

        tracing::warn!(status = %status, error = %message, "request rejected");

        let body = Json(json!({
            "accepted": false,
            "error": message,
        }));

        (status, body).into_response()
    }
}
