//! HTTP-facing error type. Wraps the core crate's error taxonomy and maps
//! each variant to a status code, the way the teacher's server maps its own
//! database/validation errors to HTTP responses.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error(transparent)]
    Core(#[from] wikisurge_core::WikiSurgeError),

    #[error("invalid request: {0}")]
    BadRequest(String),

    #[error("not found")]
    NotFound,

    #[error(transparent)]
    Config(#[from] anyhow::Error),
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let status = match &self {
            ServerError::Core(wikisurge_core::WikiSurgeError::Store(_)) => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            ServerError::Core(wikisurge_core::WikiSurgeError::Config(_)) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            ServerError::Core(wikisurge_core::WikiSurgeError::Cancelled(_)) => {
                StatusCode::REQUEST_TIMEOUT
            }
            ServerError::Core(_) => StatusCode::BAD_GATEWAY,
            ServerError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ServerError::NotFound => StatusCode::NOT_FOUND,
            ServerError::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let body = Json(json!({ "error": self.to_string() }));
        (status, body).into_response()
    }
}
