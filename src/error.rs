use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// Failures that end an operation before a reply can be produced.
///
/// Read and decode problems are not represented here: the client and the decoder log them
/// and carry on with whatever they managed to collect.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// Missing or invalid input. The scanner is never contacted.
    #[error("{0}")]
    Caller(String),

    #[error("connection to snf-server at {addr} failed: {reason}")]
    Connect { addr: String, reason: String },

    #[error("write to snf-server failed: {0}")]
    Write(String),

    #[error("failed to store upload: {0}")]
    BlobStore(String),
}

impl GatewayError {
    pub fn caller(msg: impl Into<String>) -> Self {
        GatewayError::Caller(msg.into())
    }

    pub fn status(&self) -> StatusCode {
        match self {
            GatewayError::Connect { .. } | GatewayError::Write(_) => StatusCode::BAD_GATEWAY,
            GatewayError::Caller(_) | GatewayError::BlobStore(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

pub type Result<T> = std::result::Result<T, GatewayError>;

/// JSON body shared by every error the HTTP layer emits.
pub fn error_body(msg: impl Into<String>) -> Json<serde_json::Value> {
    Json(json!({ "level": "error", "msg": msg.into() }))
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        (self.status(), error_body(self.to_string())).into_response()
    }
}
