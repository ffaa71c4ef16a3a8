use crate::db::errors::DbError;
use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error as ThisError;

#[derive(ThisError, Debug)]
pub enum Error {
    /// No valid session accompanied the request
    #[error("Unauthorized")]
    Unauthorized,

    /// The caller's subscription plan does not allow another stored file
    #[error("Requires Higher plan")]
    QuotaExceeded,

    /// The upload request carried no `file` part
    #[error("No file uploaded")]
    NoFile,

    /// Invalid request data or business rule violation
    #[error("{message}")]
    BadRequest { message: String },

    /// Requested resource not found
    #[error("{resource} with ID {id} not found")]
    NotFound { resource: String, id: String },

    /// Request body exceeded the configured limit
    #[error("{message}")]
    PayloadTooLarge { message: String },

    /// A blob store or LLM provider call failed
    #[error("Failed to {operation}: {message}")]
    Upstream { operation: String, message: String },

    /// Generic internal service error
    #[error("Failed to {operation}")]
    Internal { operation: String },

    /// Database operation error
    #[error(transparent)]
    Database(#[from] DbError),

    /// Unexpected error with full context chain
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl Error {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Error::Unauthorized => StatusCode::FORBIDDEN,
            Error::QuotaExceeded => StatusCode::PAYMENT_REQUIRED,
            Error::NoFile | Error::BadRequest { .. } => StatusCode::BAD_REQUEST,
            Error::NotFound { .. } => StatusCode::NOT_FOUND,
            Error::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            Error::Upstream { .. } | Error::Internal { .. } | Error::Database(_) | Error::Other(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        match &self {
            Error::Upstream { .. } | Error::Internal { .. } | Error::Database(_) | Error::Other(_) => {
                tracing::error!("Internal service error: {:#}", self);
            }
            Error::Unauthorized | Error::QuotaExceeded => {
                tracing::info!("Request rejected: {}", self);
            }
            Error::NoFile | Error::BadRequest { .. } | Error::NotFound { .. } | Error::PayloadTooLarge { .. } => {
                tracing::debug!("Client error: {}", self);
            }
        }

        let status = self.status_code();

        // Body shapes follow the public upload API: some errors are JSON objects, the rest
        // plain text
        match self {
            Error::QuotaExceeded | Error::NoFile => (status, Json(json!({ "error": self.to_string() }))).into_response(),
            Error::Upstream { .. } | Error::Internal { .. } | Error::Database(_) | Error::Other(_) => {
                (status, Json(json!({ "error": "Internal Server Error" }))).into_response()
            }
            _ => (status, self.to_string()).into_response(),
        }
    }
}

/// Type alias for service operation results
pub type Result<T> = std::result::Result<T, Error>;
