use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use sea_orm::DbErr;
use serde_json::json;

use crate::broker::Disposition;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("Invalid configuration {0}")]
    InvalidConfig(#[from] figment::Error),
    #[error("Database error: {0}")]
    DbError(#[from] DbErr),
    #[error("Broker error: {0}")]
    BrokerError(#[from] redis::RedisError),
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Serialization error: {0}")]
    SerdeError(#[from] serde_json::Error),
    #[error("HTTP client error: {0}")]
    HttpError(#[from] reqwest::Error),
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
    #[error("API error: {0}")]
    ApiError(#[from] ApiError),
    #[error("Custom error: {0}")]
    Custom(String),
}

// Connection-level transaction failures unwrap to the underlying error so
// callers can still match on `Error::DbError`.
impl From<sea_orm::TransactionError<Error>> for Error {
    fn from(e: sea_orm::TransactionError<Error>) -> Self {
        match e {
            sea_orm::TransactionError::Connection(e) => Error::DbError(e),
            sea_orm::TransactionError::Transaction(e) => e,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[derive(thiserror::Error, Debug)]
pub enum ApiError {
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
    #[error("{0} not found")]
    NotFound(String),
    #[error("Internal server error")]
    InternalServerError,
}

pub type ApiResult<T> = std::result::Result<T, ApiError>;

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::InternalServerError => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

/// Failures while handling a relayed delivery. The variant decides how the
/// delivery is settled on the queue.
#[derive(thiserror::Error, Debug)]
pub enum RelayError {
    #[error("Downstream call timed out: {0}")]
    Timeout(reqwest::Error),
    #[error("Malformed message payload: {0}")]
    MalformedPayload(#[from] serde_json::Error),
    #[error("Missing 'endpoint' in message")]
    MissingEndpoint,
    #[error("Unsupported method verb: {0}")]
    InvalidMethod(String),
    #[error("Unexpected relay error: {0}")]
    Unexpected(String),
}

impl RelayError {
    /// Timeouts are transient and go back on the queue; everything else is
    /// permanent and dropped.
    pub fn disposition(&self) -> Disposition {
        match self {
            RelayError::Timeout(_) => Disposition::Requeue,
            RelayError::MalformedPayload(_)
            | RelayError::MissingEndpoint
            | RelayError::InvalidMethod(_)
            | RelayError::Unexpected(_) => Disposition::Drop,
        }
    }
}
