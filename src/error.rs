//! Error types shared by the store, workers and HTTP layer.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use tracing::error;

use crate::{models::response::ErrorResponse, query::QuerySyntaxError};

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("database error: {0}")]
    Db(#[from] sqlx::Error),
    #[error("malformed message packet: {0}")]
    Packet(#[from] serde_json::Error),
    #[error("message {0} has no body")]
    MissingBody(String),
    #[error("message {0} has no personalization")]
    NoPersonalization(String),
    #[error("invalid address {0:?}: {1}")]
    Address(String, String),
    #[error("invalid envelope: {0}")]
    Envelope(#[from] lettre::error::Error),
    #[error("smtp error: {0}")]
    Smtp(#[from] lettre::transport::smtp::Error),
    #[error("mailbox error: {0}")]
    Mailbox(#[from] std::io::Error),
    #[error("mail parse error: {0}")]
    MailParse(#[from] mailparse::MailParseError),
    #[error("{0}; {1}")]
    Combined(Box<Error>, Box<Error>),
}

impl Error {
    /// Join a secondary failure onto this one.
    pub fn and(self, other: Error) -> Error {
        Error::Combined(Box::new(self), Box::new(other))
    }
}

/// Error returned to HTTP callers.
///
/// `message` is what the client sees; `internal` keeps the cause for the log.
#[derive(Debug)]
pub struct AppError {
    pub code: StatusCode,
    pub message: String,
    pub internal: Option<Error>,
}

impl AppError {
    pub fn new(code: StatusCode, message: impl Into<String>) -> Self {
        AppError {
            code,
            message: message.into(),
            internal: None,
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        AppError::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        AppError::new(StatusCode::FORBIDDEN, message)
    }

    /// Wrap a library failure. Details stay server side.
    pub fn internal(err: impl Into<Error>) -> Self {
        let err = err.into();
        AppError {
            code: StatusCode::INTERNAL_SERVER_ERROR,
            message: err.to_string(),
            internal: Some(err),
        }
    }
}

impl std::fmt::Display for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.code.as_u16(), self.message)
    }
}

impl From<Error> for AppError {
    fn from(err: Error) -> Self {
        AppError::internal(err)
    }
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        AppError::internal(err)
    }
}

impl From<QuerySyntaxError> for AppError {
    fn from(err: QuerySyntaxError) -> Self {
        AppError::new(err.code(), err.to_string())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let message = if self.code.is_server_error() {
            match &self.internal {
                Some(cause) => error!(code = self.code.as_u16(), "{cause}"),
                None => error!(code = self.code.as_u16(), "{}", self.message),
            }
            "internal server error".to_string()
        } else {
            self.message
        };
        (self.code, Json(ErrorResponse::single(message))).into_response()
    }
}
