//! `{"errors":[{"message":...}]}` body.

use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct ErrorItem {
  pub message: String,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub field: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
  pub errors: Vec<ErrorItem>,
}

impl ErrorResponse {
  pub fn single(message: impl Into<String>) -> Self {
    ErrorResponse {
      errors: vec![ErrorItem {
        message: message.into(),
        field: None,
      }],
    }
  }
}
