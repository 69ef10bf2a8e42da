//! HTTP router, API key check and handlers.

use crate::{app::AppState, error::AppError};
use axum::{
  Json, Router,
  extract::FromRequestParts,
  http::{header, request::Parts},
  routing::{get, post},
};
use serde_json::{Value, json};

pub mod messages;
pub mod send;
pub mod smtplog;

/// Assemble the HTTP router with all routes.
pub fn build_router(state: AppState) -> Router {
  Router::new()
    .route("/", get(version))
    .route("/v3/mail/send", post(send::send_mail))
    .route("/v3/messages", get(messages::search))
    .route("/v3/smtplog", get(smtplog::smtp_log))
    .with_state(state)
}

async fn version() -> Json<Value> {
  Json(json!({ "version": "1" }))
}

/// Caller presented a configured API key as `Authorization: Bearer <key>`.
#[derive(Debug, Clone)]
pub struct ApiKey(pub String);

#[axum::async_trait]
impl FromRequestParts<AppState> for ApiKey {
  type Rejection = AppError;

  async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
    let Some(value) = parts.headers.get(header::AUTHORIZATION) else {
      return Err(AppError::forbidden("no api key given"));
    };
    let value = value.to_str().unwrap_or_default();
    let key = match value.strip_prefix("Bearer") {
      Some(rest) => rest.trim_start_matches(' '),
      None => value,
    };
    if state.config.api_keys.iter().any(|k| k == key) {
      Ok(ApiKey(key.to_string()))
    } else {
      Err(AppError::forbidden("unrecognized api key"))
    }
  }
}
