//! `POST /v3/mail/send`.

use crate::{app::AppState, error::AppError, http::ApiKey, models::request::SendRequest, store};
use axum::{body::Bytes, extract::State, http::StatusCode};
use tracing::info;

pub async fn send_mail(
  State(state): State<AppState>,
  _key: ApiKey,
  body: Bytes,
) -> Result<StatusCode, AppError> {
  let req: SendRequest =
    serde_json::from_slice(&body).map_err(|e| AppError::bad_request(e.to_string()))?;
  if req.personalizations.is_empty() {
    return Err(AppError::bad_request("at least one personalization is required"));
  }
  info!(
    from = %req.from.email,
    personalizations = req.personalizations.len(),
    "got mail/send request"
  );
  store::enqueue(&state.db, &state.config.mydomain, &req).await?;
  Ok(StatusCode::ACCEPTED)
}
