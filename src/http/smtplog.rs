//! `GET /v3/smtplog?count=N`: tail of the MTA log.

use crate::{app::AppState, error::AppError, http::ApiKey, util::tail_lines};
use axum::{
  Json,
  extract::{Query, State},
};
use serde::Serialize;
use std::collections::HashMap;
use tracing::error;

const DEFAULT_COUNT: usize = 262_144;

#[derive(Debug, Serialize)]
pub struct SmtpLog {
  pub count: usize,
  pub lines: Vec<String>,
}

pub async fn smtp_log(
  State(state): State<AppState>,
  _key: ApiKey,
  Query(params): Query<HashMap<String, String>>,
) -> Result<Json<SmtpLog>, AppError> {
  let count = match params.get("count").map(String::as_str) {
    None | Some("") => DEFAULT_COUNT,
    Some(raw) => match raw.parse::<usize>() {
      Ok(n) if n > 0 => n,
      _ => return Err(AppError::bad_request(format!("invalid count {raw:?}"))),
    },
  };
  let path = &state.config.smtp_log;
  let lines = tail_lines(path, count).await.map_err(|e| {
    error!("cannot read {}: {e}", path.display());
    AppError::bad_request(format!("cannot read {}: {e}", path.display()))
  })?;
  Ok(Json(SmtpLog {
    count: lines.len(),
    lines,
  }))
}
