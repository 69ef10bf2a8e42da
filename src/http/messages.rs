//! `GET /v3/messages?query=...&limit=...`.

use crate::{
  app::AppState,
  error::AppError,
  http::ApiKey,
  models::response::SearchResult,
  query::parse_query,
  store,
};
use axum::{
  Json,
  extract::{Query, State},
};
use std::collections::HashMap;
use tracing::{debug, info};

const DEFAULT_LIMIT: i64 = 10;

pub async fn search(
  State(state): State<AppState>,
  _key: ApiKey,
  Query(params): Query<HashMap<String, String>>,
) -> Result<Json<SearchResult>, AppError> {
  let q = params.get("query").map(String::as_str).unwrap_or_default();
  let lim = params.get("limit").map(String::as_str).unwrap_or_default();
  info!(query = q, limit = lim, "got messages request");

  let criteria = parse_query(q)?;
  let limit = if lim.is_empty() {
    DEFAULT_LIMIT
  } else {
    lim
      .parse::<i64>()
      .map_err(|e| AppError::bad_request(format!("invalid limit {lim:?}: {e}")))?
  };
  debug!(?criteria, limit, "query parsed");

  let messages = store::search_messages(&state.db, &criteria, limit).await?;
  Ok(Json(SearchResult { messages }))
}
