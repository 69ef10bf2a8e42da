//! Search results for `GET /v3/messages`.

use crate::models::message::{db_message::SummaryRow, status_name};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchResultItem {
  pub from_email: String,
  pub msg_id: String,
  pub subject: String,
  pub to_email: String,
  pub status: String,
  pub last_timestamp: i64,
}

impl From<SummaryRow> for SearchResultItem {
  fn from(r: SummaryRow) -> Self {
    // first receiver only, delimiters stripped
    let receivers = r.receivers.replace('\x01', "");
    let to_email = receivers.split(',').next().unwrap_or_default().to_string();
    SearchResultItem {
      from_email: r.sender,
      msg_id: r.uid,
      subject: r.subject,
      to_email,
      status: status_name(r.status).to_string(),
      last_timestamp: r.last_update,
    }
  }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SearchResult {
  pub messages: Vec<SearchResultItem>,
}
