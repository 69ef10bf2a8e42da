//! Queued message and its lifecycle status.

pub mod db_message;

use crate::{
  error::Error,
  models::request::{Personalization, SendRequest},
};

/// Lifecycle state stored as an integer code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageStatus {
  Waiting = 0,
  Processing = 1,
  Sent = 2,
  Abandoned = 3,
}

impl MessageStatus {
  pub fn code(self) -> i64 {
    self as i64
  }

  pub fn name(self) -> &'static str {
    match self {
      MessageStatus::Waiting => "waiting",
      MessageStatus::Processing => "processing",
      MessageStatus::Sent => "sent",
      MessageStatus::Abandoned => "abandoned",
    }
  }

  pub fn from_code(code: i64) -> Option<Self> {
    match code {
      0 => Some(MessageStatus::Waiting),
      1 => Some(MessageStatus::Processing),
      2 => Some(MessageStatus::Sent),
      3 => Some(MessageStatus::Abandoned),
      _ => None,
    }
  }

  pub fn from_name(name: &str) -> Option<Self> {
    match name {
      "waiting" => Some(MessageStatus::Waiting),
      "processing" => Some(MessageStatus::Processing),
      "sent" => Some(MessageStatus::Sent),
      "abandoned" => Some(MessageStatus::Abandoned),
      _ => None,
    }
  }
}

/// Name for a stored status code, `unknown` when out of range.
pub fn status_name(code: i64) -> &'static str {
  MessageStatus::from_code(code)
    .map(MessageStatus::name)
    .unwrap_or("unknown")
}

/// A message row with its body resolved, if the body still exists.
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
  pub uid: String,
  pub request: Option<SendRequest>,
  pub status: i64,
  pub last_update: i64,
}

impl Message {
  pub fn request(&self) -> Result<&SendRequest, Error> {
    self
      .request
      .as_ref()
      .ok_or_else(|| Error::MissingBody(self.uid.clone()))
  }

  pub fn personalization(&self) -> Result<&Personalization, Error> {
    self
      .request()?
      .personalizations
      .first()
      .ok_or_else(|| Error::NoPersonalization(self.uid.clone()))
  }

  /// Envelope recipients: to, cc, then bcc.
  pub fn recipients(&self) -> Result<Vec<String>, Error> {
    let p = self.personalization()?;
    Ok(
      p.to
        .iter()
        .chain(&p.cc)
        .chain(&p.bcc)
        .filter(|a| !a.email.is_empty())
        .map(|a| a.email.clone())
        .collect(),
    )
  }
}
