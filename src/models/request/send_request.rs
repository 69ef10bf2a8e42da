//! `POST /v3/mail/send` payload, also the stored body packet.

use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Addressee {
  pub email: String,
  pub name: String,
}

impl Addressee {
  pub fn new(email: impl Into<String>) -> Self {
    Addressee {
      email: email.into(),
      name: String::new(),
    }
  }

  pub fn named(email: impl Into<String>, name: impl Into<String>) -> Self {
    Addressee {
      email: email.into(),
      name: name.into(),
    }
  }
}

/// One recipient set. Each personalization becomes its own message.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Personalization {
  #[serde(deserialize_with = "null_as_default")]
  pub to: Vec<Addressee>,
  #[serde(deserialize_with = "null_as_default")]
  pub cc: Vec<Addressee>,
  #[serde(deserialize_with = "null_as_default")]
  pub bcc: Vec<Addressee>,
  pub subject: String,
  #[serde(deserialize_with = "header_values")]
  pub headers: BTreeMap<String, Vec<String>>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Content {
  #[serde(rename = "type")]
  pub mime_type: String,
  pub value: String,
}

impl Content {
  pub fn new(mime_type: impl Into<String>, value: impl Into<String>) -> Self {
    Content {
      mime_type: mime_type.into(),
      value: value.into(),
    }
  }
}

/// Attachment as submitted. `content` is already base64 and goes out verbatim.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Attachment {
  pub content: String,
  #[serde(rename = "type")]
  pub mime_type: String,
  pub filename: String,
  pub disposition: String,
  pub content_id: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SendRequest {
  #[serde(deserialize_with = "null_as_default")]
  pub personalizations: Vec<Personalization>,
  #[serde(deserialize_with = "null_as_default")]
  pub from: Addressee,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub reply_to: Option<Addressee>,
  pub subject: String,
  #[serde(deserialize_with = "null_as_default")]
  pub content: Vec<Content>,
  #[serde(deserialize_with = "null_as_default")]
  pub attachments: Vec<Attachment>,
}

impl SendRequest {
  /// Split into one request per personalization, sharing everything else.
  pub fn expand(&self) -> Vec<SendRequest> {
    self
      .personalizations
      .iter()
      .map(|p| SendRequest {
        personalizations: vec![p.clone()],
        ..self.clone()
      })
      .collect()
  }

  /// Personalization subject, falling back to the request subject.
  pub fn effective_subject(&self) -> &str {
    match self.personalizations.first() {
      Some(p) if !p.subject.is_empty() => &p.subject,
      _ => &self.subject,
    }
  }

  /// `\x01addr\x01` for every non-empty to/cc/bcc address, comma-joined.
  ///
  /// The delimiters keep a substring search from matching across two
  /// neighbouring addresses.
  pub fn receiver_emails(&self) -> String {
    let Some(p) = self.personalizations.first() else {
      return String::new();
    };
    p.to
      .iter()
      .chain(&p.cc)
      .chain(&p.bcc)
      .filter(|a| !a.email.is_empty())
      .map(|a| format!("\x01{}\x01", a.email))
      .collect::<Vec<_>>()
      .join(",")
  }
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
  D: Deserializer<'de>,
  T: Default + Deserialize<'de>,
{
  Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

#[derive(Deserialize)]
#[serde(untagged)]
enum HeaderValue {
  One(String),
  Many(Vec<String>),
}

// Accept both `{"X-Tag": "a"}` and `{"X-Tag": ["a", "b"]}`.
fn header_values<'de, D>(deserializer: D) -> Result<BTreeMap<String, Vec<String>>, D::Error>
where
  D: Deserializer<'de>,
{
  let raw: Option<BTreeMap<String, HeaderValue>> = Option::deserialize(deserializer)?;
  Ok(
    raw
      .unwrap_or_default()
      .into_iter()
      .map(|(k, v)| match v {
        HeaderValue::One(s) => (k, vec![s]),
        HeaderValue::Many(list) => (k, list),
      })
      .collect(),
  )
}
