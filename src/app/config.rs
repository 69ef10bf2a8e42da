//! Service configuration.
//!
//! JSON from `MAILSENDER_CONFIG`, then a few per-key environment overrides.

use serde::Deserialize;
use std::path::PathBuf;

pub const CONFIG_ENV: &str = "MAILSENDER_CONFIG";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
  #[error("invalid config format: {0}")]
  Format(#[from] serde_json::Error),
  #[error("invalid value for {name}: {value:?}")]
  Override { name: &'static str, value: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct Config {
  pub api_keys: Vec<String>,
  pub mydomain: String,
  pub host: String,
  pub port: u16,
  pub database: String,
  pub smtp_host: String,
  pub smtp_port: u16,
  pub smtp_log: PathBuf,
  pub mail_command: PathBuf,
}

impl Default for Config {
  fn default() -> Self {
    Config {
      api_keys: Vec::new(),
      mydomain: "local".into(),
      host: "0.0.0.0".into(),
      port: 8333,
      database: "sqlite://mailsender.db".into(),
      smtp_host: "localhost".into(),
      smtp_port: 25,
      smtp_log: PathBuf::from("/var/log/mail.log"),
      mail_command: PathBuf::from("/usr/bin/mail"),
    }
  }
}

impl Config {
  /// Parse a JSON document; blank input yields the defaults.
  pub fn parse(json: &str) -> Result<Config, ConfigError> {
    if json.trim().is_empty() {
      return Ok(Config::default());
    }
    Ok(serde_json::from_str(json)?)
  }

  /// Read `MAILSENDER_CONFIG` and apply the environment overrides.
  pub fn from_env() -> Result<Config, ConfigError> {
    let json = std::env::var(CONFIG_ENV).unwrap_or_default();
    let mut config = Config::parse(&json)?;
    config.apply_overrides(|name| std::env::var(name).ok())?;
    Ok(config)
  }

  /// Apply overrides from `lookup`, which maps a variable name to its value.
  pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
  where
    F: Fn(&str) -> Option<String>,
  {
    if let Some(v) = lookup("MAILSENDER_DATABASE") {
      self.database = v;
    }
    if let Some(v) = lookup("MAILSENDER_HOST") {
      self.host = v;
    }
    if let Some(v) = lookup("MAILSENDER_PORT") {
      self.port = parse_port("MAILSENDER_PORT", v)?;
    }
    if let Some(v) = lookup("MAILSENDER_SMTP_PORT") {
      self.smtp_port = parse_port("MAILSENDER_SMTP_PORT", v)?;
    }
    Ok(())
  }

  pub fn listen_addr(&self) -> String {
    format!("{}:{}", self.host, self.port)
  }
}

fn parse_port(name: &'static str, value: String) -> Result<u16, ConfigError> {
  value
    .trim()
    .parse()
    .map_err(|_| ConfigError::Override { name, value })
}
