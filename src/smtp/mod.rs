//! SMTP hand-off to the local MTA.
//!
//! One plaintext session per message: EHLO, MAIL FROM, RCPT TO per recipient,
//! DATA, QUIT. No TLS and no auth, the peer is on the same host.

use async_trait::async_trait;
use lettre::{
    address::Envelope,
    transport::smtp::{extension::ClientId, AsyncSmtpTransport},
    Address, AsyncTransport, Tokio1Executor,
};
use std::time::Duration;
use tracing::debug;

use crate::error::Error;

/// Submits an already encoded message.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn submit(&self, from: &str, recipients: &[String], data: &[u8]) -> Result<(), Error>;
}

/// Plain SMTP client for the MTA on `host:port`.
#[derive(Debug, Clone)]
pub struct LocalSmtp {
    host: String,
    port: u16,
}

impl LocalSmtp {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        LocalSmtp {
            host: host.into(),
            port,
        }
    }
}

fn parse_address(addr: &str) -> Result<Address, Error> {
    addr.parse::<Address>()
        .map_err(|e| Error::Address(addr.to_string(), e.to_string()))
}

/// Envelope for `from` and `recipients`. An empty sender is the null reverse path.
pub fn build_envelope(from: &str, recipients: &[String]) -> Result<Envelope, Error> {
    let from = if from.is_empty() {
        None
    } else {
        Some(parse_address(from)?)
    };
    let to = recipients
        .iter()
        .map(|r| parse_address(r))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Envelope::new(from, to)?)
}

#[async_trait]
impl Transport for LocalSmtp {
    async fn submit(&self, from: &str, recipients: &[String], data: &[u8]) -> Result<(), Error> {
        let envelope = build_envelope(from, recipients)?;
        let mailer = AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(self.host.as_str())
            .port(self.port)
            .hello_name(ClientId::Domain("localhost".to_string()))
            .timeout(Some(Duration::from_secs(30)))
            .build();
        let response = mailer.send_raw(&envelope, data).await?;
        debug!(
            host = %self.host,
            port = self.port,
            code = %response.code(),
            "smtp accepted"
        );
        Ok(())
    }
}
