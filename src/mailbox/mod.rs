//! Bounce mailbox access.
//!
//! `LocalMailbox` drives the system `mail` utility against the service
//! user's spool. The parsing helpers are plain functions so other mailbox
//! sources can reuse them.

use async_trait::async_trait;
use mailparse::{addrparse, parse_headers, MailAddr, MailHeaderMap};
use std::{path::PathBuf, process::Stdio};
use tokio::{io::AsyncWriteExt, process::Command};
use tracing::debug;

use crate::error::Error;

/// Source of returned mail for the bounce monitor.
#[async_trait]
pub trait Mailbox: Send + Sync {
    type Mail: Send;

    async fn has_unread_mail(&self) -> bool;

    /// Raw bytes of the next mail, `None` when the mailbox is empty.
    async fn fetch_mail(&self) -> Result<Option<Vec<u8>>, Error>;

    /// `None` when the data holds no message.
    fn parse_mail(&self, data: &[u8]) -> Result<Option<Self::Mail>, Error>;

    /// Message id of the original mail if this is a non-delivery report.
    fn failed_message_id(&self, mail: &Self::Mail) -> Option<String>;
}

/// A mail read from the local spool: the `From` header and the raw body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalMail {
    pub from: Option<String>,
    pub body: Vec<u8>,
}

const NO_MAIL: &[u8] = b"No mail for";

fn has_no_mail(data: &[u8]) -> bool {
    data.starts_with(NO_MAIL)
}

// `^[A-Za-z0-9-]+:`
fn is_header_line(line: &[u8]) -> bool {
    let name_len = line
        .iter()
        .take_while(|b| b.is_ascii_alphanumeric() || **b == b'-')
        .count();
    name_len > 0 && line.get(name_len) == Some(&b':')
}

/// Parse `mail` output: skip the mailbox summary, then read the RFC 822 headers.
pub fn parse_local_mail(data: &[u8]) -> Result<Option<LocalMail>, Error> {
    if has_no_mail(data) {
        return Ok(None);
    }
    let mut offset = 0;
    let start = loop {
        if offset >= data.len() {
            return Ok(None);
        }
        let rest = &data[offset..];
        if is_header_line(rest) {
            break offset;
        }
        match rest.iter().position(|b| *b == b'\n') {
            Some(nl) => offset += nl + 1,
            None => return Ok(None),
        }
    };
    let message = &data[start..];
    let (headers, body_offset) = parse_headers(message)?;
    Ok(Some(LocalMail {
        from: headers.get_first_value("From"),
        body: message[body_offset..].to_vec(),
    }))
}

fn is_mailer_daemon(from: &str) -> bool {
    let Ok(list) = addrparse(from) else {
        debug!(from, "invalid from address in returned mail");
        return false;
    };
    let Some(MailAddr::Single(info)) = list.iter().next() else {
        return false;
    };
    match info.addr.split_once('@') {
        Some((local, _)) => local.eq_ignore_ascii_case("mailer-daemon"),
        None => false,
    }
}

/// Original `Message-ID` from a mailer-daemon bounce.
///
/// Scans the raw body for the first `Message-ID: <token>` line, which is
/// where the returned original headers sit in a typical report.
pub fn failed_message_id(mail: &LocalMail) -> Option<String> {
    if !is_mailer_daemon(mail.from.as_deref()?) {
        return None;
    }
    mail.body.split(|b| *b == b'\n').find_map(|line| {
        let line = line.strip_suffix(b"\r").unwrap_or(line);
        let line = std::str::from_utf8(line).ok()?;
        let (name, value) = (line.get(..11)?, line.get(11..)?);
        if !name.eq_ignore_ascii_case("message-id:") {
            return None;
        }
        let id = value
            .trim_start_matches([' ', '\t'])
            .strip_prefix('<')?
            .strip_suffix('>')?;
        if id.is_empty() || id.chars().any(char::is_whitespace) {
            return None;
        }
        Some(id.to_string())
    })
}

/// The `mail` utility on this host.
#[derive(Debug, Clone)]
pub struct LocalMailbox {
    command: PathBuf,
}

impl LocalMailbox {
    pub fn new(command: impl Into<PathBuf>) -> Self {
        LocalMailbox {
            command: command.into(),
        }
    }
}

#[async_trait]
impl Mailbox for LocalMailbox {
    type Mail = LocalMail;

    async fn has_unread_mail(&self) -> bool {
        Command::new(&self.command)
            .arg("-e")
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await
            .map(|s| s.success())
            .unwrap_or(false)
    }

    async fn fetch_mail(&self) -> Result<Option<Vec<u8>>, Error> {
        let mut child = Command::new(&self.command)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()?;
        if let Some(mut stdin) = child.stdin.take() {
            stdin.write_all(b"type 1").await?;
            stdin.shutdown().await?;
        }
        let output = child.wait_with_output().await?;
        if has_no_mail(&output.stdout) || has_no_mail(&output.stderr) {
            return Ok(None);
        }
        if !output.status.success() {
            return Err(Error::Mailbox(std::io::Error::other(format!(
                "{} exited with {}",
                self.command.display(),
                output.status
            ))));
        }
        Ok(Some(output.stdout))
    }

    fn parse_mail(&self, data: &[u8]) -> Result<Option<LocalMail>, Error> {
        parse_local_mail(data)
    }

    fn failed_message_id(&self, mail: &LocalMail) -> Option<String> {
        failed_message_id(mail)
    }
}
