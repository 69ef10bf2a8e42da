//! Shared fixtures: throwaway database, sample requests, an in-process SMTP
//! sink and scripted mailboxes.
#![allow(dead_code)]

use async_trait::async_trait;
use mailsender::{
    db,
    error::Error,
    mailbox::{self, LocalMail, Mailbox},
    models::request::{Addressee, Attachment, Content, Personalization, SendRequest},
};
use sqlx::SqlitePool;
use std::{
    collections::VecDeque,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex,
    },
};
use tempfile::TempDir;
use tokio::{
    io::{AsyncBufReadExt, AsyncWriteExt, BufReader},
    net::{TcpListener, TcpStream},
    task::JoinHandle,
};

/// SQLite file in a temporary directory, removed on drop.
pub struct TestDb {
    _dir: TempDir,
    pub url: String,
    pub pool: SqlitePool,
}

impl TestDb {
    pub async fn new() -> Self {
        let dir = tempfile::tempdir().expect("tempdir");
        let url = format!("sqlite://{}", dir.path().join("mailsender.db").display());
        let pool = db::connect(&url).await.expect("connect sqlite");
        db::run_migrations(&pool).await.expect("migrate");
        TestDb {
            _dir: dir,
            url,
            pool,
        }
    }

    pub async fn count(&self, table: &str) -> i64 {
        let (n,): (i64,) = sqlx::query_as(&format!("SELECT COUNT(*) FROM {table}"))
            .fetch_one(&self.pool)
            .await
            .unwrap();
        n
    }

    pub async fn status_of(&self, uid: &str) -> (i64, Option<String>) {
        sqlx::query_as("SELECT status, last_error FROM messages WHERE uid = ?")
            .bind(uid)
            .fetch_one(&self.pool)
            .await
            .unwrap()
    }
}

fn foo_cc_bar() -> Personalization {
    Personalization {
        to: vec![Addressee::new("foo@example.com")],
        cc: vec![Addressee::new("bar@example.com")],
        ..Default::default()
    }
}

pub fn sample_send_request(n: usize) -> SendRequest {
    let base = SendRequest {
        personalizations: vec![foo_cc_bar()],
        subject: "test mail".into(),
        from: Addressee::new("admin@example.com"),
        content: vec![Content::new("text/plain", "This is a test mail body")],
        ..Default::default()
    };
    match n {
        1 => SendRequest {
            personalizations: vec![
                foo_cc_bar(),
                Personalization {
                    to: vec![Addressee::new("baz@example.com"), Addressee::new("ar@example.com")],
                    ..Default::default()
                },
            ],
            subject: "[URGENT] change your password".into(),
            ..base
        },
        2 => SendRequest {
            content: vec![Content::new("text/html", "<H1>Hello</H1>")],
            ..base
        },
        3 => SendRequest {
            content: vec![
                Content::new("text/html", "<H1>Hello</H1>"),
                Content::new("text/text", "hello"),
            ],
            ..base
        },
        4 => SendRequest {
            content: vec![
                Content::new("text/plain", "Please see the attachments"),
                Content::new("text/html", "<p>Please see the attachments</p>"),
            ],
            attachments: vec![
                Attachment {
                    content: "iVBORw0KGgoAAAANSUhEUgAAAAEAAAABCAYAAAAfFcSJAAAADUlEQVR42mNk+P+/HgAFhAJ/wlseKgAAAABJRU5ErkJggg==".into(),
                    mime_type: "image/png".into(),
                    ..Default::default()
                },
                Attachment {
                    content: "R0lGODlhAQABAIAAAP///wAAACH5BAEAAAAALAAAAAABAAEAAAICRAEAOw==".into(),
                    mime_type: "image/gif".into(),
                    ..Default::default()
                },
            ],
            ..base
        },
        _ => base,
    }
}

/// Drop the `Message-Id` header line.
pub fn remove_message_id(text: &str) -> String {
    text.split_inclusive('\n')
        .filter(|line| !line.starts_with("Message-Id: <"))
        .collect()
}

/// Blank out every multipart boundary announced in a `Content-Type` header.
pub fn remove_boundaries(text: &str) -> String {
    let mut out = text.to_string();
    let marker = "; boundary=";
    let mut boundaries = Vec::new();
    for line in text.lines() {
        if line.starts_with("Content-Type: multipart/") {
            if let Some((_, b)) = line.split_once(marker) {
                let b = b.trim_end_matches('\r');
                if !b.is_empty() {
                    boundaries.push(b.to_string());
                }
            }
        }
    }
    for b in boundaries {
        out = out.replace(&b, "");
    }
    out
}

/// One accepted SMTP transaction.
#[derive(Debug, Clone)]
pub struct Envelope {
    pub from: String,
    pub rcpts: Vec<String>,
    pub data: String,
}

/// Minimal SMTP server recording what it receives.
pub struct SmtpSink {
    pub port: u16,
    pub received: Arc<Mutex<Vec<Envelope>>>,
    fail: Arc<AtomicBool>,
    handle: JoinHandle<()>,
}

impl SmtpSink {
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let received = Arc::new(Mutex::new(Vec::new()));
        let fail = Arc::new(AtomicBool::new(false));
        let (r, f) = (received.clone(), fail.clone());
        let handle = tokio::spawn(async move {
            loop {
                let Ok((stream, _)) = listener.accept().await else {
                    break;
                };
                let (r, f) = (r.clone(), f.clone());
                tokio::spawn(async move {
                    let _ = handle_client(stream, r, f).await;
                });
            }
        });
        SmtpSink {
            port,
            received,
            fail,
            handle,
        }
    }

    /// Reject every message at end of DATA.
    pub fn fail_deliveries(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub fn received(&self) -> Vec<Envelope> {
        self.received.lock().unwrap().clone()
    }
}

impl Drop for SmtpSink {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

fn path_arg(line: &str, prefix_len: usize) -> String {
    line[prefix_len..]
        .trim()
        .split_whitespace()
        .next()
        .unwrap_or("")
        .trim_matches(['<', '>'])
        .to_string()
}

async fn handle_client(
    stream: TcpStream,
    received: Arc<Mutex<Vec<Envelope>>>,
    fail: Arc<AtomicBool>,
) -> std::io::Result<()> {
    let (read_half, mut writer) = stream.into_split();
    let mut reader = BufReader::new(read_half);
    writer.write_all(b"220 sink ESMTP\r\n").await?;

    let mut mail_from = String::new();
    let mut rcpts: Vec<String> = Vec::new();
    let mut buf = String::new();
    loop {
        buf.clear();
        if reader.read_line(&mut buf).await? == 0 {
            break;
        }
        let line = buf.trim_end_matches(['\r', '\n']).to_string();
        let upper = line.to_uppercase();

        if upper.starts_with("EHLO") || upper.starts_with("HELO") {
            writer.write_all(b"250-sink\r\n250 OK\r\n").await?;
        } else if upper.starts_with("MAIL FROM:") {
            mail_from = path_arg(&line, 10);
            rcpts.clear();
            writer.write_all(b"250 OK\r\n").await?;
        } else if upper.starts_with("RCPT TO:") {
            rcpts.push(path_arg(&line, 8));
            writer.write_all(b"250 Accepted\r\n").await?;
        } else if upper == "DATA" {
            writer
                .write_all(b"354 End data with <CR><LF>.<CR><LF>\r\n")
                .await?;
            let mut data = String::new();
            loop {
                let mut l = String::new();
                if reader.read_line(&mut l).await? == 0 {
                    break;
                }
                if l == ".\r\n" || l == ".\n" {
                    break;
                }
                match l.strip_prefix('.') {
                    Some(unstuffed) => data.push_str(unstuffed),
                    None => data.push_str(&l),
                }
            }
            received.lock().unwrap().push(Envelope {
                from: mail_from.clone(),
                rcpts: rcpts.clone(),
                data,
            });
            if fail.load(Ordering::SeqCst) {
                writer.write_all(b"554 simulated smtp error\r\n").await?;
            } else {
                writer.write_all(b"250 OK queued\r\n").await?;
            }
        } else if upper == "RSET" || upper == "NOOP" {
            writer.write_all(b"250 OK\r\n").await?;
        } else if upper == "QUIT" {
            writer.write_all(b"221 Bye\r\n").await?;
            break;
        } else {
            writer.write_all(b"502 Command not implemented\r\n").await?;
        }
    }
    Ok(())
}

/// How a `StubMailbox` answers each call.
#[derive(Debug, Clone)]
pub enum Fetch {
    Fail,
    Empty,
    Data(Vec<u8>),
}

#[derive(Debug, Clone)]
pub enum Parse {
    Fail,
    Empty,
    Mail(LocalMail),
}

/// Mailbox answering every call from a fixed script.
#[derive(Debug, Clone)]
pub struct StubMailbox {
    pub unread: bool,
    pub fetch: Fetch,
    pub parse: Parse,
    pub msgid: Option<String>,
}

impl StubMailbox {
    /// A mailbox holding one bounce for `msgid`.
    pub fn bounce(msgid: Option<&str>) -> Self {
        StubMailbox {
            unread: true,
            fetch: Fetch::Data(b"raw".to_vec()),
            parse: Parse::Mail(LocalMail {
                from: Some("mailer-daemon@localhost".into()),
                body: Vec::new(),
            }),
            msgid: msgid.map(str::to_string),
        }
    }
}

fn stub_error(what: &str) -> Error {
    Error::Mailbox(std::io::Error::other(format!("simulated {what} failure")))
}

#[async_trait]
impl Mailbox for StubMailbox {
    type Mail = LocalMail;

    async fn has_unread_mail(&self) -> bool {
        self.unread
    }

    async fn fetch_mail(&self) -> Result<Option<Vec<u8>>, Error> {
        match &self.fetch {
            Fetch::Fail => Err(stub_error("fetch")),
            Fetch::Empty => Ok(None),
            Fetch::Data(d) => Ok(Some(d.clone())),
        }
    }

    fn parse_mail(&self, _data: &[u8]) -> Result<Option<LocalMail>, Error> {
        match &self.parse {
            Parse::Fail => Err(stub_error("parse")),
            Parse::Empty => Ok(None),
            Parse::Mail(m) => Ok(Some(m.clone())),
        }
    }

    fn failed_message_id(&self, _mail: &LocalMail) -> Option<String> {
        self.msgid.clone()
    }
}

/// Mailbox fed with raw spool output, parsed the same way as the local spool.
#[derive(Debug, Clone, Default)]
pub struct ScriptedMailbox {
    queue: Arc<Mutex<VecDeque<Vec<u8>>>>,
}

impl ScriptedMailbox {
    pub fn push(&self, raw: impl Into<Vec<u8>>) {
        self.queue.lock().unwrap().push_back(raw.into());
    }

    pub fn pending(&self) -> usize {
        self.queue.lock().unwrap().len()
    }
}

#[async_trait]
impl Mailbox for ScriptedMailbox {
    type Mail = LocalMail;

    async fn has_unread_mail(&self) -> bool {
        self.pending() > 0
    }

    async fn fetch_mail(&self) -> Result<Option<Vec<u8>>, Error> {
        Ok(self.queue.lock().unwrap().pop_front())
    }

    fn parse_mail(&self, data: &[u8]) -> Result<Option<LocalMail>, Error> {
        mailbox::parse_local_mail(data)
    }

    fn failed_message_id(&self, mail: &LocalMail) -> Option<String> {
        mailbox::failed_message_id(mail)
    }
}

/// Spool output for a mailer-daemon report that returns `original`.
pub fn bounce_report(original: &str) -> String {
    format!(
        concat!(
            "\"/var/mail/mailsender\": 1 message 1 new\n",
            ">N   1 Mail Delivery System Fri Sep 12 10:00  40/1500  Undelivered\n",
            "Return-Path: <>\r\n",
            "From: <mailer-daemon@localmail>\r\n",
            "To: <mailsender>\r\n",
            "Subject: Delivery Status Notification (Failure)\r\n",
            "Content-Type: multipart/report; boundary=\"boundary\"\r\n",
            "\r\n",
            "--boundary\r\n",
            "Content-Type: text/plain\r\n",
            "\r\n",
            "Message not delivered.\r\n",
            "--boundary\r\n",
            "Content-Type: message/rfc822\r\n",
            "\r\n",
            "{}",
            "--boundary--\r\n",
        ),
        original
    )
}
