//! RFC 822 / MIME rendering of a queued message.
//!
//! Pure: no I/O, the only randomness is the multipart boundary.

use base64::engine::general_purpose::STANDARD as B64;
use base64::Engine;
use std::collections::BTreeMap;
use uuid::Uuid;

use crate::{
    error::Error,
    models::{
        message::Message,
        request::{Addressee, Personalization, SendRequest},
    },
};

const DEFAULT_TYPE: &str = "text/plain";

// Longest payload that still fits a 75-char encoded word.
const MAX_WORD_BYTES: usize = 45;

/// Render the message as the byte stream handed to SMTP `DATA`.
pub fn encode(msg: &Message) -> Result<Vec<u8>, Error> {
    let req = msg.request()?;
    let p = msg.personalization()?;
    Ok(render(&msg.uid, req, p).into_bytes())
}

fn render(uid: &str, req: &SendRequest, p: &Personalization) -> String {
    let mut out = String::new();
    push_header(&mut out, "From", &addressees_field(std::slice::from_ref(&req.from)));
    for (name, list) in [("To", &p.to), ("Cc", &p.cc), ("Bcc", &p.bcc)] {
        if !list.is_empty() {
            push_header(&mut out, name, &addressees_field(list));
        }
    }
    if let Some(reply_to) = req.reply_to.as_ref().filter(|a| !a.email.is_empty()) {
        push_header(&mut out, "Reply-To", &addressees_field(std::slice::from_ref(reply_to)));
    }
    push_header(&mut out, "Subject", req.effective_subject());
    push_header(&mut out, "Message-Id", &format!("<{uid}>"));

    let mut headers = p.headers.clone();
    match req.content.len() {
        0 => {}
        1 => {
            let c = &req.content[0];
            if !c.mime_type.is_empty() && c.mime_type != DEFAULT_TYPE {
                headers.insert("Content-Type".into(), vec![c.mime_type.clone()]);
            }
            push_custom_headers(&mut out, &headers);
            out.push_str("\r\n");
            out.push_str(&c.value);
        }
        _ => {
            let alternative = alternative_part(req);
            if req.attachments.is_empty() {
                headers.insert(
                    "Content-Type".into(),
                    vec![format!("multipart/alternative; boundary={}", alternative.boundary)],
                );
                push_custom_headers(&mut out, &headers);
                out.push_str("\r\n");
                out.push_str(&alternative.finish());
            } else {
                let mut mixed = MultipartWriter::new();
                headers.insert(
                    "Content-Type".into(),
                    vec![format!("multipart/mixed; boundary={}", mixed.boundary)],
                );
                push_custom_headers(&mut out, &headers);
                out.push_str("\r\n");

                mixed.part(
                    &format!("multipart/alternative; boundary={}", alternative.boundary),
                    &alternative.finish(),
                );
                for a in &req.attachments {
                    mixed.part(or_default(&a.mime_type), &a.content);
                }
                out.push_str(&mixed.finish());
            }
        }
    }
    out
}

fn alternative_part(req: &SendRequest) -> MultipartWriter {
    let mut w = MultipartWriter::new();
    for c in &req.content {
        w.part(or_default(&c.mime_type), &c.value);
    }
    w
}

fn or_default(mime_type: &str) -> &str {
    if mime_type.is_empty() {
        DEFAULT_TYPE
    } else {
        mime_type
    }
}

fn push_header(out: &mut String, name: &str, value: &str) {
    out.push_str(name);
    out.push_str(": ");
    out.push_str(value);
    out.push_str("\r\n");
}

fn push_custom_headers(out: &mut String, headers: &BTreeMap<String, Vec<String>>) {
    for (name, values) in headers {
        for value in values {
            push_header(out, name, value);
        }
    }
}

/// Comma-joined `name <email>` list; bare email when there is no name.
pub fn addressees_field(list: &[Addressee]) -> String {
    list.iter()
        .map(|a| {
            if a.name.is_empty() {
                a.email.clone()
            } else {
                format!("{} <{}>", encode_word(&a.name), a.email)
            }
        })
        .collect::<Vec<_>>()
        .join(", ")
}

/// RFC 2047 `B` encoding, applied only when the text is not plain printable ASCII.
pub fn encode_word(text: &str) -> String {
    let needs_encoding = text
        .chars()
        .any(|c| c != '\t' && !(' '..='~').contains(&c));
    if !needs_encoding {
        return text.to_string();
    }
    let mut words = Vec::new();
    let mut start = 0;
    let mut end = 0;
    for (idx, c) in text.char_indices() {
        let next = idx + c.len_utf8();
        if next - start > MAX_WORD_BYTES {
            words.push(&text[start..end]);
            start = end;
        }
        end = next;
    }
    words.push(&text[start..end]);
    words
        .into_iter()
        .map(|w| format!("=?utf-8?b?{}?=", B64.encode(w)))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Multipart body writer using `--boundary` framing with CRLF line ends.
struct MultipartWriter {
    boundary: String,
    buf: String,
    parts: usize,
}

impl MultipartWriter {
    fn new() -> Self {
        MultipartWriter {
            boundary: Uuid::new_v4().simple().to_string(),
            buf: String::new(),
            parts: 0,
        }
    }

    fn part(&mut self, content_type: &str, body: &str) {
        if self.parts > 0 {
            self.buf.push_str("\r\n");
        }
        self.buf.push_str("--");
        self.buf.push_str(&self.boundary);
        self.buf.push_str("\r\n");
        push_header(&mut self.buf, "Content-Type", content_type);
        self.buf.push_str("\r\n");
        self.buf.push_str(body);
        self.parts += 1;
    }

    fn finish(mut self) -> String {
        if self.parts > 0 {
            self.buf.push_str("\r\n");
        }
        self.buf.push_str("--");
        self.buf.push_str(&self.boundary);
        self.buf.push_str("--\r\n");
        self.buf
    }
}
