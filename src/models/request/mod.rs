//! Inbound request bodies.

pub mod send_request;

pub use send_request::{Addressee, Attachment, Content, Personalization, SendRequest};
