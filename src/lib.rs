//! mailsender library entrypoint.
//!
//! Modules:
//! - `app`: startup, configuration, shared state, worker lifecycle
//! - `http`: Axum router and handlers for the `/v3` API
//! - `query`: filter expressions for message search
//! - `store`: SQLite-backed queue and body store
//! - `encoder`: RFC 822 / MIME rendering
//! - `smtp`: hand-off to the local MTA
//! - `sender`: queue draining worker
//! - `mailbox`, `monitor`: bounce detection
//! - `db`: connection and migrations
//! - `models`: typed records used across layers
//! - `util`: tracing and log tailing

pub mod app;
pub mod db;
pub mod encoder;
pub mod error;
pub mod http;
pub mod mailbox;
pub mod models;
pub mod monitor;
pub mod query;
pub mod sender;
pub mod smtp;
pub mod store;
pub mod util;

pub use error::{AppError, Error};
