//! Database rows for messages and bodies.

use sqlx::FromRow;

/// Row returned by the claim statement.
#[derive(Debug, FromRow)]
pub struct ClaimedRow {
    pub uid: String,
    pub bid: String,
    pub status: i64,
    pub last_update: i64,
}

/// Message joined with its (possibly purged) body.
#[derive(Debug, FromRow)]
pub struct MessageRow {
    pub uid: String,
    pub packet: Option<String>,
    pub status: i64,
    pub last_update: i64,
}

/// Search projection.
#[derive(Debug, FromRow)]
pub struct SummaryRow {
    pub uid: String,
    pub sender: String,
    pub receivers: String,
    pub subject: String,
    pub status: i64,
    pub last_update: i64,
}
