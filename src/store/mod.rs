//! Durable queue: enqueue, atomic claim, search and lifecycle transitions.
//!
//! Every mutation that touches more than one row runs in one transaction.
//! Bodies live in their own table and are dropped once the last message
//! referencing them reaches a terminal state.

use chrono::Utc;
use sqlx::{Sqlite, SqliteConnection, SqlitePool, Transaction};
use tracing::{debug, info};
use uuid::Uuid;

use crate::{
    error::Error,
    models::{
        message::{
            db_message::{ClaimedRow, MessageRow, SummaryRow},
            Message, MessageStatus,
        },
        request::SendRequest,
        response::SearchResultItem,
    },
    query::{Conjunction, Field, Operator, QueryNode},
};

const CLAIM_SQL: &str = "UPDATE messages SET status = ?, last_update = ? \
     WHERE uid = (SELECT uid FROM messages WHERE status = ? ORDER BY last_update, rowid LIMIT 1) \
     AND status = ? \
     RETURNING uid, bid, status, last_update";

// Deletes the body only when `uid` is its sole referencing message.
const CLEANUP_SQL: &str = "DELETE FROM bodies \
     WHERE bid = (SELECT bid FROM messages WHERE uid = ?) \
     AND (SELECT COUNT(*) FROM messages WHERE messages.bid = bodies.bid) = 1";

fn cleanup_query(uid: &str) -> sqlx::query::Query<'_, Sqlite, sqlx::sqlite::SqliteArguments<'_>> {
    sqlx::query(CLEANUP_SQL).bind(uid)
}

fn now() -> i64 {
    Utc::now().timestamp()
}

async fn rollback_with(tx: Transaction<'static, Sqlite>, err: Error) -> Error {
    match tx.rollback().await {
        Ok(()) => err,
        Err(e) => err.and(e.into()),
    }
}

/// Queue one message per personalization. All of them or none are stored.
///
/// Returns the assigned message ids in personalization order.
pub async fn enqueue(
    pool: &SqlitePool,
    mydomain: &str,
    req: &SendRequest,
) -> Result<Vec<String>, Error> {
    let mut tx = pool.begin().await?;
    let mut uids = Vec::with_capacity(req.personalizations.len());
    for single in req.expand() {
        let queued = enqueue_one(&mut tx, mydomain, &single).await;
        match queued {
            Ok(uid) => uids.push(uid),
            Err(e) => return Err(rollback_with(tx, e).await),
        }
    }
    tx.commit().await?;
    for uid in &uids {
        info!(uid = %uid, "enqueued");
    }
    Ok(uids)
}

async fn enqueue_one(
    conn: &mut SqliteConnection,
    mydomain: &str,
    req: &SendRequest,
) -> Result<String, Error> {
    let packet = serde_json::to_string(req)?;
    let uid = format!("{}@{}", Uuid::new_v4(), mydomain);
    let bid = Uuid::new_v4().to_string();

    sqlx::query("INSERT INTO bodies (bid, packet) VALUES (?, ?)")
        .bind(&bid)
        .bind(packet)
        .execute(&mut *conn)
        .await?;

    sqlx::query(
        "INSERT INTO messages (uid, bid, sender, receivers, subject, status, last_update) VALUES (?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&uid)
    .bind(&bid)
    .bind(&req.from.email)
    .bind(req.receiver_emails())
    .bind(req.effective_subject())
    .bind(MessageStatus::Waiting.code())
    .bind(now())
    .execute(&mut *conn)
    .await?;
    Ok(uid)
}

/// Claim the oldest waiting message, moving it to processing.
///
/// The claim is a single conditional update, so concurrent callers never get
/// the same row. `None` means the queue is empty.
pub async fn dequeue(pool: &SqlitePool) -> Result<Option<Message>, Error> {
    let mut tx = pool.begin().await?;
    let claimed = sqlx::query_as::<_, ClaimedRow>(CLAIM_SQL)
        .bind(MessageStatus::Processing.code())
        .bind(now())
        .bind(MessageStatus::Waiting.code())
        .bind(MessageStatus::Waiting.code())
        .fetch_all(&mut *tx)
        .await;
    let claimed = match claimed {
        Ok(rows) => rows,
        Err(e) => return Err(rollback_with(tx, e.into()).await),
    };
    let Some(row) = claimed.into_iter().next() else {
        tx.commit().await?;
        return Ok(None);
    };

    let packet = sqlx::query_as::<_, (String,)>("SELECT packet FROM bodies WHERE bid = ?")
        .bind(&row.bid)
        .fetch_optional(&mut *tx)
        .await;
    let packet = match packet {
        Ok(p) => p,
        Err(e) => return Err(rollback_with(tx, e.into()).await),
    };
    tx.commit().await?;

    let request = match packet {
        Some((p,)) => Some(serde_json::from_str(&p)?),
        None => None,
    };
    debug!(uid = %row.uid, "claimed");
    Ok(Some(Message {
        uid: row.uid,
        request,
        status: row.status,
        last_update: row.last_update,
    }))
}

/// Point lookup by message id. The body is `None` once it has been purged.
pub async fn get_message(pool: &SqlitePool, uid: &str) -> Result<Option<Message>, Error> {
    let row: Option<MessageRow> = sqlx::query_as(
        "SELECT uid, packet, status, last_update FROM messages \
         LEFT JOIN bodies ON messages.bid = bodies.bid WHERE uid = ?",
    )
    .bind(uid)
    .fetch_optional(pool)
    .await?;
    let Some(row) = row else {
        return Ok(None);
    };
    let request = match row.packet {
        Some(p) => Some(serde_json::from_str(&p)?),
        None => None,
    };
    Ok(Some(Message {
        uid: row.uid,
        request,
        status: row.status,
        last_update: row.last_update,
    }))
}

/// Mark a message delivered and drop its body if unshared.
pub async fn sent_message(pool: &SqlitePool, msg: &Message) -> Result<(), Error> {
    finish(pool, &msg.uid, MessageStatus::Sent, None).await?;
    info!(uid = %msg.uid, "sent");
    Ok(())
}

/// Mark a message failed with `reason` and drop its body if unshared.
pub async fn abandon_message(pool: &SqlitePool, msg: &Message, reason: &str) -> Result<(), Error> {
    finish(pool, &msg.uid, MessageStatus::Abandoned, Some(reason)).await?;
    info!(uid = %msg.uid, reason, "abandoned");
    Ok(())
}

async fn finish(
    pool: &SqlitePool,
    uid: &str,
    status: MessageStatus,
    reason: Option<&str>,
) -> Result<(), Error> {
    let mut tx = pool.begin().await?;
    let update = sqlx::query(
        "UPDATE messages SET status = ?, last_error = ?, last_update = ? WHERE uid = ?",
    )
    .bind(status.code())
    .bind(reason)
    .bind(now())
    .bind(uid)
    .execute(&mut *tx)
    .await;
    if let Err(e) = update {
        return Err(rollback_with(tx, e.into()).await);
    }
    let cleaned = cleanup_query(uid).execute(&mut *tx).await;
    if let Err(e) = cleaned {
        return Err(rollback_with(tx, e.into()).await);
    }
    tx.commit().await?;
    Ok(())
}

/// Delete the message's body when this message is its only reference.
pub async fn cleanup(pool: &SqlitePool, uid: &str) -> Result<bool, Error> {
    let mut tx = pool.begin().await?;
    let cleaned = cleanup_query(uid).execute(&mut *tx).await;
    let deleted = match cleaned {
        Ok(r) => r.rows_affected() > 0,
        Err(e) => return Err(rollback_with(tx, e.into()).await),
    };
    tx.commit().await?;
    Ok(deleted)
}

/// Bind value produced while compiling a query tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SqlParam {
    Text(String),
    Int(i64),
}

/// Compile a query tree into a WHERE fragment, pushing bind values in order.
pub fn build_where_clause(node: &QueryNode, params: &mut Vec<SqlParam>) -> String {
    match node {
        QueryNode::Expr { conj, left, right } => {
            let l = build_where_clause(left, params);
            let r = build_where_clause(right, params);
            let conj = match conj {
                Conjunction::And => "AND",
                Conjunction::Or => "OR",
            };
            format!("({l} {conj} {r})")
        }
        QueryNode::Leaf { field, op, value } => {
            let (eq, found) = match op {
                Operator::Equal => ("=", "> 0"),
                Operator::NotEqual => ("<>", "= 0"),
            };
            match field {
                Field::Sender => {
                    params.push(SqlParam::Text(value.clone()));
                    format!("sender {eq} ?")
                }
                Field::MessageId => {
                    params.push(SqlParam::Text(value.clone()));
                    format!("uid {eq} ?")
                }
                Field::Receiver => {
                    params.push(SqlParam::Text(format!("\x01{value}\x01")));
                    format!("instr(receivers, ?) {found}")
                }
                Field::Subject => {
                    params.push(SqlParam::Text(value.clone()));
                    format!("instr(subject, ?) {found}")
                }
                Field::Status => {
                    // unknown names compare against waiting
                    let code = MessageStatus::from_name(value)
                        .unwrap_or(MessageStatus::Waiting)
                        .code();
                    params.push(SqlParam::Int(code));
                    format!("status {eq} ?")
                }
            }
        }
    }
}

/// Messages matching `criteria`, most recently updated first.
/// A `limit` of zero or less returns everything.
pub async fn search_messages(
    pool: &SqlitePool,
    criteria: &QueryNode,
    limit: i64,
) -> Result<Vec<SearchResultItem>, Error> {
    let mut params = Vec::new();
    let mut sql = format!(
        "SELECT uid, sender, receivers, subject, status, last_update FROM messages WHERE {} \
         ORDER BY last_update DESC, rowid DESC",
        build_where_clause(criteria, &mut params)
    );
    if limit > 0 {
        sql.push_str(" LIMIT ?");
        params.push(SqlParam::Int(limit));
    }

    let mut query = sqlx::query_as::<_, SummaryRow>(&sql);
    for p in params {
        query = match p {
            SqlParam::Text(s) => query.bind(s),
            SqlParam::Int(i) => query.bind(i),
        };
    }
    let rows = query.fetch_all(pool).await?;
    Ok(rows.into_iter().map(SearchResultItem::from).collect())
}
