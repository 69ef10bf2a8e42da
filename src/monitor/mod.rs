//! Bounce monitor: matches returned mail to queued messages.

use sqlx::SqlitePool;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::{mailbox::Mailbox, store};

/// Wait after an empty mailbox.
pub const IDLE_BACKOFF: Duration = Duration::from_millis(500);
/// Wait after a mail was read, whether or not it was useful.
pub const BUSY_BACKOFF: Duration = Duration::from_millis(50);

/// Reason recorded on messages abandoned because of a bounce.
pub const UNDELIVERABLE: &str = "Undeliverable";

/// Handle at most one mail. Returns whether a message was abandoned and the
/// wait before the next call.
pub async fn process_mail<M: Mailbox>(pool: &SqlitePool, mailbox: &M) -> (bool, Duration) {
    if !mailbox.has_unread_mail().await {
        return (false, IDLE_BACKOFF);
    }

    let data = match mailbox.fetch_mail().await {
        Ok(Some(data)) => data,
        Ok(None) => {
            debug!("no mail");
            return (false, IDLE_BACKOFF);
        }
        Err(e) => {
            warn!("failed to fetch local mail: {e}");
            return (false, BUSY_BACKOFF);
        }
    };

    let mail = match mailbox.parse_mail(&data) {
        Ok(Some(mail)) => mail,
        Ok(None) => {
            debug!("no mail");
            return (false, IDLE_BACKOFF);
        }
        Err(e) => {
            warn!(
                "failed to parse local mail: {e}: {}",
                String::from_utf8_lossy(&data)
            );
            return (false, BUSY_BACKOFF);
        }
    };

    let Some(uid) = mailbox.failed_message_id(&mail) else {
        debug!("ignore unrelated local mail");
        return (false, BUSY_BACKOFF);
    };

    let msg = match store::get_message(pool, &uid).await {
        Ok(Some(msg)) => msg,
        Ok(None) => {
            info!(uid = %uid, "no message corresponding to returned message id");
            return (false, BUSY_BACKOFF);
        }
        Err(e) => {
            warn!(uid = %uid, "failed to retrieve message: {e}");
            return (false, BUSY_BACKOFF);
        }
    };

    if let Err(e) = store::abandon_message(pool, &msg, UNDELIVERABLE).await {
        warn!(uid = %uid, "failed to abandon message: {e}");
        return (false, BUSY_BACKOFF);
    }
    (true, BUSY_BACKOFF)
}

/// Sleep `wait`, then handle at most one mail.
pub async fn monitor_step<M: Mailbox>(
    pool: &SqlitePool,
    mailbox: &M,
    wait: Duration,
) -> (bool, Duration) {
    tokio::time::sleep(wait).await;
    process_mail(pool, mailbox).await
}

/// Run until `stop` flips to true or its sender is dropped.
pub async fn run_monitor_loop<M: Mailbox>(
    pool: SqlitePool,
    mailbox: M,
    mut stop: watch::Receiver<bool>,
) {
    info!("bounce monitor started");
    let mut wait = Duration::ZERO;
    loop {
        if *stop.borrow() {
            break;
        }
        tokio::select! {
            changed = stop.changed() => {
                if changed.is_err() || *stop.borrow() {
                    break;
                }
                continue;
            }
            _ = tokio::time::sleep(wait) => {}
        }
        let (_, next) = process_mail(&pool, &mailbox).await;
        wait = next;
    }
    info!("bounce monitor stopped");
}
