//! Sender worker: drains the queue into the local MTA.

use sqlx::SqlitePool;
use std::{sync::Arc, time::Duration};
use tokio::sync::watch;
use tracing::{error, info, warn};

use crate::{encoder, error::Error, models::message::Message, smtp::Transport, store};

/// Pause after an empty poll or a store error.
pub const IDLE_BACKOFF: Duration = Duration::from_millis(500);
/// Pause after handling a message.
pub const BUSY_BACKOFF: Duration = Duration::from_millis(50);

async fn submit(transport: &dyn Transport, msg: &Message) -> Result<(), Error> {
    let req = msg.request()?;
    let recipients = msg.recipients()?;
    let data = encoder::encode(msg)?;
    transport.submit(&req.from.email, &recipients, &data).await
}

/// Deliver one claimed message and record the outcome.
///
/// A delivery failure is terminal: the message is abandoned with the error
/// text. The returned error is only set when recording the outcome failed.
pub async fn send_message(
    pool: &SqlitePool,
    transport: &dyn Transport,
    msg: &Message,
) -> Result<(), Error> {
    match submit(transport, msg).await {
        Ok(()) => store::sent_message(pool, msg).await,
        Err(e) => {
            warn!(uid = %msg.uid, "delivery failed: {e}");
            let reason = e.to_string();
            store::abandon_message(pool, msg, &reason)
                .await
                .map_err(|abandon| e.and(abandon))
        }
    }
}

/// Claim and deliver at most one message. Returns whether one was found.
pub async fn send_next(pool: &SqlitePool, transport: &dyn Transport) -> Result<bool, Error> {
    let Some(msg) = store::dequeue(pool).await? else {
        return Ok(false);
    };
    send_message(pool, transport, &msg).await?;
    Ok(true)
}

/// Run until `stop` flips to true or its sender is dropped.
///
/// Only the backoff sleep is interruptible; a delivery in progress finishes first.
pub async fn run_sender_loop(
    pool: SqlitePool,
    transport: Arc<dyn Transport>,
    mut stop: watch::Receiver<bool>,
) {
    info!("sender started");
    loop {
        if *stop.borrow() {
            break;
        }
        let wait = match send_next(&pool, transport.as_ref()).await {
            Ok(true) => BUSY_BACKOFF,
            Ok(false) => IDLE_BACKOFF,
            Err(e) => {
                error!("sender: {e}");
                IDLE_BACKOFF
            }
        };
        tokio::select! {
            changed = stop.changed() => {
                if changed.is_err() || *stop.borrow() {
                    break;
                }
            }
            _ = tokio::time::sleep(wait) => {}
        }
    }
    info!("sender stopped");
}
