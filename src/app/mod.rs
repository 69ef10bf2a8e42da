//! Application setup and runtime.

pub mod config;

use crate::{
  db, http,
  mailbox::{LocalMailbox, Mailbox},
  monitor, sender,
  smtp::{LocalSmtp, Transport},
};
use sqlx::SqlitePool;
use std::sync::Arc;
use tokio::{sync::watch, task::JoinHandle};
use tracing::{error, info};

pub use config::{Config, ConfigError};

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
  pub db: SqlitePool,
  pub config: Arc<Config>,
}

impl AppState {
  pub fn new(db: SqlitePool, config: Config) -> Self {
    AppState {
      db,
      config: Arc::new(config),
    }
  }
}

/// Running background workers and their stop switches.
pub struct Workers {
  sender_stop: watch::Sender<bool>,
  monitor_stop: watch::Sender<bool>,
  sender: JoinHandle<()>,
  monitor: JoinHandle<()>,
}

impl Workers {
  /// Signal both loops and wait for them to finish their current step.
  pub async fn shutdown(self) {
    let _ = self.sender_stop.send(true);
    let _ = self.monitor_stop.send(true);
    if let Err(e) = self.sender.await {
      error!("sender task failed: {e}");
    }
    if let Err(e) = self.monitor.await {
      error!("monitor task failed: {e}");
    }
  }
}

/// Start the sender and bounce monitor against `state.db`.
pub fn spawn_workers<M>(state: &AppState, transport: Arc<dyn Transport>, mailbox: M) -> Workers
where
  M: Mailbox + 'static,
{
  let (sender_stop, sender_rx) = watch::channel(false);
  let (monitor_stop, monitor_rx) = watch::channel(false);
  let sender = tokio::spawn(sender::run_sender_loop(
    state.db.clone(),
    transport,
    sender_rx,
  ));
  let monitor = tokio::spawn(monitor::run_monitor_loop(
    state.db.clone(),
    mailbox,
    monitor_rx,
  ));
  Workers {
    sender_stop,
    monitor_stop,
    sender,
    monitor,
  }
}

/// Start HTTP server and workers with configured environment.
pub async fn run() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
  crate::util::init_tracing();

  let config = Config::from_env()?;
  let pool = db::connect(&config.database).await?;
  db::run_migrations(&pool).await?;

  let state = AppState::new(pool, config);
  let transport: Arc<dyn Transport> = Arc::new(LocalSmtp::new(
    state.config.smtp_host.clone(),
    state.config.smtp_port,
  ));
  let mailbox = LocalMailbox::new(state.config.mail_command.clone());
  let workers = spawn_workers(&state, transport, mailbox);

  let app = http::build_router(state.clone());
  let addr = state.config.listen_addr();
  let listener = tokio::net::TcpListener::bind(&addr).await?;

  info!("mailsender api:       http://{}/", addr);
  info!("send endpoint:        POST http://{}/v3/mail/send", addr);
  info!(
    "smtp hand-off:        {}:{}",
    state.config.smtp_host, state.config.smtp_port
  );

  let served = axum::serve(listener, app)
    .with_graceful_shutdown(shutdown_signal())
    .await;
  workers.shutdown().await;
  state.db.close().await;
  served?;
  Ok(())
}

async fn shutdown_signal() {
  if let Err(e) = tokio::signal::ctrl_c().await {
    error!("failed to listen for ctrl-c: {e}");
    std::future::pending::<()>().await;
  }
  info!("shutting down");
}
