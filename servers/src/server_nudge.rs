//! # Nudge Push Server
//!
//! Keeps a live WebSocket per signed-in app user and pushes wellness nudges to
//! them.
//!
//! ## Core Responsibilities:
//! - **Presence:** clients connect to `/ws` and send `{"type":"register","userId":...}`.
//!   The presence registry maps each user to that connection until it closes.
//! - **Scheduling:** a cron job loads every user's context snapshot, runs the
//!   nudge rules and dispatches the results.
//! - **Missed notifications:** nudges for offline users are kept and served on
//!   `/notifications/{userId}`.
//! - **Lifecycle:** graceful shutdown on Ctrl-C/SIGTERM closes every socket and
//!   releases the registry.

#![forbid(unsafe_code)]
#![warn(rust_2018_idioms, unused_qualifications)]

use anyhow::Result;
use lib_common::core::{
    ContextSource, JsonFileContextSource, MemoryNotificationStore, NotificationDispatcher,
    NotificationStore, PresenceRegistry,
};
use lib_common::rules::RuleSet;
use std::sync::Arc;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

mod nudge_logic;
use nudge_logic::{config, downstream, logger, scheduler, state};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    // Rustls 0.23+ requires an explicit crypto provider to be installed.
    let _ = rustls::crypto::ring::default_provider().install_default();

    let config = config::load_config();
    let _log_guard = logger::setup_logging(&config.log_dir(), &config.log_level())?;

    let timezone = config.timezone()?;
    let disabled = config.disabled_rules();
    let rules = RuleSet::builtin().without(disabled.as_slice());
    info!("Active nudge rules: {:?} (timezone {})", rules.ids(), timezone);

    let store: Arc<dyn NotificationStore> = Arc::new(MemoryNotificationStore::new(config.store_capacity()));
    let dispatcher = Arc::new(NotificationDispatcher::new(PresenceRegistry::new(), rules, store));

    let shutdown = CancellationToken::new();
    let app_state = state::AppState::new(dispatcher, timezone, shutdown.clone());

    let source: Arc<dyn ContextSource> = Arc::new(JsonFileContextSource::new(config.contexts_path()));
    let mut nudge_scheduler = scheduler::start(&config, app_state.clone(), source).await?;

    let mut server_handle = tokio::spawn(downstream::run(config.clone(), app_state.clone()));

    // Stop on a signal, or early if the server itself gives up (e.g. bind failure).
    let early_exit = tokio::select! {
        _ = shutdown_signal() => {
            info!("Shutdown signal received, initiating shutdown.");
            None
        }
        result = &mut server_handle => Some(result),
    };
    shutdown.cancel();

    if let Err(e) = nudge_scheduler.shutdown().await {
        warn!("Scheduler did not shut down cleanly: {:?}", e);
    }

    let server_result = match early_exit {
        Some(result) => result,
        None => server_handle.await,
    };
    match server_result {
        Ok(Ok(())) => {}
        Ok(Err(e)) => error!("Server stopped with error: {}", e),
        Err(e) => error!("Server task failed: {}", e),
    }

    let released = app_state.registry.shutdown();
    info!("Shutdown complete; released {} connection(s).", released);
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut term_signal) => {
                term_signal.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
