pub mod config;
pub mod db;
pub mod models;
pub mod reminders;

use std::sync::Arc;

use tracing_subscriber::EnvFilter;

use reminders::{
    EngineConfig, LogNotifier, NotificationChannels, ReminderEngine, ReminderError, SqliteStore,
    SystemClock, WebhookNotifier,
};

/// Run the reminder daemon until Ctrl-C.
pub fn run() -> Result<(), ReminderError> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config::default_log_filter())),
        )
        .init();

    tracing::info!("{} starting v{}", config::APP_NAME, config::APP_VERSION);

    let engine_config = EngineConfig::from_env()?;
    let webhook_config = config::WebhookConfig::from_env()?;

    let db_path = config::database_path();
    let store = Arc::new(SqliteStore::open(&db_path, engine_config.store_busy_timeout)?);
    tracing::info!(path = %db_path.display(), "Reminder store opened");

    // The blocking HTTP client is built (and finally dropped) outside the
    // async runtime.
    let channels: Arc<dyn NotificationChannels> = if webhook_config.is_configured() {
        Arc::new(WebhookNotifier::new(webhook_config)?)
    } else {
        tracing::warn!("No notification webhooks configured, notifications will only be logged");
        Arc::new(LogNotifier)
    };

    let engine = ReminderEngine::with_store(store, channels, Arc::new(SystemClock), engine_config)?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .thread_name("medroutine")
        .build()
        .map_err(|e| ReminderError::Runtime(e.to_string()))?;

    let scheduled = engine.clone();
    runtime.block_on(async move {
        let handle = reminders::start_scheduler(scheduled);
        let signal = tokio::signal::ctrl_c().await;
        tracing::info!("Shutdown requested");
        handle.shutdown().await;
        signal.map_err(|e| ReminderError::Runtime(format!("cannot listen for Ctrl-C: {e}")))
    })?;

    drop(engine);
    tracing::info!("{} stopped", config::APP_NAME);
    Ok(())
}
