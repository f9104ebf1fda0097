use std::sync::Arc;

use courtside::adapters::{EventStore, RestEventStore, WebSocketPushChannel};
use courtside::config::{AppConfig, LoggingConfig};
use courtside::error::Result;
use courtside::feed::{FeedSettings, RealtimeFeed};
use tracing::info;
use tracing_subscriber::EnvFilter;

pub fn init_logging(cfg: &LoggingConfig) {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("{},courtside=debug", cfg.level)));

    // File logging only when a directory is configured.
    let log_dir = std::env::var("COURTSIDE_LOG_DIR").ok();

    // `tracing_appender::rolling::daily` panics if it can't create the initial
    // file, so probe writability first.
    let file_layer = log_dir.as_deref().and_then(|dir| {
        if let Err(e) = std::fs::create_dir_all(dir) {
            eprintln!("Warning: Could not create log directory {dir} ({e}), file logging disabled");
            return None;
        }
        let probe = std::path::Path::new(dir).join(".courtside_write_test");
        match std::fs::OpenOptions::new().create(true).append(true).open(&probe) {
            Ok(_) => {
                let _ = std::fs::remove_file(&probe);
                let appender = tracing_appender::rolling::daily(dir, "courtside.log");
                let (non_blocking, guard) = tracing_appender::non_blocking(appender);

                // Keep the guard for the life of the process
                Box::leak(Box::new(guard));

                Some(
                    tracing_subscriber::fmt::layer()
                        .with_writer(non_blocking)
                        .with_ansi(false)
                        .with_target(true),
                )
            }
            Err(e) => {
                eprintln!("Warning: Could not write to log directory {dir} ({e}), file logging disabled");
                None
            }
        }
    });

    let (plain, json) = if cfg.json {
        (None, Some(tracing_subscriber::fmt::layer().json().with_target(true)))
    } else {
        (
            Some(
                tracing_subscriber::fmt::layer()
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_file(false)
                    .with_line_number(false),
            ),
            None,
        )
    };

    let file_logging_enabled = file_layer.is_some();
    tracing_subscriber::registry()
        .with(filter)
        .with(plain)
        .with(json)
        .with(file_layer)
        .init();

    if let (true, Some(dir)) = (file_logging_enabled, log_dir) {
        eprintln!("Logging to: {dir}/courtside.log");
    }
}

pub fn init_logging_simple() {
    // Minimal logging for one-shot commands
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::WARN)
        .try_init();
}

pub fn build_store(cfg: &AppConfig) -> Result<Arc<dyn EventStore>> {
    let store = RestEventStore::new(
        &cfg.store.rest_url,
        cfg.store.api_key.as_deref(),
        cfg.request.retry_policy(),
    )?;
    Ok(Arc::new(store))
}

/// Push feed when a realtime endpoint is configured, polling otherwise
pub fn build_feed(cfg: &AppConfig, store: Arc<dyn EventStore>) -> RealtimeFeed {
    let settings = FeedSettings::from_config(&cfg.feed, &cfg.request);
    match &cfg.store.realtime_url {
        Some(url) => {
            info!("Using push channel at {}", url);
            let push = WebSocketPushChannel::new(url, cfg.store.api_key.clone());
            RealtimeFeed::new(store, Arc::new(push), settings)
        }
        None => {
            info!("No realtime endpoint configured, polling every {:?}", settings.poll_interval);
            RealtimeFeed::polling_only(store, settings)
        }
    }
}
