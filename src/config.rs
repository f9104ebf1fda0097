use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

use crate::adapters::RetryPolicy;
use crate::domain::GameFormat;

/// Main configuration structure
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub store: StoreConfig,
    #[serde(default)]
    pub feed: FeedConfig,
    #[serde(default)]
    pub request: RequestConfig,
    #[serde(default)]
    pub game: GameConfig,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    /// REST endpoint of the event store (e.g. "https://stats.example.com/rest/v1")
    pub rest_url: String,
    /// Websocket endpoint for the push-change channel; unset means polling only
    #[serde(default)]
    pub realtime_url: Option<String>,
    /// API key sent as `apikey` and bearer token
    #[serde(default)]
    pub api_key: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FeedConfig {
    /// Fall back to polling when the push channel fails
    #[serde(default = "default_true")]
    pub fallback_enabled: bool,
    /// How long to wait for a subscription acknowledgement
    #[serde(default = "default_subscribe_timeout")]
    pub subscribe_timeout_ms: u64,
    /// Delay before the first poll after falling back
    #[serde(default = "default_initial_poll_delay")]
    pub initial_poll_delay_ms: u64,
    /// Fixed polling interval once degraded
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,
}

fn default_true() -> bool {
    true
}

fn default_subscribe_timeout() -> u64 {
    10_000
}

fn default_initial_poll_delay() -> u64 {
    1_000
}

fn default_poll_interval() -> u64 {
    5_000
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            fallback_enabled: true,
            subscribe_timeout_ms: default_subscribe_timeout(),
            initial_poll_delay_ms: default_initial_poll_delay(),
            poll_interval_ms: default_poll_interval(),
        }
    }
}

impl FeedConfig {
    pub fn subscribe_timeout(&self) -> Duration {
        Duration::from_millis(self.subscribe_timeout_ms)
    }

    pub fn initial_poll_delay(&self) -> Duration {
        Duration::from_millis(self.initial_poll_delay_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RequestConfig {
    /// Per-attempt timeout in milliseconds
    #[serde(default = "default_request_timeout")]
    pub timeout_ms: u64,
    /// Maximum attempts per request (including the first)
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Base delay for exponential backoff
    #[serde(default = "default_base_backoff")]
    pub base_backoff_ms: u64,
    /// Backoff cap
    #[serde(default = "default_max_backoff")]
    pub max_backoff_ms: u64,
}

fn default_request_timeout() -> u64 {
    10_000
}

fn default_max_retries() -> u32 {
    3
}

fn default_base_backoff() -> u64 {
    250
}

fn default_max_backoff() -> u64 {
    4_000
}

impl Default for RequestConfig {
    fn default() -> Self {
        Self {
            timeout_ms: default_request_timeout(),
            max_retries: default_max_retries(),
            base_backoff_ms: default_base_backoff(),
            max_backoff_ms: default_max_backoff(),
        }
    }
}

impl RequestConfig {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_retries.max(1),
            attempt_timeout: Duration::from_millis(self.timeout_ms),
            base_backoff: Duration::from_millis(self.base_backoff_ms),
            max_backoff: Duration::from_millis(self.max_backoff_ms),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct GameConfig {
    #[serde(default = "default_quarter_length")]
    pub quarter_length_secs: u32,
    #[serde(default = "default_regulation_quarters")]
    pub regulation_quarters: u8,
    #[serde(default = "default_overtime_length")]
    pub overtime_length_secs: u32,
}

fn default_quarter_length() -> u32 {
    720
}

fn default_regulation_quarters() -> u8 {
    4
}

fn default_overtime_length() -> u32 {
    300
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            quarter_length_secs: default_quarter_length(),
            regulation_quarters: default_regulation_quarters(),
            overtime_length_secs: default_overtime_length(),
        }
    }
}

impl GameConfig {
    pub fn format(&self) -> GameFormat {
        GameFormat {
            quarter_length_secs: self.quarter_length_secs,
            regulation_quarters: self.regulation_quarters,
            overtime_length_secs: self.overtime_length_secs,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SessionConfig {
    /// Quiet period between a change notification and the reload it triggers
    #[serde(default = "default_reload_quiet_period")]
    pub reload_quiet_period_ms: u64,
}

fn default_reload_quiet_period() -> u64 {
    750
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            reload_quiet_period_ms: default_reload_quiet_period(),
        }
    }
}

impl SessionConfig {
    pub fn reload_quiet_period(&self) -> Duration {
        Duration::from_millis(self.reload_quiet_period_ms)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Enable JSON formatted logs
    #[serde(default)]
    pub json: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

impl AppConfig {
    /// Load configuration from files and environment
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from("config")
    }

    /// Load configuration from a specific directory
    pub fn load_from<P: AsRef<Path>>(config_dir: P) -> Result<Self, ConfigError> {
        let config_dir = config_dir.as_ref();

        let builder = Config::builder()
            .set_default("logging.level", "info")?
            .set_default("logging.json", false)?
            .set_default("store.rest_url", "http://localhost:54321/rest/v1")?
            .add_source(File::from(config_dir.join("default.toml")).required(false))
            // Environment-specific config (e.g., config/production.toml)
            .add_source(
                File::from(config_dir.join(
                    std::env::var("COURTSIDE_ENV").unwrap_or_else(|_| "development".to_string()),
                ))
                .required(false),
            )
            // COURTSIDE_STORE__REST_URL, COURTSIDE_FEED__POLL_INTERVAL_MS, ...
            .add_source(
                Environment::with_prefix("COURTSIDE")
                    .separator("__")
                    .try_parsing(true),
            );

        builder.build()?.try_deserialize()
    }

    /// Configuration for local development against a store on localhost
    pub fn default_config() -> Self {
        Self {
            store: StoreConfig {
                rest_url: "http://localhost:54321/rest/v1".to_string(),
                realtime_url: Some("ws://localhost:54321/realtime/v1/websocket".to_string()),
                api_key: None,
            },
            feed: FeedConfig::default(),
            request: RequestConfig::default(),
            game: GameConfig::default(),
            session: SessionConfig::default(),
            logging: LoggingConfig::default(),
        }
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if url::Url::parse(&self.store.rest_url).is_err() {
            errors.push(format!("store.rest_url is not a valid URL: {}", self.store.rest_url));
        }

        if let Some(ws) = &self.store.realtime_url {
            match url::Url::parse(ws) {
                Ok(u) if u.scheme() == "ws" || u.scheme() == "wss" => {}
                _ => errors.push(format!("store.realtime_url must be a ws:// or wss:// URL: {ws}")),
            }
        }

        if self.feed.poll_interval_ms == 0 {
            errors.push("feed.poll_interval_ms must be positive".to_string());
        }

        if self.feed.subscribe_timeout_ms == 0 {
            errors.push("feed.subscribe_timeout_ms must be positive".to_string());
        }

        if self.request.max_retries == 0 {
            errors.push("request.max_retries must be at least 1".to_string());
        }

        if self.request.base_backoff_ms > self.request.max_backoff_ms {
            errors.push("request.base_backoff_ms should not exceed request.max_backoff_ms".to_string());
        }

        if self.game.quarter_length_secs == 0 || self.game.regulation_quarters == 0 {
            errors.push("game.quarter_length_secs and game.regulation_quarters must be positive".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}
