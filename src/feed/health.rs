//! Passive connection health for the realtime feed.
//!
//! The feed reports its transitions here; nothing in this module feeds back
//! into delivery decisions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::RwLock;
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    /// At least one subscription is on the polling fallback
    Degraded,
    /// Errors were recorded but every subscription is on push
    Issues,
}

impl HealthStatus {
    pub fn is_healthy(&self) -> bool {
        matches!(self, HealthStatus::Healthy)
    }
}

impl fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HealthStatus::Healthy => write!(f, "HEALTHY"),
            HealthStatus::Degraded => write!(f, "DEGRADED"),
            HealthStatus::Issues => write!(f, "ISSUES"),
        }
    }
}

/// Point-in-time health report
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthReport {
    pub status: HealthStatus,
    pub started_at: DateTime<Utc>,
    pub uptime_seconds: u64,
    pub connects: u64,
    pub disconnects: u64,
    pub errors: u64,
    pub events_received: u64,
    pub polling_activations: u64,
    /// Subscriptions currently on the polling fallback
    pub polling_active: u64,
    pub events_per_minute: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_event_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

pub struct HealthMonitor {
    started_at: DateTime<Utc>,
    connects: AtomicU64,
    disconnects: AtomicU64,
    errors: AtomicU64,
    events_received: AtomicU64,
    polling_activations: AtomicU64,
    polling_active: AtomicU64,
    last_event: RwLock<Option<DateTime<Utc>>>,
    last_error: RwLock<Option<(DateTime<Utc>, String)>>,
}

impl HealthMonitor {
    pub fn new() -> Self {
        Self {
            started_at: Utc::now(),
            connects: AtomicU64::new(0),
            disconnects: AtomicU64::new(0),
            errors: AtomicU64::new(0),
            events_received: AtomicU64::new(0),
            polling_activations: AtomicU64::new(0),
            polling_active: AtomicU64::new(0),
            last_event: RwLock::new(None),
            last_error: RwLock::new(None),
        }
    }

    pub fn record_connect(&self) {
        self.connects.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_disconnect(&self) {
        self.disconnects.fetch_add(1, Ordering::Relaxed);
    }

    pub async fn record_error(&self, message: &str) {
        self.errors.fetch_add(1, Ordering::Relaxed);
        *self.last_error.write().await = Some((Utc::now(), message.to_string()));
    }

    pub async fn record_event(&self) {
        self.events_received.fetch_add(1, Ordering::Relaxed);
        *self.last_event.write().await = Some(Utc::now());
    }

    pub fn record_polling_started(&self) {
        self.polling_activations.fetch_add(1, Ordering::Relaxed);
        self.polling_active.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_polling_stopped(&self) {
        let _ = self
            .polling_active
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |n| n.checked_sub(1));
    }

    pub fn status(&self) -> HealthStatus {
        if self.polling_active.load(Ordering::Relaxed) > 0 {
            HealthStatus::Degraded
        } else if self.errors.load(Ordering::Relaxed) > 0 {
            HealthStatus::Issues
        } else {
            HealthStatus::Healthy
        }
    }

    pub async fn report(&self) -> HealthReport {
        let uptime_seconds = (Utc::now() - self.started_at).num_seconds().max(0) as u64;
        let events_received = self.events_received.load(Ordering::Relaxed);
        let events_per_minute = if uptime_seconds > 0 {
            events_received as f64 * 60.0 / uptime_seconds as f64
        } else {
            0.0
        };
        let last_error = self.last_error.read().await.clone();

        HealthReport {
            status: self.status(),
            started_at: self.started_at,
            uptime_seconds,
            connects: self.connects.load(Ordering::Relaxed),
            disconnects: self.disconnects.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
            events_received,
            polling_activations: self.polling_activations.load(Ordering::Relaxed),
            polling_active: self.polling_active.load(Ordering::Relaxed),
            events_per_minute,
            last_event_at: *self.last_event.read().await,
            last_error_at: last_error.as_ref().map(|(at, _)| *at),
            last_error: last_error.map(|(_, message)| message),
        }
    }

    /// Human readable status block
    pub async fn summary(&self) -> String {
        let r = self.report().await;
        let last_event = r
            .last_event_at
            .map(|t| t.format("%H:%M:%S").to_string())
            .unwrap_or_else(|| "never".to_string());
        let last_error = r.last_error.as_deref().unwrap_or("none");

        format!(
            r#"
=== COURTSIDE FEED STATUS ===
Status: {} | Uptime: {}s
Connects: {} | Disconnects: {} | Errors: {}
Events: {} ({:.1}/min) | Last event: {}
Polling: {} active, {} activations
Last error: {}
=============================
"#,
            r.status,
            r.uptime_seconds,
            r.connects,
            r.disconnects,
            r.errors,
            r.events_received,
            r.events_per_minute,
            last_event,
            r.polling_active,
            r.polling_activations,
            last_error,
        )
    }

    /// Export counters in Prometheus text format
    pub async fn prometheus(&self) -> String {
        let r = self.report().await;
        let status_value = match r.status {
            HealthStatus::Healthy => 0,
            HealthStatus::Degraded => 1,
            HealthStatus::Issues => 2,
        };

        format!(
            r#"# HELP courtside_feed_connects_total Push subscriptions acknowledged
# TYPE courtside_feed_connects_total counter
courtside_feed_connects_total {}

# HELP courtside_feed_disconnects_total Push subscriptions lost or closed
# TYPE courtside_feed_disconnects_total counter
courtside_feed_disconnects_total {}

# HELP courtside_feed_errors_total Feed errors (subscribe, mid-session, poll)
# TYPE courtside_feed_errors_total counter
courtside_feed_errors_total {}

# HELP courtside_feed_events_total Change notifications delivered
# TYPE courtside_feed_events_total counter
courtside_feed_events_total {}

# HELP courtside_feed_polling_activations_total Fallbacks to polling
# TYPE courtside_feed_polling_activations_total counter
courtside_feed_polling_activations_total {}

# HELP courtside_feed_polling_active Subscriptions currently polling
# TYPE courtside_feed_polling_active gauge
courtside_feed_polling_active {}

# HELP courtside_feed_uptime_seconds Seconds since the monitor started
# TYPE courtside_feed_uptime_seconds gauge
courtside_feed_uptime_seconds {}

# HELP courtside_feed_status 0 healthy, 1 degraded, 2 issues
# TYPE courtside_feed_status gauge
courtside_feed_status {}
"#,
            r.connects,
            r.disconnects,
            r.errors,
            r.events_received,
            r.polling_activations,
            r.polling_active,
            r.uptime_seconds,
            status_value,
        )
    }

    pub async fn log_status(&self) {
        info!("{}", self.summary().await);
    }
}

impl Default for HealthMonitor {
    fn default() -> Self {
        Self::new()
    }
}
