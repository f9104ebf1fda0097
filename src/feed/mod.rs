//! Change delivery: push subscription with polling fallback, plus passive
//! health tracking.

pub mod health;
pub mod realtime;

pub use health::{HealthMonitor, HealthReport, HealthStatus};
pub use realtime::{
    diff_snapshots, snapshot_of, ChangeCallback, FeedSettings, FeedState, RealtimeFeed,
    Snapshot, SubscriptionHandle, SubscriptionId,
};
