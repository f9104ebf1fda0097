pub mod adapters;
pub mod cli;
pub mod config;
pub mod domain;
pub mod error;
pub mod feed;
pub mod session;
pub mod stats;

pub use adapters::{EventStore, MemoryEventStore, PushChannel, RestEventStore, WebSocketPushChannel};
pub use config::AppConfig;
pub use domain::{
    ChangeEvent, ChangeKind, EventLog, GameEvent, GameFormat, Resource, RowFilter,
    SubstitutionEvent, TeamRoster,
};
pub use error::{CourtsideError, ErrorKind, Result};
pub use feed::{FeedSettings, FeedState, HealthMonitor, HealthStatus, RealtimeFeed};
pub use session::{GameContext, GameSnapshot, SessionNotice, StatAggregator};
pub use stats::{BoxScore, PlusMinusCalculator, Timeline, TimelineReconstructor};
