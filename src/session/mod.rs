pub mod aggregator;
pub mod reload;
pub mod snapshot;

pub use aggregator::StatAggregator;
pub use reload::ReloadScheduler;
pub use snapshot::{BatchDeleteOutcome, GameContext, GameSnapshot, SessionNotice};
