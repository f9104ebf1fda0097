pub mod memory_store;
pub mod realtime_ws;
pub mod rest_store;
pub mod retry;
pub mod traits;

pub use memory_store::MemoryEventStore;
pub use realtime_ws::WebSocketPushChannel;
pub use rest_store::RestEventStore;
pub use retry::RetryPolicy;
pub use traits::{decode_rows, EventStore, PushChannel, PushMessage, PushSubscription};

#[cfg(test)]
pub use traits::MockPushChannel;
