use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::sync::{mpsc, oneshot};
use tracing::warn;

use crate::domain::{ChangeEvent, EventLog, GameEvent, Resource, RowFilter, SubstitutionEvent, TeamRoster};
use crate::error::{CourtsideError, Result};

/// Remote append-only event store.
///
/// Implementations translate transport failures into the crate taxonomy
/// (`Request`, `ResourceAbsent`, `RetriesExhausted`) before returning.
#[async_trait]
pub trait EventStore: Send + Sync {
    /// Rows of `resource` matching `filter`, oldest first
    async fn fetch_rows(&self, resource: Resource, filter: &RowFilter) -> Result<Vec<Value>>;

    /// Insert a row; returns the stored row
    async fn insert_row(&self, resource: Resource, row: Value) -> Result<Value>;

    /// Patch the row with the given id
    async fn update_row(&self, resource: Resource, id: &str, patch: Value) -> Result<()>;

    /// Delete the row with the given id
    async fn delete_row(&self, resource: Resource, id: &str) -> Result<()>;

    /// Full authoritative log for one game
    async fn fetch_log(&self, game_id: &str) -> Result<EventLog> {
        let filter = RowFilter::by_game(game_id);
        let events = self.fetch_rows(Resource::GameEvents, &filter).await?;
        let subs = self.fetch_rows(Resource::Substitutions, &filter).await?;

        let events: Vec<GameEvent> = decode_rows(Resource::GameEvents, events);
        let subs: Vec<SubstitutionEvent> = decode_rows(Resource::Substitutions, subs);
        Ok(EventLog::new(game_id, events, subs))
    }

    /// Roster for one team in one game, from the optional roster table
    async fn fetch_roster(&self, game_id: &str, team_id: &str) -> Result<TeamRoster> {
        let rows = self
            .fetch_rows(Resource::GameRosters, &RowFilter::by_game(game_id))
            .await?;
        decode_rows::<TeamRoster>(Resource::GameRosters, rows)
            .into_iter()
            .find(|r| r.team_id == team_id)
            .ok_or_else(|| {
                CourtsideError::ResourceAbsent(format!("roster for team {team_id} in game {game_id}"))
            })
    }
}

/// Decode rows, skipping (and logging) any that don't match the wire shape.
pub fn decode_rows<T: DeserializeOwned>(resource: Resource, rows: Vec<Value>) -> Vec<T> {
    rows.into_iter()
        .filter_map(|row| match serde_json::from_value::<T>(row.clone()) {
            Ok(decoded) => Some(decoded),
            Err(e) => {
                let id = row.get("id").and_then(Value::as_str).unwrap_or("?");
                warn!("Skipping malformed {} row {}: {}", resource, id, e);
                None
            }
        })
        .collect()
}

/// Item delivered on an open push subscription
#[derive(Debug, Clone)]
pub enum PushMessage {
    Change(ChangeEvent),
    /// Mid-session failure; the subscription is unusable afterwards
    Error(String),
}

/// Live push subscription. Dropping it closes the underlying channel.
#[derive(Debug)]
pub struct PushSubscription {
    pub messages: mpsc::Receiver<PushMessage>,
    closer: Option<oneshot::Sender<()>>,
}

impl PushSubscription {
    pub fn new(messages: mpsc::Receiver<PushMessage>, closer: oneshot::Sender<()>) -> Self {
        Self {
            messages,
            closer: Some(closer),
        }
    }

    pub fn close(&mut self) {
        if let Some(closer) = self.closer.take() {
            let _ = closer.send(());
        }
        self.messages.close();
    }
}

impl Drop for PushSubscription {
    fn drop(&mut self) {
        self.close();
    }
}

/// Best-effort push-change channel of the event store
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PushChannel: Send + Sync {
    /// Open a subscription; resolves once the server acknowledged it
    async fn subscribe(&self, resource: Resource, filter: &RowFilter) -> Result<PushSubscription>;
}
