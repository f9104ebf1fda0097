//! In-memory event store with failure injection.
//!
//! Backs the integration tests. Rows are kept in their JSON wire shape so
//! the same decoding path as the REST store is used.

use async_trait::async_trait;
use dashmap::{DashMap, DashSet};
use serde::Serialize;
use serde_json::Value;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::time::Duration;

use super::traits::EventStore;
use crate::domain::{GameEvent, Resource, RowFilter, SubstitutionEvent, TeamRoster};
use crate::error::{CourtsideError, Result};

#[derive(Default)]
pub struct MemoryEventStore {
    rows: DashMap<Resource, Vec<Value>>,
    absent: DashSet<Resource>,
    failing_deletes: DashSet<String>,
    pending_fetch_failures: AtomicU32,
    writes_fail: AtomicBool,
    fetch_delay_ms: AtomicU64,
    fetches: AtomicU64,
    inserts: AtomicU64,
    updates: AtomicU64,
    deletes: AtomicU64,
}

impl MemoryEventStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seed<T: Serialize>(&self, resource: Resource, row: &T) -> Result<()> {
        let value = serde_json::to_value(row)?;
        self.rows.entry(resource).or_default().push(value);
        Ok(())
    }

    pub fn seed_event(&self, event: &GameEvent) -> Result<()> {
        self.seed(Resource::GameEvents, event)
    }

    pub fn seed_substitution(&self, sub: &SubstitutionEvent) -> Result<()> {
        self.seed(Resource::Substitutions, sub)
    }

    /// Roster rows carry the game id alongside the roster itself
    pub fn seed_roster(&self, game_id: &str, roster: &TeamRoster) -> Result<()> {
        let mut value = serde_json::to_value(roster)?;
        if let Value::Object(map) = &mut value {
            map.insert("gameId".to_string(), Value::String(game_id.to_string()));
        }
        self.rows.entry(Resource::GameRosters).or_default().push(value);
        Ok(())
    }

    /// Make every call against `resource` fail as absent
    pub fn mark_absent(&self, resource: Resource) {
        self.absent.insert(resource);
    }

    pub fn fail_delete_of(&self, id: &str) {
        self.failing_deletes.insert(id.to_string());
    }

    pub fn fail_next_fetches(&self, count: u32) {
        self.pending_fetch_failures.store(count, Ordering::SeqCst);
    }

    pub fn set_writes_fail(&self, fail: bool) {
        self.writes_fail.store(fail, Ordering::SeqCst);
    }

    pub fn set_fetch_delay(&self, delay: Duration) {
        self.fetch_delay_ms.store(delay.as_millis() as u64, Ordering::SeqCst);
    }

    pub fn row_count(&self, resource: Resource) -> usize {
        self.rows.get(&resource).map(|rows| rows.len()).unwrap_or(0)
    }

    pub fn fetch_count(&self) -> u64 {
        self.fetches.load(Ordering::SeqCst)
    }

    pub fn insert_count(&self) -> u64 {
        self.inserts.load(Ordering::SeqCst)
    }

    pub fn update_count(&self) -> u64 {
        self.updates.load(Ordering::SeqCst)
    }

    pub fn delete_count(&self) -> u64 {
        self.deletes.load(Ordering::SeqCst)
    }

    fn check_present(&self, resource: Resource) -> Result<()> {
        if self.absent.contains(&resource) {
            return Err(CourtsideError::ResourceAbsent(resource.table().to_string()));
        }
        Ok(())
    }

    fn check_writable(&self) -> Result<()> {
        if self.writes_fail.load(Ordering::SeqCst) {
            return Err(CourtsideError::request(Some(503), "write rejected"));
        }
        Ok(())
    }
}

fn row_id(row: &Value) -> Option<&str> {
    row.get("id").and_then(Value::as_str)
}

fn order_key(row: &Value) -> (String, String) {
    let created = row
        .get("createdAt")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    (created, row_id(row).unwrap_or_default().to_string())
}

#[async_trait]
impl EventStore for MemoryEventStore {
    async fn fetch_rows(&self, resource: Resource, filter: &RowFilter) -> Result<Vec<Value>> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        self.check_present(resource)?;

        let delay = self.fetch_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }

        let failing = self
            .pending_fetch_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(CourtsideError::request(Some(503), "fetch rejected"));
        }

        let mut rows: Vec<Value> = self
            .rows
            .get(&resource)
            .map(|rows| rows.iter().filter(|r| filter.matches(r)).cloned().collect())
            .unwrap_or_default();
        rows.sort_by_key(order_key);
        Ok(rows)
    }

    async fn insert_row(&self, resource: Resource, mut row: Value) -> Result<Value> {
        self.inserts.fetch_add(1, Ordering::SeqCst);
        self.check_present(resource)?;
        self.check_writable()?;

        if row_id(&row).is_none() {
            if let Value::Object(map) = &mut row {
                map.insert("id".to_string(), Value::String(uuid::Uuid::new_v4().to_string()));
            }
        }
        self.rows.entry(resource).or_default().push(row.clone());
        Ok(row)
    }

    async fn update_row(&self, resource: Resource, id: &str, patch: Value) -> Result<()> {
        self.updates.fetch_add(1, Ordering::SeqCst);
        self.check_present(resource)?;
        self.check_writable()?;

        let mut rows = self.rows.entry(resource).or_default();
        let row = rows
            .iter_mut()
            .find(|r| row_id(r) == Some(id))
            .ok_or_else(|| CourtsideError::EventNotFound(format!("{resource}/{id}")))?;

        if let (Value::Object(target), Value::Object(fields)) = (row, patch) {
            for (key, value) in fields {
                target.insert(key, value);
            }
        }
        Ok(())
    }

    async fn delete_row(&self, resource: Resource, id: &str) -> Result<()> {
        self.deletes.fetch_add(1, Ordering::SeqCst);
        self.check_present(resource)?;
        self.check_writable()?;
        if self.failing_deletes.contains(id) {
            return Err(CourtsideError::request(Some(500), format!("delete of {id} rejected")));
        }

        let mut rows = self.rows.entry(resource).or_default();
        let before = rows.len();
        rows.retain(|r| row_id(r) != Some(id));
        if rows.len() == before {
            return Err(CourtsideError::EventNotFound(format!("{resource}/{id}")));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tokio_test::{assert_err, assert_ok};

    #[tokio::test]
    async fn test_fetch_filters_and_orders() {
        let store = MemoryEventStore::new();
        store
            .seed(Resource::GameEvents, &json!({"id": "b", "gameId": "g1", "createdAt": "2026-01-01T00:00:02Z"}))
            .unwrap();
        store
            .seed(Resource::GameEvents, &json!({"id": "a", "gameId": "g1", "createdAt": "2026-01-01T00:00:02Z"}))
            .unwrap();
        store
            .seed(Resource::GameEvents, &json!({"id": "c", "gameId": "g2", "createdAt": "2026-01-01T00:00:01Z"}))
            .unwrap();

        let rows = store
            .fetch_rows(Resource::GameEvents, &RowFilter::by_game("g1"))
            .await
            .unwrap();
        let ids: Vec<&str> = rows.iter().filter_map(row_id).collect();
        assert_eq!(ids, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_injected_failures() {
        let store = MemoryEventStore::new();
        store.seed(Resource::GameEvents, &json!({"id": "e1", "gameId": "g1"})).unwrap();
        store.fail_delete_of("e1");
        store.fail_next_fetches(1);
        store.mark_absent(Resource::GameRosters);

        let filter = RowFilter::by_game("g1");
        assert_err!(store.fetch_rows(Resource::GameEvents, &filter).await);
        let rows = assert_ok!(store.fetch_rows(Resource::GameEvents, &filter).await);
        assert_eq!(rows.len(), 1);
        assert_err!(store.delete_row(Resource::GameEvents, "e1").await);
        assert!(store
            .fetch_rows(Resource::GameRosters, &filter)
            .await
            .unwrap_err()
            .is_resource_absent());
        assert_eq!(store.row_count(Resource::GameEvents), 1);
    }

    #[tokio::test]
    async fn test_update_merges_and_missing_id_errors() {
        let store = MemoryEventStore::new();
        store
            .seed(Resource::GameEvents, &json!({"id": "e1", "gameId": "g1", "quarter": 1}))
            .unwrap();

        store
            .update_row(Resource::GameEvents, "e1", json!({"quarter": 2}))
            .await
            .unwrap();
        let rows = store
            .fetch_rows(Resource::GameEvents, &RowFilter::by_game("g1"))
            .await
            .unwrap();
        assert_eq!(rows[0]["quarter"], 2);

        let err = store
            .update_row(Resource::GameEvents, "nope", json!({"quarter": 3}))
            .await
            .unwrap_err();
        assert!(matches!(err, CourtsideError::EventNotFound(_)));
    }

    #[tokio::test]
    async fn test_roster_round_trip_through_trait() {
        let store = MemoryEventStore::new();
        let roster = TeamRoster::new("home", vec!["a".into(), "b".into()]);
        store.seed_roster("g1", &roster).unwrap();

        assert_eq!(store.fetch_roster("g1", "home").await.unwrap(), roster);
        assert!(store.fetch_roster("g1", "away").await.unwrap_err().is_resource_absent());
    }
}
