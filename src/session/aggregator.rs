//! Stateful game session: optimistic mutation with reload-based
//! reconciliation.
//!
//! All state changes go through one mutex. Derived stats are recomputed from
//! the whole log on every change and published on a watch channel.

use serde_json::Value;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::{broadcast, watch, Mutex};
use tracing::{debug, info, warn};

use super::reload::ReloadScheduler;
use super::snapshot::{BatchDeleteOutcome, GameContext, GameSnapshot, SessionNotice};
use crate::adapters::EventStore;
use crate::domain::{
    EventLog, EventPatch, GameEvent, NewGameEvent, NewSubstitution, Resource, RowFilter, SubstitutionEvent,
};
use crate::error::{CourtsideError, Result};
use crate::feed::{RealtimeFeed, SubscriptionHandle};

const NOTICE_BUFFER: usize = 256;

struct SessionState {
    log: Arc<EventLog>,
    version: u64,
    /// Bumped by every local change; a reload that started under an older
    /// value must not overwrite local state
    mutation_seq: u64,
    in_flight: u32,
    reload_pending: bool,
    last_error: Option<String>,
}

pub struct StatAggregator {
    ctx: GameContext,
    store: Arc<dyn EventStore>,
    state: Mutex<SessionState>,
    snapshot_tx: watch::Sender<Arc<GameSnapshot>>,
    notices: broadcast::Sender<SessionNotice>,
    live: AtomicBool,
    scheduler: ReloadScheduler,
    subscriptions: Mutex<Vec<SubscriptionHandle>>,
}

impl StatAggregator {
    /// Create a session with an empty log. Call [`reload`](Self::reload) to
    /// load the authoritative log. Must be called from within a tokio runtime.
    pub fn new(ctx: GameContext, store: Arc<dyn EventStore>, quiet_period: Duration) -> Arc<Self> {
        let (snapshot_tx, _) = watch::channel(Arc::new(GameSnapshot::empty(&ctx)));
        let (notices, _) = broadcast::channel(NOTICE_BUFFER);

        Arc::new_cyclic(|weak: &Weak<StatAggregator>| {
            let weak = weak.clone();
            let scheduler = ReloadScheduler::spawn(quiet_period, move || {
                let weak = weak.clone();
                async move {
                    if let Some(session) = weak.upgrade() {
                        // failures are logged and published by reload itself
                        let _ = session.reload().await;
                    }
                }
            });

            Self {
                state: Mutex::new(SessionState {
                    log: Arc::new(EventLog::empty(ctx.game_id.clone())),
                    version: 0,
                    mutation_seq: 0,
                    in_flight: 0,
                    reload_pending: false,
                    last_error: None,
                }),
                ctx,
                store,
                snapshot_tx,
                notices,
                live: AtomicBool::new(true),
                scheduler,
                subscriptions: Mutex::new(Vec::new()),
            }
        })
    }

    pub fn context(&self) -> &GameContext {
        &self.ctx
    }

    pub fn game_id(&self) -> &str {
        &self.ctx.game_id
    }

    pub fn is_live(&self) -> bool {
        self.live.load(Ordering::SeqCst)
    }

    pub fn snapshot(&self) -> Arc<GameSnapshot> {
        self.snapshot_tx.borrow().clone()
    }

    pub fn watch(&self) -> watch::Receiver<Arc<GameSnapshot>> {
        self.snapshot_tx.subscribe()
    }

    pub fn notices(&self) -> broadcast::Receiver<SessionNotice> {
        self.notices.subscribe()
    }

    /// Schedule a debounced reload
    pub fn request_reload(&self) -> bool {
        self.is_live() && self.scheduler.schedule()
    }

    fn ensure_live(&self) -> Result<()> {
        if self.is_live() {
            Ok(())
        } else {
            Err(CourtsideError::Cancelled)
        }
    }

    fn publish(&self, state: &SessionState) {
        let snapshot = GameSnapshot::compute(
            &self.ctx,
            Arc::clone(&state.log),
            state.version,
            state.last_error.clone(),
        );
        self.snapshot_tx.send_replace(Arc::new(snapshot));
    }

    fn notify(&self, notice: SessionNotice) {
        // no receivers is fine
        let _ = self.notices.send(notice);
    }

    /// Fetch the authoritative log and replace local state with it.
    ///
    /// If a local mutation happened while the fetch was running, or one is
    /// still in flight, the result is dropped and the reload re-runs once
    /// mutations settle.
    pub async fn reload(&self) -> Result<()> {
        self.ensure_live()?;
        let started_seq = self.state.lock().await.mutation_seq;

        let result = self.store.fetch_log(&self.ctx.game_id).await;
        self.ensure_live()?;

        let mut state = self.state.lock().await;
        match result {
            Ok(log) => {
                if state.mutation_seq != started_seq || state.in_flight > 0 {
                    debug!(
                        "Reload of {} deferred (seq {} -> {}, {} in flight)",
                        self.ctx.game_id, started_seq, state.mutation_seq, state.in_flight
                    );
                    state.reload_pending = true;
                    let settled = state.in_flight == 0;
                    drop(state);
                    self.notify(SessionNotice::ReloadDeferred);
                    if settled {
                        self.scheduler.schedule();
                    }
                    return Ok(());
                }

                let (events, substitutions) = (log.events.len(), log.substitutions.len());
                state.log = Arc::new(log);
                state.version += 1;
                state.reload_pending = false;
                state.last_error = None;
                self.publish(&state);
                let version = state.version;
                drop(state);

                debug!(
                    "Reloaded {}: {} events, {} substitutions (v{})",
                    self.ctx.game_id, events, substitutions, version
                );
                self.notify(SessionNotice::Reloaded {
                    version,
                    events,
                    substitutions,
                });
                Ok(())
            }
            Err(e) => {
                warn!("Reload of {} failed: {}", self.ctx.game_id, e);
                state.reload_pending = true;
                state.last_error = Some(e.to_string());
                self.publish(&state);
                drop(state);
                self.notify(SessionNotice::ReloadFailed { error: e.to_string() });
                Err(e)
            }
        }
    }

    /// Apply a local change, bump the sequence and mark a mutation in flight
    async fn begin_mutation<F>(&self, apply: F) -> Result<()>
    where
        F: FnOnce(&mut EventLog) -> Result<()>,
    {
        self.ensure_live()?;
        let mut state = self.state.lock().await;
        let mut log = (*state.log).clone();
        apply(&mut log)?;

        state.log = Arc::new(log);
        state.mutation_seq += 1;
        state.in_flight += 1;
        state.version += 1;
        self.publish(&state);
        Ok(())
    }

    /// Finish a mutation; on failure surface the error and force a reload
    async fn settle(&self, operation: &str, result: Result<()>) -> Result<()> {
        let mut state = self.state.lock().await;
        state.in_flight = state.in_flight.saturating_sub(1);

        match result {
            Ok(()) => {
                let rerun = state.in_flight == 0 && state.reload_pending;
                drop(state);
                if rerun && self.is_live() {
                    self.scheduler.schedule();
                }
                Ok(())
            }
            Err(e) => {
                warn!("{} failed, reloading {}: {}", operation, self.ctx.game_id, e);
                state.last_error = Some(format!("{operation} failed: {e}"));
                self.publish(&state);
                drop(state);

                self.notify(SessionNotice::MutationFailed {
                    operation: operation.to_string(),
                    error: e.to_string(),
                });
                if self.is_live() {
                    if let Err(reload_err) = self.reload().await {
                        warn!("Reload after failed {} also failed: {}", operation, reload_err);
                    }
                }
                Err(e)
            }
        }
    }

    pub async fn edit_event(&self, id: &str, patch: EventPatch) -> Result<()> {
        if patch.is_empty() {
            return Err(CourtsideError::Validation("empty edit".to_string()));
        }
        let body = serde_json::to_value(&patch)?;

        self.begin_mutation(|log| {
            if log.patch_event(id, &patch) {
                Ok(())
            } else {
                Err(CourtsideError::EventNotFound(id.to_string()))
            }
        })
        .await?;

        info!("Editing event {} in {}", id, self.ctx.game_id);
        let result = self.store.update_row(Resource::GameEvents, id, body).await;
        self.settle("edit event", result).await
    }

    /// Delete one stat event or substitution
    pub async fn delete_event(&self, id: &str) -> Result<()> {
        let resource = self.resource_of(id).await?;
        self.begin_mutation(|log| {
            let ids: HashSet<&str> = [id].into_iter().collect();
            log.remove(&ids);
            Ok(())
        })
        .await?;

        info!("Deleting {} {} in {}", resource, id, self.ctx.game_id);
        let result = self.store.delete_row(resource, id).await;
        self.settle("delete event", result).await
    }

    /// Remove every id locally, then delete them remotely one by one. Any
    /// individual failure forces a full reload.
    pub async fn delete_batch(&self, ids: &[String]) -> Result<BatchDeleteOutcome> {
        let mut outcome = BatchDeleteOutcome {
            requested: ids.len(),
            ..Default::default()
        };

        let targets: Vec<(String, Option<Resource>)> = {
            let state = self.state.lock().await;
            ids.iter()
                .map(|id| (id.clone(), resource_in(&state.log, id)))
                .collect()
        };

        self.begin_mutation(|log| {
            let set: HashSet<&str> = ids.iter().map(String::as_str).collect();
            log.remove(&set);
            Ok(())
        })
        .await?;

        info!("Deleting {} items from {}", ids.len(), self.ctx.game_id);
        for (id, resource) in targets {
            if !self.is_live() {
                break;
            }
            let result = match resource {
                Some(resource) => self.store.delete_row(resource, &id).await,
                None => Err(CourtsideError::EventNotFound(id.clone())),
            };
            match result {
                Ok(()) => outcome.deleted += 1,
                Err(e) => {
                    warn!("Batch delete of {} failed: {}", id, e);
                    outcome.failed.push((id, e.to_string()));
                }
            }
        }

        let result = if outcome.failed.is_empty() {
            Ok(())
        } else {
            outcome.reloaded = true;
            Err(CourtsideError::Internal(format!(
                "{} of {} deletes failed",
                outcome.failed.len(),
                outcome.requested
            )))
        };

        // The batch error is carried in the outcome
        let _ = self.settle("batch delete", result).await;
        Ok(outcome)
    }

    /// Insert a stat event; local state changes only once the store accepted it
    pub async fn record_event(&self, new: NewGameEvent) -> Result<GameEvent> {
        let event = new.into_event(&self.ctx.game_id);
        let row = serde_json::to_value(&event)?;
        let stored = self.insert(Resource::GameEvents, row, "record event").await?;
        let stored = serde_json::from_value::<GameEvent>(stored).unwrap_or(event);

        self.apply_insert(|log| {
            if !log.contains(&stored.id) {
                log.push_event(stored.clone());
            }
        })
        .await;
        Ok(stored)
    }

    pub async fn record_substitution(&self, new: NewSubstitution) -> Result<SubstitutionEvent> {
        let sub = new.into_event(&self.ctx.game_id);
        let row = serde_json::to_value(&sub)?;
        let stored = self.insert(Resource::Substitutions, row, "record substitution").await?;
        let stored = serde_json::from_value::<SubstitutionEvent>(stored).unwrap_or(sub);

        self.apply_insert(|log| {
            if !log.contains(&stored.id) {
                log.push_substitution(stored.clone());
            }
        })
        .await;
        Ok(stored)
    }

    /// Remote insert with the mutation counted in flight, so a concurrent
    /// reload cannot publish a log that misses it
    async fn insert(&self, resource: Resource, row: Value, operation: &str) -> Result<Value> {
        self.ensure_live()?;
        self.state.lock().await.in_flight += 1;

        match self.store.insert_row(resource, row).await {
            Ok(stored) => Ok(stored),
            Err(e) => {
                let mut state = self.state.lock().await;
                state.in_flight = state.in_flight.saturating_sub(1);
                state.last_error = Some(format!("{operation} failed: {e}"));
                self.publish(&state);
                let rerun = state.in_flight == 0 && state.reload_pending;
                drop(state);

                if rerun && self.is_live() {
                    self.scheduler.schedule();
                }
                self.notify(SessionNotice::MutationFailed {
                    operation: operation.to_string(),
                    error: e.to_string(),
                });
                Err(e)
            }
        }
    }

    async fn apply_insert<F>(&self, apply: F)
    where
        F: FnOnce(&mut EventLog),
    {
        let mut state = self.state.lock().await;
        state.in_flight = state.in_flight.saturating_sub(1);
        if self.is_live() {
            let mut log = (*state.log).clone();
            apply(&mut log);
            state.log = Arc::new(log);
            state.mutation_seq += 1;
            state.version += 1;
            self.publish(&state);
        }
        let rerun = state.in_flight == 0 && state.reload_pending;
        drop(state);

        if rerun && self.is_live() {
            self.scheduler.schedule();
        }
    }

    async fn resource_of(&self, id: &str) -> Result<Resource> {
        let state = self.state.lock().await;
        resource_in(&state.log, id).ok_or_else(|| CourtsideError::EventNotFound(id.to_string()))
    }

    /// Subscribe to stat events and substitutions of this game. Every change
    /// is forwarded as a notice and schedules a debounced reload.
    pub async fn attach_feed(self: &Arc<Self>, feed: &RealtimeFeed) -> Result<()> {
        self.ensure_live()?;
        let mut handles = self.subscriptions.lock().await;

        for resource in [Resource::GameEvents, Resource::Substitutions] {
            let weak = Arc::downgrade(self);
            let handle = feed.subscribe(resource, RowFilter::by_game(&self.ctx.game_id), move |change| {
                if let Some(session) = weak.upgrade() {
                    if session.is_live() {
                        session.notify(SessionNotice::Change(change));
                        session.request_reload();
                    }
                }
            });
            handles.push(handle);
        }

        info!("Session {} attached to feed", self.ctx.game_id);
        Ok(())
    }

    /// Stop the session: no further state is applied, subscriptions and the
    /// pending reload are torn down.
    pub async fn close(&self) {
        if !self.live.swap(false, Ordering::SeqCst) {
            return;
        }

        let handles: Vec<SubscriptionHandle> = self.subscriptions.lock().await.drain(..).collect();
        for handle in handles {
            handle.unsubscribe();
        }
        self.scheduler.stop();
        self.notify(SessionNotice::Closed);
        info!("Session {} closed", self.ctx.game_id);
    }
}

fn resource_in(log: &EventLog, id: &str) -> Option<Resource> {
    if log.events.iter().any(|e| e.id == id) {
        Some(Resource::GameEvents)
    } else if log.substitutions.iter().any(|s| s.id == id) {
        Some(Resource::Substitutions)
    } else {
        None
    }
}
