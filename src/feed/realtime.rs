//! Push/poll hybrid change delivery.
//!
//! Each subscription gets its own driver task. The driver tries the push
//! channel first; on a subscribe failure, a subscribe timeout, or a
//! mid-session error it falls back to fixed-interval polling, diffing
//! snapshots of the filtered resource into the same `ChangeEvent` shape the
//! push channel produces. Polling is never promoted back to push.

use dashmap::DashMap;
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, sleep, timeout, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use super::health::HealthMonitor;
use crate::adapters::{EventStore, PushChannel, PushMessage, PushSubscription, RetryPolicy};
use crate::config::{FeedConfig, RequestConfig};
use crate::domain::{ChangeEvent, ChangeKind, DeliverySource, Resource, RowFilter};
use crate::error::Result;

/// Callback invoked for every delivered change
pub type ChangeCallback = Arc<dyn Fn(ChangeEvent) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FeedState {
    Connecting,
    Connected,
    DegradedPolling,
    Closed,
}

impl fmt::Display for FeedState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FeedState::Connecting => write!(f, "connecting"),
            FeedState::Connected => write!(f, "connected"),
            FeedState::DegradedPolling => write!(f, "degraded-polling"),
            FeedState::Closed => write!(f, "closed"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct FeedSettings {
    pub fallback_enabled: bool,
    pub subscribe_timeout: Duration,
    pub initial_poll_delay: Duration,
    pub poll_interval: Duration,
    /// Backoff between push attempts when fallback is disabled
    pub reconnect: RetryPolicy,
}

impl Default for FeedSettings {
    fn default() -> Self {
        Self::from_config(&FeedConfig::default(), &RequestConfig::default())
    }
}

impl FeedSettings {
    pub fn from_config(feed: &FeedConfig, request: &RequestConfig) -> Self {
        Self {
            fallback_enabled: feed.fallback_enabled,
            subscribe_timeout: feed.subscribe_timeout(),
            initial_poll_delay: feed.initial_poll_delay(),
            poll_interval: feed.poll_interval(),
            reconnect: request.retry_policy(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(u64);

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

struct SubscriptionEntry {
    resource: Resource,
    state: Arc<watch::Sender<FeedState>>,
    live: Arc<AtomicBool>,
    task: JoinHandle<()>,
}

type SubscriptionMap = DashMap<SubscriptionId, SubscriptionEntry>;

/// Owned connection manager for change subscriptions.
///
/// Independent instances share nothing. Dropping the feed tears down every
/// subscription it still holds.
pub struct RealtimeFeed {
    store: Arc<dyn EventStore>,
    push: Option<Arc<dyn PushChannel>>,
    settings: FeedSettings,
    health: Arc<HealthMonitor>,
    subscriptions: Arc<SubscriptionMap>,
    next_id: AtomicU64,
}

impl RealtimeFeed {
    pub fn new(store: Arc<dyn EventStore>, push: Arc<dyn PushChannel>, settings: FeedSettings) -> Self {
        Self::build(store, Some(push), settings)
    }

    /// Feed without a push channel; every subscription polls
    pub fn polling_only(store: Arc<dyn EventStore>, settings: FeedSettings) -> Self {
        Self::build(store, None, settings)
    }

    fn build(
        store: Arc<dyn EventStore>,
        push: Option<Arc<dyn PushChannel>>,
        settings: FeedSettings,
    ) -> Self {
        Self {
            store,
            push,
            settings,
            health: Arc::new(HealthMonitor::new()),
            subscriptions: Arc::new(DashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    pub fn with_health(mut self, health: Arc<HealthMonitor>) -> Self {
        self.health = health;
        self
    }

    pub fn health(&self) -> Arc<HealthMonitor> {
        Arc::clone(&self.health)
    }

    pub fn settings(&self) -> &FeedSettings {
        &self.settings
    }

    /// Start delivering changes of `resource` rows matching `filter`.
    ///
    /// Must be called from within a tokio runtime.
    pub fn subscribe<F>(&self, resource: Resource, filter: RowFilter, on_change: F) -> SubscriptionHandle
    where
        F: Fn(ChangeEvent) + Send + Sync + 'static,
    {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let (state_tx, _) = watch::channel(FeedState::Connecting);
        let state = Arc::new(state_tx);
        let live = Arc::new(AtomicBool::new(true));

        let driver = Driver {
            id,
            resource,
            filter,
            store: Arc::clone(&self.store),
            push: self.push.clone(),
            settings: self.settings.clone(),
            health: Arc::clone(&self.health),
            state: Arc::clone(&state),
            live: Arc::clone(&live),
            on_change: Arc::new(on_change),
        };

        info!("Subscribing {} to {} ({})", id, resource, driver.filter.expression());
        let task = tokio::spawn(driver.run());

        self.subscriptions.insert(
            id,
            SubscriptionEntry {
                resource,
                state,
                live,
                task,
            },
        );

        SubscriptionHandle {
            id,
            subscriptions: Arc::clone(&self.subscriptions),
            health: Arc::clone(&self.health),
        }
    }

    /// Tear down one subscription; false if it was already gone
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        teardown(&self.subscriptions, &self.health, id)
    }

    pub fn close_all(&self) {
        let ids: Vec<SubscriptionId> = self.subscriptions.iter().map(|e| *e.key()).collect();
        for id in ids {
            teardown(&self.subscriptions, &self.health, id);
        }
    }

    pub fn state(&self, id: SubscriptionId) -> Option<FeedState> {
        self.subscriptions.get(&id).map(|e| *e.state.borrow())
    }

    pub fn watch_state(&self, id: SubscriptionId) -> Option<watch::Receiver<FeedState>> {
        self.subscriptions.get(&id).map(|e| e.state.subscribe())
    }

    pub fn resource_of(&self, id: SubscriptionId) -> Option<Resource> {
        self.subscriptions.get(&id).map(|e| e.resource)
    }

    pub fn active_count(&self) -> usize {
        self.subscriptions.len()
    }
}

impl Drop for RealtimeFeed {
    fn drop(&mut self) {
        self.close_all();
    }
}

fn teardown(subscriptions: &SubscriptionMap, health: &HealthMonitor, id: SubscriptionId) -> bool {
    let Some((_, entry)) = subscriptions.remove(&id) else {
        return false;
    };

    entry.live.store(false, Ordering::SeqCst);
    let previous = entry.state.send_replace(FeedState::Closed);
    entry.task.abort();

    match previous {
        FeedState::Connected => health.record_disconnect(),
        FeedState::DegradedPolling => health.record_polling_stopped(),
        _ => {}
    }

    info!("Closed subscription {} ({})", id, entry.resource);
    true
}

/// Returned by [`RealtimeFeed::subscribe`]; call `unsubscribe` to stop delivery
pub struct SubscriptionHandle {
    id: SubscriptionId,
    subscriptions: Arc<SubscriptionMap>,
    health: Arc<HealthMonitor>,
}

impl SubscriptionHandle {
    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    pub fn state(&self) -> FeedState {
        self.subscriptions
            .get(&self.id)
            .map(|e| *e.state.borrow())
            .unwrap_or(FeedState::Closed)
    }

    pub fn unsubscribe(self) -> bool {
        teardown(&self.subscriptions, &self.health, self.id)
    }
}

impl fmt::Debug for SubscriptionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubscriptionHandle").field("id", &self.id).finish()
    }
}

/// Per-subscription delivery task
struct Driver {
    id: SubscriptionId,
    resource: Resource,
    filter: RowFilter,
    store: Arc<dyn EventStore>,
    push: Option<Arc<dyn PushChannel>>,
    settings: FeedSettings,
    health: Arc<HealthMonitor>,
    state: Arc<watch::Sender<FeedState>>,
    live: Arc<AtomicBool>,
    on_change: ChangeCallback,
}

impl Driver {
    async fn run(self) {
        // Rows written while push connects or goes quiet surface in the
        // first poll diff against this baseline.
        let mut baseline = self.baseline().await;

        let Some(push) = self.push.clone() else {
            debug!("{}: no push channel configured, polling", self.id);
            self.poll_loop(baseline).await;
            return;
        };

        let mut retry: u32 = 0;
        loop {
            self.set_state(FeedState::Connecting);

            let failure = match timeout(
                self.settings.subscribe_timeout,
                push.subscribe(self.resource, &self.filter),
            )
            .await
            {
                Ok(Ok(mut subscription)) => {
                    self.set_state(FeedState::Connected);
                    self.health.record_connect();
                    info!("{}: push subscription active for {}", self.id, self.resource);
                    retry = 0;

                    let reason = self.pump(&mut subscription, &mut baseline).await;
                    subscription.close();
                    self.health.record_disconnect();
                    reason
                }
                Ok(Err(e)) if e.is_resource_absent() => {
                    info!("{}: push channel unavailable ({}), polling", self.id, e);
                    self.poll_loop(baseline).await;
                    return;
                }
                Ok(Err(e)) => format!("subscribe failed: {e}"),
                Err(_) => format!("subscribe timed out after {:?}", self.settings.subscribe_timeout),
            };

            if !self.is_live() {
                return;
            }
            self.health.record_error(&failure).await;

            if self.settings.fallback_enabled {
                warn!("{}: {}; falling back to polling", self.id, failure);
                self.poll_loop(baseline).await;
                return;
            }

            let delay = self.settings.reconnect.backoff_duration(retry);
            retry = retry.saturating_add(1);
            warn!("{}: {}; retrying push in {:?}", self.id, failure, delay);
            sleep(delay).await;
        }
    }

    /// Forward push messages until the channel fails; returns the reason.
    /// Delivered changes are folded into `baseline` so a later fallback
    /// does not deliver them twice.
    async fn pump(&self, subscription: &mut PushSubscription, baseline: &mut Option<Snapshot>) -> String {
        loop {
            match subscription.messages.recv().await {
                Some(PushMessage::Change(change)) => {
                    if let Some(snapshot) = baseline.as_mut() {
                        apply_change(snapshot, &change);
                    }
                    self.deliver(change).await
                }
                Some(PushMessage::Error(message)) => return format!("push channel error: {message}"),
                None => return "push channel closed".to_string(),
            }
        }
    }

    async fn baseline(&self) -> Option<Snapshot> {
        match self.fetch_snapshot().await {
            Ok(rows) => Some(rows),
            Err(e) => {
                warn!("{}: baseline poll failed: {}", self.id, e);
                self.health.record_error(&e.to_string()).await;
                None
            }
        }
    }

    async fn poll_loop(&self, mut snapshot: Option<Snapshot>) {
        self.set_state(FeedState::DegradedPolling);
        self.health.record_polling_started();

        let start = Instant::now() + self.settings.initial_poll_delay;
        let period = self.settings.poll_interval.max(MIN_POLL_INTERVAL);
        let mut ticker = interval_at(start, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            if !self.is_live() {
                return;
            }

            match self.fetch_snapshot().await {
                Ok(current) => {
                    match &snapshot {
                        Some(previous) => {
                            for change in diff_snapshots(self.resource, previous, &current) {
                                self.deliver(change).await;
                            }
                        }
                        None => debug!("{}: first successful poll becomes the baseline", self.id),
                    }
                    snapshot = Some(current);
                }
                Err(e) => {
                    warn!("{}: poll failed, keeping previous snapshot: {}", self.id, e);
                    self.health.record_error(&e.to_string()).await;
                }
            }
        }
    }

    async fn fetch_snapshot(&self) -> Result<Snapshot> {
        let rows = self.store.fetch_rows(self.resource, &self.filter).await?;
        Ok(snapshot_of(rows))
    }

    async fn deliver(&self, change: ChangeEvent) {
        if !self.is_live() {
            return;
        }
        self.health.record_event().await;
        debug!(
            "{}: {} {} {:?} via {:?}",
            self.id,
            change.resource,
            change.kind,
            change.record_id(),
            change.source
        );
        (self.on_change)(change);
    }

    fn set_state(&self, state: FeedState) {
        if self.is_live() {
            self.state.send_replace(state);
        }
    }

    fn is_live(&self) -> bool {
        self.live.load(Ordering::SeqCst)
    }
}

/// Rows keyed by id
pub type Snapshot = BTreeMap<String, Value>;

/// Floor for the polling period; `interval_at` rejects zero
const MIN_POLL_INTERVAL: Duration = Duration::from_millis(1);

/// Fold one delivered change into a snapshot
pub fn apply_change(snapshot: &mut Snapshot, change: &ChangeEvent) {
    let Some(id) = change.record_id() else {
        return;
    };
    match change.kind {
        ChangeKind::Delete => {
            snapshot.remove(id);
        }
        ChangeKind::Insert | ChangeKind::Update => {
            snapshot.insert(id.to_string(), change.record.clone());
        }
    }
}

pub fn snapshot_of(rows: Vec<Value>) -> Snapshot {
    rows.into_iter()
        .filter_map(|row| {
            let id = row.get("id").and_then(Value::as_str)?.to_string();
            Some((id, row))
        })
        .collect()
}

/// One change per differing record: deletes, then updates, then inserts,
/// each ordered by id.
pub fn diff_snapshots(resource: Resource, previous: &Snapshot, current: &Snapshot) -> Vec<ChangeEvent> {
    let deletes = previous
        .iter()
        .filter(|(id, _)| !current.contains_key(*id))
        .map(|(_, old)| {
            ChangeEvent::new(resource, ChangeKind::Delete, old.clone(), Some(old.clone()), DeliverySource::Poll)
        });

    let updates = current.iter().filter_map(|(id, row)| {
        let old = previous.get(id)?;
        (old != row).then(|| {
            ChangeEvent::new(resource, ChangeKind::Update, row.clone(), Some(old.clone()), DeliverySource::Poll)
        })
    });

    let inserts = current
        .iter()
        .filter(|(id, _)| !previous.contains_key(*id))
        .map(|(_, row)| ChangeEvent::new(resource, ChangeKind::Insert, row.clone(), None, DeliverySource::Poll));

    deletes.chain(updates).chain(inserts).collect()
}
