use super::cached_data::{CacheEntry, FetchStatus};
use super::config::SyncConfig;
use super::fetcher::{decode, request_for, QueryData};
use super::poller::{PollState, PollerHandle};
use super::queries::Query;
use super::query_key::{KeyPrefix, QueryKey};
use super::subscription::Subscription;
use crate::api::transport::Transport;
use crate::error::{Error, ErrorInfo, Result};
use futures::future::{BoxFuture, FutureExt, Shared};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

type SharedFetch = Shared<BoxFuture<'static, FetchOutcome>>;

/// What a fetch did to its slot. Every waiter attached to the same call
/// receives the same outcome.
#[derive(Debug, Clone)]
pub(crate) enum FetchOutcome {
    Applied(CacheEntry),
    /// Superseded by a newer epoch or torn down before it resolved
    Discarded,
}

struct InFlight {
    epoch: u64,
    cancel: CancellationToken,
    outcome: SharedFetch,
}

struct Slot {
    entry: CacheEntry,
    /// Epoch of the most recently issued call for this key
    epoch: u64,
    in_flight: Option<InFlight>,
    subscribers: usize,
    notifier: watch::Sender<CacheEntry>,
    poller: Option<PollerHandle>,
    idle_since: Option<Instant>,
}

impl Slot {
    fn new(key: QueryKey, stale_after: Duration) -> Self {
        let entry = CacheEntry::new(key, stale_after);
        let (notifier, _) = watch::channel(entry.clone());
        Self {
            entry,
            epoch: 0,
            in_flight: None,
            subscribers: 0,
            notifier,
            poller: None,
            idle_since: Some(Instant::now()),
        }
    }

    fn publish(&self) {
        self.notifier.send_replace(self.entry.clone());
    }
}

pub(crate) struct Inner {
    transport: Arc<dyn Transport>,
    config: SyncConfig,
    slots: Mutex<HashMap<QueryKey, Slot>>,
}

impl Inner {
    /// Every reaction runs to completion under this lock; nothing awaits
    /// while holding it.
    fn lock(&self) -> MutexGuard<'_, HashMap<QueryKey, Slot>> {
        self.slots.lock().unwrap_or_else(|poisoned| {
            warn!("Query cache lock poisoned by a prior panic, continuing with inner state");
            poisoned.into_inner()
        })
    }

    fn slot_for<'a>(slots: &'a mut HashMap<QueryKey, Slot>, query: &Query) -> &'a mut Slot {
        let slot = slots
            .entry(query.key.clone())
            .or_insert_with(|| Slot::new(query.key.clone(), query.stale_after));
        slot.entry.stale_after = query.stale_after;
        slot
    }

    /// Issue a new epoch for `key`, cancelling the call it supersedes.
    fn start_fetch(self: &Arc<Self>, key: &QueryKey, slot: &mut Slot) -> SharedFetch {
        if let Some(previous) = slot.in_flight.take() {
            debug!("⏭️  SUPERSEDED: {} (epoch {})", key, previous.epoch);
            previous.cancel.cancel();
        }

        slot.epoch += 1;
        let epoch = slot.epoch;
        slot.entry.begin_fetch();
        slot.publish();

        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let inner = Arc::clone(self);
        let key = key.clone();
        let request = request_for(&key);
        debug!("🔄 FETCH START: {} (epoch {})", key, epoch);

        let task = tokio::spawn(async move {
            let start = Instant::now();
            let timeout = inner.config.request_timeout;
            let result = tokio::select! {
                biased;
                () = token.cancelled() => return FetchOutcome::Discarded,
                result = tokio::time::timeout(timeout, inner.transport.send(request)) => {
                    result.unwrap_or_else(|_| Err(Error::Timeout(timeout)))
                }
            };
            let result = result.and_then(|body| decode(key.resource, body));
            inner.apply(&key, epoch, &token, result, start.elapsed())
        });

        let outcome = async move { task.await.unwrap_or(FetchOutcome::Discarded) }
            .boxed()
            .shared();
        slot.in_flight = Some(InFlight {
            epoch,
            cancel,
            outcome: outcome.clone(),
        });
        outcome
    }

    /// Apply a completed call, unless a newer epoch was issued or the slot
    /// was torn down while it was in flight.
    fn apply(
        &self,
        key: &QueryKey,
        epoch: u64,
        token: &CancellationToken,
        result: Result<QueryData>,
        elapsed: Duration,
    ) -> FetchOutcome {
        let mut slots = self.lock();
        let Some(slot) = slots.get_mut(key) else {
            debug!("🗑️  DISCARD: {} (epoch {}, slot evicted)", key, epoch);
            return FetchOutcome::Discarded;
        };
        if token.is_cancelled() || slot.epoch != epoch {
            debug!("🗑️  DISCARD: {} (epoch {}, current {})", key, epoch, slot.epoch);
            return FetchOutcome::Discarded;
        }

        slot.in_flight = None;
        match result {
            Ok(data) => {
                info!("✅ FETCH SUCCESS: {} ({:.2}s)", key, elapsed.as_secs_f64());
                slot.entry.succeed(data);
            }
            Err(e) => {
                error!("❌ FETCH FAILED: {} ({:.2}s) - {}", key, elapsed.as_secs_f64(), e);
                slot.entry.fail(ErrorInfo::from(&e));
            }
        }
        slot.publish();
        FetchOutcome::Applied(slot.entry.clone())
    }

    /// Drop one subscriber; the last one out cancels the poller and any
    /// call still in flight.
    pub(crate) fn release(&self, key: &QueryKey) {
        let mut slots = self.lock();
        let Some(slot) = slots.get_mut(key) else {
            return;
        };
        slot.subscribers = slot.subscribers.saturating_sub(1);
        if slot.subscribers > 0 {
            return;
        }

        if let Some(poller) = slot.poller.take() {
            poller.cancel();
        }
        if let Some(in_flight) = slot.in_flight.take() {
            debug!("✂️  CANCEL: {} (epoch {})", key, in_flight.epoch);
            in_flight.cancel.cancel();
            slot.entry.fail(ErrorInfo::cancelled());
            slot.publish();
        }
        slot.idle_since = Some(Instant::now());
        debug!("👋 Last subscriber left: {}", key);
    }
}

/// Keyed store of server snapshots.
///
/// Construct one per application and share it by cloning; clones refer to
/// the same slots. Methods that may start a fetch spawn onto the current
/// Tokio runtime.
#[derive(Clone)]
pub struct QueryCache {
    inner: Arc<Inner>,
}

impl fmt::Debug for QueryCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueryCache")
            .field("entries", &self.inner.lock().len())
            .field("config", &self.inner.config)
            .finish_non_exhaustive()
    }
}

impl QueryCache {
    #[must_use]
    pub fn new(transport: Arc<dyn Transport>, config: SyncConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                transport,
                config,
                slots: Mutex::new(HashMap::new()),
            }),
        }
    }

    #[must_use]
    pub fn config(&self) -> &SyncConfig {
        &self.inner.config
    }

    pub(crate) fn transport(&self) -> Arc<dyn Transport> {
        Arc::clone(&self.inner.transport)
    }

    /// Current entry for `query`, fetching first when it is absent or stale.
    ///
    /// Concurrent callers on the same key share a single transport call.
    /// A disabled query never fetches and yields its idle entry.
    pub async fn get(&self, query: &Query) -> CacheEntry {
        if !query.enabled {
            return self
                .peek(&query.key)
                .unwrap_or_else(|| CacheEntry::new(query.key.clone(), query.stale_after));
        }

        loop {
            let pending = {
                let mut slots = self.inner.lock();
                let slot = Inner::slot_for(&mut slots, query);
                if slot.subscribers == 0 {
                    slot.idle_since = Some(Instant::now());
                }
                if let Some(in_flight) = &slot.in_flight {
                    debug!("🔗 Cache JOIN: {} (epoch {})", query.key, in_flight.epoch);
                    in_flight.outcome.clone()
                } else if slot.entry.is_stale() {
                    if slot.entry.data.is_some() {
                        debug!("🔄 Cache STALE: {}", query.key);
                    } else {
                        debug!("❌ Cache MISS: {}", query.key);
                    }
                    self.inner.start_fetch(&query.key, slot)
                } else {
                    debug!("🎯 Cache HIT: {}", query.key);
                    return slot.entry.clone();
                }
            };

            if let FetchOutcome::Applied(entry) = pending.await {
                return entry;
            }
        }
    }

    /// Like [`QueryCache::get`] but surfaces a failed fetch as `Err`.
    ///
    /// # Errors
    ///
    /// Returns the fetch error recorded on the entry
    pub async fn load(&self, query: &Query) -> Result<CacheEntry> {
        let entry = self.get(query).await;
        match (&entry.status, &entry.error) {
            (FetchStatus::Error, Some(error)) => Err(Error::from(error.clone())),
            _ => Ok(entry),
        }
    }

    /// Read without fetching
    #[must_use]
    pub fn peek(&self, key: &QueryKey) -> Option<CacheEntry> {
        self.inner.lock().get(key).map(|slot| slot.entry.clone())
    }

    /// Force a fetch for an existing slot, joining the call in flight if
    /// there is one. Returns the entry as left by that call, or `None` when
    /// the slot is gone or the call was torn down.
    pub async fn refetch(&self, key: &QueryKey) -> Option<CacheEntry> {
        self.refetch_guarded(key, None).await
    }

    /// Poller tick. Starts nothing once `cancel` has fired or the last
    /// subscriber has left; both are checked under the slot lock, so a tick
    /// racing teardown never reaches the transport.
    pub(crate) async fn poll_refetch(
        &self,
        key: &QueryKey,
        cancel: &CancellationToken,
    ) -> Option<CacheEntry> {
        self.refetch_guarded(key, Some(cancel)).await
    }

    async fn refetch_guarded(
        &self,
        key: &QueryKey,
        poller: Option<&CancellationToken>,
    ) -> Option<CacheEntry> {
        loop {
            let pending = {
                let mut slots = self.inner.lock();
                let slot = slots.get_mut(key)?;
                if poller.is_some_and(|cancel| cancel.is_cancelled() || slot.subscribers == 0) {
                    debug!("Poll tick for {} skipped, no subscribers left", key);
                    return None;
                }
                match &slot.in_flight {
                    Some(in_flight) => in_flight.outcome.clone(),
                    None => self.inner.start_fetch(key, slot),
                }
            };

            match pending.await {
                FetchOutcome::Applied(entry) => return Some(entry),
                FetchOutcome::Discarded => {
                    // follow a newer epoch if one replaced ours
                    if self.inner.lock().get(key)?.in_flight.is_none() {
                        return None;
                    }
                }
            }
        }
    }

    /// Mark every matching entry stale and refetch the subscribed or
    /// in-flight ones now. Returns how many entries matched.
    pub fn invalidate(&self, prefix: &KeyPrefix) -> usize {
        let mut slots = self.inner.lock();
        let mut matched = 0;
        let mut refetched = 0;

        for (key, slot) in slots.iter_mut().filter(|(key, _)| prefix.matches(key)) {
            matched += 1;
            slot.entry.mark_invalidated();
            // a call already in flight may predate the write
            if slot.subscribers > 0 || slot.in_flight.is_some() {
                refetched += 1;
                drop(self.inner.start_fetch(key, slot));
            } else {
                slot.publish();
            }
        }

        info!(
            "🧹 INVALIDATE: {} ({} entries, {} refetched)",
            prefix, matched, refetched
        );
        matched
    }

    /// Register interest in `query`. The first subscriber triggers a fetch
    /// when the entry is stale and, for polling queries, arms the poller.
    /// Dropping the returned [`Subscription`] unsubscribes.
    #[must_use]
    pub fn subscribe(&self, query: &Query) -> Subscription {
        if !query.enabled {
            debug!("💤 Query disabled: {}", query.key);
            return Subscription::inert(query.key.clone(), query.stale_after);
        }

        let mut slots = self.inner.lock();
        let slot = Inner::slot_for(&mut slots, query);
        slot.subscribers += 1;
        slot.idle_since = None;
        let receiver = slot.notifier.subscribe();

        if slot.in_flight.is_none() && slot.entry.is_stale() {
            drop(self.inner.start_fetch(&query.key, slot));
        }

        if let Some(policy) = query.poll {
            if !slot.poller.as_ref().is_some_and(PollerHandle::is_active) {
                slot.poller = Some(PollerHandle::spawn(self.clone(), query.key.clone(), policy));
            }
        }

        debug!("👀 SUBSCRIBE: {} ({} subscribers)", query.key, slot.subscribers);
        Subscription::new(Arc::downgrade(&self.inner), query.key.clone(), receiver)
    }

    #[must_use]
    pub fn subscriber_count(&self, key: &QueryKey) -> usize {
        self.inner.lock().get(key).map_or(0, |slot| slot.subscribers)
    }

    #[must_use]
    pub fn poll_state(&self, key: &QueryKey) -> Option<PollState> {
        self.inner
            .lock()
            .get(key)
            .and_then(|slot| slot.poller.as_ref().map(PollerHandle::state))
    }

    /// Evict entries nobody subscribes to that have been idle for the
    /// configured delay. Returns the number evicted.
    pub fn collect_garbage(&self) -> usize {
        let gc_delay = self.inner.config.gc_delay;
        let mut slots = self.inner.lock();
        let before = slots.len();

        slots.retain(|key, slot| {
            let evict = slot.subscribers == 0
                && slot.in_flight.is_none()
                && slot.idle_since.is_some_and(|since| since.elapsed() >= gc_delay);
            if evict {
                debug!("🗑️  EVICT: {}", key);
            }
            !evict
        });

        let evicted = before - slots.len();
        if evicted > 0 {
            info!("🗑️  GC: evicted {} idle entries", evicted);
        }
        evicted
    }

    #[must_use]
    pub fn stats(&self) -> CacheStats {
        let slots = self.inner.lock();
        let count = |status: FetchStatus| {
            slots
                .values()
                .filter(|slot| slot.entry.status == status)
                .count()
        };

        CacheStats {
            total_entries: slots.len(),
            idle_entries: count(FetchStatus::Idle),
            fetching_entries: count(FetchStatus::Fetching),
            success_entries: count(FetchStatus::Success),
            error_entries: count(FetchStatus::Error),
            stale_entries: slots.values().filter(|s| s.entry.is_stale()).count(),
            subscribers: slots.values().map(|s| s.subscribers).sum(),
            active_pollers: slots
                .values()
                .filter(|s| s.poller.as_ref().is_some_and(PollerHandle::is_active))
                .count(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub total_entries: usize,
    pub idle_entries: usize,
    pub fetching_entries: usize,
    pub success_entries: usize,
    pub error_entries: usize,
    pub stale_entries: usize,
    pub subscribers: usize,
    pub active_pollers: usize,
}
