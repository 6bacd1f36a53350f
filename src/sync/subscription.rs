use super::cached_data::CacheEntry;
use super::query_cache::Inner;
use super::query_key::QueryKey;
use futures::Stream;
use std::pin::Pin;
use std::sync::Weak;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::sync::watch;
use tokio_stream::wrappers::WatchStream;
use uuid::Uuid;

/// A consumer's live binding to one cache slot.
///
/// Holds a snapshot receiver for the slot and counts toward its subscriber
/// total until dropped or [`Subscription::unsubscribe`]d.
pub struct Subscription {
    id: Uuid,
    key: QueryKey,
    receiver: watch::Receiver<CacheEntry>,
    owner: Option<Weak<Inner>>,
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("key", &self.key)
            .field("active", &self.is_active())
            .finish()
    }
}

impl Subscription {
    pub(crate) fn new(
        owner: Weak<Inner>,
        key: QueryKey,
        receiver: watch::Receiver<CacheEntry>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            key,
            receiver,
            owner: Some(owner),
        }
    }

    /// Binding for a disabled query: an idle snapshot that never changes.
    pub(crate) fn inert(key: QueryKey, stale_after: Duration) -> Self {
        let (_, receiver) = watch::channel(CacheEntry::new(key.clone(), stale_after));
        Self {
            id: Uuid::new_v4(),
            key,
            receiver,
            owner: None,
        }
    }

    #[must_use]
    pub const fn id(&self) -> Uuid {
        self.id
    }

    #[must_use]
    pub const fn key(&self) -> &QueryKey {
        &self.key
    }

    /// `false` for disabled queries
    #[must_use]
    pub const fn is_active(&self) -> bool {
        self.owner.is_some()
    }

    #[must_use]
    pub fn snapshot(&self) -> CacheEntry {
        self.receiver.borrow().clone()
    }

    /// Wait for the next published snapshot. `None` once the cache is gone
    /// or the query is disabled.
    pub async fn changed(&mut self) -> Option<CacheEntry> {
        self.receiver.changed().await.ok()?;
        Some(self.receiver.borrow_and_update().clone())
    }

    /// Wait until a snapshot satisfies `predicate`, checking the current one
    /// first.
    pub async fn wait_for(
        &mut self,
        mut predicate: impl FnMut(&CacheEntry) -> bool,
    ) -> Option<CacheEntry> {
        let entry = self.receiver.wait_for(|entry| predicate(entry)).await.ok()?;
        Some(entry.clone())
    }

    /// Stream of snapshots, starting with the current one. The subscription
    /// stays registered until the stream is dropped.
    #[must_use]
    pub fn into_stream(self) -> SubscriptionStream {
        SubscriptionStream {
            inner: WatchStream::new(self.receiver.clone()),
            _subscription: self,
        }
    }

    pub fn unsubscribe(self) {
        drop(self);
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(owner) = self.owner.take().and_then(|weak| weak.upgrade()) {
            owner.release(&self.key);
        }
    }
}

pub struct SubscriptionStream {
    inner: WatchStream<CacheEntry>,
    _subscription: Subscription,
}

impl Stream for SubscriptionStream {
    type Item = CacheEntry;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.inner).poll_next(cx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::cached_data::FetchStatus;
    use crate::sync::query_key::Resource;

    #[tokio::test]
    async fn test_inert_subscription_never_changes() {
        let mut sub = Subscription::inert(QueryKey::with_id(Resource::Job, ""), Duration::ZERO);
        assert!(!sub.is_active());
        assert_eq!(sub.snapshot().status, FetchStatus::Idle);
        assert!(sub.changed().await.is_none());
    }

    #[tokio::test]
    async fn test_ids_are_unique() {
        let key = QueryKey::bare(Resource::StatsOverview);
        let a = Subscription::inert(key.clone(), Duration::ZERO);
        let b = Subscription::inert(key, Duration::ZERO);
        assert_ne!(a.id(), b.id());
    }
}
