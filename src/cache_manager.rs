/**
Cache manager for `judgeboard`

Owns the transport, the query cache and the mutation coordinator for one
application instance. Nothing here is global: construct a manager at
startup, hand out clones of its cache, and call `shutdown` on exit.
*/
use crate::api::{ClientConfig, HttpTransport, Transport};
use crate::error::Result;
use crate::sync::{queries, MutationCoordinator, Query, QueryCache, Subscription, SyncConfig};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{debug, info};

pub struct CacheManager {
    cache: QueryCache,
    mutations: MutationCoordinator,
    gc_shutdown_tx: Option<mpsc::Sender<()>>,
    gc_handle: Option<JoinHandle<()>>,
}

impl CacheManager {
    /// Build a manager talking HTTP to the API described by `client`
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP transport cannot be created
    pub fn connect(client: &ClientConfig, sync: SyncConfig) -> Result<Self> {
        let transport = HttpTransport::new(client)?;
        info!("Cache manager connected to {}", transport.base_url());
        Ok(Self::with_transport(Arc::new(transport), sync))
    }

    #[must_use]
    pub fn with_transport(transport: Arc<dyn Transport>, sync: SyncConfig) -> Self {
        let cache = QueryCache::new(transport, sync);
        let mutations = MutationCoordinator::new(cache.clone());
        Self {
            cache,
            mutations,
            gc_shutdown_tx: None,
            gc_handle: None,
        }
    }

    #[must_use]
    pub const fn cache(&self) -> &QueryCache {
        &self.cache
    }

    #[must_use]
    pub const fn mutations(&self) -> &MutationCoordinator {
        &self.mutations
    }

    /// Subscribe to a job's progress, polling at the configured interval
    #[must_use]
    pub fn watch_job(&self, job_id: &str) -> Subscription {
        let query: Query = queries::job_progress(job_id, self.cache.config().poll_interval);
        self.cache.subscribe(&query)
    }

    /// Start the periodic eviction sweep. Calling it twice is a no-op.
    pub fn start_gc(&mut self) {
        if self.gc_handle.is_some() {
            return;
        }
        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);
        let cache = self.cache.clone();
        self.gc_handle = Some(tokio::spawn(run_gc_loop(cache, shutdown_rx)));
        self.gc_shutdown_tx = Some(shutdown_tx);
    }

    /// Stop background work
    ///
    /// This should be called on application exit
    pub async fn shutdown(&mut self) {
        if let Some(shutdown_tx) = self.gc_shutdown_tx.take() {
            let _ = shutdown_tx.send(()).await;
            info!("GC sweep shutdown requested");
        }
        if let Some(handle) = self.gc_handle.take() {
            let _ = handle.await;
        }
        let stats = self.cache.stats();
        debug!(
            "Cache at shutdown: {} entries, {} subscribers, {} pollers",
            stats.total_entries, stats.subscribers, stats.active_pollers
        );
    }
}

async fn run_gc_loop(cache: QueryCache, mut shutdown_rx: mpsc::Receiver<()>) {
    let interval = cache.config().gc_sweep_interval;
    info!("🗑️  GC sweep started (every {}s)", interval.as_secs());

    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => {
                info!("🛑 GC sweep shutting down");
                break;
            }
            () = sleep(interval) => {
                cache.collect_garbage();
            }
        }
    }
}
