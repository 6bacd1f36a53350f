use super::cached_data::FetchStatus;
use super::fetcher::QueryData;
use super::query_cache::QueryCache;
use super::query_key::QueryKey;
use crate::api::models::JobProgress;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Re-fetch a key on a fixed interval until `until` holds for a freshly
/// fetched snapshot.
#[derive(Debug, Clone, Copy)]
pub struct PollPolicy {
    pub interval: Duration,
    pub until: fn(&QueryData) -> bool,
}

impl PollPolicy {
    #[must_use]
    pub const fn new(interval: Duration, until: fn(&QueryData) -> bool) -> Self {
        Self { interval, until }
    }

    /// Poll a job's progress until it completes or reaches a terminal status
    #[must_use]
    pub const fn job_progress(interval: Duration) -> Self {
        Self::new(interval, job_finished)
    }
}

fn job_finished(data: &QueryData) -> bool {
    data.get::<JobProgress>().is_some_and(JobProgress::is_terminal)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollState {
    /// A fetch is due or in flight
    Armed,
    /// Sleeping until the next tick
    Waiting,
    /// The predicate held; no further fetches
    Terminated,
    /// Torn down by the last subscriber leaving
    Cancelled,
}

pub(crate) struct PollerHandle {
    cancel: CancellationToken,
    state: watch::Receiver<PollState>,
    task: JoinHandle<()>,
}

impl PollerHandle {
    pub(crate) fn spawn(cache: QueryCache, key: QueryKey, policy: PollPolicy) -> Self {
        let cancel = CancellationToken::new();
        let (state_tx, state) = watch::channel(PollState::Armed);
        let task = tokio::spawn(run(cache, key, policy, cancel.clone(), state_tx));
        Self { cancel, state, task }
    }

    pub(crate) fn state(&self) -> PollState {
        *self.state.borrow()
    }

    pub(crate) fn is_active(&self) -> bool {
        !self.task.is_finished()
            && matches!(self.state(), PollState::Armed | PollState::Waiting)
    }

    pub(crate) fn cancel(self) {
        self.cancel.cancel();
    }
}

async fn run(
    cache: QueryCache,
    key: QueryKey,
    policy: PollPolicy,
    cancel: CancellationToken,
    state: watch::Sender<PollState>,
) {
    info!("⏱️  POLL START: {} every {}ms", key, policy.interval.as_millis());
    let mut ticks: u64 = 0;

    loop {
        state.send_replace(PollState::Armed);
        ticks += 1;

        let fetched = tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            fetched = cache.poll_refetch(&key, &cancel) => fetched,
        };

        // the predicate only ever sees the snapshot this tick produced
        match fetched {
            Some(entry) if entry.status == FetchStatus::Success => {
                if entry.data.as_deref().is_some_and(policy.until) {
                    info!("🏁 POLL DONE: {} after {} fetches", key, ticks);
                    state.send_replace(PollState::Terminated);
                    return;
                }
            }
            Some(entry) => {
                let reason = entry.error.map(|e| e.message).unwrap_or_default();
                warn!("⚠️  POLL FETCH FAILED: {} - {} (will retry)", key, reason);
            }
            None => debug!("Poll tick for {} produced no result", key),
        }

        state.send_replace(PollState::Waiting);
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            () = tokio::time::sleep(policy.interval) => {}
        }
    }

    state.send_replace(PollState::Cancelled);
    info!("🛑 POLL CANCELLED: {} after {} fetches", key, ticks);
}
