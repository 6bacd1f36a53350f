use super::fetcher::{Extract, QueryData};
use super::query_key::QueryKey;
use crate::error::ErrorInfo;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchStatus {
    Idle,
    Fetching,
    Success,
    Error,
}

/// One cache slot's state. Consumers only ever see clones of it.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub key: QueryKey,
    pub data: Option<Arc<QueryData>>,
    pub status: FetchStatus,
    pub error: Option<ErrorInfo>,
    pub fetched_at: Option<Instant>,
    pub stale_after: Duration,
    /// Set by invalidation, cleared by the next successful fetch
    pub invalidated: bool,
    /// Bumped on every applied fetch result
    pub version: u64,
}

/// Last good data is still shown, but the latest refetch failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StaleDataWarning {
    pub error: ErrorInfo,
    pub data_age: Option<Duration>,
}

impl CacheEntry {
    #[must_use]
    pub const fn new(key: QueryKey, stale_after: Duration) -> Self {
        Self {
            key,
            data: None,
            status: FetchStatus::Idle,
            error: None,
            fetched_at: None,
            stale_after,
            invalidated: false,
            version: 0,
        }
    }

    /// An entry needs a network call on next access when it has never
    /// succeeded, was invalidated, failed, or has outlived `stale_after`.
    #[must_use]
    pub fn is_stale(&self) -> bool {
        if self.invalidated || self.status == FetchStatus::Error {
            return true;
        }
        self.fetched_at
            .is_none_or(|at| at.elapsed() >= self.stale_after)
    }

    #[must_use]
    pub fn age(&self) -> Option<Duration> {
        self.fetched_at.map(|at| at.elapsed())
    }

    #[must_use]
    pub fn time_until_stale(&self) -> Option<Duration> {
        if self.invalidated {
            return None;
        }
        let age = self.age()?;
        self.stale_after.checked_sub(age).filter(|d| !d.is_zero())
    }

    #[must_use]
    pub const fn is_fetching(&self) -> bool {
        matches!(self.status, FetchStatus::Fetching)
    }

    /// Typed view of the cached data
    #[must_use]
    pub fn get<T: Extract>(&self) -> Option<&T> {
        self.data.as_deref().and_then(T::extract)
    }

    #[must_use]
    pub fn stale_data_warning(&self) -> Option<StaleDataWarning> {
        match (&self.data, &self.error) {
            (Some(_), Some(error)) => Some(StaleDataWarning {
                error: error.clone(),
                data_age: self.age(),
            }),
            _ => None,
        }
    }

    pub(crate) fn begin_fetch(&mut self) {
        self.status = FetchStatus::Fetching;
    }

    pub(crate) fn succeed(&mut self, data: QueryData) {
        debug_assert_eq!(self.status, FetchStatus::Fetching);
        self.data = Some(Arc::new(data));
        self.status = FetchStatus::Success;
        self.error = None;
        self.fetched_at = Some(Instant::now());
        self.invalidated = false;
        self.version += 1;
    }

    /// Previously cached data is kept so the last good value stays readable.
    pub(crate) fn fail(&mut self, error: ErrorInfo) {
        debug_assert_eq!(self.status, FetchStatus::Fetching);
        self.status = FetchStatus::Error;
        self.error = Some(error);
        self.version += 1;
    }

    pub(crate) fn mark_invalidated(&mut self) {
        self.invalidated = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::models::RubricList;
    use crate::error::Error;
    use crate::sync::query_key::Resource;

    fn entry(stale_after: Duration) -> CacheEntry {
        CacheEntry::new(QueryKey::bare(Resource::RubricList), stale_after)
    }

    fn rubrics() -> QueryData {
        let list: RubricList = serde_json::from_str(r#"{"items": []}"#).unwrap();
        QueryData::Rubrics(list.items)
    }

    #[tokio::test(start_paused = true)]
    async fn test_entry_expiry() {
        let mut data = entry(Duration::from_millis(100));
        assert!(data.is_stale());

        data.begin_fetch();
        data.succeed(rubrics());
        assert!(!data.is_stale());
        assert!(data.time_until_stale().is_some());

        tokio::time::advance(Duration::from_millis(150)).await;
        assert!(data.is_stale());
        assert!(data.time_until_stale().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_stale_after_is_always_stale() {
        let mut data = entry(Duration::ZERO);
        data.begin_fetch();
        data.succeed(rubrics());
        assert!(data.is_stale());
    }

    #[tokio::test(start_paused = true)]
    async fn test_status_transitions() {
        let mut data = entry(Duration::from_secs(60));
        assert_eq!(data.status, FetchStatus::Idle);

        data.begin_fetch();
        assert_eq!(data.status, FetchStatus::Fetching);
        data.succeed(rubrics());
        assert_eq!(data.status, FetchStatus::Success);
        assert_eq!(data.version, 1);

        data.mark_invalidated();
        assert!(data.is_stale());

        data.begin_fetch();
        data.fail(ErrorInfo::from(Error::transport(503, "unavailable")));
        assert_eq!(data.status, FetchStatus::Error);
        assert!(data.data.is_some(), "last good data survives a failed refetch");
        assert!(data.stale_data_warning().is_some());
        assert!(data.get::<Vec<crate::api::models::Rubric>>().is_some());
    }
}
