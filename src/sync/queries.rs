/**
 * Query descriptors for every dashboard view.
 *
 * A descriptor names the cache key, how long a successful result is served
 * without refetching, whether the query may run at all, and whether it polls.
 */
use super::config::{
    DEFAULT_STALE_SECS, META_EVALUATION_STALE_SECS, STATS_OVERVIEW_STALE_SECS,
    TIMESERIES_STALE_SECS,
};
use super::poller::PollPolicy;
use super::query_key::{ListParams, QueryKey, Resource};
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct Query {
    pub key: QueryKey,
    pub stale_after: Duration,
    /// Disabled queries never touch the transport
    pub enabled: bool,
    pub poll: Option<PollPolicy>,
}

impl Query {
    #[must_use]
    pub const fn new(key: QueryKey) -> Self {
        Self {
            key,
            stale_after: Duration::from_secs(DEFAULT_STALE_SECS),
            enabled: true,
            poll: None,
        }
    }

    #[must_use]
    pub fn stale_after(mut self, stale_after: Duration) -> Self {
        self.stale_after = stale_after;
        self
    }

    #[must_use]
    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    #[must_use]
    pub fn poll(mut self, policy: PollPolicy) -> Self {
        self.poll = Some(policy);
        self
    }
}

fn detail(resource: Resource, id: &str) -> Query {
    let id = id.trim();
    Query::new(QueryKey::with_id(resource, id)).enabled(!id.is_empty())
}

#[must_use]
pub fn conversations(params: &ListParams) -> Query {
    let params = ListParams {
        status: None,
        min_score: None,
        max_score: None,
        critical_error: None,
        compliance_issue: None,
        ..params.clone()
    };
    Query::new(QueryKey::new(Resource::ConversationList, params.to_params()))
}

#[must_use]
pub fn conversation(id: &str) -> Query {
    detail(Resource::Conversation, id)
}

#[must_use]
pub fn evaluations(params: &ListParams) -> Query {
    let params = ListParams {
        search: None,
        status: None,
        ..params.clone()
    };
    Query::new(QueryKey::new(Resource::EvaluationList, params.to_params()))
}

#[must_use]
pub fn evaluation(id: &str) -> Query {
    detail(Resource::Evaluation, id)
}

#[must_use]
pub fn jobs(params: &ListParams) -> Query {
    let params = ListParams {
        status: params.status,
        ..ListParams::default().page(params.page, params.page_size)
    };
    Query::new(QueryKey::new(Resource::JobList, params.to_params()))
}

#[must_use]
pub fn job(id: &str) -> Query {
    detail(Resource::Job, id)
}

/// Progress of one job, polled every `interval` until it finishes.
#[must_use]
pub fn job_progress(id: &str, interval: Duration) -> Query {
    detail(Resource::JobProgress, id).poll(PollPolicy::job_progress(interval))
}

#[must_use]
pub fn stats_overview() -> Query {
    Query::new(QueryKey::bare(Resource::StatsOverview))
        .stale_after(Duration::from_secs(STATS_OVERVIEW_STALE_SECS))
}

#[must_use]
pub fn stats_timeseries(days: u32) -> Query {
    let mut key = QueryKey::bare(Resource::StatsTimeseries);
    key.params.insert("days".to_string(), days.to_string());
    key.params.insert("metric".to_string(), "avg_score".to_string());
    Query::new(key).stale_after(Duration::from_secs(TIMESERIES_STALE_SECS))
}

#[must_use]
pub fn rubrics() -> Query {
    Query::new(QueryKey::bare(Resource::RubricList))
}

#[must_use]
pub fn rubric(id: &str) -> Query {
    detail(Resource::Rubric, id)
}

/// Human annotations, optionally narrowed to one evaluation or one
/// annotator. Only paging is taken from `params`.
#[must_use]
pub fn annotations(
    params: &ListParams,
    evaluation_id: Option<&str>,
    annotator_id: Option<&str>,
) -> Query {
    let mut key = QueryKey::new(
        Resource::AnnotationList,
        ListParams::default().page(params.page, params.page_size).to_params(),
    );
    let filters = [("evaluation_id", evaluation_id), ("annotator_id", annotator_id)];
    for (name, value) in filters {
        if let Some(value) = value.map(str::trim).filter(|v| !v.is_empty()) {
            key.params.insert(name.to_string(), value.to_string());
        }
    }
    Query::new(key)
}

#[must_use]
pub fn meta_evaluation() -> Query {
    Query::new(QueryKey::bare(Resource::MetaEvaluation))
        .stale_after(Duration::from_secs(META_EVALUATION_STALE_SECS))
}

#[must_use]
pub fn health() -> Query {
    Query::new(QueryKey::bare(Resource::Health))
}
