use super::query_key::{QueryKey, Resource};
use crate::api::models::{
    Annotation, Conversation, DailyScore, Evaluation, Health, Job, JobProgress, MetaEvaluation,
    Page, Rubric, RubricList, StatsOverview, TimeseriesResponse,
};
use crate::api::transport::ApiRequest;
use crate::error::Result;
use serde_json::Value;

/// Decoded snapshot of one resource view
#[derive(Debug, Clone, PartialEq)]
pub enum QueryData {
    Conversations(Page<Conversation>),
    Conversation(Conversation),
    Evaluations(Page<Evaluation>),
    Evaluation(Evaluation),
    Jobs(Page<Job>),
    Job(Job),
    JobProgress(JobProgress),
    StatsOverview(StatsOverview),
    Timeseries(Vec<DailyScore>),
    Rubrics(Vec<Rubric>),
    Rubric(Rubric),
    Annotations(Page<Annotation>),
    MetaEvaluation(MetaEvaluation),
    Health(Health),
}

/// Build the transport request that fills `key`'s slot.
///
/// Detail views take their identifier from the `id` parameter; every other
/// parameter is passed through as a query string pair.
#[must_use]
pub fn request_for(key: &QueryKey) -> ApiRequest {
    let id = key.param("id").unwrap_or_default();
    let query = key
        .params
        .iter()
        .filter(|(k, _)| k.as_str() != "id")
        .map(|(k, v)| (k.clone(), v.clone()));

    let path = match key.resource {
        Resource::ConversationList => "/conversations".to_string(),
        Resource::Conversation => format!("/conversations/{id}"),
        Resource::EvaluationList => "/evaluations".to_string(),
        Resource::Evaluation => format!("/evaluations/{id}"),
        Resource::JobList => "/jobs".to_string(),
        Resource::Job => format!("/jobs/{id}"),
        Resource::JobProgress => format!("/jobs/{id}/progress"),
        Resource::StatsOverview => "/stats/overview".to_string(),
        Resource::StatsTimeseries => "/stats/timeseries".to_string(),
        Resource::RubricList => "/rubrics".to_string(),
        Resource::Rubric => format!("/rubrics/{id}"),
        Resource::AnnotationList => "/annotations".to_string(),
        Resource::MetaEvaluation => "/meta-evaluation".to_string(),
        Resource::Health => "/health".to_string(),
    };

    ApiRequest::get(path).with_query(query)
}

/// Decode a response body into the record shape `resource` expects.
///
/// # Errors
///
/// Returns `Error::Decode` if the body does not match that shape
pub fn decode(resource: Resource, body: Value) -> Result<QueryData> {
    let data = match resource {
        Resource::ConversationList => QueryData::Conversations(serde_json::from_value(body)?),
        Resource::Conversation => QueryData::Conversation(serde_json::from_value(body)?),
        Resource::EvaluationList => QueryData::Evaluations(serde_json::from_value(body)?),
        Resource::Evaluation => QueryData::Evaluation(serde_json::from_value(body)?),
        Resource::JobList => QueryData::Jobs(serde_json::from_value(body)?),
        Resource::Job => QueryData::Job(serde_json::from_value(body)?),
        Resource::JobProgress => QueryData::JobProgress(serde_json::from_value(body)?),
        Resource::StatsOverview => QueryData::StatsOverview(serde_json::from_value(body)?),
        Resource::StatsTimeseries => {
            let series: TimeseriesResponse = serde_json::from_value(body)?;
            QueryData::Timeseries(series.data.into_iter().map(DailyScore::from).collect())
        }
        Resource::RubricList => {
            let list: RubricList = serde_json::from_value(body)?;
            QueryData::Rubrics(list.items)
        }
        Resource::Rubric => QueryData::Rubric(serde_json::from_value(body)?),
        Resource::AnnotationList => QueryData::Annotations(serde_json::from_value(body)?),
        Resource::MetaEvaluation => QueryData::MetaEvaluation(serde_json::from_value(body)?),
        Resource::Health => QueryData::Health(serde_json::from_value(body)?),
    };
    Ok(data)
}

/// Borrow the typed record out of a [`QueryData`]
pub trait Extract {
    fn extract(data: &QueryData) -> Option<&Self>;
}

macro_rules! extract {
    ($ty:ty, $variant:ident) => {
        impl Extract for $ty {
            fn extract(data: &QueryData) -> Option<&Self> {
                match data {
                    QueryData::$variant(inner) => Some(inner),
                    _ => None,
                }
            }
        }
    };
}

extract!(Page<Conversation>, Conversations);
extract!(Conversation, Conversation);
extract!(Page<Evaluation>, Evaluations);
extract!(Evaluation, Evaluation);
extract!(Page<Job>, Jobs);
extract!(Job, Job);
extract!(JobProgress, JobProgress);
extract!(StatsOverview, StatsOverview);
extract!(Vec<DailyScore>, Timeseries);
extract!(Vec<Rubric>, Rubrics);
extract!(Rubric, Rubric);
extract!(Page<Annotation>, Annotations);
extract!(MetaEvaluation, MetaEvaluation);
extract!(Health, Health);

impl QueryData {
    #[must_use]
    pub fn get<T: Extract>(&self) -> Option<&T> {
        T::extract(self)
    }
}
