//! Wire records exchanged with the judge API.
//!
//! Read-side records are lenient (`#[serde(default)]` on optional or
//! aggregate fields) so older servers that omit a field still decode;
//! identifiers and the fields the sync layer relies on are required.
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Retoure,
    Beschwerde,
    Produktanfrage,
    Lieferung,
    Zahlung,
    Konto,
    Allgemein,
}

impl Category {
    pub const ALL: [Self; 7] = [
        Self::Retoure,
        Self::Beschwerde,
        Self::Produktanfrage,
        Self::Lieferung,
        Self::Zahlung,
        Self::Konto,
        Self::Allgemein,
    ];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Retoure => "retoure",
            Self::Beschwerde => "beschwerde",
            Self::Produktanfrage => "produktanfrage",
            Self::Lieferung => "lieferung",
            Self::Zahlung => "zahlung",
            Self::Konto => "konto",
            Self::Allgemein => "allgemein",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|c| c.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("unknown category '{s}'"))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl JobStatus {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }

    /// The server will not change a job in this state any more
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pending" => Ok(Self::Pending),
            "running" => Ok(Self::Running),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            "cancelled" => Ok(Self::Cancelled),
            other => Err(format!("unknown job status '{other}'")),
        }
    }
}

/// Paginated list envelope
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    #[serde(default)]
    pub total: u64,
    #[serde(default)]
    pub page: u32,
    #[serde(default)]
    pub page_size: u32,
    /// Not reported by every list endpoint (jobs omit it)
    #[serde(default)]
    pub pages: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: String,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
}

impl Message {
    #[must_use]
    pub fn new(role: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            content: content.into(),
            timestamp: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conversation {
    pub id: Uuid,
    #[serde(default)]
    pub external_id: Option<String>,
    pub category: String,
    pub messages: Vec<Message>,
    #[serde(default)]
    pub metadata_json: Option<Value>,
    pub conversation_timestamp: DateTime<Utc>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub pii_redacted: bool,
}

/// Body of `POST /conversations`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationCreate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external_id: Option<String>,
    pub category: Category,
    pub messages: Vec<Message>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
    pub conversation_timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchUploadResult {
    #[serde(default)]
    pub created: u32,
    #[serde(default)]
    pub failed: u32,
    #[serde(default)]
    pub errors: Vec<String>,
    #[serde(default)]
    pub ids: Vec<Uuid>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DimensionScore {
    pub score: f64,
    #[serde(default)]
    pub weight: f64,
    #[serde(default)]
    pub reasoning: String,
    #[serde(default)]
    pub evidence: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainOfThought {
    #[serde(default)]
    pub context_analysis: String,
    #[serde(default)]
    pub response_analysis: String,
    #[serde(default)]
    pub legal_check: String,
    #[serde(default)]
    pub language_assessment: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Evaluation {
    pub id: Uuid,
    pub conversation_id: Uuid,
    #[serde(default)]
    pub job_id: Option<Uuid>,
    pub overall_score: f64,
    #[serde(default)]
    pub dimension_scores: BTreeMap<String, DimensionScore>,
    #[serde(default)]
    pub chain_of_thought: ChainOfThought,
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub improvement_suggestions: Vec<String>,
    #[serde(default)]
    pub critical_error: bool,
    #[serde(default)]
    pub compliance_issue: bool,
    #[serde(default)]
    pub escalation_needed: bool,
    #[serde(default)]
    pub model_name: String,
    #[serde(default)]
    pub rubric_version: String,
    #[serde(default)]
    pub processing_time_ms: u64,
    #[serde(default)]
    pub evaluated_at: Option<DateTime<Utc>>,
}

/// Body of `POST /evaluations/single`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvaluationRequest {
    pub conversation_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rubric_id: Option<String>,
}

/// Body of `POST /evaluations/inline`; the result is never stored
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InlineEvaluationRequest {
    pub category: Category,
    pub messages: Vec<Message>,
}

/// Server-side batch evaluation job. Only the server changes these fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: Uuid,
    #[serde(default)]
    pub name: Option<String>,
    pub status: JobStatus,
    #[serde(default, rename = "total_conversations")]
    pub total: u32,
    #[serde(default, rename = "completed_conversations")]
    pub completed: u32,
    #[serde(default, rename = "failed_conversations")]
    pub failed: u32,
    #[serde(default)]
    pub progress_percent: f64,
    #[serde(default)]
    pub error_message: Option<String>,
    #[serde(default)]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

/// Body of `POST /jobs`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobCreate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conversation_ids: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category_filter: Option<Category>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date_from: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date_to: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub batch_size: Option<u32>,
}

/// Response of `GET /jobs/{id}/progress`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobProgress {
    #[serde(default)]
    pub job_id: Option<Uuid>,
    #[serde(default)]
    pub status: Option<JobStatus>,
    pub progress_percent: f64,
    #[serde(default, alias = "completed")]
    pub completed_count: u32,
    #[serde(default, alias = "failed")]
    pub failed_count: u32,
    #[serde(default)]
    pub total: Option<u32>,
    #[serde(default)]
    pub estimated_completion: Option<String>,
    #[serde(default)]
    pub estimated_seconds_remaining: Option<u64>,
}

impl JobProgress {
    /// Terminal once the raw percentage reaches 100 (no rounding, so 99.99
    /// keeps polling) or the server reports a terminal status.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        self.progress_percent >= 100.0 || self.status.is_some_and(JobStatus::is_terminal)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StatsOverview {
    #[serde(default)]
    pub total_evaluations: u64,
    #[serde(default)]
    pub total_conversations: u64,
    #[serde(default)]
    pub evaluations_today: u64,
    #[serde(default)]
    pub average_score: f64,
    #[serde(default)]
    pub median_score: f64,
    #[serde(default)]
    pub active_jobs: u64,
    #[serde(default)]
    pub critical_errors_count: u64,
    #[serde(default)]
    pub compliance_issues_count: u64,
    #[serde(default)]
    pub category_distribution: BTreeMap<String, u64>,
    #[serde(default)]
    pub score_distribution: BTreeMap<String, u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeseriesPoint {
    pub timestamp: DateTime<Utc>,
    pub value: f64,
    pub count: u64,
}

/// Response of `GET /stats/timeseries`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeseriesResponse {
    #[serde(default)]
    pub metric: String,
    #[serde(default)]
    pub granularity: String,
    pub data: Vec<TimeseriesPoint>,
}

/// One day of the score chart, reshaped from a [`TimeseriesPoint`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyScore {
    pub date: NaiveDate,
    pub average_score: f64,
    pub evaluation_count: u64,
}

impl From<TimeseriesPoint> for DailyScore {
    fn from(point: TimeseriesPoint) -> Self {
        Self {
            date: point.timestamp.date_naive(),
            average_score: point.value,
            evaluation_count: point.count,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rubric {
    pub id: Uuid,
    pub name: String,
    pub version: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub config: Value,
    #[serde(default)]
    pub is_active: bool,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RubricList {
    pub items: Vec<Rubric>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RubricDimension {
    pub key: String,
    pub name: String,
    pub weight: f64,
    pub description: String,
    pub criteria: String,
    #[serde(default = "default_critical_threshold")]
    pub critical_threshold: u8,
}

const fn default_critical_threshold() -> u8 {
    3
}

/// Body of `POST /rubrics`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RubricCreate {
    pub name: String,
    pub version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub dimensions: Vec<RubricDimension>,
}

/// Human judgement of one evaluation, used to score the judge itself
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Annotation {
    pub id: Uuid,
    pub evaluation_id: Uuid,
    pub annotator_id: String,
    pub overall_score: f64,
    #[serde(default)]
    pub dimension_scores: BTreeMap<String, f64>,
    #[serde(default)]
    pub agreement_with_judge: Option<bool>,
    #[serde(default)]
    pub disagreement_reason: Option<String>,
    #[serde(default)]
    pub annotated_at: Option<DateTime<Utc>>,
}

/// Body of `POST /annotations`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnnotationCreate {
    pub evaluation_id: String,
    pub annotator_id: String,
    pub overall_score: f64,
    #[serde(default)]
    pub dimension_scores: BTreeMap<String, f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agreement_with_judge: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub disagreement_reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CorrelationMetrics {
    pub pearson_r: f64,
    pub spearman_rho: f64,
    pub kendall_tau: f64,
    pub mean_absolute_error: f64,
    pub root_mean_squared_error: f64,
    pub cohen_kappa: f64,
    pub sample_size: u64,
}

/// Response of `GET /meta-evaluation`: agreement between judge and
/// human annotators
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetaEvaluation {
    pub overall_correlation: CorrelationMetrics,
    #[serde(default)]
    pub dimension_correlations: BTreeMap<String, CorrelationMetrics>,
    #[serde(default)]
    pub calibration_needed: bool,
    #[serde(default)]
    pub recommendations: Vec<String>,
    /// Stamped by the server without an offset
    #[serde(default)]
    pub last_calculated: Option<NaiveDateTime>,
}

/// Response of `GET /health`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Health {
    pub status: String,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub database: String,
    #[serde(default)]
    pub redis: String,
    #[serde(default)]
    pub judge_model: String,
    #[serde(default)]
    pub timestamp: Option<NaiveDateTime>,
}

impl Health {
    #[must_use]
    pub fn is_healthy(&self) -> bool {
        self.status == "healthy"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_job_progress_accepts_both_count_spellings() {
        let short: JobProgress = serde_json::from_value(json!({
            "job_id": "6b3a4f9e-6e2c-4d7a-9f1e-2a1c3b4d5e6f",
            "status": "running",
            "progress_percent": 40.0,
            "completed": 4,
            "failed": 1,
            "total": 10,
            "estimated_seconds_remaining": 12
        }))
        .unwrap();
        assert_eq!(short.completed_count, 4);
        assert_eq!(short.failed_count, 1);

        let long: JobProgress = serde_json::from_value(json!({
            "progress_percent": 40,
            "completed_count": 4,
            "failed_count": 1
        }))
        .unwrap();
        assert_eq!(long.completed_count, 4);
        assert!(long.status.is_none());
    }

    #[test]
    fn test_progress_terminal_boundary() {
        let progress = |pct: f64| JobProgress {
            job_id: None,
            status: None,
            progress_percent: pct,
            completed_count: 0,
            failed_count: 0,
            total: None,
            estimated_completion: None,
            estimated_seconds_remaining: None,
        };
        assert!(!progress(99.99).is_terminal());
        assert!(progress(100.0).is_terminal());
        assert!(progress(100.5).is_terminal());
        assert!(!progress(f64::NAN).is_terminal());

        let mut failed = progress(35.0);
        failed.status = Some(JobStatus::Failed);
        assert!(failed.is_terminal());
    }

    #[test]
    fn test_job_maps_conversation_counters() {
        let job: Job = serde_json::from_value(json!({
            "id": "6b3a4f9e-6e2c-4d7a-9f1e-2a1c3b4d5e6f",
            "status": "completed",
            "total_conversations": 10,
            "completed_conversations": 9,
            "failed_conversations": 1,
            "progress_percent": 100.0,
            "error_message": null
        }))
        .unwrap();
        assert_eq!(job.total, 10);
        assert_eq!(job.completed, 9);
        assert!(job.status.is_terminal());
    }

    #[test]
    fn test_timeseries_point_reshapes_to_daily_score() {
        let point: TimeseriesPoint = serde_json::from_value(json!({
            "timestamp": "2026-10-14T00:00:00Z",
            "value": 7.25,
            "count": 18
        }))
        .unwrap();
        let day = DailyScore::from(point);
        assert_eq!(day.date, NaiveDate::from_ymd_opt(2026, 10, 14).unwrap());
        assert!((day.average_score - 7.25).abs() < f64::EPSILON);
        assert_eq!(day.evaluation_count, 18);
    }

    #[test]
    fn test_category_parsing() {
        assert_eq!("Retoure".parse::<Category>().unwrap(), Category::Retoure);
        assert!("unknown".parse::<Category>().is_err());
        assert_eq!(
            serde_json::to_value(Category::Beschwerde).unwrap(),
            json!("beschwerde")
        );
    }

    #[test]
    fn test_meta_evaluation_accepts_naive_timestamps() {
        let meta: MetaEvaluation = serde_json::from_value(json!({
            "overall_correlation": {
                "pearson_r": 0.0, "spearman_rho": 0.0, "kendall_tau": 0.0,
                "mean_absolute_error": 0.0, "root_mean_squared_error": 0.0,
                "cohen_kappa": 0.0, "sample_size": 3
            },
            "dimension_correlations": {},
            "calibration_needed": true,
            "recommendations": ["Insufficient data for meta-evaluation."],
            "last_calculated": "2026-10-14T09:30:00.123456"
        }))
        .unwrap();
        assert_eq!(meta.overall_correlation.sample_size, 3);
        assert!(meta.calibration_needed);
        assert!(meta.last_calculated.is_some());

        let health: Health = serde_json::from_value(json!({
            "status": "degraded",
            "version": "1.0.0",
            "database": "healthy",
            "redis": "healthy",
            "judge_model": "degraded: status 503",
            "timestamp": "2026-10-14T09:30:00"
        }))
        .unwrap();
        assert!(!health.is_healthy());
    }
}
