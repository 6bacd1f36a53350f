use super::query_cache::QueryCache;
use super::query_key::{Family, KeyPrefix};
use crate::api::models::{
    Annotation, AnnotationCreate, BatchUploadResult, Conversation, ConversationCreate, Evaluation, EvaluationRequest,
    InlineEvaluationRequest, Job, JobCreate, Message, Rubric, RubricCreate,
};
use crate::api::transport::ApiRequest;
use crate::error::{Error, Result};
use regex::Regex;
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use std::sync::LazyLock;
use std::time::Instant;
use tracing::{debug, error, info};

const MIN_MESSAGES: usize = 2;
const MAX_EXTERNAL_ID_LEN: usize = 255;
const MAX_BATCH_CONVERSATIONS: usize = 1000;
const MAX_JOB_BATCH_SIZE: u32 = 1000;
const MAX_RUBRIC_NAME_LEN: usize = 100;
const WEIGHT_SUM_TOLERANCE: f64 = 0.01;
const MAX_ANNOTATOR_ID_LEN: usize = 100;
const ANNOTATION_SCORE_RANGE: std::ops::RangeInclusive<f64> = 0.0..=10.0;

static VERSION_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d+\.\d+\.\d+$").expect("version pattern is valid"));

/// A server write. Validation runs before anything is sent.
#[derive(Debug, Clone, PartialEq)]
pub enum Mutation {
    CreateConversation(ConversationCreate),
    UploadConversations(Vec<ConversationCreate>),
    DeleteConversation(String),
    CreateJob(JobCreate),
    CancelJob(String),
    RunEvaluation(EvaluationRequest),
    DeleteEvaluation(String),
    /// Ad-hoc evaluation of messages that are never stored
    RunInlineEvaluation(InlineEvaluationRequest),
    CreateRubric(RubricCreate),
    /// Human score for an evaluation, compared against the judge's
    CreateAnnotation(AnnotationCreate),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MutationKind {
    CreateConversation,
    UploadConversations,
    DeleteConversation,
    CreateJob,
    CancelJob,
    RunEvaluation,
    DeleteEvaluation,
    RunInlineEvaluation,
    CreateRubric,
    CreateAnnotation,
}

impl MutationKind {
    /// Families whose cached views are invalidated once this write succeeds.
    #[must_use]
    pub const fn invalidates(self) -> &'static [Family] {
        match self {
            Self::CreateConversation | Self::UploadConversations | Self::DeleteConversation => {
                &[Family::Conversations, Family::Stats]
            }
            Self::CreateJob | Self::CancelJob => &[Family::Jobs],
            Self::RunEvaluation | Self::DeleteEvaluation => &[Family::Evaluations, Family::Stats],
            Self::RunInlineEvaluation => &[],
            Self::CreateRubric => &[Family::Rubrics],
            Self::CreateAnnotation => &[Family::Annotations, Family::MetaEvaluation],
        }
    }

    fn decode(self, body: Value) -> Result<MutationOutcome> {
        let outcome = match self {
            Self::CreateConversation => MutationOutcome::Conversation(serde_json::from_value(body)?),
            Self::UploadConversations => MutationOutcome::Uploaded(serde_json::from_value(body)?),
            Self::DeleteConversation | Self::DeleteEvaluation => MutationOutcome::Deleted,
            Self::CreateJob | Self::CancelJob => MutationOutcome::Job(serde_json::from_value(body)?),
            Self::RunEvaluation => MutationOutcome::Evaluation(serde_json::from_value(body)?),
            Self::RunInlineEvaluation => MutationOutcome::InlineEvaluation(body),
            Self::CreateRubric => MutationOutcome::Rubric(serde_json::from_value(body)?),
            Self::CreateAnnotation => MutationOutcome::Annotation(serde_json::from_value(body)?),
        };
        Ok(outcome)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum MutationOutcome {
    Conversation(Conversation),
    Uploaded(BatchUploadResult),
    Deleted,
    Job(Job),
    Evaluation(Evaluation),
    /// Returned as-is; inline results are not cached anywhere
    InlineEvaluation(Value),
    Rubric(Rubric),
    Annotation(Annotation),
}

impl Mutation {
    #[must_use]
    pub const fn kind(&self) -> MutationKind {
        match self {
            Self::CreateConversation(_) => MutationKind::CreateConversation,
            Self::UploadConversations(_) => MutationKind::UploadConversations,
            Self::DeleteConversation(_) => MutationKind::DeleteConversation,
            Self::CreateJob(_) => MutationKind::CreateJob,
            Self::CancelJob(_) => MutationKind::CancelJob,
            Self::RunEvaluation(_) => MutationKind::RunEvaluation,
            Self::DeleteEvaluation(_) => MutationKind::DeleteEvaluation,
            Self::RunInlineEvaluation(_) => MutationKind::RunInlineEvaluation,
            Self::CreateRubric(_) => MutationKind::CreateRubric,
            Self::CreateAnnotation(_) => MutationKind::CreateAnnotation,
        }
    }

    /// Check caller-side constraints.
    ///
    /// # Errors
    ///
    /// Returns `Error::Validation` describing the first violated rule
    pub fn validate(&self) -> Result<()> {
        match self {
            Self::CreateConversation(input) => validate_conversation(input),
            Self::UploadConversations(inputs) => {
                if inputs.is_empty() || inputs.len() > MAX_BATCH_CONVERSATIONS {
                    return Err(Error::validation(format!(
                        "batch must hold between 1 and {MAX_BATCH_CONVERSATIONS} conversations, got {}",
                        inputs.len()
                    )));
                }
                inputs.iter().enumerate().try_for_each(|(i, input)| {
                    validate_conversation(input)
                        .map_err(|e| Error::validation(format!("conversation {i}: {e}")))
                })
            }
            Self::DeleteConversation(id) | Self::CancelJob(id) | Self::DeleteEvaluation(id) => {
                require_id(id)
            }
            Self::CreateJob(input) => validate_job(input),
            Self::RunEvaluation(input) => require_id(&input.conversation_id),
            Self::RunInlineEvaluation(input) => validate_messages(&input.messages),
            Self::CreateRubric(input) => validate_rubric(input),
            Self::CreateAnnotation(input) => validate_annotation(input),
        }
    }

    /// Validate and build the request for this write.
    ///
    /// # Errors
    ///
    /// Returns `Error::Validation` for rejected input, `Error::Decode` if the
    /// body cannot be serialized
    pub fn request(&self) -> Result<ApiRequest> {
        self.validate()?;
        let request = match self {
            Self::CreateConversation(input) => {
                ApiRequest::post("/conversations", serde_json::to_value(input)?)
            }
            Self::UploadConversations(inputs) => {
                ApiRequest::post("/conversations/batch", json!({ "conversations": inputs }))
            }
            Self::DeleteConversation(id) => ApiRequest::delete(format!("/conversations/{}", id.trim())),
            Self::CreateJob(input) => ApiRequest::post("/jobs", serde_json::to_value(input)?),
            Self::CancelJob(id) => ApiRequest::action(format!("/jobs/{}/cancel", id.trim())),
            Self::RunEvaluation(input) => {
                ApiRequest::post("/evaluations/single", serde_json::to_value(input)?)
            }
            Self::DeleteEvaluation(id) => ApiRequest::delete(format!("/evaluations/{}", id.trim())),
            Self::RunInlineEvaluation(input) => {
                ApiRequest::post("/evaluations/inline", serde_json::to_value(input)?)
            }
            Self::CreateRubric(input) => ApiRequest::post("/rubrics", serde_json::to_value(input)?),
            Self::CreateAnnotation(input) => {
                ApiRequest::post("/annotations", serde_json::to_value(input)?)
            }
        };
        Ok(request)
    }
}

fn require_id(id: &str) -> Result<()> {
    if id.trim().is_empty() {
        return Err(Error::validation("identifier must not be empty"));
    }
    Ok(())
}

fn validate_messages(messages: &[Message]) -> Result<()> {
    if messages.len() < MIN_MESSAGES {
        return Err(Error::validation(format!(
            "at least {MIN_MESSAGES} messages required, got {}",
            messages.len()
        )));
    }
    if let Some(i) = messages
        .iter()
        .position(|m| m.role.trim().is_empty() || m.content.trim().is_empty())
    {
        return Err(Error::validation(format!("message {i} has an empty role or content")));
    }
    Ok(())
}

fn validate_conversation(input: &ConversationCreate) -> Result<()> {
    if let Some(external_id) = &input.external_id {
        if external_id.chars().count() > MAX_EXTERNAL_ID_LEN {
            return Err(Error::validation(format!(
                "external_id exceeds {MAX_EXTERNAL_ID_LEN} characters"
            )));
        }
    }
    validate_messages(&input.messages)
}

fn validate_job(input: &JobCreate) -> Result<()> {
    if let Some(size) = input.batch_size {
        if size == 0 || size > MAX_JOB_BATCH_SIZE {
            return Err(Error::validation(format!(
                "batch_size must be between 1 and {MAX_JOB_BATCH_SIZE}, got {size}"
            )));
        }
    }
    if let (Some(from), Some(to)) = (input.date_from, input.date_to) {
        if from > to {
            return Err(Error::validation("date_from must not be after date_to"));
        }
    }
    if input.conversation_ids.as_ref().is_some_and(Vec::is_empty) {
        return Err(Error::validation("conversation_ids must not be an empty list"));
    }
    Ok(())
}

fn validate_rubric(input: &RubricCreate) -> Result<()> {
    let name_len = input.name.trim().chars().count();
    if name_len == 0 || name_len > MAX_RUBRIC_NAME_LEN {
        return Err(Error::validation(format!(
            "rubric name must be 1 to {MAX_RUBRIC_NAME_LEN} characters"
        )));
    }
    if !VERSION_PATTERN.is_match(&input.version) {
        return Err(Error::validation(format!(
            "rubric version '{}' is not of the form MAJOR.MINOR.PATCH",
            input.version
        )));
    }
    if input.dimensions.is_empty() {
        return Err(Error::validation("rubric needs at least one dimension"));
    }
    if let Some(dim) = input
        .dimensions
        .iter()
        .find(|d| !(0.0..=1.0).contains(&d.weight))
    {
        return Err(Error::validation(format!(
            "weight of dimension '{}' must be within 0..=1",
            dim.key
        )));
    }
    let total: f64 = input.dimensions.iter().map(|d| d.weight).sum();
    if (total - 1.0).abs() > WEIGHT_SUM_TOLERANCE {
        return Err(Error::validation(format!(
            "dimension weights must sum to 1.0, got {total:.3}"
        )));
    }
    Ok(())
}

fn validate_annotation(input: &AnnotationCreate) -> Result<()> {
    require_id(&input.evaluation_id)?;
    let annotator_len = input.annotator_id.trim().chars().count();
    if annotator_len == 0 || annotator_len > MAX_ANNOTATOR_ID_LEN {
        return Err(Error::validation(format!(
            "annotator_id must be 1 to {MAX_ANNOTATOR_ID_LEN} characters"
        )));
    }
    if !ANNOTATION_SCORE_RANGE.contains(&input.overall_score) {
        return Err(Error::validation(format!(
            "overall_score must be within 0..=10, got {}",
            input.overall_score
        )));
    }
    Ok(())
}

/// Runs writes against the transport and invalidates the affected cache
/// families once a write succeeds. Failed writes leave the cache untouched.
#[derive(Debug, Clone)]
pub struct MutationCoordinator {
    cache: QueryCache,
}

impl MutationCoordinator {
    #[must_use]
    pub const fn new(cache: QueryCache) -> Self {
        Self { cache }
    }

    async fn run(&self, mutation: Mutation) -> Result<(MutationKind, Value)> {
        let kind = mutation.kind();
        let request = mutation.request().inspect_err(|e| {
            debug!("Rejected {:?} before sending: {}", kind, e);
        })?;

        let start = Instant::now();
        let timeout = self.cache.config().request_timeout;
        info!("✏️  MUTATION: {:?} {}", kind, request);
        let body = tokio::time::timeout(timeout, self.cache.transport().send(request))
            .await
            .unwrap_or_else(|_| Err(Error::Timeout(timeout)))
            .inspect_err(|e| {
                error!("❌ MUTATION FAILED: {:?} ({:.2}s) - {}", kind, start.elapsed().as_secs_f64(), e);
            })?;

        info!("✅ MUTATION OK: {:?} ({:.2}s)", kind, start.elapsed().as_secs_f64());
        for family in kind.invalidates() {
            self.cache.invalidate(&KeyPrefix::family(*family));
        }
        Ok((kind, body))
    }

    /// Execute any write and decode its response.
    ///
    /// # Errors
    ///
    /// Validation, transport and timeout failures; on any of them no cache
    /// entry is invalidated
    pub async fn execute(&self, mutation: Mutation) -> Result<MutationOutcome> {
        let (kind, body) = self.run(mutation).await?;
        kind.decode(body)
    }

    async fn execute_as<T: DeserializeOwned>(&self, mutation: Mutation) -> Result<T> {
        let (_, body) = self.run(mutation).await?;
        Ok(serde_json::from_value(body)?)
    }

    /// # Errors
    ///
    /// See [`MutationCoordinator::execute`]
    pub async fn create_conversation(&self, input: ConversationCreate) -> Result<Conversation> {
        self.execute_as(Mutation::CreateConversation(input)).await
    }

    /// # Errors
    ///
    /// See [`MutationCoordinator::execute`]
    pub async fn upload_conversations(
        &self,
        inputs: Vec<ConversationCreate>,
    ) -> Result<BatchUploadResult> {
        self.execute_as(Mutation::UploadConversations(inputs)).await
    }

    /// # Errors
    ///
    /// See [`MutationCoordinator::execute`]
    pub async fn delete_conversation(&self, id: &str) -> Result<()> {
        self.run(Mutation::DeleteConversation(id.to_string())).await.map(|_| ())
    }

    /// # Errors
    ///
    /// See [`MutationCoordinator::execute`]
    pub async fn create_job(&self, input: JobCreate) -> Result<Job> {
        self.execute_as(Mutation::CreateJob(input)).await
    }

    /// # Errors
    ///
    /// See [`MutationCoordinator::execute`]
    pub async fn cancel_job(&self, id: &str) -> Result<Job> {
        self.execute_as(Mutation::CancelJob(id.to_string())).await
    }

    /// # Errors
    ///
    /// See [`MutationCoordinator::execute`]
    pub async fn run_evaluation(&self, input: EvaluationRequest) -> Result<Evaluation> {
        self.execute_as(Mutation::RunEvaluation(input)).await
    }

    /// # Errors
    ///
    /// See [`MutationCoordinator::execute`]
    pub async fn delete_evaluation(&self, id: &str) -> Result<()> {
        self.run(Mutation::DeleteEvaluation(id.to_string())).await.map(|_| ())
    }

    /// # Errors
    ///
    /// See [`MutationCoordinator::execute`]
    pub async fn run_inline_evaluation(&self, input: InlineEvaluationRequest) -> Result<Value> {
        self.run(Mutation::RunInlineEvaluation(input)).await.map(|(_, body)| body)
    }

    /// # Errors
    ///
    /// See [`MutationCoordinator::execute`]
    pub async fn create_rubric(&self, input: RubricCreate) -> Result<Rubric> {
        self.execute_as(Mutation::CreateRubric(input)).await
    }

    /// # Errors
    ///
    /// See [`MutationCoordinator::execute`]
    pub async fn create_annotation(&self, input: AnnotationCreate) -> Result<Annotation> {
        self.execute_as(Mutation::CreateAnnotation(input)).await
    }
}
