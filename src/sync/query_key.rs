use crate::api::models::{Category, JobStatus};
use std::collections::BTreeMap;
use std::fmt;

/// Top-level resource name. Invalidation rules target families.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Family {
    Conversations,
    Evaluations,
    Jobs,
    Stats,
    Rubrics,
    Annotations,
    MetaEvaluation,
    Health,
}

impl Family {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Conversations => "conversations",
            Self::Evaluations => "evaluations",
            Self::Jobs => "jobs",
            Self::Stats => "stats",
            Self::Rubrics => "rubrics",
            Self::Annotations => "annotations",
            Self::MetaEvaluation => "meta-evaluation",
            Self::Health => "health",
        }
    }
}

impl fmt::Display for Family {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A cacheable view of a family
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Resource {
    ConversationList,
    Conversation,
    EvaluationList,
    Evaluation,
    JobList,
    Job,
    JobProgress,
    StatsOverview,
    StatsTimeseries,
    RubricList,
    Rubric,
    AnnotationList,
    MetaEvaluation,
    Health,
}

impl Resource {
    #[must_use]
    pub const fn family(self) -> Family {
        match self {
            Self::ConversationList | Self::Conversation => Family::Conversations,
            Self::EvaluationList | Self::Evaluation => Family::Evaluations,
            Self::JobList | Self::Job | Self::JobProgress => Family::Jobs,
            Self::StatsOverview | Self::StatsTimeseries => Family::Stats,
            Self::RubricList | Self::Rubric => Family::Rubrics,
            Self::AnnotationList => Family::Annotations,
            Self::MetaEvaluation => Family::MetaEvaluation,
            Self::Health => Family::Health,
        }
    }

    #[must_use]
    pub const fn view(self) -> &'static str {
        match self {
            Self::ConversationList
            | Self::EvaluationList
            | Self::JobList
            | Self::RubricList
            | Self::AnnotationList => "list",
            Self::Conversation | Self::Evaluation | Self::Job | Self::Rubric => "detail",
            Self::JobProgress => "progress",
            Self::StatsOverview => "overview",
            Self::StatsTimeseries => "timeseries",
            Self::MetaEvaluation => "correlation",
            Self::Health => "status",
        }
    }
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.family(), self.view())
    }
}

/// Parameter bag. A `BTreeMap` keeps serialization deterministic, so two
/// bags are equal exactly when they hold the same pairs.
pub type Params = BTreeMap<String, String>;

/// Identifies one cache slot: resource plus parameter bag.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct QueryKey {
    pub resource: Resource,
    pub params: Params,
}

impl QueryKey {
    #[must_use]
    pub const fn new(resource: Resource, params: Params) -> Self {
        Self { resource, params }
    }

    #[must_use]
    pub fn bare(resource: Resource) -> Self {
        Self::new(resource, Params::new())
    }

    #[must_use]
    pub fn with_id(resource: Resource, id: &str) -> Self {
        let mut params = Params::new();
        params.insert("id".to_string(), id.to_string());
        Self::new(resource, params)
    }

    #[must_use]
    pub fn param(&self, name: &str) -> Option<&str> {
        self.params.get(name).map(String::as_str)
    }

    #[must_use]
    pub const fn family(&self) -> Family {
        self.resource.family()
    }
}

impl fmt::Display for QueryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.resource)?;
        for (i, (k, v)) in self.params.iter().enumerate() {
            let sep = if i == 0 { '?' } else { '&' };
            write!(f, "{sep}{k}={v}")?;
        }
        Ok(())
    }
}

/// Matches every key of a family, optionally narrowed to one resource and
/// to keys whose parameters contain all of `params`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyPrefix {
    pub family: Family,
    pub resource: Option<Resource>,
    pub params: Params,
}

impl KeyPrefix {
    #[must_use]
    pub const fn family(family: Family) -> Self {
        Self {
            family,
            resource: None,
            params: Params::new(),
        }
    }

    #[must_use]
    pub const fn resource(resource: Resource) -> Self {
        Self {
            family: resource.family(),
            resource: Some(resource),
            params: Params::new(),
        }
    }

    #[must_use]
    pub fn with_param(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(name.into(), value.into());
        self
    }

    #[must_use]
    pub fn matches(&self, key: &QueryKey) -> bool {
        key.family() == self.family
            && self.resource.is_none_or(|r| r == key.resource)
            && self
                .params
                .iter()
                .all(|(k, v)| key.params.get(k) == Some(v))
    }
}

impl From<&QueryKey> for KeyPrefix {
    fn from(key: &QueryKey) -> Self {
        Self {
            family: key.family(),
            resource: Some(key.resource),
            params: key.params.clone(),
        }
    }
}

impl fmt::Display for KeyPrefix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.resource {
            Some(resource) => write!(f, "{resource}")?,
            None => write!(f, "{}/*", self.family)?,
        }
        for (k, v) in &self.params {
            write!(f, " {k}={v}")?;
        }
        Ok(())
    }
}

/// Paging and filter arguments shared by the list views. Unset filters are
/// left out of the key so that `None` and "not given" share a slot.
#[derive(Debug, Clone, PartialEq)]
pub struct ListParams {
    pub page: u32,
    pub page_size: u32,
    pub category: Option<Category>,
    pub search: Option<String>,
    pub status: Option<JobStatus>,
    pub min_score: Option<f64>,
    pub max_score: Option<f64>,
    pub critical_error: Option<bool>,
    pub compliance_issue: Option<bool>,
}

impl Default for ListParams {
    fn default() -> Self {
        Self {
            page: 1,
            page_size: super::config::DEFAULT_PAGE_SIZE,
            category: None,
            search: None,
            status: None,
            min_score: None,
            max_score: None,
            critical_error: None,
            compliance_issue: None,
        }
    }
}

impl ListParams {
    #[must_use]
    pub fn page(mut self, page: u32, page_size: u32) -> Self {
        self.page = page;
        self.page_size = page_size;
        self
    }

    #[must_use]
    pub fn category(mut self, category: Category) -> Self {
        self.category = Some(category);
        self
    }

    #[must_use]
    pub fn search(mut self, search: impl Into<String>) -> Self {
        self.search = Some(search.into());
        self
    }

    #[must_use]
    pub fn status(mut self, status: JobStatus) -> Self {
        self.status = Some(status);
        self
    }

    #[must_use]
    pub fn to_params(&self) -> Params {
        let mut params = Params::new();
        params.insert("page".to_string(), self.page.to_string());
        params.insert("page_size".to_string(), self.page_size.to_string());
        if let Some(category) = self.category {
            params.insert("category".to_string(), category.to_string());
        }
        if let Some(search) = self.search.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            params.insert("search".to_string(), search.to_string());
        }
        if let Some(status) = self.status {
            params.insert("status".to_string(), status.to_string());
        }
        if let Some(min) = self.min_score {
            params.insert("min_score".to_string(), min.to_string());
        }
        if let Some(max) = self.max_score {
            params.insert("max_score".to_string(), max.to_string());
        }
        if let Some(flag) = self.critical_error {
            params.insert("critical_error".to_string(), flag.to_string());
        }
        if let Some(flag) = self.compliance_issue {
            params.insert("compliance_issue".to_string(), flag.to_string());
        }
        params
    }
}
