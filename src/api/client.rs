// REST transport for the judge API
use super::transport::{ApiRequest, Method, Transport};
use super::{API_PREFIX, USER_AGENT};
use crate::error::{Error, Result};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT as USER_AGENT_HEADER};
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, warn};

/// Connection settings for [`HttpTransport`]
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub api_url: String,
    pub api_prefix: String,
    pub request_timeout: Duration,
    pub user_agent: Option<String>,
}

impl ClientConfig {
    #[must_use]
    pub fn new(api_url: impl Into<String>) -> Self {
        Self {
            api_url: api_url.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn base_url(&self) -> String {
        format!(
            "{}{}",
            self.api_url.trim_end_matches('/'),
            self.api_prefix.trim_end_matches('/')
        )
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_url: super::DEFAULT_API_URL.to_string(),
            api_prefix: API_PREFIX.to_string(),
            request_timeout: Duration::from_secs(crate::sync::config::DEFAULT_REQUEST_TIMEOUT_SECS),
            user_agent: None,
        }
    }
}

/// [`Transport`] over HTTP/JSON
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    base_url: String,
}

impl HttpTransport {
    /// Create a transport for the API at `config.api_url`
    ///
    /// # Errors
    ///
    /// Will return `Err` if the url is empty or the HTTP client cannot be built
    pub fn new(config: &ClientConfig) -> Result<Self> {
        if config.api_url.trim().is_empty() {
            return Err(Error::Config("api_url must not be empty".to_string()));
        }

        let mut headers = HeaderMap::new();
        let user_agent = config.user_agent.as_deref().unwrap_or(USER_AGENT);
        match HeaderValue::from_str(user_agent) {
            Ok(value) => {
                headers.insert(USER_AGENT_HEADER, value);
            }
            Err(_) => {
                warn!("Invalid user agent {user_agent:?}, using default");
                headers.insert(USER_AGENT_HEADER, HeaderValue::from_static(USER_AGENT));
            }
        }

        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .default_headers(headers)
            .build()?;

        Ok(Self {
            client,
            base_url: config.base_url(),
        })
    }

    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, request: ApiRequest) -> Result<Value> {
        let url = format!("{}{}", self.base_url, request.path);
        debug!("🌐 {request}");

        let mut builder = match request.method {
            Method::Get => self.client.get(&url),
            Method::Post => self.client.post(&url),
            Method::Delete => self.client.delete(&url),
        };
        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = builder.send().await?;
        let status = response.status();
        let text = response.text().await?;

        if status.is_success() {
            decode_body(&text)
        } else {
            Err(error_from_body(status.as_u16(), &text))
        }
    }
}

fn decode_body(text: &str) -> Result<Value> {
    if text.trim().is_empty() {
        return Ok(Value::Null);
    }
    Ok(serde_json::from_str(text)?)
}

/// Build the error for a non-2xx response: the `detail` field when present,
/// `HTTP <status>` otherwise.
#[must_use]
pub fn error_from_body(status: u16, text: &str) -> Error {
    let detail = serde_json::from_str::<Value>(text)
        .ok()
        .and_then(|body| body.get("detail").cloned());

    let message = match detail {
        Some(Value::String(message)) if !message.is_empty() => message,
        Some(Value::Null | Value::String(_)) | None => format!("HTTP {status}"),
        Some(other) => other.to_string(),
    };

    Error::transport(status, message)
}
