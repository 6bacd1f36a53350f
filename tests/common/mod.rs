#![allow(dead_code)]

use async_trait::async_trait;
use judgeboard::api::client::error_from_body;
use judgeboard::api::{ApiRequest, Method, Transport};
use judgeboard::error::{Error, Result};
use judgeboard::sync::{QueryCache, SyncConfig};
use serde_json::{json, Value};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::time::Instant;

/// Scripted response for one call
pub enum Reply {
    Json(Value),
    Status(u16, Value),
    /// Resolves when the test sends a body through the paired sender
    Gated(oneshot::Receiver<Value>),
    Hang,
}

impl Reply {
    fn replay(&self) -> Option<Self> {
        match self {
            Self::Json(v) => Some(Self::Json(v.clone())),
            Self::Status(s, v) => Some(Self::Status(*s, v.clone())),
            Self::Hang => Some(Self::Hang),
            Self::Gated(_) => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Call {
    pub request: ApiRequest,
    pub at: Instant,
}

#[derive(Default)]
struct State {
    replies: HashMap<String, VecDeque<Reply>>,
    calls: Vec<Call>,
}

/// In-memory [`Transport`]. Replies are queued per `"METHOD /path"`; the
/// last reply in a queue keeps being served unless it is gated.
#[derive(Default)]
pub struct MockTransport {
    state: Mutex<State>,
}

fn route(method: Method, path: &str) -> String {
    format!("{method} {path}")
}

impl MockTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn push(&self, method: Method, path: &str, reply: Reply) {
        self.state
            .lock()
            .unwrap()
            .replies
            .entry(route(method, path))
            .or_default()
            .push_back(reply);
    }

    /// Drop every reply still queued for a route
    pub fn clear(&self, method: Method, path: &str) {
        self.state.lock().unwrap().replies.remove(&route(method, path));
    }

    pub fn ok(&self, method: Method, path: &str, body: Value) {
        self.push(method, path, Reply::Json(body));
    }

    pub fn fail(&self, method: Method, path: &str, status: u16, body: Value) {
        self.push(method, path, Reply::Status(status, body));
    }

    pub fn gate(&self, method: Method, path: &str) -> oneshot::Sender<Value> {
        let (tx, rx) = oneshot::channel();
        self.push(method, path, Reply::Gated(rx));
        tx
    }

    pub fn calls(&self) -> Vec<Call> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn count(&self, method: Method, path: &str) -> usize {
        self.calls()
            .iter()
            .filter(|c| c.request.method == method && c.request.path == path)
            .count()
    }

    pub fn times(&self, method: Method, path: &str) -> Vec<Instant> {
        self.calls()
            .iter()
            .filter(|c| c.request.method == method && c.request.path == path)
            .map(|c| c.at)
            .collect()
    }

    fn next_reply(&self, request: &ApiRequest) -> Option<Reply> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(Call {
            request: request.clone(),
            at: Instant::now(),
        });
        let queue = state.replies.get_mut(&route(request.method, &request.path))?;
        if queue.len() > 1 {
            return queue.pop_front();
        }
        match queue.front().and_then(Reply::replay) {
            Some(reply) => Some(reply),
            None => queue.pop_front(),
        }
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn send(&self, request: ApiRequest) -> Result<Value> {
        match self.next_reply(&request) {
            Some(Reply::Json(body)) => Ok(body),
            Some(Reply::Status(status, body)) => Err(error_from_body(status, &body.to_string())),
            Some(Reply::Gated(rx)) => rx.await.map_err(|_| Error::Cancelled),
            Some(Reply::Hang) => futures::future::pending().await,
            None => Err(error_from_body(404, r#"{"detail":"no scripted reply"}"#)),
        }
    }
}

pub fn cache_with(transport: &Arc<MockTransport>) -> QueryCache {
    QueryCache::new(transport.clone(), SyncConfig::default())
}

pub fn cache_with_timeout(transport: &Arc<MockTransport>, timeout: Duration) -> QueryCache {
    let config = SyncConfig {
        request_timeout: timeout,
        ..SyncConfig::default()
    };
    QueryCache::new(transport.clone(), config)
}

/// Let spawned fetch tasks run to their next await point
pub async fn settle() {
    for _ in 0..10 {
        tokio::task::yield_now().await;
    }
}

pub fn page(items: Vec<Value>) -> Value {
    let total = items.len();
    json!({ "items": items, "total": total, "page": 1, "page_size": 20, "pages": 1 })
}

pub fn conversation(id: &str) -> Value {
    json!({
        "id": id,
        "category": "retoure",
        "messages": [
            {"role": "customer", "content": "Wo ist mein Paket?"},
            {"role": "agent", "content": "Ich schaue nach."}
        ],
        "conversation_timestamp": "2026-10-14T09:30:00Z"
    })
}

pub fn overview(total_evaluations: u64) -> Value {
    json!({
        "total_evaluations": total_evaluations,
        "total_conversations": 12,
        "average_score": 3.8
    })
}

pub fn progress(percent: f64, status: &str) -> Value {
    json!({
        "job_id": "6b3a4f9e-6e2c-4d7a-9f1e-2a1c3b4d5e6f",
        "status": status,
        "progress_percent": percent,
        "completed": 0,
        "failed": 0
    })
}

pub fn job(id: &str, status: &str) -> Value {
    json!({
        "id": id,
        "status": status,
        "total_conversations": 10,
        "completed_conversations": 0,
        "failed_conversations": 0,
        "progress_percent": 0.0
    })
}

pub const CONV_ID: &str = "0b1c2d3e-4f50-4617-8293-a4b5c6d7e8f9";
pub const JOB_ID: &str = "6b3a4f9e-6e2c-4d7a-9f1e-2a1c3b4d5e6f";
