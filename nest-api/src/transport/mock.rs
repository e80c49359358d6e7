use crate::error::{Error, Result};
use crate::transport::{AdapterOptions, HttpAdapter, RawResponse, Transport};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

/// Scripted outcome of a single mocked call.
#[derive(Debug, Clone)]
pub enum MockReply {
    Response(RawResponse),
    TransportError(String),
}

impl MockReply {
    pub fn status(code: u16) -> Self {
        Self::Response(RawResponse::new(code, serde_json::Value::Null))
    }

    pub fn json(code: u16, body: serde_json::Value) -> Self {
        Self::Response(RawResponse::new(code, body))
    }

    pub fn redirect(redirection: &str) -> Self {
        Self::Response(RawResponse::new(307, serde_json::Value::Null).with_redirection(redirection))
    }

    pub fn error(msg: &str) -> Self {
        Self::TransportError(msg.to_string())
    }
}

/// A call observed by a [`MockTransport`] adapter.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedCall {
    pub base_url: String,
    pub method: &'static str,
    pub path: String,
    pub token: Option<String>,
    pub body: Option<serde_json::Value>,
}

#[derive(Default)]
struct MockState {
    replies: HashMap<String, VecDeque<MockReply>>,
    calls: Vec<RecordedCall>,
    bound: Vec<String>,
}

/// [`Transport`] answering calls from per-base-URL queues of scripted replies.
///
/// Calls without a scripted reply left fail with a transport error.
#[derive(Clone, Default)]
pub struct MockTransport {
    state: Arc<Mutex<MockState>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues `reply` for the next call through an adapter bound to `base_url`.
    pub fn reply(self, base_url: &str, reply: MockReply) -> Self {
        self.push_reply(base_url, reply);
        self
    }

    pub fn push_reply(&self, base_url: &str, reply: MockReply) {
        self.state
            .lock()
            .replies
            .entry(base_url.to_string())
            .or_default()
            .push_back(reply);
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.state.lock().calls.clone()
    }

    /// Base URLs adapters were bound to, in order.
    pub fn bound(&self) -> Vec<String> {
        self.state.lock().bound.clone()
    }

    pub fn pending_replies(&self) -> usize {
        self.state.lock().replies.values().map(VecDeque::len).sum()
    }
}

impl Transport for MockTransport {
    fn bind(&self, base_url: &str, options: &AdapterOptions) -> Result<Arc<dyn HttpAdapter>> {
        self.state.lock().bound.push(base_url.to_string());
        Ok(Arc::new(MockAdapter {
            state: self.state.clone(),
            base_url: base_url.to_string(),
            token: options.token.clone(),
        }))
    }
}

struct MockAdapter {
    state: Arc<Mutex<MockState>>,
    base_url: String,
    token: Option<String>,
}

impl MockAdapter {
    fn call(
        &self,
        method: &'static str,
        path: &str,
        body: Option<serde_json::Value>,
    ) -> Result<RawResponse> {
        let mut state = self.state.lock();
        state.calls.push(RecordedCall {
            base_url: self.base_url.clone(),
            method,
            path: path.to_string(),
            token: self.token.clone(),
            body,
        });

        let reply = state
            .replies
            .get_mut(&self.base_url)
            .and_then(VecDeque::pop_front);
        match reply {
            Some(MockReply::Response(response)) => Ok(response),
            Some(MockReply::TransportError(msg)) => Err(Error::Transport(anyhow::anyhow!(msg))),
            None => Err(Error::Transport(anyhow::anyhow!(
                "no scripted reply for {method} {}{path}",
                self.base_url
            ))),
        }
    }
}

#[async_trait]
impl HttpAdapter for MockAdapter {
    fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn get(&self, path: &str) -> Result<RawResponse> {
        self.call("GET", path, None)
    }

    async fn put(&self, path: &str, json: &serde_json::Value) -> Result<RawResponse> {
        self.call("PUT", path, Some(json.clone()))
    }

    async fn post_form(&self, path: &str, form: &[(&str, &str)]) -> Result<RawResponse> {
        let fields = form
            .iter()
            .map(|(k, v)| (k.to_string(), serde_json::Value::from(*v)))
            .collect::<serde_json::Map<_, _>>();
        self.call("POST", path, Some(serde_json::Value::Object(fields)))
    }

    async fn delete(&self, path: &str) -> Result<RawResponse> {
        self.call("DELETE", path, None)
    }
}
