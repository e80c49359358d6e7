pub mod http;
#[cfg(any(test, feature = "test-utils"))]
pub mod mock;

pub use http::HttpTransport;

use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt::{Debug, Formatter};
use std::sync::Arc;
use std::time::Duration;

/// Normalized response of a single HTTP call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawResponse {
    /// HTTP status code.
    pub code: u16,
    /// Decoded JSON body, the raw text if the body is not JSON, or `null` if it was empty.
    pub body: serde_json::Value,
    /// Base URL (origin) a redirect response points to.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub redirection: Option<String>,
}

impl RawResponse {
    pub fn new(code: u16, body: serde_json::Value) -> Self {
        Self {
            code,
            body,
            redirection: None,
        }
    }

    pub fn with_redirection(mut self, redirection: impl Into<String>) -> Self {
        self.redirection = Some(redirection.into());
        self
    }
}

/// Options every adapter is bound with.
#[derive(Clone)]
pub struct AdapterOptions {
    /// Access token sent as bearer token with every request, if any.
    pub token: Option<String>,
    pub timeout: Duration,
}

impl AdapterOptions {
    pub fn new(timeout: Duration) -> Self {
        Self {
            token: None,
            timeout,
        }
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }
}

impl Default for AdapterOptions {
    fn default() -> Self {
        Self::new(crate::DEFAULT_HTTP_TIMEOUT)
    }
}

impl Debug for AdapterOptions {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdapterOptions")
            .field("token", &self.token.as_ref().map(|_| "[redacted]"))
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// Creates [`HttpAdapter`]s bound to a base URL.
pub trait Transport: Send + Sync {
    fn bind(&self, base_url: &str, options: &AdapterOptions) -> Result<Arc<dyn HttpAdapter>>;
}

/// Performs single HTTP calls relative to the base URL it was bound to.
///
/// Every call yields either a [`RawResponse`] for whatever status the service answered with, or a
/// transport error if the service could not be reached.
#[async_trait]
pub trait HttpAdapter: Send + Sync {
    fn base_url(&self) -> &str;
    async fn get(&self, path: &str) -> Result<RawResponse>;
    async fn put(&self, path: &str, json: &serde_json::Value) -> Result<RawResponse>;
    async fn post_form(&self, path: &str, form: &[(&str, &str)]) -> Result<RawResponse>;
    async fn delete(&self, path: &str) -> Result<RawResponse>;
}
