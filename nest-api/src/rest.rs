//! REST client bound to a single access token.
//!
//! The service may answer any request with `307 Temporary Redirect`, pointing at another base URL
//! the client should talk to instead. The client follows such redirects and keeps using the
//! redirect target for subsequent requests until a request through it fails at the transport
//! level, at which point it falls back to the canonical base URL once.

use crate::completion;
use crate::config::ApiConfig;
use crate::error::{Error, Result};
use crate::transport::{AdapterOptions, HttpAdapter, HttpTransport, RawResponse, Transport};
use parking_lot::RwLock;
use serde::Serialize;
use std::fmt::{Debug, Formatter};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::instrument;

/// Maximum number of retries (redirects followed plus fallbacks) per request.
pub const MAX_REDIRECT_HOPS: usize = 2;

/// Outcome of a [`RestApiClient::read`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReadResult {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response: Option<RawResponse>,
}

/// Outcome of a [`RestApiClient::write`].
pub type WriteResult = ReadResult;

impl ReadResult {
    fn from_response(response: RawResponse) -> Self {
        if response.code == 200 {
            Self {
                success: true,
                data: Some(response.body),
                response: None,
            }
        } else {
            Self {
                success: false,
                data: None,
                response: Some(response),
            }
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Request<'a> {
    Read { path: &'a str },
    Write { path: &'a str, data: &'a serde_json::Value },
}

impl Request<'_> {
    async fn send(&self, adapter: &dyn HttpAdapter) -> Result<RawResponse> {
        match *self {
            Request::Read { path } => adapter.get(path).await,
            Request::Write { path, data } => adapter.put(path, data).await,
        }
    }
}

/// Adapter a single request is currently sent through.
enum Route {
    /// Main adapter, no redirect cached when the request started.
    Direct,
    /// Cached or freshly created redirect adapter.
    Redirected(Arc<dyn HttpAdapter>),
    /// Main adapter again, after the redirect adapter failed.
    FallingBack,
}

impl Route {
    fn name(&self) -> &'static str {
        match self {
            Route::Direct => "direct",
            Route::Redirected(_) => "redirected",
            Route::FallingBack => "falling_back",
        }
    }
}

/// Client for reading and writing resources of the REST API with a single access token.
///
/// Cloning is cheap; clones share the cached redirect target.
#[derive(Clone)]
pub struct RestApiClient {
    inner: Arc<RestApiClientInner>,
}

struct RestApiClientInner {
    transport: Arc<dyn Transport>,
    options: AdapterOptions,
    main: Arc<dyn HttpAdapter>,
    redirected: RwLock<Option<Arc<dyn HttpAdapter>>>,
}

impl Debug for RestApiClient {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RestApiClient")
            .field("base_url", &self.inner.main.base_url())
            .field(
                "redirected",
                &self.inner.redirected.read().as_ref().map(|a| a.base_url().to_string()),
            )
            .field("options", &self.inner.options)
            .finish()
    }
}

pub struct RestApiClientBuilder {
    token: String,
    base_url: String,
    timeout: Duration,
    transport: Option<Arc<dyn Transport>>,
}

impl RestApiClientBuilder {
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Applies the REST base URL and timeout of the given [`ApiConfig`].
    pub fn with_config(self, config: &ApiConfig) -> Self {
        self.with_base_url(config.rest_base_url.clone())
            .with_timeout(config.timeout())
    }

    pub fn build(self) -> Result<RestApiClient> {
        let transport = match self.transport {
            Some(transport) => transport,
            None => Arc::new(HttpTransport::new()?),
        };
        let options = AdapterOptions::new(self.timeout).with_token(self.token);
        let main = transport.bind(&self.base_url, &options)?;

        Ok(RestApiClient {
            inner: Arc::new(RestApiClientInner {
                transport,
                options,
                main,
                redirected: RwLock::new(None),
            }),
        })
    }
}

impl RestApiClient {
    /// Creates a client for the canonical API endpoint using the default [`HttpTransport`].
    pub fn new(token: impl Into<String>) -> Result<Self> {
        Self::builder(token).build()
    }

    pub fn builder(token: impl Into<String>) -> RestApiClientBuilder {
        RestApiClientBuilder {
            token: token.into(),
            base_url: crate::REST_BASE_URL.to_string(),
            timeout: crate::DEFAULT_HTTP_TIMEOUT,
            transport: None,
        }
    }

    /// Base URL of the cached redirect target, if any.
    pub fn redirected_base_url(&self) -> Option<String> {
        self.inner
            .redirected
            .read()
            .as_ref()
            .map(|adapter| adapter.base_url().to_string())
    }

    /// Reads the resource at `path`.
    ///
    /// Responses other than `200 OK` are returned as unsuccessful [`ReadResult`]s carrying the raw
    /// response.
    #[instrument(level = "debug", skip(self), err)]
    pub async fn read(&self, path: &str) -> Result<ReadResult> {
        let response = self.execute(Request::Read { path }).await?;
        Ok(ReadResult::from_response(response))
    }

    /// Completion-handler variant of [`RestApiClient::read`].
    pub fn read_with<F>(&self, path: impl Into<String>, completion: F) -> Option<JoinHandle<()>>
    where
        F: FnOnce(Result<ReadResult>) + Send + 'static,
    {
        let client = self.clone();
        let path = path.into();
        completion::dispatch(async move { client.read(&path).await }, completion)
    }

    /// Writes `data` to the resource at `path`.
    #[instrument(level = "debug", skip(self, data), err)]
    pub async fn write(&self, path: &str, data: &serde_json::Value) -> Result<WriteResult> {
        let response = self.execute(Request::Write { path, data }).await?;
        Ok(WriteResult::from_response(response))
    }

    /// Completion-handler variant of [`RestApiClient::write`].
    pub fn write_with<F>(
        &self,
        path: impl Into<String>,
        data: serde_json::Value,
        completion: F,
    ) -> Option<JoinHandle<()>>
    where
        F: FnOnce(Result<WriteResult>) + Send + 'static,
    {
        let client = self.clone();
        let path = path.into();
        completion::dispatch(
            async move { client.write(&path, &data).await },
            completion,
        )
    }

    async fn execute(&self, request: Request<'_>) -> Result<RawResponse> {
        let mut route = match self.inner.redirected.read().clone() {
            Some(adapter) => Route::Redirected(adapter),
            None => Route::Direct,
        };

        for hop in 0..=MAX_REDIRECT_HOPS {
            let adapter = match &route {
                Route::Redirected(adapter) => adapter.clone(),
                Route::Direct | Route::FallingBack => self.inner.main.clone(),
            };

            tracing::trace!(
                hop,
                route = route.name(),
                base_url = adapter.base_url(),
                "Sending request"
            );
            match request.send(adapter.as_ref()).await {
                Err(err) if matches!(route, Route::Redirected(_)) => {
                    tracing::warn!(
                        ?err,
                        base_url = adapter.base_url(),
                        "Redirect target failed, falling back"
                    );
                    self.clear_redirect(&adapter);
                    route = Route::FallingBack;
                }
                Err(err) => return Err(err),
                Ok(RawResponse {
                    code: 307,
                    redirection: Some(redirection),
                    ..
                }) => {
                    tracing::debug!(?redirection, "Following redirect");
                    let redirected = self.inner.transport.bind(&redirection, &self.inner.options)?;
                    *self.inner.redirected.write() = Some(redirected.clone());
                    route = Route::Redirected(redirected);
                }
                Ok(response) => {
                    tracing::trace!(code = response.code, "Received response");
                    return Ok(response);
                }
            }
        }

        tracing::warn!(hops = MAX_REDIRECT_HOPS, "Giving up following redirects");
        Err(Error::TooManyRedirects(MAX_REDIRECT_HOPS))
    }

    /// Drops the cached redirect adapter unless another request already replaced it.
    fn clear_redirect(&self, failed: &Arc<dyn HttpAdapter>) {
        let mut redirected = self.inner.redirected.write();
        if redirected
            .as_ref()
            .is_some_and(|current| Arc::ptr_eq(current, failed))
        {
            *redirected = None;
        }
    }
}
