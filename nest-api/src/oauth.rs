//! OAuth2 authorization flow: authorization URL, code-for-token exchange and token revocation.
//!
//! The free functions read credentials from the environment on every call and talk to the
//! canonical endpoints. Use [`OAuth2Client`] directly to inject credentials, endpoints or a
//! different [`Transport`].

use crate::completion;
use crate::config::{ApiConfig, CredentialSource, Credentials, EnvCredentials};
use crate::error::{Error, Result};
use crate::transport::{AdapterOptions, HttpAdapter, HttpTransport, RawResponse, Transport};
use oauth2::{ClientId, ClientSecret};
use serde::{Deserialize, Serialize};
use std::fmt::{Debug, Formatter};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::instrument;

const ACCESS_TOKEN_ENDPOINT: &str = "/access_token";
const ACCESS_TOKENS_ENDPOINT: &str = "/access_tokens";

/// Outcome of exchanging an authorization code for an access token.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TokenExchangeResult {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    /// Lifetime of the token in seconds, as sent by the server (integral or fractional).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires: Option<serde_json::Number>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response: Option<RawResponse>,
}

impl TokenExchangeResult {
    fn granted(token: String, expires: serde_json::Number) -> Self {
        Self {
            success: true,
            token: Some(token),
            expires: Some(expires),
            response: None,
        }
    }

    fn rejected(response: RawResponse) -> Self {
        Self {
            success: false,
            token: None,
            expires: None,
            response: Some(response),
        }
    }
}

/// Outcome of revoking an access token.
///
/// `revoked` is `true` if the token was deleted and `false` if it did not exist (anymore); both
/// count as success.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RevocationResult {
    pub success: bool,
    pub revoked: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response: Option<RawResponse>,
}

/// Body of a successful exchange. Both fields are required, a body missing either is a rejection.
#[derive(Debug, Deserialize)]
struct AccessTokenBody {
    access_token: String,
    expires_in: serde_json::Number,
}

/// Client for the OAuth2 endpoints.
#[derive(Clone)]
pub struct OAuth2Client {
    inner: Arc<OAuth2ClientInner>,
}

struct OAuth2ClientInner {
    credentials: Arc<dyn CredentialSource>,
    transport: Arc<dyn Transport>,
    base_url: String,
    login_url: String,
    timeout: Duration,
}

impl Debug for OAuth2Client {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OAuth2Client")
            .field("base_url", &self.inner.base_url)
            .field("login_url", &self.inner.login_url)
            .field("timeout", &self.inner.timeout)
            .finish()
    }
}

impl OAuth2Client {
    /// Creates a client for the canonical endpoints using the default [`HttpTransport`].
    pub fn new(credentials: impl CredentialSource + 'static) -> Result<Self> {
        Ok(Self::with_transport(credentials, Arc::new(HttpTransport::new()?)))
    }

    /// Creates a client reading its credentials from the environment on every call.
    pub fn from_env() -> Result<Self> {
        Self::new(EnvCredentials::new())
    }

    pub fn with_transport(
        credentials: impl CredentialSource + 'static,
        transport: Arc<dyn Transport>,
    ) -> Self {
        Self {
            inner: Arc::new(OAuth2ClientInner {
                credentials: Arc::new(credentials),
                transport,
                base_url: crate::OAUTH2_BASE_URL.to_string(),
                login_url: crate::OAUTH2_LOGIN_URL.to_string(),
                timeout: crate::DEFAULT_HTTP_TIMEOUT,
            }),
        }
    }

    /// Applies the endpoints and timeout of the given [`ApiConfig`].
    pub fn with_config(self, config: &ApiConfig) -> Self {
        self.map_inner(|inner| OAuth2ClientInner {
            base_url: config.oauth2_base_url.clone(),
            login_url: config.oauth2_login_url.clone(),
            timeout: config.timeout(),
            ..inner
        })
    }

    pub fn with_endpoints(self, base_url: impl Into<String>, login_url: impl Into<String>) -> Self {
        let (base_url, login_url) = (base_url.into(), login_url.into());
        self.map_inner(|inner| OAuth2ClientInner {
            base_url,
            login_url,
            ..inner
        })
    }

    pub fn with_timeout(self, timeout: Duration) -> Self {
        self.map_inner(|inner| OAuth2ClientInner { timeout, ..inner })
    }

    fn map_inner(self, f: impl FnOnce(OAuth2ClientInner) -> OAuth2ClientInner) -> Self {
        let inner = match Arc::try_unwrap(self.inner) {
            Ok(inner) => inner,
            Err(shared) => OAuth2ClientInner {
                credentials: shared.credentials.clone(),
                transport: shared.transport.clone(),
                base_url: shared.base_url.clone(),
                login_url: shared.login_url.clone(),
                timeout: shared.timeout,
            },
        };
        Self {
            inner: Arc::new(f(inner)),
        }
    }

    fn adapter(&self) -> Result<Arc<dyn HttpAdapter>> {
        self.inner
            .transport
            .bind(&self.inner.base_url, &AdapterOptions::new(self.inner.timeout))
    }

    /// Builds the URL of the login page a user authorizes this client on.
    ///
    /// Fails with [`Error::Configuration`] if no client ID is configured. `state` and the redirect
    /// URI (if configured) are percent-encoded.
    pub fn generate_authorization_url(&self, state: &str) -> Result<String> {
        let credentials = self.inner.credentials.credentials()?;
        authorization_url(&self.inner.login_url, &credentials, state)
    }

    /// Exchanges an authorization code for an access token.
    ///
    /// Fails with [`Error::Configuration`] before performing any request if the client ID or
    /// secret is missing. A response other than `200 OK`, or a `200 OK` without a string
    /// `access_token` and a numeric `expires_in`, is returned as an unsuccessful
    /// [`TokenExchangeResult`] carrying the raw response.
    #[instrument(level = "debug", skip_all, err)]
    pub async fn exchange_code_for_token(&self, code: &str) -> Result<TokenExchangeResult> {
        let credentials = self.inner.credentials.credentials()?;
        let (client_id, client_secret) = client_secrets(&credentials)?;

        tracing::trace!("Exchanging OAuth2 code for token");
        let response = self
            .adapter()?
            .post_form(
                ACCESS_TOKEN_ENDPOINT,
                &[
                    ("client_id", client_id.as_str()),
                    ("client_secret", client_secret.secret().as_str()),
                    ("grant_type", "authorization_code"),
                    ("code", code),
                ],
            )
            .await?;

        if response.code != 200 {
            tracing::debug!(code = ?response.code, "Token exchange rejected");
            return Ok(TokenExchangeResult::rejected(response));
        }

        match serde_json::from_value::<AccessTokenBody>(response.body.clone()) {
            Ok(body) => {
                tracing::debug!(
                    expires = %body.expires_in,
                    "Successfully exchanged code for token"
                );
                Ok(TokenExchangeResult::granted(body.access_token, body.expires_in))
            }
            Err(err) => {
                tracing::warn!(?err, "Token exchange response is missing the token or its expiry");
                Ok(TokenExchangeResult::rejected(response))
            }
        }
    }

    /// Completion-handler variant of [`OAuth2Client::exchange_code_for_token`].
    pub fn exchange_code_for_token_with<F>(
        &self,
        code: impl Into<String>,
        completion: F,
    ) -> Option<JoinHandle<()>>
    where
        F: FnOnce(Result<TokenExchangeResult>) + Send + 'static,
    {
        let client = self.clone();
        let code = code.into();
        completion::dispatch(
            async move { client.exchange_code_for_token(&code).await },
            completion,
        )
    }

    /// Revokes an access token.
    ///
    /// `204 No Content` and `404 Not Found` both count as success, the latter with `revoked`
    /// set to `false`.
    #[instrument(level = "debug", skip_all, err)]
    pub async fn revoke_token(&self, token: &str) -> Result<RevocationResult> {
        tracing::trace!("Revoking OAuth2 token");
        let path = format!("{ACCESS_TOKENS_ENDPOINT}/{}", urlencoding::encode(token));
        let response = self.adapter()?.delete(&path).await?;

        let result = match response.code {
            204 => RevocationResult {
                success: true,
                revoked: true,
                response: None,
            },
            404 => RevocationResult {
                success: true,
                revoked: false,
                response: None,
            },
            _ => RevocationResult {
                success: false,
                revoked: false,
                response: Some(response),
            },
        };

        tracing::debug!(
            success = result.success,
            revoked = result.revoked,
            "Token revocation finished"
        );
        Ok(result)
    }

    /// Completion-handler variant of [`OAuth2Client::revoke_token`].
    pub fn revoke_token_with<F>(
        &self,
        token: impl Into<String>,
        completion: F,
    ) -> Option<JoinHandle<()>>
    where
        F: FnOnce(Result<RevocationResult>) + Send + 'static,
    {
        let client = self.clone();
        let token = token.into();
        completion::dispatch(
            async move { client.revoke_token(&token).await },
            completion,
        )
    }
}

fn authorization_url(login_url: &str, credentials: &Credentials, state: &str) -> Result<String> {
    let client_id = credentials
        .client_id
        .as_ref()
        .ok_or_else(|| Error::configuration("Missing OAUTH2_CLIENT_ID in environment"))?;

    let mut url = format!(
        "{login_url}?client_id={}&state={}",
        urlencoding::encode(client_id.as_str()),
        urlencoding::encode(state)
    );
    if let Some(redirect_uri) = &credentials.redirect_uri {
        url.push_str("&redirect_uri=");
        url.push_str(&urlencoding::encode(redirect_uri));
    }

    tracing::trace!("Generated OAuth2 authorization URL");
    Ok(url)
}

fn client_secrets(credentials: &Credentials) -> Result<(&ClientId, &ClientSecret)> {
    match (&credentials.client_id, &credentials.client_secret) {
        (Some(client_id), Some(client_secret)) => Ok((client_id, client_secret)),
        _ => {
            tracing::warn!("Client ID or secret not configured, not exchanging code");
            Err(Error::configuration(
                "Missing OAUTH2_CLIENT_ID or OAUTH2_CLIENT_SECRET in environment",
            ))
        }
    }
}

/// Builds the authorization URL using credentials from the environment.
///
/// Performs no I/O besides reading the environment.
pub fn generate_authorization_url(state: &str) -> Result<String> {
    generate_authorization_url_from(&EnvCredentials::new(), state)
}

fn generate_authorization_url_from(source: &dyn CredentialSource, state: &str) -> Result<String> {
    authorization_url(crate::OAUTH2_LOGIN_URL, &source.credentials()?, state)
}

/// Exchanges an authorization code using credentials from the environment.
///
/// Missing credentials are reported before the HTTP transport is created.
pub async fn exchange_code_for_token(code: &str) -> Result<TokenExchangeResult> {
    exchange_code_for_token_from(&EnvCredentials::new(), code).await
}

async fn exchange_code_for_token_from(
    source: &dyn CredentialSource,
    code: &str,
) -> Result<TokenExchangeResult> {
    let credentials = source.credentials()?;
    client_secrets(&credentials)?;
    OAuth2Client::new(credentials)?
        .exchange_code_for_token(code)
        .await
}

pub fn exchange_code_for_token_with<F>(
    code: impl Into<String>,
    completion: F,
) -> Option<JoinHandle<()>>
where
    F: FnOnce(Result<TokenExchangeResult>) + Send + 'static,
{
    let code = code.into();
    completion::dispatch(
        async move { exchange_code_for_token(&code).await },
        completion,
    )
}

/// Revokes an access token against the canonical endpoint.
pub async fn revoke_token(token: &str) -> Result<RevocationResult> {
    OAuth2Client::from_env()?.revoke_token(token).await
}

pub fn revoke_token_with<F>(token: impl Into<String>, completion: F) -> Option<JoinHandle<()>>
where
    F: FnOnce(Result<RevocationResult>) + Send + 'static,
{
    let token = token.into();
    completion::dispatch(async move { revoke_token(&token).await }, completion)
}
