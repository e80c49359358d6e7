pub mod completion;
pub mod config;
pub mod error;
pub mod oauth;
pub mod rest;
pub mod transport;

pub use crate::error::{Error, Result};
pub use crate::oauth::{OAuth2Client, RevocationResult, TokenExchangeResult};
pub use crate::rest::{ReadResult, RestApiClient, RestApiClientBuilder, WriteResult};
pub use crate::transport::RawResponse;

use std::time::Duration;

/// User-Agent string used for all HTTP requests.
static APP_USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"));

/// Base URL of the OAuth2 token and revocation endpoints.
pub const OAUTH2_BASE_URL: &str = "https://api.home.nest.com/oauth2";
/// Login page users are sent to for authorizing a client.
pub const OAUTH2_LOGIN_URL: &str = "https://home.nest.com/login/oauth2";
/// Canonical base URL of the REST API.
pub const REST_BASE_URL: &str = "https://developer-api.nest.com";
/// Timeout applied to every request unless configured otherwise.
pub const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(3);

/// Creates a [`RestApiClient`] for the given access token against the canonical API endpoint.
pub fn rest_api_client(token: impl Into<String>) -> Result<RestApiClient> {
    RestApiClient::new(token)
}
