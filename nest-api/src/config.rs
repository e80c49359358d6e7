use crate::error::{Error, Result};
use anyhow::Context;
use config::{Config, Environment, File};
use oauth2::{ClientId, ClientSecret};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

/// Prefix of the environment variables holding the OAuth2 client credentials.
const CREDENTIALS_ENV_PREFIX: &str = "OAUTH2";
/// Prefix of the environment variables overriding [`ApiConfig`] values.
const API_CONFIG_ENV_PREFIX: &str = "NEST";
/// Optional configuration file consulted by [`ApiConfig::parse`].
const API_CONFIG_FILE: &str = "nest.toml";

/// OAuth2 client credentials. Every field is optional; operations check for the fields they need.
#[derive(Debug, Clone, Default)]
pub struct Credentials {
    pub client_id: Option<ClientId>,
    pub client_secret: Option<ClientSecret>,
    pub redirect_uri: Option<String>,
}

impl Credentials {
    pub fn new(client_id: impl Into<String>, client_secret: impl Into<String>) -> Self {
        Self {
            client_id: non_empty(Some(client_id.into())).map(ClientId::new),
            client_secret: non_empty(Some(client_secret.into())).map(ClientSecret::new),
            redirect_uri: None,
        }
    }

    pub fn with_redirect_uri(mut self, redirect_uri: impl Into<String>) -> Self {
        self.redirect_uri = non_empty(Some(redirect_uri.into()));
        self
    }
}

/// Source the OAuth2 operations pull their credentials from on every call.
pub trait CredentialSource: Send + Sync {
    fn credentials(&self) -> Result<Credentials>;
}

impl CredentialSource for Credentials {
    fn credentials(&self) -> Result<Credentials> {
        Ok(self.clone())
    }
}

/// Reads `OAUTH2_CLIENT_ID`, `OAUTH2_CLIENT_SECRET` and `OAUTH2_REDIRECT_URI` from the process
/// environment each time credentials are requested. Empty values are treated as unset.
#[derive(Debug, Clone, Default)]
pub struct EnvCredentials {
    vars: Option<HashMap<String, String>>,
}

impl EnvCredentials {
    pub fn new() -> Self {
        Self::default()
    }

    /// Uses the given variables instead of the process environment.
    pub fn from_vars<K, V>(vars: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            vars: Some(
                vars.into_iter()
                    .map(|(k, v)| (k.into(), v.into()))
                    .collect(),
            ),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct RawCredentials {
    client_id: Option<String>,
    client_secret: Option<String>,
    redirect_uri: Option<String>,
}

impl CredentialSource for EnvCredentials {
    fn credentials(&self) -> Result<Credentials> {
        let raw = Config::builder()
            .add_source(Environment::with_prefix(CREDENTIALS_ENV_PREFIX).source(self.vars.clone()))
            .build()
            .and_then(|config| config.try_deserialize::<RawCredentials>())
            .map_err(|err| Error::configuration(format!("Failed to read credentials: {err}")))?;

        tracing::trace!(
            client_id = raw.client_id.is_some(),
            client_secret = raw.client_secret.is_some(),
            redirect_uri = raw.redirect_uri.is_some(),
            "Read OAuth2 credentials from environment"
        );

        Ok(Credentials {
            client_id: non_empty(raw.client_id).map(ClientId::new),
            client_secret: non_empty(raw.client_secret).map(ClientSecret::new),
            redirect_uri: non_empty(raw.redirect_uri),
        })
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}

/// Endpoints and timeouts used by the clients.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ApiConfig {
    pub oauth2_base_url: String,
    pub oauth2_login_url: String,
    pub rest_base_url: String,
    pub timeout_millis: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            oauth2_base_url: crate::OAUTH2_BASE_URL.to_string(),
            oauth2_login_url: crate::OAUTH2_LOGIN_URL.to_string(),
            rest_base_url: crate::REST_BASE_URL.to_string(),
            timeout_millis: crate::DEFAULT_HTTP_TIMEOUT.as_millis() as u64,
        }
    }
}

impl ApiConfig {
    /// Layers the built-in defaults, an optional `nest.toml` in the working directory and
    /// `NEST_*` environment variables.
    pub fn parse() -> anyhow::Result<Self> {
        Self::parse_from(None)
    }

    fn parse_from(vars: Option<HashMap<String, String>>) -> anyhow::Result<Self> {
        let config = Config::builder()
            .add_source(Config::try_from(&ApiConfig::default())?)
            .add_source(File::with_name(API_CONFIG_FILE).required(false))
            .add_source(
                Environment::with_prefix(API_CONFIG_ENV_PREFIX)
                    .try_parsing(true)
                    .source(vars),
            )
            .build()
            .context("Failed to build config")?
            .try_deserialize::<Self>()
            .context("Failed to deserialize config")?;

        if config.timeout_millis == 0 {
            anyhow::bail!("Timeout must be greater than zero");
        }

        Ok(config)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_millis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use test_log::test;

    #[test]
    fn env_credentials() -> Result<()> {
        let source = EnvCredentials::from_vars([
            ("OAUTH2_CLIENT_ID", "client1"),
            ("OAUTH2_CLIENT_SECRET", "secret1"),
            ("OAUTH2_REDIRECT_URI", "https://example.org/callback"),
        ]);

        let credentials = source.credentials()?;
        assert_eq!(credentials.client_id.unwrap().as_str(), "client1");
        assert_eq!(credentials.client_secret.unwrap().secret(), "secret1");
        assert_eq!(
            credentials.redirect_uri.as_deref(),
            Some("https://example.org/callback")
        );
        Ok(())
    }

    #[test]
    fn env_credentials_missing() -> Result<()> {
        let source = EnvCredentials::from_vars([("UNRELATED", "value")]);

        let credentials = source.credentials()?;
        assert!(credentials.client_id.is_none());
        assert!(credentials.client_secret.is_none());
        assert!(credentials.redirect_uri.is_none());
        Ok(())
    }

    #[test]
    fn env_credentials_empty_values_are_unset() -> Result<()> {
        let source = EnvCredentials::from_vars([
            ("OAUTH2_CLIENT_ID", ""),
            ("OAUTH2_CLIENT_SECRET", "secret1"),
            ("OAUTH2_REDIRECT_URI", ""),
        ]);

        let credentials = source.credentials()?;
        assert!(credentials.client_id.is_none());
        assert!(credentials.client_secret.is_some());
        assert!(credentials.redirect_uri.is_none());
        Ok(())
    }

    #[test]
    fn static_credentials() -> Result<()> {
        let credentials = Credentials::new("client1", "")
            .with_redirect_uri("https://example.org")
            .credentials()?;

        assert_eq!(credentials.client_id.unwrap().as_str(), "client1");
        assert!(credentials.client_secret.is_none());
        assert_eq!(credentials.redirect_uri.as_deref(), Some("https://example.org"));
        Ok(())
    }

    #[test]
    fn api_config_defaults() -> anyhow::Result<()> {
        let config = ApiConfig::parse_from(Some(HashMap::new()))?;

        assert_eq!(config.rest_base_url, crate::REST_BASE_URL);
        assert_eq!(config.oauth2_base_url, crate::OAUTH2_BASE_URL);
        assert_eq!(config.oauth2_login_url, crate::OAUTH2_LOGIN_URL);
        assert_eq!(config.timeout(), crate::DEFAULT_HTTP_TIMEOUT);
        Ok(())
    }

    #[test]
    fn api_config_env_overrides() -> anyhow::Result<()> {
        let vars = HashMap::from([
            ("NEST_REST_BASE_URL".to_string(), "http://localhost:8080".to_string()),
            ("NEST_TIMEOUT_MILLIS".to_string(), "500".to_string()),
        ]);

        let config = ApiConfig::parse_from(Some(vars))?;

        assert_eq!(config.rest_base_url, "http://localhost:8080");
        assert_eq!(config.timeout(), Duration::from_millis(500));
        assert_eq!(config.oauth2_base_url, crate::OAUTH2_BASE_URL);
        Ok(())
    }

    #[test]
    fn api_config_zero_timeout() {
        let vars = HashMap::from([("NEST_TIMEOUT_MILLIS".to_string(), "0".to_string())]);

        let result = ApiConfig::parse_from(Some(vars));

        assert!(result.is_err());
    }
}
