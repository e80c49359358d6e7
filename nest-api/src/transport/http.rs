use crate::error::{Error, Result};
use crate::transport::{AdapterOptions, HttpAdapter, RawResponse, Transport};
use anyhow::Context;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::instrument;
use url::Url;

/// [`Transport`] performing requests with [`reqwest`].
///
/// Redirects are never followed automatically; 3xx responses are handed back to the caller with
/// their target exposed as [`RawResponse::redirection`].
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new() -> Result<Self> {
        let client = reqwest::ClientBuilder::new()
            .redirect(reqwest::redirect::Policy::none())
            .user_agent(crate::APP_USER_AGENT)
            .build()
            .context("Failed to create HTTP client")?;
        Ok(Self { client })
    }
}

impl Transport for HttpTransport {
    fn bind(&self, base_url: &str, options: &AdapterOptions) -> Result<Arc<dyn HttpAdapter>> {
        Url::parse(base_url).map_err(|source| Error::InvalidUrl {
            url: base_url.to_string(),
            source,
        })?;

        tracing::trace!(?base_url, ?options, "Binding HTTP adapter");
        Ok(Arc::new(HttpAdapterImpl {
            client: self.client.clone(),
            base_url: base_url.trim_end_matches('/').to_string(),
            options: options.clone(),
        }))
    }
}

struct HttpAdapterImpl {
    client: reqwest::Client,
    base_url: String,
    options: AdapterOptions,
}

impl HttpAdapterImpl {
    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        let builder = self
            .client
            .request(method, format!("{}{}", self.base_url, path))
            .header(reqwest::header::ACCEPT, "application/json")
            .timeout(self.options.timeout);
        match &self.options.token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    async fn send(&self, builder: reqwest::RequestBuilder) -> Result<RawResponse> {
        let response = builder
            .send()
            .await
            .context("Failed to perform HTTP request")?;

        let code = response.status().as_u16();
        let redirection = if response.status().is_redirection() {
            redirect_origin(&response)
        } else {
            None
        };

        tracing::trace!(
            ?code,
            content_length = ?response.content_length(),
            "Reading response body"
        );
        let text = response
            .text()
            .await
            .context("Failed to read response body")?;

        Ok(RawResponse {
            code,
            body: decode_body(text),
            redirection,
        })
    }
}

#[async_trait]
impl HttpAdapter for HttpAdapterImpl {
    fn base_url(&self) -> &str {
        &self.base_url
    }

    #[instrument(level = "trace", skip(self), fields(base_url = %self.base_url), err)]
    async fn get(&self, path: &str) -> Result<RawResponse> {
        self.send(self.request(reqwest::Method::GET, path)).await
    }

    #[instrument(level = "trace", skip(self, json), fields(base_url = %self.base_url), err)]
    async fn put(&self, path: &str, json: &serde_json::Value) -> Result<RawResponse> {
        self.send(self.request(reqwest::Method::PUT, path).json(json))
            .await
    }

    #[instrument(level = "trace", skip(self, form), fields(base_url = %self.base_url), err)]
    async fn post_form(&self, path: &str, form: &[(&str, &str)]) -> Result<RawResponse> {
        self.send(self.request(reqwest::Method::POST, path).form(form))
            .await
    }

    #[instrument(level = "trace", skip(self), fields(base_url = %self.base_url), err)]
    async fn delete(&self, path: &str) -> Result<RawResponse> {
        self.send(self.request(reqwest::Method::DELETE, path)).await
    }
}

/// Resolves the `Location` header of a redirect against the request URL and keeps its origin.
fn redirect_origin(response: &reqwest::Response) -> Option<String> {
    let location = response
        .headers()
        .get(reqwest::header::LOCATION)?
        .to_str()
        .ok()?;
    match response.url().join(location) {
        Ok(target) => Some(target.origin().ascii_serialization()),
        Err(err) => {
            tracing::warn!(?location, ?err, "Ignoring unparsable redirect location");
            None
        }
    }
}

fn decode_body(text: String) -> serde_json::Value {
    if text.trim().is_empty() {
        return serde_json::Value::Null;
    }
    serde_json::from_str(&text).unwrap_or(serde_json::Value::String(text))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use std::time::Duration;
    use test_log::test;
    use wiremock::matchers::{body_json, body_string_contains, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn bind(server: &MockServer, options: AdapterOptions) -> Arc<dyn HttpAdapter> {
        HttpTransport::new()
            .expect("Failed to create transport")
            .bind(&server.uri(), &options)
            .expect("Failed to bind adapter")
    }

    #[test]
    fn bind_invalid_url() {
        let transport = HttpTransport::new().expect("Failed to create transport");

        let result = transport.bind("not a url", &AdapterOptions::default());

        assert!(matches!(result, Err(Error::InvalidUrl { .. })));
    }

    #[test]
    fn decode_bodies() {
        assert_eq!(decode_body(String::new()), serde_json::Value::Null);
        assert_eq!(decode_body("{\"a\":1}".to_string()), json!({"a": 1}));
        assert_eq!(decode_body("plain".to_string()), json!("plain"));
    }

    #[test(tokio::test)]
    async fn get_sends_bearer_token() -> Result<()> {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/devices"))
            .and(header("authorization", "Bearer token1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"thermostats": {}})))
            .expect(1)
            .mount(&server)
            .await;

        let adapter = bind(&server, AdapterOptions::default().with_token("token1"));
        let response = adapter.get("/devices").await?;

        assert_eq!(response, RawResponse::new(200, json!({"thermostats": {}})));
        Ok(())
    }

    #[test(tokio::test)]
    async fn get_exposes_redirect_origin() -> Result<()> {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/devices"))
            .respond_with(
                ResponseTemplate::new(307)
                    .insert_header("location", "https://firebase.example.org:9553/devices"),
            )
            .mount(&server)
            .await;

        let adapter = bind(&server, AdapterOptions::default());
        let response = adapter.get("/devices").await?;

        assert_eq!(response.code, 307);
        assert_eq!(
            response.redirection.as_deref(),
            Some("https://firebase.example.org:9553")
        );
        Ok(())
    }

    #[test(tokio::test)]
    async fn put_sends_json() -> Result<()> {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path("/devices/thermostats/t1"))
            .and(body_json(json!({"target_temperature_c": 21.5})))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"target_temperature_c": 21.5})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let adapter = bind(&server, AdapterOptions::default());
        let response = adapter
            .put("/devices/thermostats/t1", &json!({"target_temperature_c": 21.5}))
            .await?;

        assert_eq!(response.code, 200);
        Ok(())
    }

    #[test(tokio::test)]
    async fn post_form_sends_fields() -> Result<()> {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/oauth2/access_token"))
            .and(body_string_contains("grant_type=authorization_code"))
            .and(body_string_contains("code=c%26d"))
            .respond_with(ResponseTemplate::new(400).set_body_string("bad request"))
            .expect(1)
            .mount(&server)
            .await;

        let adapter = HttpTransport::new()?
            .bind(&format!("{}/oauth2", server.uri()), &AdapterOptions::default())?;
        let response = adapter
            .post_form(
                "/access_token",
                &[("grant_type", "authorization_code"), ("code", "c&d")],
            )
            .await?;

        assert_eq!(response, RawResponse::new(400, json!("bad request")));
        Ok(())
    }

    #[test(tokio::test)]
    async fn delete_empty_body() -> Result<()> {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .and(path("/access_tokens/t1"))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        let adapter = bind(&server, AdapterOptions::default());
        let response = adapter.delete("/access_tokens/t1").await?;

        assert_eq!(response, RawResponse::new(204, serde_json::Value::Null));
        Ok(())
    }

    #[test(tokio::test)]
    async fn get_timeout() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/devices"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_millis(100)))
            .mount(&server)
            .await;

        let adapter = bind(&server, AdapterOptions::new(Duration::from_millis(50)));
        let result = adapter.get("/devices").await;

        let err = result.unwrap_err();
        assert!(err.is_transport());
        assert!(err.to_string().contains("Failed to perform HTTP request"));
    }
}
