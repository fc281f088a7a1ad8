//! OpenAI-compatible `/v1/models` probe.
//!
//! Sends the secret both as a bearer token and as `x-api-key` so that
//! OpenAI-style and Anthropic-style gateways both accept it.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use http::header::{HeaderName, AUTHORIZATION, CONTENT_TYPE};
use serde_json::Value;
use tracing::debug;

use super::{ModelProbe, ProbeResult};
use crate::error::ProbeError;
use crate::models::normalize_models;
use crate::util::normalize_base_url;

const X_API_KEY: HeaderName = HeaderName::from_static("x-api-key");

pub struct OpenAIModelsProbe {
    client: reqwest::Client,
}

impl OpenAIModelsProbe {
    pub fn new() -> Self {
        Self { client: reqwest::Client::new() }
    }

    /// Build a probe whose client aborts requests after `timeout`.
    pub fn with_timeout(timeout: Option<Duration>) -> anyhow::Result<Self> {
        let mut builder = reqwest::Client::builder();
        if let Some(t) = timeout {
            builder = builder.timeout(t);
        }
        Ok(Self { client: builder.build()? })
    }
}

impl Default for OpenAIModelsProbe {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ModelProbe for OpenAIModelsProbe {
    async fn probe(&self, base_url: &str, secret: &str) -> Result<ProbeResult, ProbeError> {
        let base = normalize_base_url(base_url);
        if base.is_empty() {
            return Err(ProbeError::InvalidBaseUrl(base_url.to_string()));
        }
        let target = format!("{}/v1/models", base);

        let start = Instant::now();
        let sent = self
            .client
            .get(&target)
            .header(AUTHORIZATION, format!("Bearer {}", secret))
            .header(X_API_KEY, secret)
            .header(CONTENT_TYPE, "application/json")
            .send()
            .await;
        let elapsed_ms = start.elapsed().as_millis() as u64;

        let resp = sent.map_err(|source| ProbeError::Unreachable { elapsed_ms, source })?;

        let status = resp.status();
        if !status.is_success() {
            debug!(url = %target, status = status.as_u16(), elapsed_ms, "Upstream rejected probe");
            return Ok(ProbeResult::failed(elapsed_ms));
        }

        // A 2xx with an unreadable body still counts as reachable.
        let payload = match resp.json::<Value>().await {
            Ok(v) => v,
            Err(e) => {
                debug!(url = %target, "Undecodable models body: {}", e);
                serde_json::json!({ "data": [] })
            }
        };

        let models = normalize_models(models_section(&payload));
        debug!(url = %target, elapsed_ms, models = models.len(), "Probe succeeded");
        Ok(ProbeResult::succeeded(elapsed_ms, models, payload))
    }
}

/// Pick the model sequence out of a `/v1/models` body.
fn models_section(payload: &Value) -> &Value {
    match payload {
        Value::Array(_) => payload,
        Value::Object(obj) => match obj.get("data") {
            Some(data) if !data.is_null() => data,
            _ => payload,
        },
        _ => payload,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_sends_both_auth_headers() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/models"))
            .and(header("authorization", "Bearer sk-test-123"))
            .and(header("x-api-key", "sk-test-123"))
            .and(header("content-type", "application/json"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "object": "list",
                "data": [{"id": "gpt-4o"}, {"id": "gpt-4o-mini"}]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let probe = OpenAIModelsProbe::new();
        let result = probe.probe(&server.uri(), "sk-test-123").await.unwrap();

        assert!(result.ok);
        assert_eq!(result.models, vec!["gpt-4o", "gpt-4o-mini"]);
        assert!(result.raw_payload.is_some());
    }

    #[tokio::test]
    async fn test_trailing_slash_and_version_base() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/models"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"data": []})))
            .expect(2)
            .mount(&server)
            .await;

        let probe = OpenAIModelsProbe::new();
        let slashed = format!("{}/", server.uri());
        let versioned = format!("{}/v1", server.uri());
        assert!(probe.probe(&slashed, "k").await.unwrap().ok);
        assert!(probe.probe(&versioned, "k").await.unwrap().ok);
    }

    #[tokio::test]
    async fn test_bare_array_body() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/models"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!(["a", {"id": "b"}])))
            .mount(&server)
            .await;

        let result = OpenAIModelsProbe::new().probe(&server.uri(), "k").await.unwrap();
        assert!(result.ok);
        assert_eq!(result.models, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_unauthorized_ignores_body() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/models"))
            .respond_with(ResponseTemplate::new(401).set_body_json(json!({
                "data": [{"id": "gpt-4o"}]
            })))
            .mount(&server)
            .await;

        let result = OpenAIModelsProbe::new().probe(&server.uri(), "bad").await.unwrap();
        assert!(!result.ok);
        assert!(result.models.is_empty());
        assert!(result.raw_payload.is_none());
    }

    #[tokio::test]
    async fn test_undecodable_success_body_is_ok() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/models"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>gateway</html>"))
            .mount(&server)
            .await;

        let result = OpenAIModelsProbe::new().probe(&server.uri(), "k").await.unwrap();
        assert!(result.ok);
        assert!(result.models.is_empty());
        assert_eq!(result.raw_payload, Some(json!({"data": []})));
    }

    #[tokio::test]
    async fn test_object_without_data_passes_through() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/models"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"models": ["x"]})))
            .mount(&server)
            .await;

        let result = OpenAIModelsProbe::new().probe(&server.uri(), "k").await.unwrap();
        assert!(result.ok);
        assert!(result.models.is_empty());
    }

    #[tokio::test]
    async fn test_connection_refused_is_unreachable() {
        // Bind then drop to get a port with nothing listening.
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let err = OpenAIModelsProbe::new()
            .probe(&format!("http://{}", addr), "k")
            .await
            .unwrap_err();
        assert!(matches!(err, ProbeError::Unreachable { .. }));
    }

    async fn slow_server() -> MockServer {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/models"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"data": [{"id": "late"}]}))
                    .set_delay(Duration::from_millis(500)),
            )
            .mount(&server)
            .await;
        server
    }

    #[tokio::test]
    async fn test_timeout_reports_elapsed() {
        let server = slow_server().await;
        let client = OpenAIModelsProbe::with_timeout(Some(Duration::from_millis(50))).unwrap();

        let err = client.probe(&server.uri(), "k").await.unwrap_err();
        assert!(matches!(err, ProbeError::Unreachable { .. }));
        assert!(err.elapsed_ms() >= 50, "elapsed {}", err.elapsed_ms());
    }

    #[tokio::test]
    async fn test_timed_out_token_keeps_its_elapsed() {
        let server = slow_server().await;
        let client = OpenAIModelsProbe::with_timeout(Some(Duration::from_millis(50))).unwrap();

        let tokens = [crate::discovery::Credential::new("slow")];
        let summary = crate::discovery::test_channel_tokens(&server.uri(), &tokens, &client).await;

        assert!(!summary.ok);
        assert_eq!(summary.failed, 1);
        assert!(!summary.items[0].ok);
        assert!(summary.items[0].models.is_empty());
        assert!(summary.items[0].elapsed_ms >= 50);
        assert_eq!(summary.elapsed_ms, summary.items[0].elapsed_ms);
    }

    #[tokio::test]
    async fn test_blank_base_url_is_rejected() {
        let err = OpenAIModelsProbe::new().probe("  / ", "k").await.unwrap_err();
        assert!(matches!(err, ProbeError::InvalidBaseUrl(_)));
        assert_eq!(err.elapsed_ms(), 0);
    }

    #[test]
    fn test_models_section_shapes() {
        let arr = json!(["a"]);
        assert_eq!(models_section(&arr), &arr);
        let wrapped = json!({"data": ["b"]});
        assert_eq!(models_section(&wrapped), &json!(["b"]));
        let null_data = json!({"data": null});
        assert_eq!(models_section(&null_data), &null_data);
        let scalar = json!(5);
        assert_eq!(models_section(&scalar), &scalar);
    }
}
