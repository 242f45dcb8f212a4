use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Url;

use super::MetricsBackend;
use super::error::{LookupError, PrometheusError};
use super::signer::{NoSigner, RequestSigner, SigV4Signer};
use super::types::{parse_instant_count, parse_label_values};
use crate::core::config::{PrometheusConfig, SigningMode};
use crate::utils::time::prometheus_timestamp;

const LABEL_VALUES_PATH: &str = "/api/v1/label/__name__/values";
const QUERY_PATH: &str = "/api/v1/query";

/// Error bodies are cut to this many bytes in error messages
const MAX_ERROR_BODY: usize = 512;

/// Prometheus HTTP API client
pub struct PrometheusClient {
    http: reqwest::Client,
    endpoint: String,
    signer: Arc<dyn RequestSigner>,
    list_timeout: Duration,
    query_timeout: Duration,
}

impl PrometheusClient {
    pub fn new(
        endpoint: &str,
        signer: Arc<dyn RequestSigner>,
        list_timeout: Duration,
        query_timeout: Duration,
    ) -> Result<Self, PrometheusError> {
        let endpoint = endpoint.trim_end_matches('/').to_string();
        Url::parse(&endpoint)
            .map_err(|e| PrometheusError::Config(format!("invalid endpoint {endpoint}: {e}")))?;

        let http = reqwest::Client::builder()
            .user_agent(concat!("cardinality/", env!("CARGO_PKG_VERSION")))
            .build()?;

        tracing::debug!(
            endpoint = %endpoint,
            signer = signer.name(),
            list_timeout_secs = list_timeout.as_secs(),
            query_timeout_secs = query_timeout.as_secs(),
            "Prometheus client initialized"
        );

        Ok(Self {
            http,
            endpoint,
            signer,
            list_timeout,
            query_timeout,
        })
    }

    /// Build a client for the configured endpoint and signing mode
    pub async fn from_config(config: &PrometheusConfig) -> Result<Self, PrometheusError> {
        let endpoint = config.endpoint().ok_or_else(|| {
            PrometheusError::Config(
                "set prometheus.url, or prometheus.workspace_id together with prometheus.region"
                    .to_string(),
            )
        })?;

        let signer: Arc<dyn RequestSigner> = match config.signing {
            SigningMode::Sigv4 => Arc::new(SigV4Signer::from_env(config.region.clone()).await?),
            SigningMode::None => Arc::new(NoSigner),
        };

        Self::new(
            &endpoint,
            signer,
            config.list_timeout(),
            config.query_timeout(),
        )
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Signed GET returning the body of a 2xx response
    async fn get(
        &self,
        path: &str,
        params: &[(&str, String)],
        timeout: Duration,
    ) -> Result<String, PrometheusError> {
        let url = Url::parse_with_params(&format!("{}{}", self.endpoint, path), params)
            .map_err(|e| PrometheusError::Config(e.to_string()))?;

        let mut request = self.http.get(url).timeout(timeout).build()?;
        self.signer.sign(&mut request).await?;

        let response = self
            .http
            .execute(request)
            .await
            .map_err(|e| transport_error(e, timeout))?;
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| transport_error(e, timeout))?;

        if !status.is_success() {
            return Err(PrometheusError::Status {
                status: status.as_u16(),
                body: truncate(body, MAX_ERROR_BODY),
            });
        }
        Ok(body)
    }
}

fn transport_error(e: reqwest::Error, timeout: Duration) -> PrometheusError {
    if e.is_timeout() {
        PrometheusError::Timeout {
            timeout_secs: timeout.as_secs(),
        }
    } else {
        PrometheusError::Http(e)
    }
}

fn truncate(mut body: String, max: usize) -> String {
    if body.len() > max {
        let mut cut = max;
        while !body.is_char_boundary(cut) {
            cut -= 1;
        }
        body.truncate(cut);
    }
    body
}

/// PromQL counting the series of one metric name
pub fn count_query(name: &str) -> String {
    let escaped = name.replace('\\', "\\\\").replace('"', "\\\"");
    format!("count by (__name__) ({{__name__=\"{escaped}\"}})")
}

#[async_trait]
impl MetricsBackend for PrometheusClient {
    async fn list_metric_names(&self, at: DateTime<Utc>) -> Result<Vec<String>, PrometheusError> {
        let at = prometheus_timestamp(at);
        let params = [("start", at.clone()), ("end", at)];
        let body = self
            .get(LABEL_VALUES_PATH, &params, self.list_timeout)
            .await?;
        parse_label_values(&body)
    }

    async fn instant_count(&self, name: &str, at: DateTime<Utc>) -> Result<u64, LookupError> {
        let params = [
            ("query", count_query(name)),
            ("time", prometheus_timestamp(at)),
        ];
        let body = self
            .get(QUERY_PATH, &params, self.query_timeout)
            .await
            .map_err(|source| LookupError::Backend {
                name: name.to_string(),
                source,
            })?;
        parse_instant_count(name, &body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client(server: &MockServer, signer: Arc<dyn RequestSigner>) -> PrometheusClient {
        PrometheusClient::new(
            &server.uri(),
            signer,
            Duration::from_secs(5),
            Duration::from_millis(300),
        )
        .unwrap()
    }

    fn at() -> DateTime<Utc> {
        DateTime::from_timestamp(1_704_067_180, 0).unwrap()
    }

    #[test]
    fn test_count_query() {
        assert_eq!(
            count_query("http_requests_total"),
            r#"count by (__name__) ({__name__="http_requests_total"})"#
        );
        assert_eq!(count_query(r#"a"b"#), r#"count by (__name__) ({__name__="a\"b"})"#);
    }

    #[test]
    fn test_truncate_respects_char_boundary() {
        assert_eq!(truncate("héllo".to_string(), 2), "h");
        assert_eq!(truncate("short".to_string(), 512), "short");
    }

    #[test]
    fn test_new_rejects_invalid_endpoint() {
        let result = PrometheusClient::new(
            "not a url",
            Arc::new(NoSigner),
            Duration::from_secs(1),
            Duration::from_secs(1),
        );
        assert!(matches!(result, Err(PrometheusError::Config(_))));
    }

    #[tokio::test]
    async fn test_list_metric_names() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(LABEL_VALUES_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "status": "success",
                "data": ["go_goroutines", "up"]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let names = client(&server, Arc::new(NoSigner))
            .list_metric_names(at())
            .await
            .unwrap();
        assert_eq!(names, vec!["go_goroutines", "up"]);

        let requests = server.received_requests().await.unwrap();
        let query: Vec<(String, String)> = requests[0]
            .url
            .query_pairs()
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();
        assert_eq!(
            query,
            vec![
                ("start".to_string(), "1704067180.000".to_string()),
                ("end".to_string(), "1704067180.000".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn test_list_metric_names_http_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(LABEL_VALUES_PATH))
            .respond_with(ResponseTemplate::new(403).set_body_string("denied"))
            .mount(&server)
            .await;

        let err = client(&server, Arc::new(NoSigner))
            .list_metric_names(at())
            .await
            .unwrap_err();
        match err {
            PrometheusError::Status { status, body } => {
                assert_eq!(status, 403);
                assert_eq!(body, "denied");
            }
            other => panic!("expected status error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_instant_count() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(QUERY_PATH))
            .and(query_param("query", count_query("up")))
            .and(query_param("time", "1704067180.000"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "status": "success",
                "data": {
                    "resultType": "vector",
                    "result": [{"metric": {"__name__": "up"}, "value": [1704067180, "42"]}]
                }
            })))
            .expect(1)
            .mount(&server)
            .await;

        let count = client(&server, Arc::new(NoSigner))
            .instant_count("up", at())
            .await
            .unwrap();
        assert_eq!(count, 42);
    }

    #[tokio::test]
    async fn test_instant_count_no_data() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(QUERY_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "status": "success",
                "data": {"resultType": "vector", "result": []}
            })))
            .mount(&server)
            .await;

        let err = client(&server, Arc::new(NoSigner))
            .instant_count("missing", at())
            .await
            .unwrap_err();
        assert!(matches!(err, LookupError::NoData { name } if name == "missing"));
    }

    #[tokio::test]
    async fn test_instant_count_malformed() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(QUERY_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>oops</html>"))
            .mount(&server)
            .await;

        let err = client(&server, Arc::new(NoSigner))
            .instant_count("up", at())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "malformed_response");
    }

    #[tokio::test]
    async fn test_instant_count_server_error_is_backend() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(QUERY_PATH))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let err = client(&server, Arc::new(NoSigner))
            .instant_count("up", at())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            LookupError::Backend {
                source: PrometheusError::Status { status: 503, .. },
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_instant_count_timeout_is_backend() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(QUERY_PATH))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(2)))
            .mount(&server)
            .await;

        let err = client(&server, Arc::new(NoSigner))
            .instant_count("up", at())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            LookupError::Backend {
                source: PrometheusError::Timeout { .. },
                ..
            }
        ));
    }

    struct StaticSigner;

    #[async_trait]
    impl RequestSigner for StaticSigner {
        async fn sign(&self, request: &mut reqwest::Request) -> Result<(), PrometheusError> {
            request.headers_mut().insert(
                "authorization",
                reqwest::header::HeaderValue::from_static("Bearer test"),
            );
            Ok(())
        }

        fn name(&self) -> &'static str {
            "static"
        }
    }

    #[tokio::test]
    async fn test_requests_are_signed() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(LABEL_VALUES_PATH))
            .and(header("authorization", "Bearer test"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "status": "success",
                "data": []
            })))
            .expect(1)
            .mount(&server)
            .await;

        let names = client(&server, Arc::new(StaticSigner))
            .list_metric_names(at())
            .await
            .unwrap();
        assert!(names.is_empty());
    }

    #[tokio::test]
    async fn test_endpoint_trailing_slash() {
        let server = MockServer::start().await;
        let client = PrometheusClient::new(
            &format!("{}/", server.uri()),
            Arc::new(NoSigner),
            Duration::from_secs(1),
            Duration::from_secs(1),
        )
        .unwrap();
        assert_eq!(client.endpoint(), server.uri());
    }
}
