//! Request signing for the Prometheus HTTP API
//!
//! Amazon Managed Prometheus requires AWS SigV4 (service `aps`). Plain
//! Prometheus servers take unsigned requests.

use std::time::SystemTime;

use async_trait::async_trait;
use aws_credential_types::provider::{ProvideCredentials, SharedCredentialsProvider};
use aws_sigv4::http_request::{SignableBody, SignableRequest, SigningSettings, sign};
use aws_sigv4::sign::v4;
use reqwest::header::{HeaderName, HeaderValue};

use super::error::PrometheusError;

/// SigV4 service name of Amazon Managed Prometheus
const APS_SERVICE: &str = "aps";

#[async_trait]
pub trait RequestSigner: Send + Sync {
    /// Add authentication to an outgoing request
    async fn sign(&self, request: &mut reqwest::Request) -> Result<(), PrometheusError>;

    fn name(&self) -> &'static str;
}

/// Leaves requests untouched
#[derive(Debug, Default)]
pub struct NoSigner;

#[async_trait]
impl RequestSigner for NoSigner {
    async fn sign(&self, _request: &mut reqwest::Request) -> Result<(), PrometheusError> {
        Ok(())
    }

    fn name(&self) -> &'static str {
        "none"
    }
}

/// Signs requests with AWS SigV4 using credentials resolved per request,
/// so expiring session tokens are refreshed by the provider.
#[derive(Debug)]
pub struct SigV4Signer {
    credentials: SharedCredentialsProvider,
    region: String,
}

impl SigV4Signer {
    pub fn new(credentials: SharedCredentialsProvider, region: impl Into<String>) -> Self {
        Self {
            credentials,
            region: region.into(),
        }
    }

    /// Build a signer from the AWS default credential chain
    pub async fn from_env(region: Option<String>) -> Result<Self, PrometheusError> {
        let mut config_loader = aws_config::defaults(aws_config::BehaviorVersion::latest());
        if let Some(region) = region {
            config_loader = config_loader.region(aws_config::Region::new(region));
        }
        let config = config_loader.load().await;

        let region = config
            .region()
            .map(|r| r.to_string())
            .ok_or_else(|| PrometheusError::Config("AWS region is not configured".to_string()))?;
        let credentials = config.credentials_provider().ok_or_else(|| {
            PrometheusError::Config("no AWS credentials provider available".to_string())
        })?;

        tracing::debug!(region = %region, "SigV4 signer initialized");
        Ok(Self::new(credentials, region))
    }
}

#[async_trait]
impl RequestSigner for SigV4Signer {
    async fn sign(&self, request: &mut reqwest::Request) -> Result<(), PrometheusError> {
        let credentials = self
            .credentials
            .provide_credentials()
            .await
            .map_err(|e| PrometheusError::Signing(e.to_string()))?;
        let identity = credentials.into();

        let params = v4::SigningParams::builder()
            .identity(&identity)
            .region(&self.region)
            .name(APS_SERVICE)
            .time(SystemTime::now())
            .settings(SigningSettings::default())
            .build()
            .map_err(|e| PrometheusError::Signing(e.to_string()))?
            .into();

        let headers: Vec<(&str, &str)> = request
            .headers()
            .iter()
            .filter_map(|(name, value)| value.to_str().ok().map(|v| (name.as_str(), v)))
            .collect();
        let signable = SignableRequest::new(
            request.method().as_str(),
            request.url().as_str(),
            headers.into_iter(),
            SignableBody::Bytes(&[]),
        )
        .map_err(|e| PrometheusError::Signing(e.to_string()))?;

        let (instructions, _signature) = sign(signable, &params)
            .map_err(|e| PrometheusError::Signing(e.to_string()))?
            .into_parts();

        for (name, value) in instructions.headers() {
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| PrometheusError::Signing(e.to_string()))?;
            let value =
                HeaderValue::from_str(value).map_err(|e| PrometheusError::Signing(e.to_string()))?;
            request.headers_mut().insert(name, value);
        }
        Ok(())
    }

    fn name(&self) -> &'static str {
        "sigv4"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aws_credential_types::Credentials;

    fn request() -> reqwest::Request {
        reqwest::Client::new()
            .get("https://aps-workspaces.us-east-1.amazonaws.com/workspaces/ws-1/api/v1/query?query=up")
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn test_no_signer_leaves_request_untouched() {
        let mut req = request();
        NoSigner.sign(&mut req).await.unwrap();
        assert!(req.headers().is_empty());
    }

    #[tokio::test]
    async fn test_sigv4_adds_authorization() {
        let credentials = SharedCredentialsProvider::new(Credentials::new(
            "AKIDEXAMPLE",
            "secret",
            Some("session".to_string()),
            None,
            "test",
        ));
        let signer = SigV4Signer::new(credentials, "us-east-1");

        let mut req = request();
        signer.sign(&mut req).await.unwrap();

        let authorization = req.headers()["authorization"].to_str().unwrap();
        assert!(authorization.starts_with("AWS4-HMAC-SHA256 Credential=AKIDEXAMPLE/"));
        assert!(authorization.contains("/us-east-1/aps/aws4_request"));
        assert!(req.headers().contains_key("x-amz-date"));
        assert_eq!(req.headers()["x-amz-security-token"], "session");
        assert_eq!(signer.name(), "sigv4");
    }

    #[tokio::test]
    async fn test_from_env_uses_configured_region() {
        let signer = SigV4Signer::from_env(Some("eu-west-1".to_string()))
            .await
            .unwrap();
        assert_eq!(signer.region, "eu-west-1");
    }
}
