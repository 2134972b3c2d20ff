//! Backend seam: turning one object reference into a fetchable URL.
//!
//! The production implementation is [`HttpSigner`], which calls the signing
//! endpoint over HTTP. The response envelope may be either
//! `{"url": "..."}` or `{"data": {"url": "..."}}`.

use super::SignError;
use crate::config::SigningConfig;
use futures::future::BoxFuture;
use serde::Deserialize;
use std::sync::Arc;

/// Something that can sign object references.
///
/// Returns a `'static` future so signing can run on a spawned task that
/// outlives the caller.
pub trait Signer: Send + Sync {
    fn sign(&self, reference: &str) -> BoxFuture<'static, Result<String, SignError>>;
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum SignResponse {
    Flat { url: String },
    Enveloped { data: SignedUrlBody },
}

#[derive(Debug, Deserialize)]
struct SignedUrlBody {
    url: String,
}

impl SignResponse {
    fn into_url(self) -> String {
        match self {
            SignResponse::Flat { url } => url,
            SignResponse::Enveloped { data } => data.url,
        }
    }
}

/// Signs references with `GET {endpoint}?{query_param}={reference}`.
#[derive(Debug, Clone)]
pub struct HttpSigner {
    client: reqwest::Client,
    endpoint: String,
    query_param: String,
    auth_token: Option<String>,
}

impl HttpSigner {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: endpoint.into(),
            query_param: "key".to_string(),
            auth_token: None,
        }
    }

    /// Build from config; `None` when no endpoint is configured.
    pub fn from_config(config: &SigningConfig) -> Option<Self> {
        let endpoint = config.endpoint.as_ref()?;
        Some(Self {
            client: reqwest::Client::new(),
            endpoint: endpoint.clone(),
            query_param: config.query_param.clone(),
            auth_token: config.auth_token.clone(),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

impl Signer for HttpSigner {
    fn sign(&self, reference: &str) -> BoxFuture<'static, Result<String, SignError>> {
        let mut request = self
            .client
            .get(&self.endpoint)
            .query(&[(self.query_param.as_str(), reference)]);
        if let Some(token) = &self.auth_token {
            request = request.bearer_auth(token);
        }

        Box::pin(async move {
            let response = request.send().await.map_err(|e| SignError::Request(Arc::new(e)))?;
            let status = response.status();
            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                return Err(SignError::Status {
                    status: status.as_u16(),
                    body,
                });
            }
            let body: SignResponse = response
                .json()
                .await
                .map_err(|e| SignError::Request(Arc::new(e)))?;
            let url = body.into_url();
            if url.is_empty() {
                return Err(SignError::MissingUrl);
            }
            Ok(url)
        })
    }
}

/// Signer used when no endpoint is configured: every call fails.
#[derive(Debug, Default, Clone, Copy)]
pub struct UnconfiguredSigner;

impl Signer for UnconfiguredSigner {
    fn sign(&self, _reference: &str) -> BoxFuture<'static, Result<String, SignError>> {
        Box::pin(async { Err(SignError::NoEndpoint) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_flat_response() {
        let body: SignResponse =
            serde_json::from_str(r#"{"url":"https://cdn/x.png?Signature=1"}"#).unwrap();
        assert_eq!(body.into_url(), "https://cdn/x.png?Signature=1");
    }

    #[test]
    fn parses_enveloped_response() {
        let body: SignResponse =
            serde_json::from_str(r#"{"code":0,"data":{"url":"https://cdn/y.png"}}"#).unwrap();
        assert_eq!(body.into_url(), "https://cdn/y.png");
    }

    #[test]
    fn rejects_response_without_url() {
        assert!(serde_json::from_str::<SignResponse>(r#"{"data":{}}"#).is_err());
    }

    #[test]
    fn from_config_requires_endpoint() {
        assert!(HttpSigner::from_config(&SigningConfig::default()).is_none());

        let config = SigningConfig {
            endpoint: Some("https://api.example.com/sign".to_string()),
            query_param: "path".to_string(),
            ..SigningConfig::default()
        };
        let signer = HttpSigner::from_config(&config).unwrap();
        assert_eq!(signer.endpoint(), "https://api.example.com/sign");
        assert_eq!(signer.query_param, "path");
    }

    #[tokio::test]
    async fn unconfigured_signer_fails() {
        let err = UnconfiguredSigner.sign("images/a.png").await.unwrap_err();
        assert!(matches!(err, SignError::NoEndpoint));
    }
}
