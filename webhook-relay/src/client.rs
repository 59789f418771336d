//! HTTP client for delivering webhook envelopes to the downstream endpoint.

use crate::config::parse_endpoint;
use crate::credentials::Credential;
use crate::error::{Error, Result};
use async_trait::async_trait;
use bytes::Bytes;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Client, StatusCode};
use std::time::Duration;
use tracing::{debug, error, info};

/// Default timeout for HTTP requests in seconds.
const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Delivers an envelope downstream.
#[async_trait]
pub trait Forwarder: Send + Sync {
    /// Sends `body` to `endpoint` with the credential as bearer authorization and
    /// returns the downstream status on success.
    async fn forward(&self, endpoint: &str, credential: &Credential, body: Bytes)
        -> Result<StatusCode>;
}

/// Webhook HTTP client.
///
/// Wraps a pooled `reqwest::Client` whose timeout bounds every outbound call. The
/// same client is shared with the credential provider.
pub struct WebhookClient {
    client: Client,
}

impl WebhookClient {
    /// Creates a new client with the given timeout, or the default of 30 seconds.
    pub fn new(timeout_secs: Option<u64>) -> Result<Self> {
        let timeout_secs = timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS);
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .user_agent(concat!("webhook-relay/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| Error::Http(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self { client })
    }

    /// The underlying HTTP client.
    pub fn http(&self) -> &Client {
        &self.client
    }
}

#[async_trait]
impl Forwarder for WebhookClient {
    async fn forward(
        &self,
        endpoint: &str,
        credential: &Credential,
        body: Bytes,
    ) -> Result<StatusCode> {
        let url = parse_endpoint(endpoint, "EXTERNAL_WEBHOOK_URL")?;
        info!("Forwarding event to {}", url);
        debug!("Payload size: {} bytes", body.len());

        let response = self
            .client
            .post(url)
            .header(CONTENT_TYPE, "application/json")
            .header(AUTHORIZATION, credential.bearer())
            .body(body)
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            return Ok(status);
        }

        let error_body = response
            .text()
            .await
            .unwrap_or_else(|_| "<unable to read error response>".to_string());
        error!(
            "Downstream rejected event: Status {}, Body: {}",
            status, error_body
        );
        Err(Error::Forward(format!(
            "downstream responded with status {}: {}",
            status, error_body
        )))
    }
}
