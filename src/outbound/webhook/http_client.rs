use reqwest::{Client, Response};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

use super::envelope::{SignatureScheme, SignedEnvelope};
use super::error::DeliveryError;

/// Limit response body size kept for error reporting to 1MB
const MAX_BODY_SIZE: usize = 1024 * 1024;

/// Raw outcome of one HTTP attempt that reached the receiver
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttemptResponse {
    pub status_code: u16,
    pub response_time_ms: u64,
    pub body: String,
}

/// HTTP client wrapper for webhook delivery
#[derive(Debug, Clone)]
pub struct WebhookHttpClient {
    client: Client,
    timeout: Duration,
}

impl WebhookHttpClient {
    /// Create a new HTTP client with default timeout (10 seconds)
    pub fn new() -> Result<Self, DeliveryError> {
        Self::with_timeout(Duration::from_secs(10))
    }

    /// Create a new HTTP client with custom per-request timeout
    pub fn with_timeout(timeout: Duration) -> Result<Self, DeliveryError> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(format!("SignedWebhooks/{}", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| DeliveryError::Configuration(e.to_string()))?;

        Ok(Self { client, timeout })
    }

    /// Wrap a caller-supplied client, e.g. to share a connection pool.
    ///
    /// The caller's client keeps its own timeout settings; `timeout` is applied per request.
    pub fn from_client(client: Client, timeout: Duration) -> Self {
        Self { client, timeout }
    }

    /// POST a signed envelope once.
    ///
    /// Any response that arrives is returned as-is; only transport failures are errors.
    pub async fn send_envelope(
        &self,
        url: &str,
        envelope: &SignedEnvelope,
        scheme: SignatureScheme,
    ) -> Result<AttemptResponse, DeliveryError> {
        debug!(url = %url, message_id = %envelope.message_id, "Sending webhook");

        let start = Instant::now();

        let mut request = self.client.post(url).timeout(self.timeout);
        for (name, value) in envelope.headers(scheme)? {
            request = request.header(name, value);
        }

        let response = request
            .body(envelope.raw_body.clone())
            .send()
            .await
            .map_err(|e| {
                warn!(url = %url, error = %e, "Webhook request failed");
                DeliveryError::from(e)
            })?;

        let response_time_ms = start.elapsed().as_millis() as u64;
        let status_code = response.status().as_u16();

        debug!(
            url = %url,
            status = %status_code,
            response_time_ms = %response_time_ms,
            "Webhook response received"
        );

        let body = self.read_response_body(response).await?;

        Ok(AttemptResponse {
            status_code,
            response_time_ms,
            body,
        })
    }

    /// Read response body with size limit
    async fn read_response_body(&self, response: Response) -> Result<String, DeliveryError> {
        let bytes = response
            .bytes()
            .await
            .map_err(|e| DeliveryError::Network(format!("Failed to read response body: {e}")))?;

        if bytes.len() > MAX_BODY_SIZE {
            warn!(
                size = bytes.len(),
                max_size = MAX_BODY_SIZE,
                "Response body too large, truncating"
            );
        }

        Ok(String::from_utf8_lossy(&bytes[..bytes.len().min(MAX_BODY_SIZE)]).to_string())
    }

    /// Get configured timeout
    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}
