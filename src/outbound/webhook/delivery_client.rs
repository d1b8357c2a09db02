use std::fmt;
use std::time::Duration;

use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::domain::payload::Payload;
use crate::outbound::webhook::envelope::{SignatureScheme, SignedEnvelope};
use crate::outbound::webhook::error::DeliveryError;
use crate::outbound::webhook::hmac_signer::HmacSigner;
use crate::outbound::webhook::http_client::WebhookHttpClient;
use crate::outbound::webhook::retry_strategy::{RetryStrategy, StatusClass};

pub const DEFAULT_MAX_RETRIES: u32 = 3;
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_MAX_BACKOFF_INTERVAL: Duration = Duration::from_secs(30);
pub const DEFAULT_INITIAL_INTERVAL: Duration = Duration::from_secs(1);
pub const DEFAULT_JITTER_FACTOR: f64 = 0.25;

/// Configuration owned by one [`DeliveryClient`].
///
/// Build it with [`DeliveryConfig::new`] and the `with_*` methods; it is validated
/// once by [`DeliveryClient::new`] and never changes afterwards.
#[derive(Clone)]
pub struct DeliveryConfig {
    pub target_url: String,
    pub secret: String,
    pub scheme: SignatureScheme,
    /// Total attempts including the first one; at least 1
    pub max_retries: u32,
    pub request_timeout: Duration,
    pub max_backoff_interval: Duration,
    pub initial_interval: Duration,
    pub jitter_factor: f64,
}

impl DeliveryConfig {
    pub fn new(target_url: impl Into<String>, secret: impl Into<String>) -> Self {
        Self {
            target_url: target_url.into(),
            secret: secret.into(),
            scheme: SignatureScheme::default(),
            max_retries: DEFAULT_MAX_RETRIES,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            max_backoff_interval: DEFAULT_MAX_BACKOFF_INTERVAL,
            initial_interval: DEFAULT_INITIAL_INTERVAL,
            jitter_factor: DEFAULT_JITTER_FACTOR,
        }
    }

    pub fn with_scheme(mut self, scheme: SignatureScheme) -> Self {
        self.scheme = scheme;
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_max_backoff_interval(mut self, interval: Duration) -> Self {
        self.max_backoff_interval = interval;
        self
    }

    pub fn with_initial_interval(mut self, interval: Duration) -> Self {
        self.initial_interval = interval;
        self
    }

    pub fn with_jitter(mut self, jitter_factor: f64) -> Self {
        self.jitter_factor = jitter_factor;
        self
    }

    fn validate(&self) -> Result<(), DeliveryError> {
        if self.target_url.trim().is_empty() {
            return Err(DeliveryError::Configuration(
                "target URL is required".to_string(),
            ));
        }
        reqwest::Url::parse(&self.target_url).map_err(|e| {
            DeliveryError::Configuration(format!("invalid target URL {}: {e}", self.target_url))
        })?;
        if self.secret.is_empty() {
            return Err(DeliveryError::Configuration("secret is required".to_string()));
        }
        if self.max_retries == 0 {
            return Err(DeliveryError::Configuration(
                "max_retries must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    fn retry_strategy(&self) -> RetryStrategy {
        RetryStrategy::new(
            self.max_retries,
            self.initial_interval,
            self.max_backoff_interval,
        )
        .with_jitter(self.jitter_factor)
    }
}

impl fmt::Debug for DeliveryConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeliveryConfig")
            .field("target_url", &self.target_url)
            .field("secret", &"<redacted>")
            .field("scheme", &self.scheme)
            .field("max_retries", &self.max_retries)
            .field("request_timeout", &self.request_timeout)
            .field("max_backoff_interval", &self.max_backoff_interval)
            .field("initial_interval", &self.initial_interval)
            .field("jitter_factor", &self.jitter_factor)
            .finish()
    }
}

/// Terminal outcome of one logical send
#[derive(Debug, Clone, PartialEq)]
pub struct DeliveryResult {
    pub success: bool,
    /// Last HTTP status received, if any attempt reached the receiver
    pub status_code: Option<u16>,
    /// Set once the envelope has been sealed, on failure too
    pub message_id: Option<String>,
    pub error: Option<DeliveryError>,
    pub attempts: u32,
}

impl DeliveryResult {
    fn delivered(message_id: String, status_code: u16, attempts: u32) -> Self {
        Self {
            success: true,
            status_code: Some(status_code),
            message_id: Some(message_id),
            error: None,
            attempts,
        }
    }

    fn failed(
        message_id: Option<String>,
        status_code: Option<u16>,
        error: DeliveryError,
        attempts: u32,
    ) -> Self {
        Self {
            success: false,
            status_code,
            message_id,
            error: Some(error),
            attempts,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.error.as_ref().is_some_and(DeliveryError::is_cancelled)
    }
}

/// Reusable, signed webhook sender for one target
#[derive(Debug, Clone)]
pub struct DeliveryClient {
    config: DeliveryConfig,
    signer: HmacSigner,
    http: WebhookHttpClient,
    retry_strategy: RetryStrategy,
}

impl DeliveryClient {
    /// Validate the configuration and build a client with its own connection pool
    pub fn new(config: DeliveryConfig) -> Result<Self, DeliveryError> {
        config.validate()?;
        let http = WebhookHttpClient::with_timeout(config.request_timeout)?;
        Self::build(config, http)
    }

    /// Validate the configuration and send through a caller-supplied `reqwest::Client`
    pub fn with_http_client(
        config: DeliveryConfig,
        client: reqwest::Client,
    ) -> Result<Self, DeliveryError> {
        config.validate()?;
        let http = WebhookHttpClient::from_client(client, config.request_timeout);
        Self::build(config, http)
    }

    fn build(config: DeliveryConfig, http: WebhookHttpClient) -> Result<Self, DeliveryError> {
        let signer = HmacSigner::new(config.scheme, &config.secret)?;
        let retry_strategy = config.retry_strategy();
        Ok(Self {
            config,
            signer,
            http,
            retry_strategy,
        })
    }

    pub fn config(&self) -> &DeliveryConfig {
        &self.config
    }

    /// Send `data` as a new `event` payload stamped now
    pub async fn send<T: Serialize + ?Sized>(
        &self,
        event: &str,
        data: &T,
        cancel: &CancellationToken,
    ) -> DeliveryResult {
        let data = match serde_json::to_value(data) {
            Ok(value) => value,
            Err(e) => return DeliveryResult::failed(None, None, DeliveryError::from(e), 0),
        };

        self.send_payload(&Payload::new(event, data), cancel).await
    }

    /// Like [`send`](Self::send), cancelled automatically once `deadline` elapses
    pub async fn send_with_deadline<T: Serialize + ?Sized>(
        &self,
        event: &str,
        data: &T,
        deadline: Duration,
    ) -> DeliveryResult {
        let cancel = CancellationToken::new();
        let send = self.send(event, data, &cancel);
        tokio::pin!(send);

        tokio::select! {
            result = &mut send => result,
            () = tokio::time::sleep(deadline) => {
                debug!(deadline_ms = deadline.as_millis() as u64, "Delivery deadline reached");
                cancel.cancel();
                send.await
            }
        }
    }

    /// Serialize, sign once and deliver a caller-built payload.
    ///
    /// The signing timestamp is taken at send time and may differ from `payload.timestamp`.
    pub async fn send_payload(
        &self,
        payload: &Payload,
        cancel: &CancellationToken,
    ) -> DeliveryResult {
        let raw_body = match payload.to_canonical_json() {
            Ok(bytes) => bytes,
            Err(e) => return DeliveryResult::failed(None, None, DeliveryError::from(e), 0),
        };

        let envelope = match SignedEnvelope::seal(&self.signer, raw_body) {
            Ok(envelope) => envelope,
            Err(e) => return DeliveryResult::failed(None, None, DeliveryError::from(e), 0),
        };

        self.deliver(&envelope, &payload.event, cancel).await
    }

    /// Retry loop: resend the identical envelope until success, a permanent failure,
    /// exhaustion or cancellation.
    async fn deliver(
        &self,
        envelope: &SignedEnvelope,
        event: &str,
        cancel: &CancellationToken,
    ) -> DeliveryResult {
        let message_id = &envelope.message_id;
        let mut attempts: u32 = 0;
        let mut last_status: Option<u16> = None;

        loop {
            if cancel.is_cancelled() {
                return self.cancelled(envelope, last_status, attempts);
            }

            attempts += 1;
            debug!(
                message_id = %message_id,
                event = %event,
                attempt = attempts,
                "Delivery attempt"
            );

            let attempt =
                self.http
                    .send_envelope(&self.config.target_url, envelope, self.config.scheme);
            let outcome = tokio::select! {
                biased;
                () = cancel.cancelled() => return self.cancelled(envelope, last_status, attempts),
                outcome = attempt => outcome,
            };

            let error = match outcome {
                Ok(response) => {
                    last_status = Some(response.status_code);
                    match RetryStrategy::classify(response.status_code) {
                        StatusClass::Success => {
                            info!(
                                message_id = %message_id,
                                event = %event,
                                attempt = attempts,
                                status_code = response.status_code,
                                response_time_ms = response.response_time_ms,
                                "Webhook delivered successfully"
                            );
                            return DeliveryResult::delivered(
                                message_id.clone(),
                                response.status_code,
                                attempts,
                            );
                        }
                        StatusClass::Permanent => DeliveryError::Client {
                            status: response.status_code,
                            body: response.body,
                        },
                        StatusClass::Retryable => DeliveryError::Server {
                            status: response.status_code,
                            body: response.body,
                        },
                    }
                }
                Err(e) => e,
            };

            if !error.is_retryable() {
                warn!(
                    message_id = %message_id,
                    event = %event,
                    attempt = attempts,
                    error = %error,
                    "Webhook delivery failed permanently"
                );
                return DeliveryResult::failed(
                    Some(message_id.clone()),
                    last_status,
                    error,
                    attempts,
                );
            }

            let Some(delay) = self.retry_strategy.next_delay(attempts) else {
                warn!(
                    message_id = %message_id,
                    event = %event,
                    attempts = attempts,
                    error = %error,
                    "Webhook delivery failed, retries exhausted"
                );
                return DeliveryResult::failed(
                    Some(message_id.clone()),
                    last_status,
                    DeliveryError::RetriesExhausted {
                        attempts,
                        last: Box::new(error),
                    },
                    attempts,
                );
            };

            warn!(
                message_id = %message_id,
                event = %event,
                attempt = attempts,
                max_attempts = self.retry_strategy.max_attempts(),
                delay_ms = delay.as_millis() as u64,
                error = %error,
                "Webhook delivery failed, will retry"
            );

            tokio::select! {
                biased;
                () = cancel.cancelled() => return self.cancelled(envelope, last_status, attempts),
                () = tokio::time::sleep(delay) => {}
            }
        }
    }

    fn cancelled(
        &self,
        envelope: &SignedEnvelope,
        last_status: Option<u16>,
        attempts: u32,
    ) -> DeliveryResult {
        info!(
            message_id = %envelope.message_id,
            attempts = attempts,
            "Webhook delivery cancelled"
        );
        DeliveryResult::failed(
            Some(envelope.message_id.clone()),
            last_status,
            DeliveryError::Cancelled,
            attempts,
        )
    }
}
