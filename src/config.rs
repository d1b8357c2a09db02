use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

use config::{Config as ConfigLib, ConfigBuilder, ConfigError, Environment, builder::DefaultState};
use serde::{Deserialize, Serialize};

use crate::inbound::dispatcher::{DispatchMode, EventDispatcher};
use crate::inbound::replay_guard::ReplayGuard;
use crate::inbound::verification::VerificationEngine;
use crate::outbound::webhook::delivery_client::DeliveryConfig;
use crate::outbound::webhook::envelope::SignatureScheme;
use crate::outbound::webhook::hmac_signer::{HmacSigner, SigningError};

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub webhook: WebhookConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Clone, Deserialize)]
pub struct WebhookConfig {
    /// Shared HMAC secret; `whsec_<base64>` or raw text
    pub secret: String,
    pub scheme: SignatureScheme,
    /// Receiver for outbound deliveries; the trigger routes are disabled without it
    pub target_url: Option<String>,
    /// Total delivery attempts, the first one included
    pub max_retries: u32,
    pub timeout_secs: u64,
    pub max_interval_secs: u64,
    /// Accepted clock skew either side of now when verifying
    pub tolerance_secs: u64,
    pub dispatch_mode: DispatchMode,
    pub dedupe_message_ids: bool,
}

impl fmt::Debug for WebhookConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WebhookConfig")
            .field("secret", &"<redacted>")
            .field("scheme", &self.scheme)
            .field("target_url", &self.target_url)
            .field("max_retries", &self.max_retries)
            .field("timeout_secs", &self.timeout_secs)
            .field("max_interval_secs", &self.max_interval_secs)
            .field("tolerance_secs", &self.tolerance_secs)
            .field("dispatch_mode", &self.dispatch_mode)
            .field("dedupe_message_ids", &self.dedupe_message_ids)
            .finish()
    }
}

impl Config {
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_with_sources(None)
    }

    /// Load from defaults plus `env_vars` (dotted keys such as `webhook.secret`)
    /// instead of the process environment.
    pub fn load_with_sources(env_vars: Option<HashMap<String, String>>) -> Result<Self, ConfigError> {
        let mut builder = Self::set_defaults()?;
        // If env_vars is provided, we use it instead of system environment
        // This is to avoid systems variables pollution across tests
        if let Some(vars) = env_vars {
            for (key, value) in vars {
                builder = builder.set_override(&key, value)?;
            }
        } else {
            // Should be in the format APP_SERVER__PORT or APP_WEBHOOK__SECRET
            builder = builder.add_source(
                Environment::with_prefix("APP")
                    .prefix_separator("_")
                    .separator("__"),
            );
        }

        let config: Self = builder.build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Set default values for the configuration.
    /// `webhook.secret` has no default; loading fails without it.
    fn set_defaults() -> Result<ConfigBuilder<DefaultState>, ConfigError> {
        ConfigLib::builder()
            .set_default("server.host", "127.0.0.1")?
            .set_default("server.port", 3000)?
            .set_default("webhook.scheme", "enveloped")?
            .set_default("webhook.max_retries", 3)?
            .set_default("webhook.timeout_secs", 10)?
            .set_default("webhook.max_interval_secs", 30)?
            .set_default("webhook.tolerance_secs", 300)?
            .set_default("webhook.dispatch_mode", "sequential")?
            .set_default("webhook.dedupe_message_ids", false)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.webhook.secret.trim().is_empty() {
            return Err(ConfigError::Message(
                "webhook.secret must not be empty".to_string(),
            ));
        }
        if self.webhook.max_retries == 0 {
            return Err(ConfigError::Message(
                "webhook.max_retries must be at least 1".to_string(),
            ));
        }
        if self.webhook.timeout_secs == 0 {
            return Err(ConfigError::Message(
                "webhook.timeout_secs must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Outbound delivery settings, or `None` when no target URL is configured
    pub fn delivery_config(&self) -> Option<DeliveryConfig> {
        let target_url = self
            .webhook
            .target_url
            .as_deref()
            .map(str::trim)
            .filter(|url| !url.is_empty())?;

        Some(
            DeliveryConfig::new(target_url, self.webhook.secret.clone())
                .with_scheme(self.webhook.scheme)
                .with_max_retries(self.webhook.max_retries)
                .with_request_timeout(Duration::from_secs(self.webhook.timeout_secs))
                .with_max_backoff_interval(Duration::from_secs(self.webhook.max_interval_secs)),
        )
    }

    pub fn verification_engine(&self) -> Result<VerificationEngine, SigningError> {
        let signer = HmacSigner::new(self.webhook.scheme, &self.webhook.secret)?;
        Ok(VerificationEngine::new(signer)
            .with_tolerance(Duration::from_secs(self.webhook.tolerance_secs)))
    }

    pub fn event_dispatcher(&self) -> EventDispatcher {
        EventDispatcher::new(self.webhook.dispatch_mode)
    }

    pub fn replay_guard(&self) -> Option<ReplayGuard> {
        self.webhook
            .dedupe_message_ids
            .then(|| ReplayGuard::new(Duration::from_secs(self.webhook.tolerance_secs)))
    }
}
