use thiserror::Error;

use super::hmac_signer::SigningError;

/// Outcome classification for a failed delivery.
///
/// `Network` and `Server` are retryable; everything else ends the send.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DeliveryError {
    #[error("Invalid delivery configuration: {0}")]
    Configuration(String),

    #[error("Failed to serialize payload: {0}")]
    Serialization(String),

    #[error("Failed to sign payload: {0}")]
    Signing(#[from] SigningError),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Client error: status={status}, body={body}")]
    Client { status: u16, body: String },

    #[error("Server error: status={status}, body={body}")]
    Server { status: u16, body: String },

    #[error("Retries exhausted after {attempts} attempts: {last}")]
    RetriesExhausted {
        attempts: u32,
        last: Box<DeliveryError>,
    },

    #[error("Delivery cancelled")]
    Cancelled,
}

impl DeliveryError {
    /// Whether resending the identical request could plausibly succeed
    pub fn is_retryable(&self) -> bool {
        matches!(self, DeliveryError::Network(_) | DeliveryError::Server { .. })
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, DeliveryError::Cancelled)
    }

    /// HTTP status attached to this error, looking through exhaustion
    pub fn status_code(&self) -> Option<u16> {
        match self.root_cause() {
            DeliveryError::Client { status, .. } | DeliveryError::Server { status, .. } => {
                Some(*status)
            }
            _ => None,
        }
    }

    /// The last underlying error when retries ran out, otherwise `self`
    pub fn root_cause(&self) -> &DeliveryError {
        match self {
            DeliveryError::RetriesExhausted { last, .. } => last.root_cause(),
            other => other,
        }
    }
}

impl From<serde_json::Error> for DeliveryError {
    fn from(err: serde_json::Error) -> Self {
        DeliveryError::Serialization(err.to_string())
    }
}

impl From<reqwest::Error> for DeliveryError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            DeliveryError::Network(format!("request timed out: {err}"))
        } else if err.is_connect() {
            DeliveryError::Network(format!("connection failed: {err}"))
        } else {
            DeliveryError::Network(err.to_string())
        }
    }
}
