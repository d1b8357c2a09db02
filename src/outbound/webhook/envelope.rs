use std::fmt;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use uuid::Uuid;

use super::hmac_signer::{HmacSigner, SigningError};

/// Which signing/header convention a deployment uses.
///
/// Both sides must agree; the scheme is chosen by configuration, never negotiated.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SignatureScheme {
    /// `svix-*` headers, HMAC over `id.timestamp.body`, base64 `v1,` signatures
    #[default]
    Enveloped,
    /// `X-Webhook-*` headers, HMAC over the body alone, hex signatures
    Simple,
}

impl SignatureScheme {
    pub fn as_str(&self) -> &'static str {
        match self {
            SignatureScheme::Enveloped => "enveloped",
            SignatureScheme::Simple => "simple",
        }
    }

    /// Header names carrying the envelope under this scheme
    pub fn headers(&self) -> HeaderNames {
        match self {
            SignatureScheme::Enveloped => HeaderNames {
                id: "svix-id",
                timestamp: "svix-timestamp",
                signature: "svix-signature",
            },
            SignatureScheme::Simple => HeaderNames {
                id: "x-webhook-id",
                timestamp: "x-webhook-timestamp",
                signature: "x-webhook-signature",
            },
        }
    }

    /// Render a signing timestamp for the timestamp header
    pub fn format_timestamp(&self, timestamp: i64) -> Result<String, SigningError> {
        match self {
            SignatureScheme::Enveloped => Ok(timestamp.to_string()),
            SignatureScheme::Simple => OffsetDateTime::from_unix_timestamp(timestamp)
                .map_err(|e| SigningError::Timestamp(e.to_string()))?
                .format(&Rfc3339)
                .map_err(|e| SigningError::Timestamp(e.to_string())),
        }
    }

    /// Parse a timestamp header back into unix seconds
    pub fn parse_timestamp(&self, value: &str) -> Option<i64> {
        match self {
            SignatureScheme::Enveloped => value.trim().parse().ok(),
            SignatureScheme::Simple => OffsetDateTime::parse(value.trim(), &Rfc3339)
                .ok()
                .map(|t| t.unix_timestamp()),
        }
    }
}

impl fmt::Display for SignatureScheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lowercase header names for one scheme
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeaderNames {
    pub id: &'static str,
    pub timestamp: &'static str,
    pub signature: &'static str,
}

/// Everything needed to (re)send one logical delivery.
///
/// Built once per send; every retry transmits these exact bytes and headers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedEnvelope {
    pub message_id: String,
    pub signing_timestamp: i64,
    pub signature: String,
    pub raw_body: Vec<u8>,
}

impl SignedEnvelope {
    /// Sign `raw_body` under a fresh message ID at the current time
    pub fn seal(signer: &HmacSigner, raw_body: Vec<u8>) -> Result<Self, SigningError> {
        Self::seal_at(
            signer,
            new_message_id(),
            OffsetDateTime::now_utc().unix_timestamp(),
            raw_body,
        )
    }

    /// Sign with an explicit message ID and timestamp
    pub fn seal_at(
        signer: &HmacSigner,
        message_id: String,
        signing_timestamp: i64,
        raw_body: Vec<u8>,
    ) -> Result<Self, SigningError> {
        let signature = signer.sign(&message_id, signing_timestamp, &raw_body)?;
        Ok(Self {
            message_id,
            signing_timestamp,
            signature,
            raw_body,
        })
    }

    /// Header name/value pairs to attach to the outbound request
    pub fn headers(
        &self,
        scheme: SignatureScheme,
    ) -> Result<Vec<(&'static str, String)>, SigningError> {
        let names = scheme.headers();
        Ok(vec![
            ("content-type", "application/json".to_string()),
            (names.id, self.message_id.clone()),
            (names.timestamp, scheme.format_timestamp(self.signing_timestamp)?),
            (names.signature, self.signature.clone()),
        ])
    }
}

/// Process-unique message identifier: `msg_` followed by a UUID v4
pub fn new_message_id() -> String {
    format!("msg_{}", Uuid::new_v4())
}
