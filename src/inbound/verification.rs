use std::time::Duration;

use axum::http::HeaderMap;
use sha2::{Digest, Sha256};
use thiserror::Error;
use time::OffsetDateTime;
use tracing::debug;

use crate::domain::payload::Payload;
use crate::domain::ports::InboundEvent;
use crate::outbound::webhook::envelope::SignatureScheme;
use crate::outbound::webhook::hmac_signer::HmacSigner;

/// Default freshness window: five minutes either side of the receiver's clock
pub const DEFAULT_TOLERANCE: Duration = Duration::from_secs(300);

/// Reasons an inbound webhook is rejected
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VerificationError {
    #[error("Missing signature headers")]
    MissingHeaders,

    #[error("Invalid signature timestamp")]
    InvalidTimestamp,

    #[error("Timestamp outside tolerance: {age_secs}s from now (max: {tolerance_secs}s)")]
    StaleTimestamp { age_secs: u64, tolerance_secs: u64 },

    #[error("Invalid signature")]
    BadSignature,

    #[error("Malformed payload: {0}")]
    MalformedBody(String),
}

/// The inbound header values and raw body of one request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VerificationContext<'a> {
    pub message_id: Option<&'a str>,
    pub timestamp: Option<&'a str>,
    pub signature: Option<&'a str>,
    pub body: &'a [u8],
}

impl<'a> VerificationContext<'a> {
    pub fn new(
        message_id: Option<&'a str>,
        timestamp: Option<&'a str>,
        signature: Option<&'a str>,
        body: &'a [u8],
    ) -> Self {
        Self {
            message_id,
            timestamp,
            signature,
            body,
        }
    }

    /// Pull the scheme's three headers out of a request. Empty or non-ASCII values count as absent.
    pub fn from_headers(headers: &'a HeaderMap, scheme: SignatureScheme, body: &'a [u8]) -> Self {
        let names = scheme.headers();
        let get = |name: &str| {
            headers
                .get(name)
                .and_then(|value| value.to_str().ok())
                .map(str::trim)
                .filter(|value| !value.is_empty())
        };

        Self::new(
            get(names.id),
            get(names.timestamp),
            get(names.signature),
            body,
        )
    }
}

/// A webhook that passed every check
#[derive(Debug, Clone, PartialEq)]
pub struct VerifiedWebhook {
    pub message_id: String,
    /// Signing time claimed by the sender, unix seconds
    pub signed_at: i64,
    pub payload: Payload,
    /// Identity of this delivery as covered by the signature; retries of one
    /// envelope share it. Enveloped: the message ID. Simple: a body digest,
    /// since the ID header is not signed.
    pub replay_key: String,
}

impl VerifiedWebhook {
    pub fn into_event(self) -> InboundEvent {
        InboundEvent::new(self.message_id, self.payload)
    }
}

/// Stateless verifier for inbound webhooks.
///
/// Checks run in a fixed order: required headers, timestamp freshness (from the
/// header, never from the body), signature, then payload parsing.
#[derive(Debug, Clone)]
pub struct VerificationEngine {
    signer: HmacSigner,
    tolerance: Duration,
}

impl VerificationEngine {
    pub fn new(signer: HmacSigner) -> Self {
        Self {
            signer,
            tolerance: DEFAULT_TOLERANCE,
        }
    }

    pub fn with_tolerance(mut self, tolerance: Duration) -> Self {
        self.tolerance = tolerance;
        self
    }

    pub fn scheme(&self) -> SignatureScheme {
        self.signer.scheme()
    }

    pub fn tolerance(&self) -> Duration {
        self.tolerance
    }

    /// Verify against the current time
    pub fn verify(&self, ctx: &VerificationContext<'_>) -> Result<VerifiedWebhook, VerificationError> {
        self.verify_at(ctx, OffsetDateTime::now_utc())
    }

    /// Extract the context from request headers and verify
    pub fn verify_headers(
        &self,
        headers: &HeaderMap,
        body: &[u8],
    ) -> Result<VerifiedWebhook, VerificationError> {
        self.verify(&VerificationContext::from_headers(headers, self.scheme(), body))
    }

    /// Verify against an explicit clock
    pub fn verify_at(
        &self,
        ctx: &VerificationContext<'_>,
        now: OffsetDateTime,
    ) -> Result<VerifiedWebhook, VerificationError> {
        let (Some(message_id), Some(timestamp), Some(signature)) =
            (ctx.message_id, ctx.timestamp, ctx.signature)
        else {
            return Err(VerificationError::MissingHeaders);
        };

        let signed_at = self
            .scheme()
            .parse_timestamp(timestamp)
            .ok_or(VerificationError::InvalidTimestamp)?;

        let age_secs = now.unix_timestamp().abs_diff(signed_at);
        let tolerance_secs = self.tolerance.as_secs();
        if age_secs > tolerance_secs {
            debug!(message_id = %message_id, age_secs, tolerance_secs, "Rejecting stale webhook");
            return Err(VerificationError::StaleTimestamp {
                age_secs,
                tolerance_secs,
            });
        }

        if !self.signer.verify(message_id, signed_at, ctx.body, signature) {
            debug!(message_id = %message_id, "Rejecting webhook with bad signature");
            return Err(VerificationError::BadSignature);
        }

        let payload: Payload = serde_json::from_slice(ctx.body)
            .map_err(|e| VerificationError::MalformedBody(e.to_string()))?;

        let replay_key = match self.scheme() {
            SignatureScheme::Enveloped => message_id.to_string(),
            SignatureScheme::Simple => format!("sha256:{}", hex::encode(Sha256::digest(ctx.body))),
        };

        Ok(VerifiedWebhook {
            message_id: message_id.to_string(),
            signed_at,
            payload,
            replay_key,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::outbound::webhook::envelope::SignedEnvelope;
    use axum::http::HeaderValue;
    use serde_json::json;
    use time::macros::datetime;

    const SECRET: &str = "s3cr3t";
    const NOW: OffsetDateTime = datetime!(2024-01-15 10:30:00 UTC);

    fn engine(scheme: SignatureScheme) -> VerificationEngine {
        VerificationEngine::new(HmacSigner::new(scheme, SECRET).unwrap())
    }

    fn payload() -> Payload {
        Payload::with_timestamp(
            "order.created",
            datetime!(2024-01-15 10:29:59.5 UTC),
            json!({"order_id": "12345", "amount": 99.99}),
        )
    }

    fn sealed_at(scheme: SignatureScheme, signed_at: OffsetDateTime) -> SignedEnvelope {
        let signer = HmacSigner::new(scheme, SECRET).unwrap();
        SignedEnvelope::seal_at(
            &signer,
            "msg_test".to_string(),
            signed_at.unix_timestamp(),
            payload().to_canonical_json().unwrap(),
        )
        .unwrap()
    }

    fn header_map(scheme: SignatureScheme, envelope: &SignedEnvelope) -> HeaderMap {
        let mut headers = HeaderMap::new();
        for (name, value) in envelope.headers(scheme).unwrap() {
            headers.insert(name, HeaderValue::from_str(&value).unwrap());
        }
        headers
    }

    fn verify_envelope(
        engine: &VerificationEngine,
        envelope: &SignedEnvelope,
        now: OffsetDateTime,
    ) -> Result<VerifiedWebhook, VerificationError> {
        let timestamp = envelope.signing_timestamp.to_string();
        let ctx = VerificationContext::new(
            Some(&envelope.message_id),
            Some(&timestamp),
            Some(&envelope.signature),
            &envelope.raw_body,
        );
        engine.verify_at(&ctx, now)
    }

    #[test]
    fn test_round_trip_returns_original_payload() {
        let envelope = sealed_at(SignatureScheme::Enveloped, NOW);
        let verified = verify_envelope(&engine(SignatureScheme::Enveloped), &envelope, NOW).unwrap();

        assert_eq!(verified.payload, payload());
        assert_eq!(verified.message_id, "msg_test");
        assert_eq!(verified.signed_at, NOW.unix_timestamp());
    }

    #[test]
    fn test_round_trip_anywhere_inside_window() {
        let engine = engine(SignatureScheme::Enveloped);
        for offset in [-300, -120, 0, 120, 300] {
            let envelope = sealed_at(SignatureScheme::Enveloped, NOW + time::Duration::seconds(offset));
            assert!(verify_envelope(&engine, &envelope, NOW).is_ok(), "offset {offset}");
        }
    }

    #[test]
    fn test_round_trip_through_header_map() {
        for scheme in [SignatureScheme::Enveloped, SignatureScheme::Simple] {
            let now = OffsetDateTime::now_utc();
            let envelope = sealed_at(scheme, now);
            let headers = header_map(scheme, &envelope);

            let verified = engine(scheme)
                .verify_headers(&headers, &envelope.raw_body)
                .unwrap();
            assert_eq!(verified.payload, payload(), "scheme {scheme}");
        }
    }

    #[test]
    fn test_every_body_byte_is_covered() {
        let engine = engine(SignatureScheme::Enveloped);
        let envelope = sealed_at(SignatureScheme::Enveloped, NOW);

        for i in 0..envelope.raw_body.len() {
            let mut tampered = envelope.clone();
            tampered.raw_body[i] ^= 0x01;
            assert_eq!(
                verify_envelope(&engine, &tampered, NOW),
                Err(VerificationError::BadSignature),
                "byte {i}"
            );
        }
    }

    #[test]
    fn test_message_id_is_covered() {
        let mut envelope = sealed_at(SignatureScheme::Enveloped, NOW);
        envelope.message_id = "msg_tesT".to_string();

        assert_eq!(
            verify_envelope(&engine(SignatureScheme::Enveloped), &envelope, NOW),
            Err(VerificationError::BadSignature)
        );
    }

    #[test]
    fn test_timestamp_is_covered() {
        let mut envelope = sealed_at(SignatureScheme::Enveloped, NOW);
        envelope.signing_timestamp += 1;

        assert_eq!(
            verify_envelope(&engine(SignatureScheme::Enveloped), &envelope, NOW),
            Err(VerificationError::BadSignature)
        );
    }

    #[test]
    fn test_replay_outside_window_rejected() {
        let engine = engine(SignatureScheme::Enveloped);
        let old = sealed_at(SignatureScheme::Enveloped, NOW - time::Duration::minutes(6));

        assert_eq!(
            verify_envelope(&engine, &old, NOW),
            Err(VerificationError::StaleTimestamp {
                age_secs: 360,
                tolerance_secs: 300
            })
        );
    }

    #[test]
    fn test_future_timestamp_outside_window_rejected() {
        let engine = engine(SignatureScheme::Enveloped);
        let future = sealed_at(SignatureScheme::Enveloped, NOW + time::Duration::minutes(6));

        assert!(matches!(
            verify_envelope(&engine, &future, NOW),
            Err(VerificationError::StaleTimestamp { .. })
        ));
    }

    #[test]
    fn test_custom_tolerance() {
        let envelope = sealed_at(SignatureScheme::Enveloped, NOW - time::Duration::seconds(100));

        let strict = engine(SignatureScheme::Enveloped).with_tolerance(Duration::from_secs(60));
        assert!(verify_envelope(&strict, &envelope, NOW).is_err());

        let relaxed = engine(SignatureScheme::Enveloped).with_tolerance(Duration::from_secs(200));
        assert!(verify_envelope(&relaxed, &envelope, NOW).is_ok());
    }

    #[test]
    fn test_freshness_checked_before_signature() {
        let mut stale = sealed_at(SignatureScheme::Enveloped, NOW - time::Duration::hours(1));
        stale.signature = "v1,AAAA".to_string();

        assert!(matches!(
            verify_envelope(&engine(SignatureScheme::Enveloped), &stale, NOW),
            Err(VerificationError::StaleTimestamp { .. })
        ));
    }

    #[test]
    fn test_missing_headers_rejected_before_body() {
        let engine = engine(SignatureScheme::Enveloped);
        let body = b"not even json";
        let cases = [
            VerificationContext::new(None, Some("1705314600"), Some("v1,x"), body),
            VerificationContext::new(Some("msg"), None, Some("v1,x"), body),
            VerificationContext::new(Some("msg"), Some("1705314600"), None, body),
        ];

        for ctx in cases {
            assert_eq!(
                engine.verify_at(&ctx, NOW),
                Err(VerificationError::MissingHeaders)
            );
        }
    }

    #[test]
    fn test_empty_header_counts_as_missing() {
        let mut headers = HeaderMap::new();
        headers.insert("svix-id", HeaderValue::from_static("msg_1"));
        headers.insert("svix-timestamp", HeaderValue::from_static("1705314600"));
        headers.insert("svix-signature", HeaderValue::from_static(""));

        let ctx = VerificationContext::from_headers(&headers, SignatureScheme::Enveloped, b"{}");
        assert_eq!(ctx.signature, None);
        assert_eq!(
            engine(SignatureScheme::Enveloped).verify_at(&ctx, NOW),
            Err(VerificationError::MissingHeaders)
        );
    }

    #[test]
    fn test_unparsable_timestamp_rejected() {
        let ctx = VerificationContext::new(Some("msg"), Some("yesterday"), Some("v1,x"), b"{}");
        assert_eq!(
            engine(SignatureScheme::Enveloped).verify_at(&ctx, NOW),
            Err(VerificationError::InvalidTimestamp)
        );
    }

    #[test]
    fn test_malformed_body_is_distinct_from_bad_signature() {
        let signer = HmacSigner::new(SignatureScheme::Enveloped, SECRET).unwrap();
        let engine = VerificationEngine::new(signer.clone());

        for body in [&b"{not json"[..], &br#"{"event":"x"}"#[..], &b"[1,2,3]"[..]] {
            let envelope = SignedEnvelope::seal_at(
                &signer,
                "msg_bad".to_string(),
                NOW.unix_timestamp(),
                body.to_vec(),
            )
            .unwrap();

            assert!(matches!(
                verify_envelope(&engine, &envelope, NOW),
                Err(VerificationError::MalformedBody(_))
            ));
        }
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let envelope = sealed_at(SignatureScheme::Enveloped, NOW);
        let other = VerificationEngine::new(
            HmacSigner::new(SignatureScheme::Enveloped, "another-secret").unwrap(),
        );

        assert_eq!(
            verify_envelope(&other, &envelope, NOW),
            Err(VerificationError::BadSignature)
        );
    }

    #[test]
    fn test_mixed_schemes_do_not_verify() {
        let now = OffsetDateTime::now_utc();
        let envelope = sealed_at(SignatureScheme::Simple, now);
        let mut headers = header_map(SignatureScheme::Simple, &envelope);
        // Present simple-scheme values under enveloped header names
        headers.insert("svix-id", HeaderValue::from_static("msg_test"));
        headers.insert(
            "svix-timestamp",
            HeaderValue::from_str(&now.unix_timestamp().to_string()).unwrap(),
        );
        headers.insert(
            "svix-signature",
            HeaderValue::from_str(&envelope.signature).unwrap(),
        );

        assert_eq!(
            engine(SignatureScheme::Enveloped).verify_headers(&headers, &envelope.raw_body),
            Err(VerificationError::BadSignature)
        );
    }

    #[test]
    fn test_simple_replay_key_ignores_unsigned_id() {
        let now = OffsetDateTime::now_utc();
        let envelope = sealed_at(SignatureScheme::Simple, now);
        let engine = engine(SignatureScheme::Simple);

        let mut keys = Vec::new();
        for id in ["msg_original", "msg_forged"] {
            let mut headers = header_map(SignatureScheme::Simple, &envelope);
            headers.insert("x-webhook-id", HeaderValue::from_static(id));

            let verified = engine.verify_headers(&headers, &envelope.raw_body).unwrap();
            assert_eq!(verified.message_id, id);
            keys.push(verified.replay_key);
        }

        assert_eq!(keys[0], keys[1]);
        assert!(keys[0].starts_with("sha256:"));
    }

    #[test]
    fn test_enveloped_replay_key_is_message_id() {
        let envelope = sealed_at(SignatureScheme::Enveloped, NOW);
        let verified = verify_envelope(&engine(SignatureScheme::Enveloped), &envelope, NOW).unwrap();

        assert_eq!(verified.replay_key, "msg_test");
    }
}
