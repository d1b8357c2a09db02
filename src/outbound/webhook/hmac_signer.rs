use std::fmt;

use base64::{Engine, engine::general_purpose::STANDARD as BASE64};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::{Choice, ConstantTimeEq};
use thiserror::Error;

use super::envelope::SignatureScheme;

type HmacSha256 = Hmac<Sha256>;

/// Prefix of base64-encoded secrets issued for the enveloped scheme
const SECRET_PREFIX: &str = "whsec_";

/// Version tag of enveloped signatures
const SIGNATURE_VERSION: &str = "v1";

/// Error type for signing operations. Never carries secret material.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SigningError {
    #[error("Signing secret is empty")]
    EmptySecret,

    #[error("Signing secret is not valid base64: {0}")]
    InvalidSecret(String),

    #[error("HMAC key rejected")]
    InvalidKey,

    #[error("Invalid signing timestamp: {0}")]
    Timestamp(String),
}

/// HMAC-SHA256 signer for webhook authentication
///
/// Holds only the scheme and key bytes; sign and verify take `&self`.
#[derive(Clone)]
pub struct HmacSigner {
    scheme: SignatureScheme,
    key: Vec<u8>,
}

impl HmacSigner {
    /// New HMAC signer for the given scheme and shared secret
    pub fn new(scheme: SignatureScheme, secret: &str) -> Result<Self, SigningError> {
        if secret.is_empty() {
            return Err(SigningError::EmptySecret);
        }

        let key = match (scheme, secret.strip_prefix(SECRET_PREFIX)) {
            (SignatureScheme::Enveloped, Some(encoded)) => BASE64
                .decode(encoded)
                .map_err(|e| SigningError::InvalidSecret(e.to_string()))?,
            _ => secret.as_bytes().to_vec(),
        };

        if key.is_empty() {
            return Err(SigningError::EmptySecret);
        }

        Ok(Self { scheme, key })
    }

    pub fn scheme(&self) -> SignatureScheme {
        self.scheme
    }

    /// Sign a body under the configured scheme.
    ///
    /// Enveloped: `v1,` + base64 HMAC of `{message_id}.{timestamp}.{body}`.
    /// Simple: hex HMAC of the body; `message_id` and `timestamp` are not covered.
    pub fn sign(
        &self,
        message_id: &str,
        timestamp: i64,
        body: &[u8],
    ) -> Result<String, SigningError> {
        let mac = self.compute(message_id, timestamp, body)?;
        Ok(match self.scheme {
            SignatureScheme::Enveloped => format!("{SIGNATURE_VERSION},{}", BASE64.encode(mac)),
            SignatureScheme::Simple => hex::encode(mac),
        })
    }

    /// Verify a candidate signature header value in constant time.
    ///
    /// Enveloped headers may list several space-separated `v1,<sig>` entries;
    /// any match is accepted and entries with other versions are ignored.
    pub fn verify(
        &self,
        message_id: &str,
        timestamp: i64,
        body: &[u8],
        candidate: &str,
    ) -> bool {
        let Ok(expected) = self.compute(message_id, timestamp, body) else {
            return false;
        };

        match self.scheme {
            SignatureScheme::Enveloped => {
                let mut matched = Choice::from(0);
                for entry in candidate.split_whitespace() {
                    let Some((version, encoded)) = entry.split_once(',') else {
                        continue;
                    };
                    if version != SIGNATURE_VERSION {
                        continue;
                    }
                    if let Ok(decoded) = BASE64.decode(encoded) {
                        matched |= decoded.as_slice().ct_eq(expected.as_slice());
                    }
                }
                matched.into()
            }
            SignatureScheme::Simple => {
                let encoded = parse_signature_header(candidate.trim());
                match hex::decode(encoded) {
                    Ok(decoded) => decoded.as_slice().ct_eq(expected.as_slice()).into(),
                    Err(_) => false,
                }
            }
        }
    }

    /// Compute raw HMAC-SHA256 bytes
    fn compute(
        &self,
        message_id: &str,
        timestamp: i64,
        body: &[u8],
    ) -> Result<Vec<u8>, SigningError> {
        let mut mac =
            HmacSha256::new_from_slice(&self.key).map_err(|_| SigningError::InvalidKey)?;

        if self.scheme == SignatureScheme::Enveloped {
            mac.update(message_id.as_bytes());
            mac.update(b".");
            mac.update(timestamp.to_string().as_bytes());
            mac.update(b".");
        }
        mac.update(body);

        Ok(mac.finalize().into_bytes().to_vec())
    }
}

impl fmt::Debug for HmacSigner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HmacSigner")
            .field("scheme", &self.scheme)
            .field("key", &"<redacted>")
            .finish()
    }
}

/// Helper function to strip an optional `sha256=` prefix from a simple-scheme header
pub fn parse_signature_header(header: &str) -> &str {
    header.strip_prefix("sha256=").unwrap_or(header)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SVIX_SECRET: &str = "whsec_MfKQ9r8GKYqrTwjUPD8ILPZIo2LaLaSw";
    const SVIX_MSG_ID: &str = "msg_p5jXN8AQM9LWM0D4loKWxJek";
    const SVIX_TIMESTAMP: i64 = 1614265330;
    const SVIX_BODY: &[u8] = br#"{"test": 2432232314}"#;
    const SVIX_SIGNATURE: &str = "v1,g0hM9SsE+OTPJTGt/tmIKtSyZlE3uFJELVlNIOLJ1OE=";

    fn enveloped(secret: &str) -> HmacSigner {
        HmacSigner::new(SignatureScheme::Enveloped, secret).unwrap()
    }

    fn simple(secret: &str) -> HmacSigner {
        HmacSigner::new(SignatureScheme::Simple, secret).unwrap()
    }

    #[test]
    fn test_enveloped_known_vector() {
        let signer = enveloped(SVIX_SECRET);
        let signature = signer.sign(SVIX_MSG_ID, SVIX_TIMESTAMP, SVIX_BODY).unwrap();
        assert_eq!(signature, SVIX_SIGNATURE);
        assert!(signer.verify(SVIX_MSG_ID, SVIX_TIMESTAMP, SVIX_BODY, SVIX_SIGNATURE));
    }

    #[test]
    fn test_simple_known_vector() {
        let signer = simple("s3cr3t");
        let signature = signer.sign("ignored", 0, b"hello").unwrap();
        assert_eq!(
            signature,
            "6b23653f08c72072554e5dfef9b72efe01fcfe724a950689e991e7bd7089eb3e"
        );
    }

    #[test]
    fn test_empty_secret_rejected() {
        assert_eq!(
            HmacSigner::new(SignatureScheme::Enveloped, "").unwrap_err(),
            SigningError::EmptySecret
        );
        assert_eq!(
            HmacSigner::new(SignatureScheme::Enveloped, "whsec_").unwrap_err(),
            SigningError::EmptySecret
        );
    }

    #[test]
    fn test_invalid_prefixed_secret_rejected() {
        let result = HmacSigner::new(SignatureScheme::Enveloped, "whsec_not*base64");
        assert!(matches!(result, Err(SigningError::InvalidSecret(_))));
    }

    #[test]
    fn test_error_does_not_leak_secret() {
        let err = HmacSigner::new(SignatureScheme::Enveloped, "whsec_hunter2!!").unwrap_err();
        assert!(!err.to_string().contains("hunter2"));
    }

    #[test]
    fn test_debug_redacts_key() {
        let signer = enveloped("s3cr3t");
        let debug = format!("{signer:?}");
        assert!(!debug.contains("s3cr3t"));
        assert!(debug.contains("redacted"));
    }

    #[test]
    fn test_enveloped_covers_id_timestamp_and_body() {
        let signer = enveloped("s3cr3t");
        let signature = signer.sign("msg_a", 1000, b"body").unwrap();

        assert!(signer.verify("msg_a", 1000, b"body", &signature));
        assert!(!signer.verify("msg_b", 1000, b"body", &signature));
        assert!(!signer.verify("msg_a", 1001, b"body", &signature));
        assert!(!signer.verify("msg_a", 1000, b"bodY", &signature));
    }

    #[test]
    fn test_simple_covers_body_only() {
        let signer = simple("s3cr3t");
        let signature = signer.sign("msg_a", 1000, b"body").unwrap();

        assert!(signer.verify("msg_b", 2000, b"body", &signature));
        assert!(!signer.verify("msg_a", 1000, b"bodY", &signature));
    }

    #[test]
    fn test_verify_fails_with_wrong_secret() {
        let signature = enveloped("secret1").sign("msg", 1, b"{}").unwrap();
        assert!(!enveloped("secret2").verify("msg", 1, b"{}", &signature));
    }

    #[test]
    fn test_verify_accepts_any_listed_signature() {
        let signer = enveloped("s3cr3t");
        let valid = signer.sign("msg", 1, b"{}").unwrap();
        let header = format!("v1,AAAA v2,whatever {valid}");
        assert!(signer.verify("msg", 1, b"{}", &header));
    }

    #[test]
    fn test_verify_rejects_wrong_version_and_garbage() {
        let signer = enveloped("s3cr3t");
        let valid = signer.sign("msg", 1, b"{}").unwrap();
        let wrong_version = valid.replacen("v1,", "v2,", 1);

        assert!(!signer.verify("msg", 1, b"{}", &wrong_version));
        assert!(!signer.verify("msg", 1, b"{}", "v1,!!!"));
        assert!(!signer.verify("msg", 1, b"{}", ""));
    }

    #[test]
    fn test_verify_rejects_truncated_signature() {
        let signer = simple("s3cr3t");
        let signature = signer.sign("msg", 1, b"{}").unwrap();
        assert!(!signer.verify("msg", 1, b"{}", &signature[..signature.len() - 2]));
    }

    #[test]
    fn test_simple_accepts_prefixed_and_uppercase_hex() {
        let signer = simple("s3cr3t");
        let signature = signer.sign("msg", 1, b"{}").unwrap();

        assert!(signer.verify("msg", 1, b"{}", &format!("sha256={signature}")));
        assert!(signer.verify("msg", 1, b"{}", &signature.to_uppercase()));
    }

    #[test]
    fn test_signature_is_deterministic() {
        let signer = enveloped("s3cr3t");
        assert_eq!(
            signer.sign("msg", 1707574200, b"payload").unwrap(),
            signer.sign("msg", 1707574200, b"payload").unwrap()
        );
    }

    #[test]
    fn test_simple_signature_is_hex_encoded() {
        let signature = simple("s3cr3t").sign("msg", 1, b"test").unwrap();
        assert_eq!(signature.len(), 64);
        assert!(signature.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_unprefixed_secret_used_verbatim() {
        let raw = HmacSigner::new(SignatureScheme::Enveloped, "MfKQ9r8GKYqrTwjUPD8ILPZIo2LaLaSw")
            .unwrap();
        let decoded = enveloped(SVIX_SECRET);
        assert_ne!(
            raw.sign(SVIX_MSG_ID, SVIX_TIMESTAMP, SVIX_BODY).unwrap(),
            decoded.sign(SVIX_MSG_ID, SVIX_TIMESTAMP, SVIX_BODY).unwrap()
        );
    }

    #[test]
    fn test_parse_signature_header() {
        assert_eq!(parse_signature_header("sha256=abcdef"), "abcdef");
        assert_eq!(parse_signature_header("abcdef"), "abcdef");
    }
}
