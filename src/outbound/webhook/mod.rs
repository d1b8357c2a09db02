// Webhook delivery module
//
// Leaf components:
//   envelope, hmac_signer, retry_strategy, error
//
// Composed components:
//   http_client     – sends one signed attempt
//   delivery_client – serializes, signs once and runs the retry loop

pub mod delivery_client;
pub mod envelope;
pub mod error;
pub mod hmac_signer;
pub mod http_client;
pub mod retry_strategy;

// Re-export commonly used types
pub use delivery_client::{DeliveryClient, DeliveryConfig, DeliveryResult};
pub use envelope::{HeaderNames, SignatureScheme, SignedEnvelope, new_message_id};
pub use error::DeliveryError;
pub use hmac_signer::{HmacSigner, SigningError, parse_signature_header};
pub use http_client::{AttemptResponse, WebhookHttpClient};
pub use retry_strategy::{RetryStrategy, StatusClass};
