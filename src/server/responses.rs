use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

use crate::inbound::verification::VerificationError;

/// Body of every non-2xx response
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorBody {
    pub error: String,
}

pub fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (
        status,
        Json(ErrorBody {
            error: message.into(),
        }),
    )
        .into_response()
}

/// Receiver reply once a webhook was verified and dispatched
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookAccepted {
    pub message: String,
    pub event: String,
    pub msg_id: String,
}

/// Reply to the trigger routes after a successful delivery
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TriggerAccepted {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub event: Option<String>,
    pub msg_id: String,
}

impl VerificationError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            VerificationError::MissingHeaders
            | VerificationError::InvalidTimestamp
            | VerificationError::StaleTimestamp { .. }
            | VerificationError::BadSignature => StatusCode::UNAUTHORIZED,
            VerificationError::MalformedBody(_) => StatusCode::BAD_REQUEST,
        }
    }
}

impl IntoResponse for VerificationError {
    fn into_response(self) -> Response {
        error_response(self.status_code(), self.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verification_error_status_codes() {
        assert_eq!(
            VerificationError::MissingHeaders.status_code(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            VerificationError::InvalidTimestamp.status_code(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            VerificationError::StaleTimestamp {
                age_secs: 360,
                tolerance_secs: 300
            }
            .status_code(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            VerificationError::BadSignature.status_code(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            VerificationError::MalformedBody("eof".to_string()).status_code(),
            StatusCode::BAD_REQUEST
        );
    }

    #[test]
    fn test_accepted_body_uses_camel_case() {
        let body = serde_json::to_value(WebhookAccepted {
            message: "Webhook received".to_string(),
            event: "order.created".to_string(),
            msg_id: "msg_1".to_string(),
        })
        .unwrap();

        assert_eq!(
            body,
            serde_json::json!({"message": "Webhook received", "event": "order.created", "msgId": "msg_1"})
        );
    }

    #[test]
    fn test_trigger_body_omits_missing_event() {
        let body = serde_json::to_value(TriggerAccepted {
            message: "Webhook sent!".to_string(),
            event: None,
            msg_id: "msg_1".to_string(),
        })
        .unwrap();

        assert_eq!(
            body,
            serde_json::json!({"message": "Webhook sent!", "msgId": "msg_1"})
        );
    }
}
