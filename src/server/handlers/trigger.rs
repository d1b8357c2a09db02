use axum::Json;
use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::{Value, json};
use tokio_util::sync::CancellationToken;
use tracing::error;

use crate::server::AppState;
use crate::server::responses::{TriggerAccepted, error_response};

pub const SAMPLE_EVENT: &str = "order.created";

pub fn sample_data() -> Value {
    json!({ "order_id": "12345", "amount": 99.99 })
}

/// `POST /trigger`: deliver the sample `order.created` event
pub async fn trigger_sample(State(state): State<AppState>) -> Response {
    send(&state, SAMPLE_EVENT, &sample_data(), false).await
}

/// `POST /trigger/{event}`: deliver the JSON object in the request body as `data`
pub async fn trigger_event(
    State(state): State<AppState>,
    Path(event): Path<String>,
    body: Bytes,
) -> Response {
    let data = match serde_json::from_slice::<Value>(&body) {
        Ok(data @ Value::Object(_)) => data,
        _ => return error_response(StatusCode::BAD_REQUEST, "Invalid JSON payload"),
    };

    send(&state, &event, &data, true).await
}

async fn send(state: &AppState, event: &str, data: &Value, echo_event: bool) -> Response {
    let Some(client) = &state.delivery else {
        return error_response(
            StatusCode::SERVICE_UNAVAILABLE,
            "Webhook target not configured",
        );
    };

    // Dropping this future (client went away) abandons the delivery
    let result = client.send(event, data, &CancellationToken::new()).await;

    match (result.success, result.message_id) {
        (true, Some(msg_id)) => (
            StatusCode::OK,
            Json(TriggerAccepted {
                message: "Webhook sent!".to_string(),
                event: echo_event.then(|| event.to_string()),
                msg_id,
            }),
        )
            .into_response(),
        (_, msg_id) => {
            let message = result
                .error
                .map(|e| e.to_string())
                .unwrap_or_else(|| "Webhook delivery failed".to_string());
            error!(event = %event, attempts = result.attempts, error = %message, "Trigger delivery failed");

            let mut body = json!({ "error": message });
            if let Some(msg_id) = msg_id {
                body["msgId"] = Value::String(msg_id);
            }
            (StatusCode::BAD_GATEWAY, Json(body)).into_response()
        }
    }
}
