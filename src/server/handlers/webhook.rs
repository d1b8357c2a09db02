use axum::Json;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use tracing::{info, warn};

use crate::server::AppState;
use crate::server::responses::{WebhookAccepted, error_response};

/// `POST /webhook`: verify, drop replays when enabled, then dispatch to handlers
pub async fn receive_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let verified = match state.engine.verify_headers(&headers, &body) {
        Ok(verified) => verified,
        Err(e) => {
            warn!(error = %e, "Rejected inbound webhook");
            return e.into_response();
        }
    };

    if let Some(guard) = &state.replay_guard {
        if let Err(e) = guard
            .check_and_record(&verified.replay_key, verified.signed_at)
            .await
        {
            warn!(message_id = %verified.message_id, replay_key = %e.0, "Rejected duplicate webhook");
            return error_response(StatusCode::CONFLICT, "Duplicate message");
        }
    }

    let event = verified.into_event();
    let report = state.dispatcher.dispatch(&event).await;

    info!(
        event = %event.event(),
        message_id = %event.message_id,
        handlers = report.invoked,
        failed = report.failed,
        "Webhook received"
    );

    (
        StatusCode::OK,
        Json(WebhookAccepted {
            message: "Webhook received".to_string(),
            event: event.payload.event,
            msg_id: event.message_id,
        }),
    )
        .into_response()
}
