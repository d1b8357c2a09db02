use axum::Json;
use axum::http::StatusCode;
use serde_json::{Value, json};

pub async fn health_check() -> (StatusCode, Json<Value>) {
    (StatusCode::OK, Json(json!({ "status": "ok" })))
}
