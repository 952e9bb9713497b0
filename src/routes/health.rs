//! Unauthenticated liveness check (spec.md §6 `/api/health`): always 200.

use axum::Json;
use serde_json::{Value, json};

pub async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}
