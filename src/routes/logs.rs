//! `/api/logs/recent` (spec.md §1 "log ring buffer", carried as an ambient
//! in-process concern per SPEC_FULL.md even though the persisted ring is an
//! external collaborator).

use std::sync::Arc;

use axum::Json;
use axum::extract::State;

use crate::events::LogEntry;
use crate::state::AppShared;

pub async fn recent(State(shared): State<Arc<AppShared>>) -> Json<Vec<LogEntry>> {
    Json(shared.events.recent_logs())
}
