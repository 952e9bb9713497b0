//! `/api/system/info`, `/api/system/updates`, `/api/proxy/status` (spec.md
//! §6). `info` mirrors the teacher's `/version` endpoint almost unchanged.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use serde_json::{Value, json};

use crate::constants::{BUILD_TIME, GIT_HASH, VERSION};
use crate::state::AppShared;

pub async fn info() -> Json<Value> {
    Json(json!({
        "version": VERSION,
        "git_hash": GIT_HASH,
        "build_time": BUILD_TIME,
    }))
}

/// The portal never phones home; this reports the running version only so
/// an admin UI can compare it against whatever release feed it trusts.
pub async fn updates() -> Json<Value> {
    Json(json!({ "current_version": VERSION }))
}

pub async fn proxy_status(State(shared): State<Arc<AppShared>>) -> Json<Value> {
    let snapshot = shared.config.current();
    let apps: Vec<Value> = snapshot
        .apps
        .iter()
        .filter(|a| a.proxy)
        .map(|a| {
            json!({
                "slug": a.slug,
                "name": a.name,
                "enabled": a.enabled,
                "url": a.url,
            })
        })
        .collect();
    Json(json!({ "apps": apps }))
}
