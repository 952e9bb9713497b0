//! `/api/admin/groups/*` CRUD (spec.md §3 "Group": a named ordering of app
//! slugs used by the dashboard UI, carries no access semantics of its own).

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::response::{IntoResponse, Response};
use serde_json::json;

use crate::auth::identity::{Identity, require_role};
use crate::config::schema::{GroupConfig, Role};
use crate::error::AppError;
use crate::state::AppShared;

pub async fn list_groups(State(shared): State<Arc<AppShared>>) -> Json<Vec<GroupConfig>> {
    Json(shared.config.current().groups.clone())
}

pub async fn create_group(
    identity: Identity,
    State(shared): State<Arc<AppShared>>,
    Json(body): Json<GroupConfig>,
) -> Response {
    if let Err(err) = require_role(&identity, &[Role::Admin]) {
        return err.into_response();
    }
    let snapshot = shared.config.current();
    if snapshot.groups.iter().any(|g| g.name == body.name) {
        return AppError::BadRequest(format!("group '{}' already exists", body.name)).into_response();
    }
    let mut next = (*snapshot).clone();
    next.groups.push(body);
    match shared.config.update(next).await {
        Ok(_) => (axum::http::StatusCode::CREATED, Json(json!({ "success": true }))).into_response(),
        Err(err) => err.into_response(),
    }
}

pub async fn update_group(
    identity: Identity,
    State(shared): State<Arc<AppShared>>,
    Path(name): Path<String>,
    Json(body): Json<GroupConfig>,
) -> Response {
    if let Err(err) = require_role(&identity, &[Role::Admin]) {
        return err.into_response();
    }
    let snapshot = shared.config.current();
    let mut next = (*snapshot).clone();
    let Some(group) = next.groups.iter_mut().find(|g| g.name == name) else {
        return AppError::NotFound(format!("group '{name}' not found")).into_response();
    };
    *group = body;
    match shared.config.update(next).await {
        Ok(_) => Json(json!({ "success": true })).into_response(),
        Err(err) => err.into_response(),
    }
}

pub async fn delete_group(
    identity: Identity,
    State(shared): State<Arc<AppShared>>,
    Path(name): Path<String>,
) -> Response {
    if let Err(err) = require_role(&identity, &[Role::Admin]) {
        return err.into_response();
    }
    let snapshot = shared.config.current();
    let mut next = (*snapshot).clone();
    let before = next.groups.len();
    next.groups.retain(|g| g.name != name);
    if next.groups.len() == before {
        return AppError::NotFound(format!("group '{name}' not found")).into_response();
    }
    match shared.config.update(next).await {
        Ok(_) => Json(json!({ "success": true })).into_response(),
        Err(err) => err.into_response(),
    }
}
