//! `/api/admin/apps/*` CRUD and health endpoints (spec.md §4.G, §3 "App").

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::response::{IntoResponse, Response};
use serde_json::json;

use crate::auth::identity::{Identity, meets_min_role, require_role};
use crate::config::schema::{AppConfig, Role, slugify};
use crate::error::AppError;
use crate::state::AppShared;

/// An app is visible to an identity if its role clears `min_role` AND
/// (`access` is unset, or the identity's role/username is explicitly
/// listed) — `access.roles` and `access.users` are OR'd together, not
/// intersected: being named in either list is sufficient.
pub fn app_visible(app: &AppConfig, identity: &Identity) -> bool {
    if !meets_min_role(identity, app.min_role) {
        return false;
    }
    if app.access.roles.is_empty() && app.access.users.is_empty() {
        return true;
    }
    app.access.roles.contains(&identity.role) || app.access.users.iter().any(|u| u == &identity.username)
}

pub async fn list_apps(identity: Identity, State(shared): State<Arc<AppShared>>) -> Json<Vec<AppConfig>> {
    let snapshot = shared.config.current();
    let apps = snapshot
        .apps
        .iter()
        .filter(|a| app_visible(a, &identity))
        .cloned()
        .collect();
    Json(apps)
}

pub async fn get_app(
    identity: Identity,
    State(shared): State<Arc<AppShared>>,
    Path(slug): Path<String>,
) -> Response {
    let snapshot = shared.config.current();
    match snapshot.apps.iter().find(|a| a.slug == slug) {
        Some(app) if app_visible(app, &identity) => Json(app.clone()).into_response(),
        Some(_) => AppError::Forbidden.into_response(),
        None => AppError::NotFound(format!("app '{slug}' not found")).into_response(),
    }
}

pub async fn create_app(
    identity: Identity,
    State(shared): State<Arc<AppShared>>,
    Json(body): Json<AppConfig>,
) -> Response {
    if let Err(err) = require_role(&identity, &[Role::Admin]) {
        return err.into_response();
    }
    let snapshot = shared.config.current();
    let mut app = body;
    if app.slug.is_empty() {
        app.slug = slugify(&app.name);
    }
    if snapshot.apps.iter().any(|a| a.slug == app.slug) {
        return AppError::BadRequest(format!("app slug '{}' already exists", app.slug)).into_response();
    }

    let mut next = (*snapshot).clone();
    next.apps.push(app);
    match shared.config.update(next).await {
        Ok(_) => (axum::http::StatusCode::CREATED, Json(json!({ "success": true }))).into_response(),
        Err(err) => err.into_response(),
    }
}

/// Merges a partial JSON payload onto the existing app: any field the
/// caller omits keeps its current value because `AppConfig`'s `#[serde]`
/// defaults fall back to `Default::default()`, not the existing record, so
/// the merge is done field-by-field rather than by deserializing over it.
pub async fn update_app(
    identity: Identity,
    State(shared): State<Arc<AppShared>>,
    Path(slug): Path<String>,
    Json(patch): Json<serde_json::Value>,
) -> Response {
    if let Err(err) = require_role(&identity, &[Role::Admin]) {
        return err.into_response();
    }
    let snapshot = shared.config.current();
    let mut next = (*snapshot).clone();
    let Some(idx) = next.apps.iter().position(|a| a.slug == slug) else {
        return AppError::NotFound(format!("app '{slug}' not found")).into_response();
    };

    let current = serde_json::to_value(&next.apps[idx]).unwrap_or(serde_json::Value::Null);
    let merged = merge_json(current, patch);
    let updated: AppConfig = match serde_json::from_value(merged) {
        Ok(app) => app,
        Err(err) => return AppError::BadRequest(format!("invalid app patch: {err}")).into_response(),
    };
    next.apps[idx] = updated;

    match shared.config.update(next).await {
        Ok(_) => Json(json!({ "success": true })).into_response(),
        Err(err) => err.into_response(),
    }
}

fn merge_json(mut base: serde_json::Value, patch: serde_json::Value) -> serde_json::Value {
    if let (Some(base_map), serde_json::Value::Object(patch_map)) = (base.as_object_mut(), patch) {
        for (key, value) in patch_map {
            base_map.insert(key, value);
        }
    }
    base
}

pub async fn delete_app(
    identity: Identity,
    State(shared): State<Arc<AppShared>>,
    Path(slug): Path<String>,
) -> Response {
    if let Err(err) = require_role(&identity, &[Role::Admin]) {
        return err.into_response();
    }
    let snapshot = shared.config.current();
    let mut next = (*snapshot).clone();
    let before = next.apps.len();
    next.apps.retain(|a| a.slug != slug);
    if next.apps.len() == before {
        return AppError::NotFound(format!("app '{slug}' not found")).into_response();
    }
    for group in next.groups.iter_mut() {
        group.apps.retain(|s| s != &slug);
    }

    match shared.config.update(next).await {
        Ok(_) => Json(json!({ "success": true })).into_response(),
        Err(err) => err.into_response(),
    }
}

pub async fn apps_health(State(shared): State<Arc<AppShared>>) -> Json<Vec<serde_json::Value>> {
    let records = shared
        .health
        .all()
        .into_iter()
        .map(|(slug, record)| json!({ "slug": slug, "health": record }))
        .collect();
    Json(records)
}

pub async fn app_health(State(shared): State<Arc<AppShared>>, Path(slug): Path<String>) -> Response {
    match shared.health.snapshot(&slug) {
        Some(record) => Json(record).into_response(),
        None => AppError::NotFound(format!("no health record for '{slug}'")).into_response(),
    }
}

/// Runs one probe immediately, outside the monitor's regular interval, by
/// calling the monitor's tick directly on a one-element slice.
pub async fn trigger_app_health_check(
    identity: Identity,
    State(shared): State<Arc<AppShared>>,
    Path(slug): Path<String>,
) -> Response {
    if let Err(err) = require_role(&identity, &[Role::Admin, Role::PowerUser]) {
        return err.into_response();
    }
    let snapshot = shared.config.current();
    let Some(app) = snapshot.apps.iter().find(|a| a.slug == slug) else {
        return AppError::NotFound(format!("app '{slug}' not found")).into_response();
    };
    if !app.health_check {
        return AppError::BadRequest(format!("app '{slug}' does not have health_check enabled")).into_response();
    }
    shared.health.tick(std::slice::from_ref(app)).await;
    match shared.health.snapshot(&slug) {
        Some(record) => Json(record).into_response(),
        None => AppError::Internal("health check produced no record".into()).into_response(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::AccessConfig;

    fn identity(role: Role, username: &str) -> Identity {
        Identity {
            user_id: username.into(),
            username: username.into(),
            role,
        }
    }

    #[test]
    fn app_visible_open_access_ignores_lists() {
        let app = AppConfig::default();
        assert!(app_visible(&app, &identity(Role::User, "alice")));
    }

    #[test]
    fn app_visible_allows_listed_role_or_user() {
        let mut app = AppConfig::default();
        app.access = AccessConfig {
            roles: vec![Role::PowerUser],
            users: vec!["bob".to_string()],
        };
        assert!(app_visible(&app, &identity(Role::PowerUser, "carol")));
        assert!(app_visible(&app, &identity(Role::User, "bob")));
        assert!(!app_visible(&app, &identity(Role::User, "dave")));
    }

    #[test]
    fn app_visible_respects_min_role_even_with_access_list() {
        let mut app = AppConfig::default();
        app.min_role = Some(Role::Admin);
        app.access = AccessConfig {
            roles: vec![],
            users: vec!["bob".to_string()],
        };
        assert!(!app_visible(&app, &identity(Role::User, "bob")));
    }

    #[test]
    fn merge_json_overlays_only_patched_keys() {
        let base = json!({ "name": "Sonarr", "enabled": true });
        let patch = json!({ "enabled": false });
        let merged = merge_json(base, patch);
        assert_eq!(merged["name"], "Sonarr");
        assert_eq!(merged["enabled"], false);
    }
}
