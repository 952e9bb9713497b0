//! `/api/admin/*` surface (spec.md §4.G): whole-config read/write, export
//! with secrets redacted, literal import, plus the apps/groups/assets
//! sub-resources.

pub mod apps;
pub mod assets;
pub mod groups;

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use axum::response::{IntoResponse, Response};

use crate::auth::identity::{Identity, require_role};
use crate::config::schema::{PortalConfig, Role};
use crate::config::{redact_secrets, redacted_value};
use crate::error::AppError;
use crate::state::AppShared;

pub async fn get_config(identity: Identity, State(shared): State<Arc<AppShared>>) -> Response {
    if let Err(err) = require_role(&identity, &[Role::Admin]) {
        return err.into_response();
    }
    Json(redacted_value(&shared.config.current())).into_response()
}

pub async fn update_config(
    identity: Identity,
    State(shared): State<Arc<AppShared>>,
    Json(body): Json<PortalConfig>,
) -> Response {
    if let Err(err) = require_role(&identity, &[Role::Admin]) {
        return err.into_response();
    }
    match shared.config.update(body).await {
        Ok(snapshot) => Json(redacted_value(&snapshot)).into_response(),
        Err(err) => err.into_response(),
    }
}

/// Export is just the redacted view serialized as YAML, so the round trip
/// through `import_config` is a literal save: nothing is re-derived from a
/// partial payload on the way back in.
pub async fn export_config(identity: Identity, State(shared): State<Arc<AppShared>>) -> Response {
    if let Err(err) = require_role(&identity, &[Role::Admin]) {
        return err.into_response();
    }
    let redacted = {
        let mut copy = (*shared.config.current()).clone();
        redact_secrets(&mut copy);
        copy
    };
    match serde_yaml::to_string(&redacted) {
        Ok(yaml) => ([(axum::http::header::CONTENT_TYPE, "application/yaml")], yaml).into_response(),
        Err(err) => AppError::Internal(format!("failed to serialize config: {err}")).into_response(),
    }
}

pub async fn import_config(identity: Identity, State(shared): State<Arc<AppShared>>, body: String) -> Response {
    if let Err(err) = require_role(&identity, &[Role::Admin]) {
        return err.into_response();
    }
    let parsed: PortalConfig = match serde_yaml::from_str(&body) {
        Ok(cfg) => cfg,
        Err(err) => return AppError::BadRequest(format!("invalid config YAML: {err}")).into_response(),
    };
    match shared.config.update(parsed).await {
        Ok(snapshot) => Json(redacted_value(&snapshot)).into_response(),
        Err(err) => err.into_response(),
    }
}
