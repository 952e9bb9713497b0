//! `/api/auth/*` (spec.md §4.C, §6): login/logout, session introspection,
//! password change, user CRUD, live auth-method switch, first-run setup,
//! and the OIDC authorization-code flow. Combines the teacher's
//! `routes/admin/session.rs` login/logout cookie handling with spec.md's
//! multi-method identity model.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Redirect, Response};
use bcrypt::DEFAULT_COST;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::auth::identity::{Identity, require_role};
use crate::auth::middleware::parse_cookie;
use crate::config::schema::{AuthMethodKind, Role, UserConfig};
use crate::constants::SESSION_COOKIE_NAME;
use crate::error::AppError;
use crate::state::AppShared;

fn session_cookie(session_id: &str, max_age_secs: u64, secure: bool) -> String {
    let secure_flag = if secure { "; Secure" } else { "" };
    format!("{SESSION_COOKIE_NAME}={session_id}; HttpOnly; SameSite=Lax; Path=/; Max-Age={max_age_secs}{secure_flag}")
}

fn clear_cookie(secure: bool) -> String {
    let secure_flag = if secure { "; Secure" } else { "" };
    format!("{SESSION_COOKIE_NAME}=; HttpOnly; SameSite=Lax; Path=/; Max-Age=0{secure_flag}")
}

fn session_id_from_headers(headers: &HeaderMap) -> Option<String> {
    headers
        .get(header::COOKIE)
        .and_then(|v| v.to_str().ok())
        .and_then(|h| parse_cookie(h, SESSION_COOKIE_NAME))
}

#[derive(Debug, Serialize)]
struct PublicUser {
    username: String,
    role: Role,
    #[serde(skip_serializing_if = "Option::is_none")]
    email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    display_name: Option<String>,
}

impl From<&UserConfig> for PublicUser {
    fn from(u: &UserConfig) -> Self {
        Self {
            username: u.username.clone(),
            role: u.role,
            email: u.email.clone(),
            display_name: u.display_name.clone(),
        }
    }
}

// --- Login / logout / status ---

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    username: String,
    password: String,
}

/// Constant-time bcrypt comparison is `bcrypt::verify`'s own job: it hashes
/// the candidate with the stored hash's salt/cost and does a fixed-time
/// byte compare internally.
pub async fn login(State(shared): State<Arc<AppShared>>, Json(body): Json<LoginRequest>) -> Response {
    let snapshot = shared.auth.current();
    if snapshot.method != AuthMethodKind::Builtin {
        return AppError::BadRequest("builtin authentication is not enabled".into()).into_response();
    }
    let Some(user) = snapshot.find_user(&body.username) else {
        return AppError::LoginFailed.into_response();
    };
    match bcrypt::verify(&body.password, &user.password_hash) {
        Ok(true) => {}
        _ => return AppError::LoginFailed.into_response(),
    }

    let session = shared.auth.sessions.create(user.username.clone(), user.username.clone(), user.role).await;
    let cookie = session_cookie(&session.id, snapshot.session_max_age_secs, snapshot.cookie_secure);

    (
        StatusCode::OK,
        [(header::SET_COOKIE, cookie)],
        Json(PublicUser::from(user)),
    )
        .into_response()
}

pub async fn logout(State(shared): State<Arc<AppShared>>, headers: HeaderMap) -> Response {
    if let Some(session_id) = session_id_from_headers(&headers) {
        shared.auth.sessions.delete(&session_id).await;
    }
    let cookie = clear_cookie(shared.auth.current().cookie_secure);
    (StatusCode::OK, [(header::SET_COOKIE, cookie)], Json(json!({ "success": true }))).into_response()
}

pub async fn status(State(shared): State<Arc<AppShared>>, headers: HeaderMap) -> Json<serde_json::Value> {
    let snapshot = shared.auth.current();
    let authenticated = match snapshot.method {
        AuthMethodKind::None => true,
        _ => match session_id_from_headers(&headers) {
            Some(id) => shared.auth.sessions.get_and_refresh(&id).await.is_some(),
            None => false,
        },
    };
    Json(json!({ "authenticated": authenticated, "method": snapshot.method }))
}

pub async fn me(identity: Identity) -> Json<Identity> {
    Json(identity)
}

// --- Password change ---

#[derive(Debug, Deserialize)]
pub struct ChangePasswordRequest {
    current_password: String,
    new_password: String,
}

pub async fn change_password(
    identity: Identity,
    State(shared): State<Arc<AppShared>>,
    headers: HeaderMap,
    Json(body): Json<ChangePasswordRequest>,
) -> Response {
    let snapshot = shared.config.current();
    let Some(user) = snapshot.users.iter().find(|u| u.username == identity.username) else {
        return AppError::NotFound("user not found".into()).into_response();
    };
    match bcrypt::verify(&body.current_password, &user.password_hash) {
        Ok(true) => {}
        _ => return AppError::Forbidden.into_response(),
    }
    let new_hash = match bcrypt::hash(&body.new_password, DEFAULT_COST) {
        Ok(h) => h,
        Err(err) => return AppError::Internal(format!("failed to hash password: {err}")).into_response(),
    };

    let mut next = (*snapshot).clone();
    for u in next.users.iter_mut() {
        if u.username == identity.username {
            u.password_hash = new_hash.clone();
        }
    }
    if let Err(err) = shared.config.update(next).await {
        return err.into_response();
    }

    let except_id = session_id_from_headers(&headers).unwrap_or_default();
    shared.auth.sessions.delete_by_user_except(&identity.user_id, &except_id).await;

    Json(json!({ "success": true })).into_response()
}

// --- User CRUD (admin only for mutation) ---

pub async fn list_users(identity: Identity, State(shared): State<Arc<AppShared>>) -> Response {
    if let Err(err) = require_role(&identity, &[Role::Admin]) {
        return err.into_response();
    }
    let snapshot = shared.config.current();
    let users: Vec<PublicUser> = snapshot.users.iter().map(PublicUser::from).collect();
    Json(users).into_response()
}

#[derive(Debug, Deserialize)]
pub struct CreateUserRequest {
    username: String,
    password: String,
    role: Role,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    display_name: Option<String>,
}

pub async fn create_user(
    identity: Identity,
    State(shared): State<Arc<AppShared>>,
    Json(body): Json<CreateUserRequest>,
) -> Response {
    if let Err(err) = require_role(&identity, &[Role::Admin]) {
        return err.into_response();
    }
    let snapshot = shared.config.current();
    if snapshot.users.iter().any(|u| u.username == body.username) {
        return AppError::BadRequest(format!("user '{}' already exists", body.username)).into_response();
    }
    let password_hash = match bcrypt::hash(&body.password, DEFAULT_COST) {
        Ok(h) => h,
        Err(err) => return AppError::Internal(format!("failed to hash password: {err}")).into_response(),
    };

    let mut next = (*snapshot).clone();
    next.users.push(UserConfig {
        username: body.username,
        password_hash,
        role: body.role,
        email: body.email,
        display_name: body.display_name,
    });
    match shared.config.update(next).await {
        Ok(_) => (StatusCode::CREATED, Json(json!({ "success": true }))).into_response(),
        Err(err) => err.into_response(),
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct UpdateUserRequest {
    password: Option<String>,
    role: Option<Role>,
    email: Option<String>,
    display_name: Option<String>,
}

pub async fn update_user(
    identity: Identity,
    State(shared): State<Arc<AppShared>>,
    Path(username): Path<String>,
    Json(body): Json<UpdateUserRequest>,
) -> Response {
    if let Err(err) = require_role(&identity, &[Role::Admin]) {
        return err.into_response();
    }
    let snapshot = shared.config.current();
    let mut next = (*snapshot).clone();
    let Some(user) = next.users.iter_mut().find(|u| u.username == username) else {
        return AppError::NotFound(format!("user '{username}' not found")).into_response();
    };
    if let Some(password) = &body.password {
        match bcrypt::hash(password, DEFAULT_COST) {
            Ok(hash) => user.password_hash = hash,
            Err(err) => return AppError::Internal(format!("failed to hash password: {err}")).into_response(),
        }
    }
    if let Some(role) = body.role {
        user.role = role;
    }
    if body.email.is_some() {
        user.email = body.email.clone();
    }
    if body.display_name.is_some() {
        user.display_name = body.display_name.clone();
    }

    if next.users.iter().all(|u| u.role != Role::Admin) {
        return AppError::BadRequest("cannot leave the system with zero admins".into()).into_response();
    }

    match shared.config.update(next).await {
        Ok(_) => Json(json!({ "success": true })).into_response(),
        Err(err) => err.into_response(),
    }
}

pub async fn delete_user(
    identity: Identity,
    State(shared): State<Arc<AppShared>>,
    Path(username): Path<String>,
) -> Response {
    if let Err(err) = require_role(&identity, &[Role::Admin]) {
        return err.into_response();
    }
    if username == identity.username {
        return AppError::BadRequest("cannot delete your own account".into()).into_response();
    }

    let snapshot = shared.config.current();
    let mut next = (*snapshot).clone();
    let Some(idx) = next.users.iter().position(|u| u.username == username) else {
        return AppError::NotFound(format!("user '{username}' not found")).into_response();
    };
    let deleting_an_admin = next.users[idx].role == Role::Admin;
    let remaining_admins =
        next.users.iter().enumerate().filter(|(i, u)| *i != idx && u.role == Role::Admin).count();
    if deleting_an_admin && remaining_admins == 0 {
        return AppError::BadRequest("cannot delete the last admin".into()).into_response();
    }
    next.users.remove(idx);

    match shared.config.update(next).await {
        Ok(_) => {
            shared.auth.sessions.delete_all_for_user(&username).await;
            Json(json!({ "success": true })).into_response()
        }
        Err(err) => err.into_response(),
    }
}

// --- Live auth-method switch ---

#[derive(Debug, Deserialize)]
pub struct MethodSwitchRequest {
    method: AuthMethodKind,
}

pub async fn switch_method(
    identity: Identity,
    State(shared): State<Arc<AppShared>>,
    Json(body): Json<MethodSwitchRequest>,
) -> Response {
    if let Err(err) = require_role(&identity, &[Role::Admin]) {
        return err.into_response();
    }
    let snapshot = shared.config.current();

    match body.method {
        AuthMethodKind::Builtin => {
            if snapshot.users.is_empty() {
                return AppError::BadRequest("switching to builtin requires at least one user".into())
                    .into_response();
            }
            if snapshot.users.iter().all(|u| u.role != Role::Admin) {
                return AppError::BadRequest("cannot switch to builtin with zero admins".into()).into_response();
            }
        }
        AuthMethodKind::ForwardAuth if snapshot.auth.forward_auth.trusted_proxies.is_empty() => {
            return AppError::BadRequest("switching to forward_auth requires at least one trusted proxy".into())
                .into_response();
        }
        _ => {}
    }

    let mut next = (*snapshot).clone();
    next.auth.method = body.method;
    match shared.config.update(next).await {
        Ok(_) => Json(json!({ "success": true })).into_response(),
        Err(err) => err.into_response(),
    }
}

// --- First-run setup ---

#[derive(Debug, Deserialize)]
pub struct SetupRequest {
    username: String,
    password: String,
}

/// Only usable while no users exist yet; creates the first admin and
/// switches the method to `builtin` in the same commit.
pub async fn setup(State(shared): State<Arc<AppShared>>, Json(body): Json<SetupRequest>) -> Response {
    let snapshot = shared.config.current();
    if !snapshot.users.is_empty() {
        return AppError::BadRequest("setup has already been completed".into()).into_response();
    }
    let password_hash = match bcrypt::hash(&body.password, DEFAULT_COST) {
        Ok(h) => h,
        Err(err) => return AppError::Internal(format!("failed to hash password: {err}")).into_response(),
    };

    let mut next = (*snapshot).clone();
    next.users.push(UserConfig {
        username: body.username,
        password_hash,
        role: Role::Admin,
        email: None,
        display_name: None,
    });
    next.auth.method = AuthMethodKind::Builtin;

    match shared.config.update(next).await {
        Ok(_) => (StatusCode::CREATED, Json(json!({ "success": true }))).into_response(),
        Err(err) => err.into_response(),
    }
}

// --- OIDC ---

fn callback_url(base_path: &str, cookie_secure: bool, headers: &HeaderMap) -> String {
    let host = headers.get(header::HOST).and_then(|v| v.to_str().ok()).unwrap_or("localhost");
    let scheme = if cookie_secure { "https" } else { "http" };
    format!("{scheme}://{host}{base_path}/api/auth/oidc/callback")
}

#[derive(Debug, Deserialize)]
pub struct OidcLoginQuery {
    redirect: Option<String>,
}

pub async fn oidc_login(
    State(shared): State<Arc<AppShared>>,
    Query(query): Query<OidcLoginQuery>,
    headers: HeaderMap,
) -> Response {
    let snapshot = shared.auth.current();
    if snapshot.method != AuthMethodKind::Oidc {
        return AppError::BadRequest("oidc authentication is not enabled".into()).into_response();
    }
    let sanitized = crate::auth::oidc::sanitize_redirect(&snapshot.base_path, query.redirect.as_deref());
    let redirect_uri = callback_url(&snapshot.base_path, snapshot.cookie_secure, &headers);

    match shared.auth.oidc.authorize_url(&snapshot.oidc, &redirect_uri, sanitized).await {
        Ok(authorize) => Redirect::to(&authorize.url).into_response(),
        Err(err) => err.into_response(),
    }
}

#[derive(Debug, Deserialize)]
pub struct OidcCallbackQuery {
    code: Option<String>,
    state: Option<String>,
    error: Option<String>,
}

pub async fn oidc_callback(
    State(shared): State<Arc<AppShared>>,
    Query(query): Query<OidcCallbackQuery>,
    headers: HeaderMap,
) -> Response {
    if query.error.is_some() {
        return AppError::Unauthenticated.into_response();
    }
    let (Some(code), Some(state)) = (query.code, query.state) else {
        return AppError::BadRequest("missing code or state".into()).into_response();
    };

    let snapshot = shared.auth.current();
    let redirect_uri = callback_url(&snapshot.base_path, snapshot.cookie_secure, &headers);

    let (identity, redirect_to) = match shared.auth.oidc.complete(&snapshot.oidc, &state, &code, &redirect_uri).await {
        Ok(pair) => pair,
        Err(err) => return err.into_response(),
    };

    let session = shared.auth.sessions.create(identity.username.clone(), identity.username.clone(), identity.role).await;
    let cookie = session_cookie(&session.id, snapshot.session_max_age_secs, snapshot.cookie_secure);

    let mut response = Redirect::to(&redirect_to).into_response();
    if let Ok(value) = axum::http::HeaderValue::from_str(&cookie) {
        response.headers_mut().insert(header::SET_COOKIE, value);
    }
    response
}
