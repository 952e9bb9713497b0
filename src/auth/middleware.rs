//! `RequireAuth` (spec.md §4.C): identity resolution, bypass evaluation,
//! and the unauthenticated-dispatch split (401 for `/api/*`, redirect to
//! `<base_path>/login` elsewhere) as two thin axum middleware wrappers
//! around one shared core. Combines the teacher's `admin_auth_middleware`
//! (header/cookie extraction ahead of the handler) with the homeroute
//! handler's bypass-then-auth ordering.

use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use axum::extract::{ConnectInfo, Request, State};
use axum::http::{HeaderMap, header};
use axum::middleware::Next;
use axum::response::{IntoResponse, Redirect, Response};
use subtle::ConstantTimeEq;

use super::bypass;
use super::forward_auth;
use super::identity::Identity;
use super::snapshot::AuthSnapshot;
use crate::config::schema::{AuthMethodKind, Role};
use crate::constants::SESSION_COOKIE_NAME;
use crate::error::AppError;
use crate::state::AppShared;

/// Parse a single cookie value out of a raw `Cookie` header.
pub fn parse_cookie(header_value: &str, name: &str) -> Option<String> {
    header_value.split(';').find_map(|part| {
        let (key, value) = part.trim().split_once('=')?;
        (key == name).then(|| value.to_string())
    })
}

fn synthetic_admin() -> Identity {
    Identity {
        user_id: "system".into(),
        username: "admin".into(),
        role: Role::Admin,
    }
}

/// `X-Api-Key` is checked ahead of every auth method: a match authenticates
/// as a synthetic admin identity, bypassing sessions entirely (spec.md
/// §4.C "API key authentication").
fn api_key_identity(snapshot: &AuthSnapshot, headers: &HeaderMap) -> Option<Identity> {
    let configured = snapshot.api_key.as_deref()?;
    let provided = headers.get("x-api-key").and_then(|v| v.to_str().ok())?;
    let matches: bool = configured.as_bytes().ct_eq(provided.as_bytes()).into();
    matches.then(synthetic_admin)
}

async fn resolve_identity(shared: &AppShared, peer: IpAddr, headers: &HeaderMap) -> Option<Identity> {
    let snapshot = shared.auth.current();

    if let Some(identity) = api_key_identity(&snapshot, headers) {
        return Some(identity);
    }

    match snapshot.method {
        AuthMethodKind::None => Some(synthetic_admin()),
        AuthMethodKind::Builtin | AuthMethodKind::Oidc => {
            let cookie_header = headers.get(header::COOKIE).and_then(|v| v.to_str().ok())?;
            let session_id = parse_cookie(cookie_header, SESSION_COOKIE_NAME)?;
            let session = shared.auth.sessions.get_and_refresh(&session_id).await?;
            Some(Identity {
                user_id: session.user_id,
                username: session.username,
                role: session.role,
            })
        }
        AuthMethodKind::ForwardAuth => {
            let identity = forward_auth::authenticate(&snapshot, peer, headers)?;
            Some(Identity {
                user_id: identity.username.clone(),
                username: identity.username,
                role: identity.role,
            })
        }
    }
}

/// Resolve identity and bypass status for one request. The effective
/// client IP (direct peer, or `X-Forwarded-For`'s left-most entry once
/// that peer is itself a trusted proxy) feeds both the forward-auth check
/// and any bypass rule's `allowed_ips` predicate, per spec.md §8's
/// universally-quantified invariant.
async fn authenticate(shared: &AppShared, addr: SocketAddr, req: &Request) -> (Option<Identity>, bool) {
    let snapshot = shared.auth.current();
    let headers = req.headers();
    let peer = addr.ip();
    let effective_ip = forward_auth::effective_client_ip(&snapshot, peer, headers);

    let identity = resolve_identity(shared, peer, headers).await;

    let path = req.uri().path();
    let method = req.method().as_str();
    let provided_key = headers.get("x-api-key").and_then(|v| v.to_str().ok());
    let bypassed = bypass::any_matches(
        &snapshot.bypass_rules,
        path,
        method,
        effective_ip,
        snapshot.api_key.as_deref(),
        provided_key,
    );

    (identity, bypassed)
}

/// Wraps handlers under `/api/*`: missing identity (and no bypass match)
/// is rejected with 401.
pub async fn require_auth_api(
    State(shared): State<Arc<AppShared>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    mut req: Request,
    next: Next,
) -> Response {
    let (identity, bypassed) = authenticate(&shared, addr, &req).await;
    if let Some(identity) = identity.clone() {
        req.extensions_mut().insert(identity);
    }
    if identity.is_none() && !bypassed {
        return AppError::Unauthenticated.into_response();
    }
    next.run(req).await
}

/// Wraps browser-facing (non-API) handlers: missing identity (and no
/// bypass match) 302-redirects to `<base_path>/login`.
pub async fn require_auth_web(
    State(shared): State<Arc<AppShared>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    mut req: Request,
    next: Next,
) -> Response {
    let (identity, bypassed) = authenticate(&shared, addr, &req).await;
    if let Some(identity) = identity.clone() {
        req.extensions_mut().insert(identity);
    }
    if identity.is_none() && !bypassed {
        let base_path = shared.auth.current().base_path.clone();
        return Redirect::to(&format!("{base_path}/login")).into_response();
    }
    next.run(req).await
}

/// Best-effort auth for endpoints that never reject (e.g. the liveness
/// check) but should still see an identity when one happens to be present.
pub async fn attach_identity_best_effort(
    State(shared): State<Arc<AppShared>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    mut req: Request,
    next: Next,
) -> Response {
    let snapshot = shared.auth.current();
    if let Some(identity) = resolve_identity(&shared, addr.ip(), &req.headers().clone()).await {
        req.extensions_mut().insert(identity);
    }
    let _ = snapshot;
    next.run(req).await
}

/// Per-IP login/setup rate limiting (spec.md §4.C, §6): 5/min, direct peer
/// IP only honored via the same trusted-proxy rule as everywhere else.
pub async fn login_rate_limit(
    State(shared): State<Arc<AppShared>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    req: Request,
    next: Next,
) -> Response {
    let snapshot = shared.auth.current();
    let ip = forward_auth::effective_client_ip(&snapshot, addr.ip(), req.headers());
    if shared.auth.rate_limiter.check(ip).await {
        next.run(req).await
    } else {
        AppError::RateLimited.into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_cookie_finds_named_value_among_others() {
        let header = "a=1; muximux_session=abc123; b=2";
        assert_eq!(parse_cookie(header, "muximux_session"), Some("abc123".to_string()));
    }

    #[test]
    fn parse_cookie_absent_returns_none() {
        assert_eq!(parse_cookie("a=1", "muximux_session"), None);
    }
}
