//! Route table assembly (spec.md §4.B). Grounded on the teacher's
//! `main.rs` `Router::new().route(...).nest(...).merge(...)` style,
//! generalized to the dispatch order spec.md spells out and to a table
//! that gets rebuilt (not just built once) on every config commit.

use std::net::SocketAddr;
use std::path::{Path as FsPath, PathBuf};
use std::sync::Arc;

use axum::extract::{ConnectInfo, Path, Request, State};
use axum::http::{HeaderValue, Method, StatusCode, header};
use axum::middleware;
use axum::response::{Html, IntoResponse, Redirect, Response};
use axum::routing::{any, get, post, put};
use axum::{Json, Router};
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::auth::middleware as auth_mw;
use crate::config::ConfigSnapshot;
use crate::config::loader::data_dir;
use crate::constants::{DEFAULT_PROXY_TIMEOUT_SECS, SESSION_COOKIE_NAME};
use crate::error::AppError;
use crate::routes;
use crate::state::AppShared;

const LOGIN_PAGE_FALLBACK: &str = r#"<!doctype html>
<html><head><title>Sign in</title></head>
<body>
<form method="post" action="api/auth/login" onsubmit="return submitLogin(event)">
  <input name="username" placeholder="username" autocomplete="username">
  <input name="password" type="password" placeholder="password" autocomplete="current-password">
  <button type="submit">Sign in</button>
</form>
<script>
function submitLogin(evt) {
  evt.preventDefault();
  const form = evt.target;
  fetch(form.action, {
    method: 'POST',
    headers: {'Content-Type': 'application/json'},
    body: JSON.stringify({
      username: form.username.value,
      password: form.password.value,
    }),
  }).then(r => { if (r.ok) window.location.href = './'; });
  return false;
}
</script>
</body></html>"#;

const SPA_FALLBACK: &str = r#"<!doctype html>
<html><head><title>muximux-portal</title></head>
<body><p>No UI bundle is installed. Drop one under the data directory's <code>static/</code> folder.</p></body></html>"#;

async fn proxy_dispatch(
    State(shared): State<Arc<AppShared>>,
    Path(slug): Path<String>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    req: Request,
) -> Response {
    let snapshot = shared.config.current();
    let Some(app) = snapshot.apps.iter().find(|a| a.slug == slug && a.enabled && a.proxy) else {
        return AppError::NotFound(format!("no proxied app at '{slug}'")).into_response();
    };
    let proxy_timeout_secs = snapshot.proxy_timeout_secs.unwrap_or(DEFAULT_PROXY_TIMEOUT_SECS);
    crate::proxy::proxy_request(&shared, app, &slug, addr.ip(), proxy_timeout_secs, req).await
}

/// Rejects `..`/absolute traversal so a requested static asset name can
/// never escape its directory.
fn safe_relative_path(requested: &str) -> Option<PathBuf> {
    let mut path = PathBuf::new();
    for segment in requested.split('/') {
        if segment.is_empty() || segment == "." {
            continue;
        }
        if segment == ".." {
            return None;
        }
        path.push(segment);
    }
    Some(path)
}

fn content_type_for(path: &FsPath) -> &'static str {
    match path.extension().and_then(|e| e.to_str()) {
        Some("html") => "text/html; charset=utf-8",
        Some("css") => "text/css",
        Some("js") => "text/javascript",
        Some("svg") => "image/svg+xml",
        Some("png") => "image/png",
        Some("json") => "application/json",
        _ => "application/octet-stream",
    }
}

async fn login_page() -> Html<String> {
    match tokio::fs::read_to_string(data_dir().join("static").join("login.html")).await {
        Ok(body) => Html(body),
        Err(_) => Html(LOGIN_PAGE_FALLBACK.to_string()),
    }
}

async fn logout_page(State(shared): State<Arc<AppShared>>, headers: header::HeaderMap) -> Response {
    if let Some(cookie_header) = headers.get(header::COOKIE).and_then(|v| v.to_str().ok())
        && let Some(id) = auth_mw::parse_cookie(cookie_header, SESSION_COOKIE_NAME)
    {
        shared.auth.sessions.delete(&id).await;
    }
    let base_path = shared.auth.current().base_path.clone();
    let secure = shared.auth.current().cookie_secure;
    let secure_flag = if secure { "; Secure" } else { "" };
    let cookie = format!("{SESSION_COOKIE_NAME}=; HttpOnly; SameSite=Lax; Path=/; Max-Age=0{secure_flag}");
    let mut response = Redirect::to(&format!("{base_path}/login")).into_response();
    if let Ok(value) = HeaderValue::from_str(&cookie) {
        response.headers_mut().insert(header::SET_COOKIE, value);
    }
    response
}

/// Serves a single static asset from the data directory's `static/`
/// subtree; used for `{base_path}/assets/*` and `{base_path}/themes/*`.
async fn static_asset(subdir: &'static str, requested: &str) -> Response {
    let Some(relative) = safe_relative_path(requested) else {
        return AppError::NotFound("asset not found".into()).into_response();
    };
    let path = data_dir().join(subdir).join(relative);
    match tokio::fs::read(&path).await {
        Ok(bytes) => ([(header::CONTENT_TYPE, content_type_for(&path))], bytes).into_response(),
        Err(_) => AppError::NotFound("asset not found".into()).into_response(),
    }
}

async fn serve_assets(Path(requested): Path<String>) -> Response {
    static_asset("static", &requested).await
}

async fn serve_themes(Path(requested): Path<String>) -> Response {
    static_asset("themes", &requested).await
}

/// SPA fallback: any unmatched GET under `base_path` serves the installed
/// `index.html`, or a minimal built-in placeholder if none is installed.
async fn spa_fallback() -> Response {
    match tokio::fs::read_to_string(data_dir().join("static").join("index.html")).await {
        Ok(body) => Html(body).into_response(),
        Err(_) => (StatusCode::OK, Html(SPA_FALLBACK.to_string())).into_response(),
    }
}

fn cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(AllowOrigin::predicate(|_origin: &HeaderValue, _| true))
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE, Method::OPTIONS])
        .allow_headers([
            header::CONTENT_TYPE,
            header::AUTHORIZATION,
            header::COOKIE,
            header::HeaderName::from_static("x-api-key"),
        ])
        .allow_credentials(true)
}

/// Builds a complete router for one config snapshot. Called at startup and
/// again every time `ConfigStore::update` commits, from the observer that
/// swaps the `ArcSwap<Router>` the listener actually serves through.
pub fn build_router(snapshot: ConfigSnapshot, shared: Arc<AppShared>) -> Router {
    let base_path = snapshot.base_path.trim_end_matches('/').to_string();
    let proxy_timeout_secs = snapshot.proxy_timeout_secs.unwrap_or(DEFAULT_PROXY_TIMEOUT_SECS);

    // Reachable without a session: liveness, status, logout, OIDC kickoff
    // and callback. `attach_identity_best_effort` still lets an
    // already-authenticated caller's identity show up on `/status`.
    let public_api = Router::new()
        .route("/health", get(routes::health::health))
        .route("/auth/status", get(routes::auth::status))
        .route("/auth/logout", post(routes::auth::logout))
        .route("/auth/oidc/login", get(routes::auth::oidc_login))
        .route("/auth/oidc/callback", get(routes::auth::oidc_callback))
        .layer(middleware::from_fn_with_state(shared.clone(), auth_mw::attach_identity_best_effort));

    let rate_limited_public = Router::new()
        .route("/auth/login", post(routes::auth::login))
        .route("/auth/setup", post(routes::auth::setup))
        .layer(middleware::from_fn_with_state(shared.clone(), auth_mw::login_rate_limit));

    // Everything else under /api requires an identity (401, never a redirect).
    let protected_api = Router::new()
        .route("/auth/me", get(routes::auth::me))
        .route("/auth/password", post(routes::auth::change_password))
        .route("/auth/users", get(routes::auth::list_users).post(routes::auth::create_user))
        .route("/auth/users/{username}", put(routes::auth::update_user).delete(routes::auth::delete_user))
        .route("/auth/method", put(routes::auth::switch_method))
        .route("/config", get(routes::admin::get_config).put(routes::admin::update_config))
        .route("/config/export", get(routes::admin::export_config))
        .route("/config/import", post(routes::admin::import_config))
        .route("/apps", get(routes::admin::apps::list_apps).post(routes::admin::apps::create_app))
        .route(
            "/app/{slug}",
            get(routes::admin::apps::get_app)
                .put(routes::admin::apps::update_app)
                .delete(routes::admin::apps::delete_app),
        )
        .route("/apps/health", get(routes::admin::apps::apps_health))
        .route("/apps/{slug}/health", get(routes::admin::apps::app_health))
        .route("/apps/{slug}/health/check", post(routes::admin::apps::trigger_app_health_check))
        .route("/groups", get(routes::admin::groups::list_groups).post(routes::admin::groups::create_group))
        .route(
            "/group/{name}",
            put(routes::admin::groups::update_group).delete(routes::admin::groups::delete_group),
        )
        .route("/icons/{collection}", get(routes::admin::assets::list_icons))
        .route("/icons/{collection}/{name}", get(routes::admin::assets::get_icon))
        .route("/themes", get(routes::admin::assets::list_themes))
        .route("/themes/{name}", get(routes::admin::assets::get_theme))
        .route("/logs/recent", get(routes::logs::recent))
        .route("/system/info", get(routes::system::info))
        .route("/system/updates", get(routes::system::updates))
        .route("/proxy/status", get(routes::system::proxy_status))
        .layer(middleware::from_fn_with_state(shared.clone(), auth_mw::require_auth_api));

    let api = Router::new().merge(public_api).merge(rate_limited_public).merge(protected_api);

    // Proxied app traffic and the event hub are browser-facing: an
    // unauthenticated visitor gets redirected to the login page, not a
    // bare 401 an iframe would render as an empty page.
    let browser_protected = Router::new()
        .route("/proxy/{slug}/{*rest}", any(proxy_dispatch))
        .route("/proxy/{slug}", any(proxy_dispatch))
        .route("/ws", get(routes::ws::upgrade))
        .layer(middleware::from_fn_with_state(shared.clone(), auth_mw::require_auth_web));

    let public_pages = Router::new()
        .route("/login", get(login_page))
        .route("/logout", get(logout_page))
        .route("/assets/{*path}", get(serve_assets))
        .route("/themes/{*path}", get(serve_themes))
        .fallback(spa_fallback);

    let routed = Router::new().nest("/api", api).merge(browser_protected).merge(public_pages);

    let app = if base_path.is_empty() {
        routed
    } else {
        Router::new().nest(&base_path, routed)
    };

    app.layer(cors_layer())
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::new(std::time::Duration::from_secs(proxy_timeout_secs + 5)))
        .with_state(shared)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn safe_relative_path_rejects_traversal() {
        assert!(safe_relative_path("../etc/passwd").is_none());
        assert!(safe_relative_path("icons/lucide/x.svg").is_some());
    }

    #[test]
    fn safe_relative_path_drops_leading_slash() {
        let path = safe_relative_path("/style.css").unwrap();
        assert_eq!(path, PathBuf::from("style.css"));
    }
}
