//! The reverse proxy engine (spec.md §4.D): request forwarding, WebSocket
//! tunneling, and the streaming response-rewriting pipeline built on the
//! submodules below.

pub mod compression;
pub mod css;
pub mod forward;
pub mod headers;
pub mod html;
pub mod interceptor;
pub mod jsonxml;
pub mod rewrite;
pub mod tls;
pub mod websocket;

pub use forward::forward_request;
pub use websocket::is_websocket_upgrade;

/// Entry point the router calls for every `/proxy/{slug}/*` request: tunnels
/// WebSocket upgrades, forwards everything else.
pub async fn proxy_request(
    shared: &crate::state::AppShared,
    app: &crate::config::schema::AppConfig,
    slug: &str,
    client_ip: std::net::IpAddr,
    proxy_timeout_secs: u64,
    req: axum::extract::Request,
) -> axum::response::Response {
    if websocket::is_websocket_upgrade(&req) {
        websocket::handle_upgrade(app, slug, req).await
    } else {
        forward::forward_request(shared, app, slug, client_ip, proxy_timeout_secs, req).await
    }
}

/// Strip the `/proxy/{slug}` prefix from an incoming request path, leaving
/// the remainder (always starting with `/`, or empty for the bare
/// `/proxy/{slug}` path) to forward to the backend.
pub fn strip_proxy_prefix<'a>(path: &'a str, slug: &str) -> &'a str {
    let prefix = format!("/proxy/{slug}");
    path.strip_prefix(&prefix).unwrap_or(path)
}

/// Build the full backend request target (path + query) by combining the
/// backend base URL's own path (if it has one beyond `/`) with the
/// remainder of the incoming request path once `/proxy/{slug}` is
/// stripped.
pub fn backend_target(app_url: &url::Url, remainder_path_and_query: &str) -> String {
    let base_path = app_url.path().trim_end_matches('/');
    let remainder = if remainder_path_and_query.is_empty() {
        "/"
    } else {
        remainder_path_and_query
    };
    if base_path.is_empty() {
        remainder.to_string()
    } else {
        format!("{base_path}{remainder}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_slug_prefix() {
        assert_eq!(strip_proxy_prefix("/proxy/sonarr/api/x", "sonarr"), "/api/x");
        assert_eq!(strip_proxy_prefix("/proxy/sonarr", "sonarr"), "");
    }

    #[test]
    fn backend_target_combines_base_path() {
        let url = url::Url::parse("http://backend:9000/base").unwrap();
        assert_eq!(backend_target(&url, "/x?y=1"), "/base/x?y=1");
        assert_eq!(backend_target(&url, ""), "/base/");
    }

    #[test]
    fn backend_target_without_base_path() {
        let url = url::Url::parse("http://backend:9000").unwrap();
        assert_eq!(backend_target(&url, "/x"), "/x");
        assert_eq!(backend_target(&url, ""), "/");
    }
}
