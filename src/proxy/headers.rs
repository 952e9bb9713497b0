//! Header-level transforms applied to every proxied request/response
//! (spec.md §4.D "Request path" / "Response path — headers").

use axum::http::{HeaderMap, HeaderName, HeaderValue};

use super::rewrite::rewrite_url;

/// Connection-scoped headers that must never be forwarded to the backend
/// (or from it), per RFC 7230 §6.1 plus the proxy-specific pair.
pub const HOP_BY_HOP: &[&str] = &[
    "connection",
    "upgrade",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
];

/// Response headers stripped outright so a proxied app can't prevent
/// itself being iframed, or leak SRI directives the rewriter can't honor.
pub const STRIPPED_RESPONSE_HEADERS: &[&str] = &[
    "x-frame-options",
    "content-security-policy",
    "content-security-policy-report-only",
];

/// Response headers whose value is rewritten the same way response bodies
/// are, when it carries an absolute backend URL or a root-relative path.
pub const REWRITTEN_HEADERS: &[&str] = &["location", "content-location", "refresh", "link"];

pub fn strip_hop_by_hop(headers: &mut HeaderMap) {
    for name in HOP_BY_HOP {
        headers.remove(*name);
    }
}

pub fn strip_security_headers(headers: &mut HeaderMap) {
    for name in STRIPPED_RESPONSE_HEADERS {
        headers.remove(*name);
    }
}

/// Rewrite the handful of response headers that can themselves carry a
/// backend URL (`Location`, `Content-Location`, `Refresh`, `Link`).
pub fn rewrite_location_headers(headers: &mut HeaderMap, slug: &str, backend_origin: &str) {
    for name in REWRITTEN_HEADERS {
        let Some(value) = headers.get(*name).and_then(|v| v.to_str().ok()) else {
            continue;
        };
        let rewritten = if *name == "refresh" {
            rewrite_refresh(value, slug, backend_origin)
        } else {
            rewrite_url(value, slug, backend_origin)
        };
        if rewritten != value
            && let Ok(header_value) = HeaderValue::from_str(&rewritten)
        {
            headers.insert(HeaderName::from_static(name), header_value);
        }
    }
}

/// `Refresh: 5; url=/x` — rewrite only the `url=` operand.
fn rewrite_refresh(value: &str, slug: &str, backend_origin: &str) -> String {
    let Some(idx) = value.to_ascii_lowercase().find("url=") else {
        return value.to_string();
    };
    let (prefix, rest) = value.split_at(idx + 4);
    format!("{prefix}{}", rewrite_url(rest, slug, backend_origin))
}

/// Rewrite a single `Set-Cookie` header's `Path=` attribute:
/// `Path=/` -> `Path=/proxy/{slug}/`, `Path=/x` -> `Path=/proxy/{slug}/x`.
/// A cookie with no `Path` attribute is left as-is (defaults to the
/// request path, which the client already sees under `/proxy/{slug}`).
pub fn rewrite_set_cookie_path(value: &str, slug: &str) -> String {
    let lower = value.to_ascii_lowercase();
    let Some(idx) = lower.find("path=") else {
        return value.to_string();
    };
    let path_start = idx + 5;
    let end = value[path_start..]
        .find(';')
        .map(|i| path_start + i)
        .unwrap_or(value.len());
    let path = &value[path_start..end];
    let rewritten_path = if path == "/" {
        format!("/proxy/{slug}/")
    } else if let Some(rest) = path.strip_prefix('/') {
        format!("/proxy/{slug}/{rest}")
    } else {
        path.to_string()
    };
    format!("{}{}{}", &value[..path_start], rewritten_path, &value[end..])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rewrites_root_cookie_path() {
        assert_eq!(
            rewrite_set_cookie_path("sid=abc; Path=/; HttpOnly", "sonarr"),
            "sid=abc; Path=/proxy/sonarr/; HttpOnly"
        );
    }

    #[test]
    fn rewrites_subpath_cookie_path() {
        assert_eq!(
            rewrite_set_cookie_path("sid=abc; Path=/api", "sonarr"),
            "sid=abc; Path=/proxy/sonarr/api"
        );
    }

    #[test]
    fn leaves_cookie_without_path_alone() {
        assert_eq!(rewrite_set_cookie_path("sid=abc; HttpOnly", "sonarr"), "sid=abc; HttpOnly");
    }

    #[test]
    fn rewrites_refresh_header_url_operand() {
        assert_eq!(
            rewrite_refresh("5; url=/login", "sonarr", "http://backend.internal:9000"),
            "5; url=/proxy/sonarr/login"
        );
    }
}
