//! The URL-rewriting function at the heart of the reverse proxy (spec.md
//! §4.D "URL-rewriting function"). Total and idempotent: `rewrite(rewrite(s,
//! k), k) == rewrite(s, k)` for all `s`, `k` (spec.md §8).

/// Rewrite `s` (an attribute value, header value, or CSS/JS URL literal)
/// relative to a proxied app's `slug`, given the backend's own origin
/// (`scheme://host[:port]`, no trailing slash).
///
/// - An absolute URL whose origin equals `backend_origin` has its origin
///   replaced with `/proxy/{slug}` (path/query/fragment preserved).
/// - A value already anchored at `/proxy/{slug}` or `/proxy/{slug}/` is
///   left untouched (this is what makes the function idempotent).
/// - A root-relative value (starts with `/`, not `//`) is prefixed with
///   `/proxy/{slug}`.
/// - Anything else (relative paths, scheme-relative `//host/...`,
///   `mailto:`, `data:`, other-origin absolute URLs, fragments) is
///   returned unchanged.
pub fn rewrite_url(s: &str, slug: &str, backend_origin: &str) -> String {
    let prefix = format!("/proxy/{slug}");

    if let Some(rest) = strip_origin(s, backend_origin) {
        return format!("{prefix}{rest}");
    }

    if s.starts_with(&format!("{prefix}/")) || s == prefix {
        return s.to_string();
    }

    if s.starts_with('/') && !s.starts_with("//") {
        return format!("{prefix}{s}");
    }

    s.to_string()
}

/// If `s` starts with `backend_origin` (scheme + host + optional port),
/// return the remainder (path/query/fragment, possibly empty).
fn strip_origin<'a>(s: &'a str, backend_origin: &str) -> Option<&'a str> {
    let backend_origin = backend_origin.trim_end_matches('/');
    if backend_origin.is_empty() {
        return None;
    }
    s.strip_prefix(backend_origin).filter(|rest| rest.is_empty() || rest.starts_with('/'))
}

/// Derive `scheme://host[:port]` from a backend base URL, for use as
/// `backend_origin` in [`rewrite_url`].
pub fn backend_origin(backend_url: &url::Url) -> String {
    let mut origin = format!(
        "{}://{}",
        backend_url.scheme(),
        backend_url.host_str().unwrap_or_default()
    );
    if let Some(port) = backend_url.port() {
        origin.push(':');
        origin.push_str(&port.to_string());
    }
    origin
}

#[cfg(test)]
mod tests {
    use super::*;

    const ORIGIN: &str = "http://backend.internal:9000";

    #[test]
    fn rewrites_absolute_backend_url() {
        assert_eq!(
            rewrite_url("http://backend.internal:9000/api/x?y=1", "sonarr", ORIGIN),
            "/proxy/sonarr/api/x?y=1"
        );
    }

    #[test]
    fn rewrites_root_relative_path() {
        assert_eq!(rewrite_url("/x", "sonarr", ORIGIN), "/proxy/sonarr/x");
    }

    #[test]
    fn leaves_already_prefixed_path_alone() {
        assert_eq!(rewrite_url("/proxy/sonarr/x", "sonarr", ORIGIN), "/proxy/sonarr/x");
        assert_eq!(rewrite_url("/proxy/sonarr", "sonarr", ORIGIN), "/proxy/sonarr");
    }

    #[test]
    fn leaves_scheme_relative_and_other_origin_alone() {
        assert_eq!(rewrite_url("//cdn.example.com/a.js", "sonarr", ORIGIN), "//cdn.example.com/a.js");
        assert_eq!(rewrite_url("https://other.example.com/a", "sonarr", ORIGIN), "https://other.example.com/a");
    }

    #[test]
    fn leaves_relative_and_opaque_schemes_alone() {
        assert_eq!(rewrite_url("images/a.png", "sonarr", ORIGIN), "images/a.png");
        assert_eq!(rewrite_url("mailto:a@b.com", "sonarr", ORIGIN), "mailto:a@b.com");
        assert_eq!(rewrite_url("data:image/png;base64,abc", "sonarr", ORIGIN), "data:image/png;base64,abc");
    }

    #[test]
    fn is_idempotent_for_every_case() {
        let cases = [
            "http://backend.internal:9000/api/x?y=1",
            "/x",
            "/proxy/sonarr/x",
            "//cdn.example.com/a.js",
            "https://other.example.com/a",
            "images/a.png",
            "",
            "/",
        ];
        for case in cases {
            let once = rewrite_url(case, "sonarr", ORIGIN);
            let twice = rewrite_url(&once, "sonarr", ORIGIN);
            assert_eq!(once, twice, "not idempotent for {case:?}");
        }
    }

    #[test]
    fn backend_origin_includes_nonstandard_port() {
        let url = url::Url::parse("http://backend.internal:9000/base").unwrap();
        assert_eq!(backend_origin(&url), "http://backend.internal:9000");
    }

    #[test]
    fn backend_origin_omits_default_port() {
        let url = url::Url::parse("https://backend.internal/base").unwrap();
        assert_eq!(backend_origin(&url), "https://backend.internal");
    }
}
