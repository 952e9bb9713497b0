//! JS/JSON/XML "safe mode" rewriting (spec.md §4.D, §9 Open Question,
//! resolved in DESIGN.md): these payloads often carry *data* the SPA itself
//! composes into URLs, so only a narrow, conservative rewrite is applied —
//! aggressive root-relative rewriting here would corrupt API responses
//! (spec.md §8 scenario 6: a JSON `"poster":"/art/1.jpg"` value must pass
//! through unchanged).
//!
//! What *is* rewritten, in all three formats:
//! - absolute URLs whose host equals the backend's origin, and
//! - the value of a recognised base-path config key
//!   ([`crate::constants::BASE_PATH_CONFIG_KEYS`]) when that value is empty
//!   or already root-anchored.
//!
//! JS additionally gets a conservative literal rewrite for root-relative
//! string literals immediately inside `fetch(`, `new XMLHttpRequest`-style
//! open calls, `new URL(`, or `import(` — contexts where the string is
//! unambiguously a URL, not arbitrary data.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

use super::rewrite::rewrite_url;
use crate::constants::BASE_PATH_CONFIG_KEYS;

/// Rewrite only the "absolute URL matching the backend origin" case,
/// leaving root-relative and every other form of string untouched — used
/// for arbitrary JSON/XML string values where over-rewriting would
/// corrupt API data.
fn rewrite_absolute_only(value: &str, slug: &str, backend_origin: &str) -> String {
    let prefix = format!("/proxy/{slug}");
    let backend_origin = backend_origin.trim_end_matches('/');
    if !backend_origin.is_empty()
        && let Some(rest) = value.strip_prefix(backend_origin)
        && (rest.is_empty() || rest.starts_with('/'))
    {
        return format!("{prefix}{rest}");
    }
    value.to_string()
}

fn rewrite_base_path_value(value: &str, slug: &str, backend_origin: &str) -> String {
    if value.is_empty() || value == "/" {
        format!("/proxy/{slug}")
    } else if value.starts_with('/') {
        rewrite_url(value, slug, backend_origin)
    } else {
        rewrite_absolute_only(value, slug, backend_origin)
    }
}

fn walk(value: &mut Value, slug: &str, backend_origin: &str) {
    match value {
        Value::Object(map) => {
            map.retain(|k, _| !k.eq_ignore_ascii_case("integrity"));
            for (key, v) in map.iter_mut() {
                if BASE_PATH_CONFIG_KEYS.iter().any(|k| k.eq_ignore_ascii_case(key))
                    && let Value::String(s) = v
                {
                    *s = rewrite_base_path_value(s, slug, backend_origin);
                    continue;
                }
                walk(v, slug, backend_origin);
            }
        }
        Value::Array(items) => {
            for item in items.iter_mut() {
                walk(item, slug, backend_origin);
            }
        }
        Value::String(s) => {
            *s = rewrite_absolute_only(s, slug, backend_origin);
        }
        _ => {}
    }
}

/// Rewrite a JSON body. Returns the original text unchanged (byte for
/// byte) if it fails to parse as JSON, so malformed/partial bodies are
/// never corrupted by a best-effort rewrite.
pub fn rewrite_json(body: &str, slug: &str, backend_origin: &str) -> String {
    let Ok(mut value) = serde_json::from_str::<Value>(body) else {
        return body.to_string();
    };
    walk(&mut value, slug, backend_origin);
    serde_json::to_string(&value).unwrap_or_else(|_| body.to_string())
}

static XML_INTEGRITY_ATTR: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(?i)\s+integrity\s*=\s*("[^"]*"|'[^']*')"#).unwrap());
static XML_BASE_PATH_ELEMENT: Lazy<Regex> = Lazy::new(|| {
    let keys = BASE_PATH_CONFIG_KEYS.join("|");
    Regex::new(&format!(r"(?i)<({keys})>([^<]*)</({keys})>")).unwrap()
});
static XML_BASE_PATH_ATTR: Lazy<Regex> = Lazy::new(|| {
    let keys = BASE_PATH_CONFIG_KEYS.join("|");
    Regex::new(&format!(r#"(?i)\b({keys})\s*=\s*("([^"]*)"|'([^']*)')"#)).unwrap()
});

/// Rewrite an XML body: strips `integrity` attributes, rewrites recognised
/// base-path elements/attributes, and rewrites absolute-backend-URL text
/// occurrences. Plain text/attribute transforms only — never reparses or
/// reserializes the document, so malformed XML passes through safely.
pub fn rewrite_xml(body: &str, slug: &str, backend_origin: &str) -> String {
    let without_integrity = XML_INTEGRITY_ATTR.replace_all(body, "");

    let step1 = XML_BASE_PATH_ELEMENT.replace_all(&without_integrity, |caps: &regex::Captures| {
        let tag = &caps[1];
        let rewritten = rewrite_base_path_value(&caps[2], slug, backend_origin);
        format!("<{tag}>{rewritten}</{tag}>")
    });

    let step2 = XML_BASE_PATH_ATTR.replace_all(&step1, |caps: &regex::Captures| {
        let attr = &caps[1];
        let quote = if caps.get(3).is_some() { '"' } else { '\'' };
        let value = caps.get(3).or_else(|| caps.get(4)).map(|m| m.as_str()).unwrap_or("");
        let rewritten = rewrite_base_path_value(value, slug, backend_origin);
        format!("{attr}={quote}{rewritten}{quote}")
    });

    if backend_origin.is_empty() {
        step2.into_owned()
    } else {
        step2.replace(backend_origin, &format!("/proxy/{slug}"))
    }
}

static JS_URL_CALL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(?i)(fetch|XMLHttpRequest|new\s+URL|import)\s*\(\s*(['"])(/[^'"]*)\2"#).unwrap());

/// Rewrite a JS body in safe mode: literal URL strings in the conservative
/// contexts described above, plus the universal absolute-backend-URL and
/// base-path-config-key rewrites shared with JSON/XML.
pub fn rewrite_js(body: &str, slug: &str, backend_origin: &str) -> String {
    let step1 = JS_URL_CALL.replace_all(body, |caps: &regex::Captures| {
        let call = &caps[1];
        let quote = &caps[2];
        let rewritten = rewrite_url(&caps[3], slug, backend_origin);
        format!("{call}({quote}{rewritten}")
    });

    let step2 = XML_BASE_PATH_ATTR.replace_all(&step1, |caps: &regex::Captures| {
        let attr = &caps[1];
        let quote = if caps.get(3).is_some() { '"' } else { '\'' };
        let value = caps.get(3).or_else(|| caps.get(4)).map(|m| m.as_str()).unwrap_or("");
        let rewritten = rewrite_base_path_value(value, slug, backend_origin);
        format!("{attr}={quote}{rewritten}{quote}")
    });

    if backend_origin.is_empty() {
        step2.into_owned()
    } else {
        step2.replace(backend_origin, &format!("/proxy/{slug}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ORIGIN: &str = "http://backend.internal:8080";

    #[test]
    fn json_safe_mode_leaves_root_relative_poster_untouched() {
        let out = rewrite_json(r#"{"poster":"/art/1.jpg","api":""}"#, "sonarr", ORIGIN);
        let parsed: Value = serde_json::from_str(&out).unwrap();
        assert_eq!(parsed["poster"], "/art/1.jpg");
    }

    #[test]
    fn json_rewrites_recognised_empty_base_path_key() {
        let out = rewrite_json(r#"{"urlBase":""}"#, "sonarr", ORIGIN);
        let parsed: Value = serde_json::from_str(&out).unwrap();
        assert_eq!(parsed["urlBase"], "/proxy/sonarr");
    }

    #[test]
    fn json_rewrites_recognised_root_anchored_base_path_key() {
        let out = rewrite_json(r#"{"baseUrl":"/"}"#, "sonarr", ORIGIN);
        let parsed: Value = serde_json::from_str(&out).unwrap();
        assert_eq!(parsed["baseUrl"], "/proxy/sonarr");
    }

    #[test]
    fn json_rewrites_absolute_backend_url_anywhere() {
        let out = rewrite_json(r#"{"thumb":"http://backend.internal:8080/t/1.jpg"}"#, "sonarr", ORIGIN);
        let parsed: Value = serde_json::from_str(&out).unwrap();
        assert_eq!(parsed["thumb"], "/proxy/sonarr/t/1.jpg");
    }

    #[test]
    fn json_strips_integrity_fields() {
        let out = rewrite_json(r#"{"file":"a.js","integrity":"sha384-x"}"#, "sonarr", ORIGIN);
        assert!(!out.contains("integrity"));
    }

    #[test]
    fn json_malformed_passes_through_unchanged() {
        let body = "{not json";
        assert_eq!(rewrite_json(body, "sonarr", ORIGIN), body);
    }

    #[test]
    fn js_rewrites_root_relative_fetch_literal() {
        let out = rewrite_js("fetch('/api/status').then(r => r.json())", "sonarr", ORIGIN);
        assert!(out.contains("fetch('/proxy/sonarr/api/status')"));
    }

    #[test]
    fn js_does_not_touch_unrelated_root_relative_strings() {
        let out = rewrite_js("const path = '/api/status';", "sonarr", ORIGIN);
        assert_eq!(out, "const path = '/api/status';");
    }

    #[test]
    fn xml_strips_integrity_and_rewrites_base_path_element() {
        let out = rewrite_xml(r#"<config><urlBase></urlBase><link integrity="sha384-x" /></config>"#, "sonarr", ORIGIN);
        assert!(!out.contains("integrity"));
        assert!(out.contains("<urlBase>/proxy/sonarr</urlBase>"));
    }
}
