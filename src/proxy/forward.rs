//! Non-WebSocket request forwarding and response rewriting (spec.md §4.D
//! "Request path" / "Response path"). Grounded on the homeroute
//! `proxy_handler_inner`'s header-stripping/`X-Forwarded-*` pattern, built on
//! `reqwest` (the teacher's own outbound HTTP client in `main.rs`) rather
//! than a raw connection, since a non-upgrade request never needs
//! tunnel-level control — only [`super::websocket`] does.

use std::net::IpAddr;
use std::time::Duration;

use async_stream::stream;
use axum::body::Body;
use axum::extract::Request;
use axum::http::{HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use futures_util::StreamExt;

use super::compression::{self, ByteStream, Encoding};
use super::rewrite::backend_origin as derive_backend_origin;
use super::{backend_target, css, headers as proxy_headers, html, jsonxml, strip_proxy_prefix};
use crate::config::schema::AppConfig;
use crate::state::AppShared;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BodyKind {
    Html,
    Css,
    Json,
    Xml,
    Js,
    Other,
}

fn classify(content_type: &str) -> BodyKind {
    let ct = content_type.split(';').next().unwrap_or("").trim().to_ascii_lowercase();
    match ct.as_str() {
        "text/html" | "application/xhtml+xml" => BodyKind::Html,
        "text/css" => BodyKind::Css,
        "application/json" | "text/json" => BodyKind::Json,
        "application/xml" | "text/xml" | "application/rss+xml" | "application/atom+xml" => BodyKind::Xml,
        "application/javascript" | "text/javascript" | "application/ecmascript" => BodyKind::Js,
        _ => BodyKind::Other,
    }
}

async fn buffer_all(mut input: ByteStream) -> std::io::Result<Bytes> {
    let mut buf = Vec::new();
    while let Some(chunk) = input.next().await {
        buf.extend_from_slice(&chunk?);
    }
    Ok(Bytes::from(buf))
}

/// Rewrite a whole-body text transform (CSS/JSON/XML/JS): the body is
/// buffered in full since each of these formats needs structural validity
/// (a JSON parse, a well-formed `url()`/`@import`) that a bounded holdback
/// window can't guarantee, unlike HTML's tag-at-a-time streaming.
fn rewrite_whole_body(input: ByteStream, kind: BodyKind, slug: String, backend_origin: String) -> ByteStream {
    Box::pin(stream! {
        let bytes = buffer_all(input).await?;
        let text = String::from_utf8_lossy(&bytes);
        let rewritten = match kind {
            BodyKind::Css => css::rewrite(&text, &slug, &backend_origin),
            BodyKind::Json => jsonxml::rewrite_json(&text, &slug, &backend_origin),
            BodyKind::Xml => jsonxml::rewrite_xml(&text, &slug, &backend_origin),
            BodyKind::Js => jsonxml::rewrite_js(&text, &slug, &backend_origin),
            BodyKind::Html | BodyKind::Other => text.into_owned(),
        };
        yield Ok::<_, std::io::Error>(Bytes::from(rewritten.into_bytes()));
    })
}

/// Stream an HTML body through [`html::HtmlRewriter`] a chunk at a time,
/// re-synchronizing to a UTF-8 boundary on every chunk so a multi-byte
/// character split across two TCP reads is never corrupted.
fn rewrite_html_body(input: ByteStream, slug: String, backend_origin: String) -> ByteStream {
    Box::pin(stream! {
        let mut rewriter = html::HtmlRewriter::new(&slug, &backend_origin);
        let mut carry: Vec<u8> = Vec::new();
        futures_util::pin_mut!(input);
        while let Some(chunk) = input.next().await {
            let bytes = chunk?;
            carry.extend_from_slice(&bytes);
            let valid_len = match std::str::from_utf8(&carry) {
                Ok(_) => carry.len(),
                Err(e) => e.valid_up_to(),
            };
            if valid_len == 0 {
                continue;
            }
            let text = String::from_utf8(carry[..valid_len].to_vec()).expect("valid_up_to guarantees utf8");
            carry.drain(..valid_len);
            let out = rewriter.push(&text);
            if !out.is_empty() {
                yield Ok(Bytes::from(out.into_bytes()));
            }
        }
        if !carry.is_empty() {
            let text = String::from_utf8_lossy(&carry).into_owned();
            let out = rewriter.push(&text);
            if !out.is_empty() {
                yield Ok(Bytes::from(out.into_bytes()));
            }
        }
        let tail = rewriter.finish();
        if !tail.is_empty() {
            yield Ok(Bytes::from(tail.into_bytes()));
        }
    })
}

/// Forward a non-upgrade request for `app` (reachable under `/proxy/{slug}`)
/// to its backend, rewriting the response body/headers so embedding under
/// that prefix works transparently.
pub async fn forward_request(
    shared: &AppShared,
    app: &AppConfig,
    slug: &str,
    client_ip: IpAddr,
    proxy_timeout_secs: u64,
    req: Request,
) -> Response {
    let Ok(backend_url) = url::Url::parse(&app.url) else {
        return (StatusCode::BAD_GATEWAY, "invalid backend url").into_response();
    };
    let backend_origin = derive_backend_origin(&backend_url);

    let (mut parts, body) = req.into_parts();
    let query = parts.uri.query().map(|q| format!("?{q}")).unwrap_or_default();
    let remainder = strip_proxy_prefix(parts.uri.path(), slug);
    let target_path = backend_target(&backend_url, &format!("{remainder}{query}"));
    let target_url_str = format!("{backend_origin}{target_path}");
    let Ok(target_url) = url::Url::parse(&target_url_str) else {
        return (StatusCode::BAD_GATEWAY, "invalid proxied target").into_response();
    };

    let accept_encoding = parts
        .headers
        .get(header::ACCEPT_ENCODING)
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string());

    let inbound_host = parts.headers.get(header::HOST).and_then(|v| v.to_str().ok()).map(str::to_string);

    proxy_headers::strip_hop_by_hop(&mut parts.headers);
    for (key, value) in &app.headers {
        if let (Ok(name), Ok(val)) = (
            axum::http::HeaderName::from_bytes(key.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            parts.headers.insert(name, val);
        }
    }
    if let Some(inbound_host) = inbound_host
        && let Ok(value) = HeaderValue::from_str(&inbound_host)
    {
        parts.headers.insert(axum::http::HeaderName::from_static("x-forwarded-host"), value);
    }
    let host_header = match target_url.port() {
        Some(port) => format!("{}:{port}", target_url.host_str().unwrap_or_default()),
        None => target_url.host_str().unwrap_or_default().to_string(),
    };
    if let Ok(value) = HeaderValue::from_str(&host_header) {
        parts.headers.insert(header::HOST, value);
    }
    let xff_name = axum::http::HeaderName::from_static("x-forwarded-for");
    let existing_xff = parts.headers.get(&xff_name).and_then(|v| v.to_str().ok()).map(str::to_string);
    let xff_value = match existing_xff {
        Some(prev) => format!("{prev}, {client_ip}"),
        None => client_ip.to_string(),
    };
    if let Ok(value) = HeaderValue::from_str(&xff_value) {
        parts.headers.insert(xff_name, value);
    }
    if let Ok(value) = HeaderValue::from_str(target_url.scheme()) {
        parts.headers.insert(axum::http::HeaderName::from_static("x-forwarded-proto"), value);
    }

    let body_stream = body.into_data_stream();
    let client = shared.client_for(app.skip_tls_verify);
    let upstream = client
        .request(parts.method.clone(), target_url.as_str())
        .headers(parts.headers.clone())
        .body(reqwest::Body::wrap_stream(body_stream))
        .timeout(Duration::from_secs(proxy_timeout_secs.max(1)));

    let response = match upstream.send().await {
        Ok(resp) => resp,
        Err(err) => {
            tracing::warn!(app = %slug, error = %err, "proxied request failed");
            return (StatusCode::BAD_GATEWAY, "upstream request failed").into_response();
        }
    };

    let status = response.status();
    let mut resp_headers = response.headers().clone();
    let content_type = resp_headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
        .to_string();
    let content_encoding = resp_headers
        .get(header::CONTENT_ENCODING)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
        .to_string();
    let set_cookies: Vec<String> = resp_headers
        .get_all(header::SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok().map(str::to_string))
        .collect();

    proxy_headers::strip_security_headers(&mut resp_headers);
    proxy_headers::rewrite_location_headers(&mut resp_headers, slug, &backend_origin);
    resp_headers.remove(header::SET_COOKIE);
    for cookie in &set_cookies {
        let rewritten = proxy_headers::rewrite_set_cookie_path(cookie, slug);
        if let Ok(value) = HeaderValue::from_str(&rewritten) {
            resp_headers.append(header::SET_COOKIE, value);
        }
    }

    let kind = classify(&content_type);
    let raw_stream: ByteStream = Box::pin(response.bytes_stream().map(|r| r.map_err(std::io::Error::other)));

    let out_body = if kind == BodyKind::Other {
        Body::from_stream(raw_stream)
    } else {
        let encoding = Encoding::from_header(&content_encoding);
        let decompressed = compression::decompress(encoding, raw_stream);
        let rewritten = if kind == BodyKind::Html {
            rewrite_html_body(decompressed, slug.to_string(), backend_origin.clone())
        } else {
            rewrite_whole_body(decompressed, kind, slug.to_string(), backend_origin.clone())
        };
        let client_accepts = encoding.accepted_by(accept_encoding.as_deref());
        let final_encoding = if client_accepts { encoding } else { Encoding::Identity };
        let recompressed = compression::compress(final_encoding, rewritten);
        resp_headers.remove(header::CONTENT_LENGTH);
        match final_encoding.header_value() {
            Some(value) => {
                if let Ok(header_value) = HeaderValue::from_str(value) {
                    resp_headers.insert(header::CONTENT_ENCODING, header_value);
                }
            }
            None => {
                resp_headers.remove(header::CONTENT_ENCODING);
            }
        }
        Body::from_stream(recompressed)
    };

    let mut builder = Response::builder().status(status);
    if let Some(headers) = builder.headers_mut() {
        *headers = resp_headers;
    }
    builder.body(out_body).unwrap_or_else(|_| StatusCode::BAD_GATEWAY.into_response())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_known_content_types() {
        assert_eq!(classify("text/html; charset=utf-8"), BodyKind::Html);
        assert_eq!(classify("text/css"), BodyKind::Css);
        assert_eq!(classify("application/json"), BodyKind::Json);
        assert_eq!(classify("application/xml"), BodyKind::Xml);
        assert_eq!(classify("text/javascript"), BodyKind::Js);
        assert_eq!(classify("image/png"), BodyKind::Other);
        assert_eq!(classify(""), BodyKind::Other);
    }
}
