//! Raw WebSocket tunneling (spec.md §4.D "WebSocket upgrade"). Grounded on
//! `localplatform-homeroute`'s `handle_websocket_upgrade` (its
//! `hyper::upgrade::on` + `hyper::client::conn::http1` one-shot handshake +
//! `copy_bidirectional` pump), generalized to dial either a plain-TCP or
//! TLS backend via [`super::tls::client_config`] depending on the app's
//! scheme, since the teacher only ever dialed plain TCP.

use axum::extract::Request;
use axum::http::{HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use hyper_util::rt::TokioIo;
use rustls::pki_types::ServerName;
use tokio::io::{AsyncRead, AsyncWrite, copy_bidirectional};
use tokio::net::TcpStream;
use tokio_rustls::TlsConnector;

use super::{backend_target, strip_proxy_prefix};
use crate::config::schema::AppConfig;

/// Whether `req` is an HTTP/1.1 WebSocket upgrade request (`Connection:
/// Upgrade` + `Upgrade: websocket`, case-insensitively, `Connection` being
/// a comma-separated list per RFC 7230).
pub fn is_websocket_upgrade(req: &Request) -> bool {
    let has_upgrade_token = req
        .headers()
        .get(header::CONNECTION)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.split(',').any(|tok| tok.trim().eq_ignore_ascii_case("upgrade")))
        .unwrap_or(false);
    let is_websocket = req
        .headers()
        .get(header::UPGRADE)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.eq_ignore_ascii_case("websocket"))
        .unwrap_or(false);
    has_upgrade_token && is_websocket
}

/// Tunnel a WebSocket upgrade for `app` through to its backend. Dials the
/// backend directly (bypassing `reqwest`, which has no upgrade support),
/// performs the HTTP/1.1 handshake by hand, then pumps bytes in both
/// directions until either side closes.
pub async fn handle_upgrade(app: &AppConfig, slug: &str, mut req: Request) -> Response {
    let Ok(backend_url) = url::Url::parse(&app.url) else {
        return (StatusCode::BAD_GATEWAY, "invalid backend url").into_response();
    };
    let Some(host) = backend_url.host_str().map(str::to_string) else {
        return (StatusCode::BAD_GATEWAY, "backend url has no host").into_response();
    };
    let use_tls = backend_url.scheme() == "https" || backend_url.scheme() == "wss";
    let port = backend_url.port_or_known_default().unwrap_or(if use_tls { 443 } else { 80 });

    let query = req.uri().query().map(|q| format!("?{q}")).unwrap_or_default();
    let remainder = strip_proxy_prefix(req.uri().path(), slug);
    let target_path = backend_target(&backend_url, &format!("{remainder}{query}"));
    let Ok(target_uri) = target_path.parse() else {
        return (StatusCode::BAD_GATEWAY, "invalid proxied target").into_response();
    };

    let host_header = if use_tls && port == 443 || !use_tls && port == 80 {
        host.clone()
    } else {
        format!("{host}:{port}")
    };

    let client_upgrade = hyper::upgrade::on(&mut req);

    *req.uri_mut() = target_uri;
    for (key, value) in &app.headers {
        if let (Ok(name), Ok(val)) = (
            axum::http::HeaderName::from_bytes(key.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            req.headers_mut().insert(name, val);
        }
    }
    if let Ok(value) = HeaderValue::from_str(&host_header) {
        req.headers_mut().insert(header::HOST, value);
    }

    let tcp = match TcpStream::connect((host.as_str(), port)).await {
        Ok(stream) => stream,
        Err(err) => {
            tracing::warn!(app = %slug, error = %err, "websocket tunnel dial failed");
            return (StatusCode::BAD_GATEWAY, "upstream dial failed").into_response();
        }
    };

    if use_tls {
        let connector = TlsConnector::from(super::tls::client_config(app.skip_tls_verify));
        let Ok(server_name) = ServerName::try_from(host.clone()) else {
            return (StatusCode::BAD_GATEWAY, "invalid backend hostname").into_response();
        };
        match connector.connect(server_name, tcp).await {
            Ok(tls_stream) => handshake_and_bridge(tls_stream, req, client_upgrade, slug).await,
            Err(err) => {
                tracing::warn!(app = %slug, error = %err, "websocket tunnel tls handshake failed");
                (StatusCode::BAD_GATEWAY, "upstream tls handshake failed").into_response()
            }
        }
    } else {
        handshake_and_bridge(tcp, req, client_upgrade, slug).await
    }
}

/// Perform the one-shot HTTP/1.1 handshake over `io`, forward the upgrade
/// request, and if the backend answers `101 Switching Protocols`, spawn a
/// task that bridges both upgraded connections until either side closes.
async fn handshake_and_bridge<IO>(
    io: IO,
    req: Request,
    client_upgrade: hyper::upgrade::OnUpgrade,
    slug: &str,
) -> Response
where
    IO: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let io = TokioIo::new(io);
    let (mut sender, conn) = match hyper::client::conn::http1::Builder::new()
        .preserve_header_case(true)
        .title_case_headers(true)
        .handshake(io)
        .await
    {
        Ok(pair) => pair,
        Err(err) => {
            tracing::warn!(app = %slug, error = %err, "websocket tunnel handshake failed");
            return (StatusCode::BAD_GATEWAY, "upstream handshake failed").into_response();
        }
    };

    tokio::spawn(async move {
        if let Err(err) = conn.with_upgrades().await {
            tracing::debug!(error = %err, "websocket tunnel connection driver exited");
        }
    });

    let backend_response = match sender.send_request(req).await {
        Ok(resp) => resp,
        Err(err) => {
            tracing::warn!(app = %slug, error = %err, "websocket upgrade request failed");
            return (StatusCode::BAD_GATEWAY, "upstream upgrade request failed").into_response();
        }
    };

    if backend_response.status() != StatusCode::SWITCHING_PROTOCOLS {
        let status = backend_response.status();
        return (status, "backend refused the websocket upgrade").into_response();
    }

    let mut response_headers = backend_response.headers().clone();
    let backend_upgrade = hyper::upgrade::on(backend_response);

    let slug = slug.to_string();
    tokio::spawn(async move {
        let (client_io, backend_io) = match tokio::try_join!(client_upgrade, backend_upgrade) {
            Ok(pair) => pair,
            Err(err) => {
                tracing::warn!(app = %slug, error = %err, "websocket upgrade handshake incomplete");
                return;
            }
        };
        let mut client_io = TokioIo::new(client_io);
        let mut backend_io = TokioIo::new(backend_io);
        match copy_bidirectional(&mut client_io, &mut backend_io).await {
            Ok((to_backend, to_client)) => {
                tracing::debug!(app = %slug, to_backend, to_client, "websocket tunnel closed");
            }
            Err(err) => {
                tracing::debug!(app = %slug, error = %err, "websocket tunnel closed with error");
            }
        }
    });

    let mut builder = Response::builder().status(StatusCode::SWITCHING_PROTOCOLS);
    if let Some(headers) = builder.headers_mut() {
        std::mem::swap(headers, &mut response_headers);
    }
    builder.body(axum::body::Body::empty()).unwrap_or_else(|_| StatusCode::BAD_GATEWAY.into_response())
}

#[cfg(test)]
mod tests {
    use axum::body::Body;
    use axum::http::Request as HttpRequest;

    use super::*;

    fn request_with(conn: &str, upgrade: &str) -> Request {
        HttpRequest::builder()
            .header(header::CONNECTION, conn)
            .header(header::UPGRADE, upgrade)
            .body(Body::empty())
            .unwrap()
    }

    #[test]
    fn recognises_standard_websocket_upgrade() {
        assert!(is_websocket_upgrade(&request_with("Upgrade", "websocket")));
    }

    #[test]
    fn recognises_upgrade_token_within_connection_list() {
        assert!(is_websocket_upgrade(&request_with("keep-alive, Upgrade", "websocket")));
    }

    #[test]
    fn rejects_non_websocket_upgrade() {
        assert!(!is_websocket_upgrade(&request_with("Upgrade", "h2c")));
    }

    #[test]
    fn rejects_plain_request() {
        let req = HttpRequest::builder().body(Body::empty()).unwrap();
        assert!(!is_websocket_upgrade(&req));
    }
}
