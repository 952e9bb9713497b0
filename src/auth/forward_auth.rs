//! Forward-auth header trust (spec.md §4.C). Security-critical: identity
//! headers are only honored once the *direct* TCP peer — never a
//! forwarded-for value — is verified inside a configured trusted CIDR.

use std::net::IpAddr;

use axum::http::HeaderMap;

use super::snapshot::AuthSnapshot;
use crate::config::schema::Role;

pub struct ForwardAuthIdentity {
    pub username: String,
    pub email: Option<String>,
    pub display_name: Option<String>,
    pub role: Role,
}

/// `None` trusted proxies configured means all forward-auth requests are
/// rejected outright, even if headers are present.
pub fn is_trusted_peer(snapshot: &AuthSnapshot, peer: IpAddr) -> bool {
    !snapshot.trusted_proxies.is_empty() && snapshot.trusted_proxies.iter().any(|net| net.contains(&peer))
}

/// Authenticate a forward-auth request. Returns `None` for "unauthenticated":
/// either the peer isn't trusted, or the trusted peer omitted the user header.
pub fn authenticate(snapshot: &AuthSnapshot, peer: IpAddr, headers: &HeaderMap) -> Option<ForwardAuthIdentity> {
    if !is_trusted_peer(snapshot, peer) {
        return None;
    }

    let fa = &snapshot.forward_auth;
    let header_str = |name: &str| -> Option<String> {
        if name.is_empty() {
            return None;
        }
        headers.get(name).and_then(|v| v.to_str().ok()).map(|s| s.to_string())
    };

    let username = header_str(&fa.user_header)?;
    let email = header_str(&fa.email_header);
    let display_name = header_str(&fa.name_header);
    let groups_raw = header_str(&fa.groups_header).unwrap_or_default();
    let role = snapshot.role_for_groups(groups_raw.split(',').map(str::trim).filter(|s| !s.is_empty()));

    Some(ForwardAuthIdentity {
        username,
        email,
        display_name,
        role,
    })
}

/// The IP to use for any IP-based decision (bypass `allowed_ips`, rate
/// limiting): the direct peer, unless that peer is itself a trusted proxy,
/// in which case `X-Forwarded-For`'s left-most entry is honored.
pub fn effective_client_ip(snapshot: &AuthSnapshot, peer: IpAddr, headers: &HeaderMap) -> IpAddr {
    if !is_trusted_peer(snapshot, peer) {
        return peer;
    }
    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .and_then(|s| s.trim().parse::<IpAddr>().ok())
        .unwrap_or(peer)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::ForwardAuthConfig;
    use axum::http::HeaderValue;

    fn snapshot_with_trusted_cidrs(cidrs: &[&str]) -> AuthSnapshot {
        AuthSnapshot {
            method: Default::default(),
            trusted_proxies: cidrs.iter().map(|c| c.parse().unwrap()).collect(),
            forward_auth: ForwardAuthConfig {
                trusted_proxies: cidrs.iter().map(|s| s.to_string()).collect(),
                user_header: "remote-user".into(),
                email_header: "remote-email".into(),
                name_header: "remote-name".into(),
                groups_header: "remote-groups".into(),
                logout_url: None,
            },
            oidc: Default::default(),
            api_key: None,
            bypass_rules: Vec::new(),
            base_path: String::new(),
            cookie_secure: false,
            session_max_age_secs: 3600,
            users: Vec::new(),
        }
    }

    #[test]
    fn spoofed_xff_from_untrusted_peer_is_rejected() {
        let snapshot = snapshot_with_trusted_cidrs(&["10.0.0.0/8"]);
        let mut headers = HeaderMap::new();
        headers.insert("remote-user", HeaderValue::from_static("admin"));
        headers.insert("remote-groups", HeaderValue::from_static("admins"));
        headers.insert("x-forwarded-for", HeaderValue::from_static("10.0.0.1"));

        let peer: IpAddr = "203.0.113.50".parse().unwrap();
        assert!(authenticate(&snapshot, peer, &headers).is_none());
        assert_eq!(effective_client_ip(&snapshot, peer, &headers), peer);
    }

    #[test]
    fn trusted_peer_with_admin_group_is_admin() {
        let snapshot = snapshot_with_trusted_cidrs(&["10.0.0.0/8"]);
        let mut headers = HeaderMap::new();
        headers.insert("remote-user", HeaderValue::from_static("admin"));
        headers.insert("remote-groups", HeaderValue::from_static("Admins, other"));

        let peer: IpAddr = "10.1.2.3".parse().unwrap();
        let identity = authenticate(&snapshot, peer, &headers).unwrap();
        assert_eq!(identity.role, Role::Admin);
    }

    #[test]
    fn no_trusted_proxies_rejects_everything() {
        let snapshot = snapshot_with_trusted_cidrs(&[]);
        let mut headers = HeaderMap::new();
        headers.insert("remote-user", HeaderValue::from_static("admin"));
        let peer: IpAddr = "127.0.0.1".parse().unwrap();
        assert!(authenticate(&snapshot, peer, &headers).is_none());
    }

    #[test]
    fn missing_user_header_is_unauthenticated() {
        let snapshot = snapshot_with_trusted_cidrs(&["10.0.0.0/8"]);
        let headers = HeaderMap::new();
        let peer: IpAddr = "10.1.2.3".parse().unwrap();
        assert!(authenticate(&snapshot, peer, &headers).is_none());
    }
}
