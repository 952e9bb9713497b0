//! Provider-agnostic OIDC authorization-code flow (spec.md §3 "OIDC pending
//! state", §4.C). Generalized from the teacher's fixed-endpoint Claude OAuth
//! client (`auth/oauth.rs`) to a discovery-document-driven flow: no
//! per-provider code paths, only the standard discovery + code-exchange +
//! userinfo sequence.

use std::collections::HashMap;
use std::time::{SystemTime, UNIX_EPOCH};

use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;
use tokio::sync::{Mutex, RwLock};

use crate::config::schema::{OidcConfig, Role};
use crate::constants::OIDC_STATE_TTL_SECS;
use crate::error::AppError;

fn now_secs() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap().as_secs()
}

/// A fresh, URL-safe, >=256-bit opaque state token.
fn generate_state() -> String {
    format!("{:032x}{:032x}", rand::random::<u128>(), rand::random::<u128>())
}

#[derive(Debug, Deserialize)]
struct Discovery {
    authorization_endpoint: String,
    token_endpoint: String,
    userinfo_endpoint: String,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
}

struct PendingState {
    created_at: u64,
    redirect_url: String,
}

/// Sanitize a client-supplied redirect path: must start with `/` and must
/// not be protocol-relative (`//host/...`), else it is replaced with the
/// base-path root so an open-redirect can never slip through the callback.
pub fn sanitize_redirect(base_path: &str, redirect: Option<&str>) -> String {
    match redirect {
        Some(r) if r.starts_with('/') && !r.starts_with("//") => r.to_string(),
        _ => {
            if base_path.is_empty() {
                "/".to_string()
            } else {
                format!("{base_path}/")
            }
        }
    }
}

/// Caches the discovery document (fetched once per issuer, on first use)
/// and the map of pending, one-time `state` tokens.
pub struct OidcClient {
    http: Client,
    discovery: RwLock<Option<Discovery>>,
    pending: Mutex<HashMap<String, PendingState>>,
}

pub struct AuthorizeUrl {
    pub state: String,
    pub url: String,
}

pub struct OidcIdentity {
    pub username: String,
    pub email: Option<String>,
    pub display_name: Option<String>,
    pub role: Role,
}

impl OidcClient {
    pub fn new() -> Self {
        Self {
            http: Client::builder()
                .timeout(std::time::Duration::from_secs(30))
                .build()
                .expect("failed to build OIDC http client"),
            discovery: RwLock::new(None),
            pending: Mutex::new(HashMap::new()),
        }
    }

    async fn discovery(&self, config: &OidcConfig) -> Result<Discovery, AppError> {
        if let Some(cached) = self.discovery.read().await.as_ref() {
            return Ok(Discovery {
                authorization_endpoint: cached.authorization_endpoint.clone(),
                token_endpoint: cached.token_endpoint.clone(),
                userinfo_endpoint: cached.userinfo_endpoint.clone(),
            });
        }

        let url = format!("{}/.well-known/openid-configuration", config.issuer.trim_end_matches('/'));
        let response = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| AppError::Internal(format!("oidc discovery request failed: {e}")))?;
        if !response.status().is_success() {
            return Err(AppError::Internal("oidc discovery failed".into()));
        }
        let doc: Discovery = response
            .json()
            .await
            .map_err(|e| AppError::Internal(format!("oidc discovery parse failed: {e}")))?;

        let cached = Discovery {
            authorization_endpoint: doc.authorization_endpoint.clone(),
            token_endpoint: doc.token_endpoint.clone(),
            userinfo_endpoint: doc.userinfo_endpoint.clone(),
        };
        *self.discovery.write().await = Some(doc);
        Ok(cached)
    }

    /// Sweep entries older than [`OIDC_STATE_TTL_SECS`]; called from the
    /// same periodic loop that sweeps the session store.
    pub async fn sweep_expired(&self) -> usize {
        let now = now_secs();
        let mut guard = self.pending.lock().await;
        let before = guard.len();
        guard.retain(|_, s| now.saturating_sub(s.created_at) < OIDC_STATE_TTL_SECS);
        before - guard.len()
    }

    /// Start the flow: fetch/cache discovery, mint a state, redirect to the
    /// provider's `authorization_endpoint`.
    pub async fn authorize_url(
        &self,
        config: &OidcConfig,
        redirect_uri: &str,
        sanitized_redirect: String,
    ) -> Result<AuthorizeUrl, AppError> {
        let discovery = self.discovery(config).await?;
        let state = generate_state();

        self.pending.lock().await.insert(
            state.clone(),
            PendingState {
                created_at: now_secs(),
                redirect_url: sanitized_redirect,
            },
        );

        let scope = config.scope.clone().unwrap_or_else(|| crate::constants::DEFAULT_OIDC_SCOPE.to_string());
        let url = format!(
            "{}?response_type=code&client_id={}&redirect_uri={}&scope={}&state={}",
            discovery.authorization_endpoint,
            urlencode(&config.client_id),
            urlencode(redirect_uri),
            urlencode(&scope),
            urlencode(&state),
        );

        Ok(AuthorizeUrl { state, url })
    }

    /// Consume a pending state (one-time use) and return its stored
    /// redirect target; `None` if the state is missing, already consumed,
    /// or expired past [`OIDC_STATE_TTL_SECS`].
    async fn consume_state(&self, state: &str) -> Option<String> {
        let mut guard = self.pending.lock().await;
        let pending = guard.remove(state)?;
        if now_secs().saturating_sub(pending.created_at) >= OIDC_STATE_TTL_SECS {
            return None;
        }
        Some(pending.redirect_url)
    }

    /// Exchange `code` for an access token, fetch userinfo, extract claims.
    /// Returns `(identity, sanitized_redirect)`. Provider error detail is
    /// never surfaced to the caller per spec.md §7's no-leak rule.
    pub async fn complete(
        &self,
        config: &OidcConfig,
        state: &str,
        code: &str,
        redirect_uri: &str,
    ) -> Result<(OidcIdentity, String), AppError> {
        let redirect_url = self
            .consume_state(state)
            .await
            .ok_or_else(|| AppError::BadRequest("unknown or expired oidc state".into()))?;

        let discovery = self.discovery(config).await?;

        let form = [
            ("grant_type", "authorization_code"),
            ("code", code),
            ("redirect_uri", redirect_uri),
            ("client_id", &config.client_id),
            ("client_secret", &config.client_secret),
        ];

        let response = self
            .http
            .post(&discovery.token_endpoint)
            .form(&form)
            .send()
            .await
            .map_err(|_| AppError::Internal("oidc token exchange failed".into()))?;

        if !response.status().is_success() {
            return Err(AppError::Internal("oidc token exchange failed".into()));
        }

        let token: TokenResponse = response
            .json()
            .await
            .map_err(|_| AppError::Internal("oidc token response malformed".into()))?;

        let userinfo: Value = self
            .http
            .get(&discovery.userinfo_endpoint)
            .bearer_auth(&token.access_token)
            .send()
            .await
            .map_err(|_| AppError::Internal("oidc userinfo request failed".into()))?
            .json()
            .await
            .map_err(|_| AppError::Internal("oidc userinfo response malformed".into()))?;

        let identity = extract_identity(config, &userinfo);
        Ok((identity, redirect_url))
    }
}

impl Default for OidcClient {
    fn default() -> Self {
        Self::new()
    }
}

fn claim_str<'a>(userinfo: &'a Value, claim: &str) -> Option<&'a str> {
    userinfo.get(claim).and_then(Value::as_str)
}

/// Accepts `groups` as a list-of-string, a list-of-any (filtered to
/// strings), or a space-separated string, per spec.md §4.C.
fn extract_groups(userinfo: &Value, claim: &str) -> Vec<String> {
    match userinfo.get(claim) {
        Some(Value::Array(items)) => items.iter().filter_map(|v| v.as_str().map(str::to_string)).collect(),
        Some(Value::String(s)) => s.split_whitespace().map(str::to_string).collect(),
        _ => Vec::new(),
    }
}

fn extract_identity(config: &OidcConfig, userinfo: &Value) -> OidcIdentity {
    let username = claim_str(userinfo, &config.username_claim)
        .or_else(|| claim_str(userinfo, "sub"))
        .unwrap_or_default()
        .to_string();
    let email = config
        .email_claim
        .as_deref()
        .and_then(|c| claim_str(userinfo, c))
        .map(str::to_string);
    let display_name = config
        .display_name_claim
        .as_deref()
        .and_then(|c| claim_str(userinfo, c))
        .map(str::to_string);

    let groups = config
        .groups_claim
        .as_deref()
        .map(|c| extract_groups(userinfo, c))
        .unwrap_or_default();

    let role = if groups
        .iter()
        .any(|g| config.admin_groups.iter().any(|a| a.eq_ignore_ascii_case(g.trim())))
    {
        Role::Admin
    } else {
        Role::User
    };

    OidcIdentity {
        username,
        email,
        display_name,
        role,
    }
}

fn urlencode(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for byte in input.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => out.push(byte as char),
            _ => out.push_str(&format!("%{byte:02X}")),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_accepts_root_relative_path() {
        assert_eq!(sanitize_redirect("", Some("/dashboard")), "/dashboard");
    }

    #[test]
    fn sanitize_rejects_protocol_relative() {
        assert_eq!(sanitize_redirect("", Some("//evil.example.com")), "/");
    }

    #[test]
    fn sanitize_rejects_absolute_url() {
        assert_eq!(sanitize_redirect("", Some("https://evil.example.com")), "/");
    }

    #[test]
    fn sanitize_falls_back_to_base_path_root() {
        assert_eq!(sanitize_redirect("/portal", None), "/portal/");
    }

    #[tokio::test]
    async fn state_expires_after_ttl() {
        let client = OidcClient::new();
        client.pending.lock().await.insert(
            "stale".into(),
            PendingState {
                created_at: 0,
                redirect_url: "/".into(),
            },
        );
        assert!(client.consume_state("stale").await.is_none());
    }

    #[tokio::test]
    async fn state_is_consumed_exactly_once() {
        let client = OidcClient::new();
        client.pending.lock().await.insert(
            "fresh".into(),
            PendingState {
                created_at: now_secs(),
                redirect_url: "/dashboard".into(),
            },
        );
        assert_eq!(client.consume_state("fresh").await, Some("/dashboard".into()));
        assert_eq!(client.consume_state("fresh").await, None);
    }

    #[test]
    fn extract_groups_handles_space_separated_string() {
        let userinfo = serde_json::json!({ "groups": "admins editors" });
        assert_eq!(extract_groups(&userinfo, "groups"), vec!["admins", "editors"]);
    }

    #[test]
    fn extract_groups_filters_non_string_list_items() {
        let userinfo = serde_json::json!({ "groups": ["admins", 42, "editors"] });
        assert_eq!(extract_groups(&userinfo, "groups"), vec!["admins", "editors"]);
    }
}
