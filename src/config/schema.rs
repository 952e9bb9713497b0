//! On-disk shape of the portal's YAML configuration file.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OpenMode {
    Iframe,
    NewTab,
    NewWindow,
    Redirect,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Role {
    User,
    PowerUser,
    Admin,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AccessConfig {
    pub roles: Vec<Role>,
    pub users: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BypassRuleConfig {
    /// Literal path, or a `prefix*` glob.
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub methods: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub require_api_key: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allowed_ips: Option<Vec<String>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub name: String,
    pub slug: String,
    pub url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub health_url: Option<String>,
    pub headers: HashMap<String, String>,
    pub skip_tls_verify: bool,
    pub enabled: bool,
    pub open_mode: OpenMode,
    pub proxy: bool,
    pub health_check: bool,
    pub default: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_role: Option<Role>,
    pub access: AccessConfig,
    pub auth_bypass: Vec<BypassRuleConfig>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            name: String::new(),
            slug: String::new(),
            url: String::new(),
            health_url: None,
            headers: HashMap::new(),
            skip_tls_verify: true,
            enabled: true,
            open_mode: OpenMode::Iframe,
            proxy: true,
            health_check: false,
            default: false,
            min_role: None,
            access: AccessConfig::default(),
            auth_bypass: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GroupConfig {
    pub name: String,
    pub apps: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserConfig {
    pub username: String,
    pub password_hash: String,
    pub role: Role,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthMethodKind {
    #[default]
    None,
    Builtin,
    ForwardAuth,
    Oidc,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ForwardAuthConfig {
    pub trusted_proxies: Vec<String>,
    pub user_header: String,
    pub email_header: String,
    pub name_header: String,
    pub groups_header: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub logout_url: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct OidcConfig {
    pub issuer: String,
    pub client_id: String,
    pub client_secret: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
    pub admin_groups: Vec<String>,
    pub username_claim: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email_claim: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_name_claim: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub groups_claim: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    pub method: AuthMethodKind,
    pub forward_auth: ForwardAuthConfig,
    pub oidc: OidcConfig,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    pub cookie_secure: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_max_age_secs: Option<u64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TlsConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cert: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub config_path: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct HealthPolicyConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_interval_secs: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PortalConfig {
    pub listen_addr: String,
    pub base_path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub proxy_timeout_secs: Option<u64>,
    pub health: HealthPolicyConfig,
    pub auth: AuthConfig,
    pub apps: Vec<AppConfig>,
    pub groups: Vec<GroupConfig>,
    pub users: Vec<UserConfig>,
    pub tls: TlsConfig,
    pub gateway: GatewayConfig,
    pub bypass: Vec<BypassRuleConfig>,
}

impl Default for PortalConfig {
    fn default() -> Self {
        Self {
            listen_addr: "127.0.0.1:8080".to_string(),
            base_path: String::new(),
            proxy_timeout_secs: None,
            health: HealthPolicyConfig::default(),
            auth: AuthConfig::default(),
            apps: Vec::new(),
            groups: Vec::new(),
            users: Vec::new(),
            tls: TlsConfig::default(),
            gateway: GatewayConfig::default(),
            bypass: Vec::new(),
        }
    }
}

/// Lowercase, hyphen-separate an app name into its proxy path segment.
///
/// `"My Sonarr"` -> `my-sonarr`; collapses runs of whitespace into one hyphen.
pub fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    let mut last_was_sep = false;
    for ch in name.trim().chars() {
        if ch.is_whitespace() || ch == '-' {
            if !last_was_sep && !slug.is_empty() {
                slug.push('-');
                last_was_sep = true;
            }
        } else {
            slug.extend(ch.to_lowercase());
            last_was_sep = false;
        }
    }
    while slug.ends_with('-') {
        slug.pop();
    }
    slug
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slugify_examples_from_spec() {
        assert_eq!(slugify("My Sonarr"), "my-sonarr");
        assert_eq!(slugify("Pi-hole"), "pi-hole");
        assert_eq!(slugify("Home  Assistant"), "home-assistant");
    }
}
