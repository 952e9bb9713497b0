//! The authentication plane's own derived, atomically-swapped snapshot
//! (spec.md §3 "Auth snapshot"). Recomputed from the config snapshot on
//! every commit; never mutated in place.

use std::sync::Arc;

use ipnet::IpNet;

use crate::config::ConfigSnapshot;
use crate::config::schema::{AuthMethodKind, BypassRuleConfig, ForwardAuthConfig, OidcConfig, Role, UserConfig};

#[derive(Debug, Clone)]
pub struct AuthSnapshot {
    pub method: AuthMethodKind,
    pub trusted_proxies: Vec<IpNet>,
    pub forward_auth: ForwardAuthConfig,
    pub oidc: OidcConfig,
    pub api_key: Option<String>,
    pub bypass_rules: Vec<BypassRuleConfig>,
    pub base_path: String,
    pub cookie_secure: bool,
    pub session_max_age_secs: u64,
    pub users: Vec<UserConfig>,
}

impl AuthSnapshot {
    pub fn from_config(config: &ConfigSnapshot) -> Arc<Self> {
        let auth = &config.auth;
        let trusted_proxies = auth
            .forward_auth
            .trusted_proxies
            .iter()
            .filter_map(|cidr| cidr.parse::<IpNet>().ok())
            .collect();

        let mut bypass_rules = config.bypass.clone();
        for app in &config.apps {
            bypass_rules.extend(app.auth_bypass.clone());
        }

        Arc::new(Self {
            method: auth.method,
            trusted_proxies,
            forward_auth: auth.forward_auth.clone(),
            oidc: auth.oidc.clone(),
            api_key: auth.api_key.clone(),
            bypass_rules,
            base_path: config.base_path.clone(),
            cookie_secure: auth.cookie_secure,
            session_max_age_secs: auth
                .session_max_age_secs
                .unwrap_or(crate::constants::DEFAULT_SESSION_MAX_AGE_SECS),
            users: config.users.clone(),
        })
    }

    pub fn find_user(&self, username: &str) -> Option<&UserConfig> {
        self.users.iter().find(|u| u.username == username)
    }

    pub fn is_admin_group(&self, group: &str) -> bool {
        let trimmed = group.trim();
        crate::constants::ADMIN_GROUP_NAMES
            .iter()
            .any(|candidate| candidate.eq_ignore_ascii_case(trimmed))
    }

    pub fn role_for_groups<'a>(&self, groups: impl Iterator<Item = &'a str>) -> Role {
        if groups.into_iter().any(|g| self.is_admin_group(g)) {
            Role::Admin
        } else {
            Role::User
        }
    }
}
