//! Secret scrubbing applied uniformly to every outward-facing view of the
//! config: the admin API's GET/export responses and the `config_updated`
//! event broadcast to `/ws` clients share this so a secret never leaks
//! through either path.

use serde_json::Value;

use super::schema::PortalConfig;

const REDACTED: &str = "********";

pub fn redact_secrets(config: &mut PortalConfig) {
    for user in config.users.iter_mut() {
        user.password_hash = REDACTED.to_string();
    }
    if !config.auth.oidc.client_secret.is_empty() {
        config.auth.oidc.client_secret = REDACTED.to_string();
    }
    if let Some(key) = &config.auth.api_key
        && !key.is_empty()
    {
        config.auth.api_key = Some(REDACTED.to_string());
    }
}

pub fn redacted_value(config: &PortalConfig) -> Value {
    let mut copy = config.clone();
    redact_secrets(&mut copy);
    serde_json::to_value(copy).unwrap_or(Value::Null)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::{Role, UserConfig};

    #[test]
    fn redact_secrets_blanks_password_hashes() {
        let mut config = PortalConfig::default();
        config.users.push(UserConfig {
            username: "alice".into(),
            password_hash: "realhash".into(),
            role: Role::Admin,
            email: None,
            display_name: None,
        });
        redact_secrets(&mut config);
        assert_eq!(config.users[0].password_hash, REDACTED);
    }

    #[test]
    fn redact_secrets_leaves_empty_api_key_alone() {
        let mut config = PortalConfig::default();
        config.auth.api_key = None;
        redact_secrets(&mut config);
        assert_eq!(config.auth.api_key, None);
    }
}
