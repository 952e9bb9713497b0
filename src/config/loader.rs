//! Loads a [`PortalConfig`] from a YAML file, expands `${VAR}` references in
//! string scalars, and layers the `MUXIMUX_*` environment overrides on top.

use std::path::{Path, PathBuf};

use super::schema::PortalConfig;
use crate::error::AppError;

/// Expand `${VAR}` references in a string. An unset variable is preserved
/// literally (never silently replaced with an empty string) so a missing
/// secret doesn't quietly disable auth.
pub fn expand_env_refs(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let bytes = input.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'$' && bytes.get(i + 1) == Some(&b'{') {
            if let Some(close) = input[i + 2..].find('}') {
                let var_name = &input[i + 2..i + 2 + close];
                match std::env::var(var_name) {
                    Ok(value) => out.push_str(&value),
                    Err(_) => out.push_str(&input[i..i + 2 + close + 1]),
                }
                i += 2 + close + 1;
                continue;
            }
        }
        let ch = input[i..].chars().next().unwrap();
        out.push(ch);
        i += ch.len_utf8();
    }
    out
}

fn expand_value(value: &mut serde_yaml::Value) {
    match value {
        serde_yaml::Value::String(s) => *s = expand_env_refs(s),
        serde_yaml::Value::Sequence(seq) => seq.iter_mut().for_each(expand_value),
        serde_yaml::Value::Mapping(map) => {
            for (_, v) in map.iter_mut() {
                expand_value(v);
            }
        }
        _ => {}
    }
}

pub fn data_dir() -> PathBuf {
    std::env::var("MUXIMUX_DATA")
        .map(PathBuf::from)
        .unwrap_or_else(|_| dirs::data_dir().unwrap_or_else(|| PathBuf::from(".")).join("muximux"))
}

pub fn config_path() -> PathBuf {
    std::env::var("MUXIMUX_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|_| data_dir().join("config.yaml"))
}

/// Load the config file at `path`, creating a default one if absent.
/// Applies `${VAR}` expansion, then `MUXIMUX_LISTEN`/`MUXIMUX_BASE_PATH`
/// env overrides, then runs validation.
pub async fn load(path: &Path) -> Result<PortalConfig, AppError> {
    let raw = if path.exists() {
        tokio::fs::read_to_string(path)
            .await
            .map_err(|e| AppError::ConfigInvalid(format!("failed to read {}: {e}", path.display())))?
    } else {
        let default_yaml = serde_yaml::to_string(&PortalConfig::default())
            .map_err(|e| AppError::Internal(e.to_string()))?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(path, &default_yaml).await?;
        default_yaml
    };

    let mut value: serde_yaml::Value = serde_yaml::from_str(&raw)
        .map_err(|e| AppError::ConfigInvalid(format!("invalid YAML: {e}")))?;
    expand_value(&mut value);

    let mut config: PortalConfig = serde_yaml::from_value(value)
        .map_err(|e| AppError::ConfigInvalid(format!("schema mismatch: {e}")))?;

    if let Ok(listen) = std::env::var("MUXIMUX_LISTEN") {
        config.listen_addr = listen;
    }
    if let Ok(base_path) = std::env::var("MUXIMUX_BASE_PATH") {
        config.base_path = base_path;
    }

    validate(&config)?;
    Ok(config)
}

/// Persist `config` atomically: write to a sibling temp file, `fsync`, then
/// rename over the target path.
pub async fn save(path: &Path, config: &PortalConfig) -> Result<(), AppError> {
    validate(config)?;
    let yaml = serde_yaml::to_string(config).map_err(|e| AppError::Internal(e.to_string()))?;

    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let temp_path = path.with_extension("yaml.tmp");
    let mut file = tokio::fs::File::create(&temp_path).await?;
    use tokio::io::AsyncWriteExt;
    file.write_all(yaml.as_bytes()).await?;
    file.sync_all().await?;
    tokio::fs::rename(&temp_path, path).await?;
    Ok(())
}

/// The load/commit-time validation rules of spec.md §4.A. Note that
/// "forward-auth without a trusted proxy" is deliberately *not* checked here:
/// the snapshot may hold it, and only the auth plane refuses such requests
/// at request time.
pub fn validate(config: &PortalConfig) -> Result<(), AppError> {
    let tls = &config.tls;
    if tls.cert.is_some() != tls.key.is_some() {
        return Err(AppError::ConfigInvalid(
            "tls.cert and tls.key must both be present or both be absent".into(),
        ));
    }
    if tls.domain.is_some() && tls.email.is_none() {
        return Err(AppError::ConfigInvalid("tls.domain requires tls.email".into()));
    }
    if tls.domain.is_some() && tls.cert.is_some() {
        return Err(AppError::ConfigInvalid(
            "tls.domain and tls.cert are mutually exclusive".into(),
        ));
    }
    if let Some(path) = &config.gateway.config_path
        && !Path::new(path).exists()
    {
        return Err(AppError::ConfigInvalid(format!(
            "gateway config file does not exist: {path}"
        )));
    }

    let mut seen_slugs = std::collections::HashSet::new();
    let mut default_count = 0;
    for app in &config.apps {
        if !app.enabled {
            continue;
        }
        if !seen_slugs.insert(app.slug.clone()) {
            return Err(AppError::ConfigInvalid(format!(
                "duplicate app slug among enabled apps: {}",
                app.slug
            )));
        }
        if app.default {
            default_count += 1;
        }
        if app.proxy && url::Url::parse(&app.url).is_err() {
            return Err(AppError::ConfigInvalid(format!(
                "app '{}' has proxy=true but an unparseable url",
                app.name
            )));
        }
    }
    if default_count > 1 {
        return Err(AppError::ConfigInvalid("at most one app may be marked default".into()));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expand_preserves_unset_vars() {
        // SAFETY: test-only, single-threaded access to this env var name.
        unsafe { std::env::remove_var("MUXIMUX_TEST_UNSET_VAR") };
        assert_eq!(
            expand_env_refs("secret=${MUXIMUX_TEST_UNSET_VAR}"),
            "secret=${MUXIMUX_TEST_UNSET_VAR}"
        );
    }

    #[test]
    fn expand_substitutes_set_vars() {
        // SAFETY: test-only, single-threaded access to this env var name.
        unsafe { std::env::set_var("MUXIMUX_TEST_SET_VAR", "hunter2") };
        assert_eq!(expand_env_refs("secret=${MUXIMUX_TEST_SET_VAR}"), "secret=hunter2");
        unsafe { std::env::remove_var("MUXIMUX_TEST_SET_VAR") };
    }

    #[test]
    fn validate_rejects_mismatched_tls_pair() {
        let mut cfg = PortalConfig::default();
        cfg.tls.cert = Some("/tmp/cert.pem".into());
        assert!(validate(&cfg).is_err());
    }

    #[test]
    fn validate_rejects_domain_and_cert_together() {
        let mut cfg = PortalConfig::default();
        cfg.tls.domain = Some("example.com".into());
        cfg.tls.email = Some("a@example.com".into());
        cfg.tls.cert = Some("/tmp/cert.pem".into());
        cfg.tls.key = Some("/tmp/key.pem".into());
        assert!(validate(&cfg).is_err());
    }

    #[test]
    fn validate_rejects_duplicate_enabled_slugs() {
        use super::super::schema::AppConfig;
        let mut cfg = PortalConfig::default();
        cfg.apps.push(AppConfig {
            name: "A".into(),
            slug: "a".into(),
            proxy: false,
            ..Default::default()
        });
        cfg.apps.push(AppConfig {
            name: "B".into(),
            slug: "a".into(),
            proxy: false,
            ..Default::default()
        });
        assert!(validate(&cfg).is_err());
    }
}
