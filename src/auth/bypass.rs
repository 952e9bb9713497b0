//! Bypass-rule matching (spec.md §3 "Bypass rule"): a path+method+IP+API-key
//! predicate that, when it matches, lets a request skip authentication
//! enforcement — the best-effort authentication attempt still runs
//! alongside it (see [`super::middleware::require_auth`]).

use std::net::IpAddr;

use subtle::ConstantTimeEq;

use crate::config::schema::BypassRuleConfig;

/// `path` is either a literal or a `prefix*` glob.
fn path_matches(rule_path: &str, path: &str) -> bool {
    match rule_path.strip_suffix('*') {
        Some(prefix) => path.starts_with(prefix),
        None => path == rule_path,
    }
}

fn method_matches(rule: &BypassRuleConfig, method: &str) -> bool {
    match &rule.methods {
        Some(methods) => methods.iter().any(|m| m.eq_ignore_ascii_case(method)),
        None => true,
    }
}

fn ip_matches(rule: &BypassRuleConfig, ip: IpAddr) -> bool {
    match &rule.allowed_ips {
        Some(allowed) => allowed.iter().any(|entry| {
            if let Ok(net) = entry.parse::<ipnet::IpNet>() {
                net.contains(&ip)
            } else if let Ok(single) = entry.parse::<IpAddr>() {
                single == ip
            } else {
                false
            }
        }),
        None => true,
    }
}

/// Constant-time: for all rules with `require_api_key=true`, the rule
/// matches iff the provided key equals the configured key (spec.md §8).
fn api_key_matches(rule: &BypassRuleConfig, configured_key: Option<&str>, provided_key: Option<&str>) -> bool {
    if !rule.require_api_key.unwrap_or(false) {
        return true;
    }
    match (configured_key, provided_key) {
        (Some(configured), Some(provided)) => configured.as_bytes().ct_eq(provided.as_bytes()).into(),
        _ => false,
    }
}

fn matches(
    rule: &BypassRuleConfig,
    path: &str,
    method: &str,
    ip: IpAddr,
    configured_key: Option<&str>,
    provided_key: Option<&str>,
) -> bool {
    path_matches(&rule.path, path)
        && method_matches(rule, method)
        && ip_matches(rule, ip)
        && api_key_matches(rule, configured_key, provided_key)
}

pub fn any_matches(
    rules: &[BypassRuleConfig],
    path: &str,
    method: &str,
    ip: IpAddr,
    configured_key: Option<&str>,
    provided_key: Option<&str>,
) -> bool {
    rules.iter().any(|r| matches(r, path, method, ip, configured_key, provided_key))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rule(path: &str) -> BypassRuleConfig {
        BypassRuleConfig {
            path: path.to_string(),
            methods: None,
            require_api_key: None,
            allowed_ips: None,
        }
    }

    #[test]
    fn literal_path_matches_exactly() {
        let r = rule("/api/health");
        assert!(path_matches(&r.path, "/api/health"));
        assert!(!path_matches(&r.path, "/api/health/extra"));
    }

    #[test]
    fn prefix_glob_matches_subpaths() {
        let r = rule("/api/public*");
        assert!(path_matches(&r.path, "/api/public/widgets"));
        assert!(!path_matches(&r.path, "/api/private"));
    }

    #[test]
    fn api_key_rule_requires_exact_match() {
        let mut r = rule("/api/metrics");
        r.require_api_key = Some(true);
        let ip: IpAddr = "127.0.0.1".parse().unwrap();
        assert!(matches(&r, "/api/metrics", "GET", ip, Some("secret"), Some("secret")));
        assert!(!matches(&r, "/api/metrics", "GET", ip, Some("secret"), Some("wrong")));
        assert!(!matches(&r, "/api/metrics", "GET", ip, Some("secret"), None));
    }

    #[test]
    fn allowed_ips_supports_cidr_and_single_address() {
        let mut r = rule("/api/internal*");
        r.allowed_ips = Some(vec!["10.0.0.0/8".into(), "203.0.113.9".into()]);
        assert!(ip_matches(&r, "10.1.2.3".parse().unwrap()));
        assert!(ip_matches(&r, "203.0.113.9".parse().unwrap()));
        assert!(!ip_matches(&r, "203.0.113.10".parse().unwrap()));
    }

    #[test]
    fn method_restriction_is_case_insensitive() {
        let mut r = rule("/api/webhook");
        r.methods = Some(vec!["POST".into()]);
        assert!(method_matches(&r, "post"));
        assert!(!method_matches(&r, "GET"));
    }
}
