//! `AuthPlane` bundles the authentication subsystem's live state: the
//! derived [`AuthSnapshot`] (rebuilt on every config commit), the session
//! store, the OIDC client, and the login rate limiter. Registered as a
//! [`crate::config::Observer`] so it refreshes itself the moment a new
//! config snapshot commits, without the router or config store ever
//! holding a back-reference to it (spec.md §9 "cyclic component
//! references... broken by the snapshot pattern").

use std::sync::Arc;

use arc_swap::ArcSwap;

use super::oidc::OidcClient;
use super::ratelimit::LoginRateLimiter;
use super::session::SessionStore;
use super::snapshot::AuthSnapshot;
use crate::config::snapshot::{ConfigSnapshot, Observer};

pub struct AuthPlane {
    snapshot: ArcSwap<AuthSnapshot>,
    pub sessions: SessionStore,
    pub oidc: OidcClient,
    pub rate_limiter: LoginRateLimiter,
}

impl AuthPlane {
    pub fn new(initial: &ConfigSnapshot) -> Self {
        let snapshot = AuthSnapshot::from_config(initial);
        let sessions = SessionStore::new(snapshot.session_max_age_secs);
        Self {
            snapshot: ArcSwap::from(snapshot),
            sessions,
            oidc: OidcClient::new(),
            rate_limiter: LoginRateLimiter::new(),
        }
    }

    pub fn current(&self) -> Arc<AuthSnapshot> {
        self.snapshot.load_full()
    }

    /// Periodic sweep of both the session store and the OIDC pending-state
    /// store; run from the same background loop every
    /// [`crate::constants::SWEEP_INTERVAL_SECS`].
    pub async fn sweep_expired(&self) {
        let sessions_removed = self.sessions.sweep_expired().await;
        let oidc_removed = self.oidc.sweep_expired().await;
        if sessions_removed > 0 || oidc_removed > 0 {
            tracing::debug!(sessions_removed, oidc_removed, "expired auth state swept");
        }
    }
}

impl Observer for AuthPlane {
    fn on_config_change(&self, snapshot: &ConfigSnapshot) {
        let new_auth = AuthSnapshot::from_config(snapshot);
        self.sessions.set_max_age_secs(new_auth.session_max_age_secs);
        self.snapshot.store(new_auth);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::PortalConfig;

    #[test]
    fn on_config_change_replaces_snapshot() {
        let initial: ConfigSnapshot = Arc::new(PortalConfig::default());
        let plane = AuthPlane::new(&initial);

        let mut next = PortalConfig::default();
        next.base_path = "/portal".into();
        plane.on_config_change(&Arc::new(next));

        assert_eq!(plane.current().base_path, "/portal");
    }
}
