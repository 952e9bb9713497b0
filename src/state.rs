//! Shared application state threaded through every handler via axum's
//! `State` extractor (spec.md §9 "Session store as process-global mutable
//! state -> encapsulated in an owned store object passed to middleware; no
//! singletons"). Mirrors the teacher's `AppState` shape.

use std::sync::Arc;

use reqwest::Client;

use crate::auth::AuthPlane;
use crate::config::ConfigStore;
use crate::events::Hub;
use crate::health::Monitor;

pub struct AppShared {
    pub config: Arc<ConfigStore>,
    pub auth: Arc<AuthPlane>,
    pub health: Arc<Monitor>,
    pub events: Arc<Hub>,
    /// Pooled client for proxied requests to backends with TLS verification on.
    pub proxy_client: Client,
    /// Pooled client for backends configured with `skip_tls_verify` (the default).
    pub proxy_client_insecure: Client,
}

impl AppShared {
    pub fn new(config: Arc<ConfigStore>, auth: Arc<AuthPlane>, health: Arc<Monitor>, events: Arc<Hub>) -> Self {
        let proxy_client = Client::builder().build().expect("failed to build proxy http client");
        let proxy_client_insecure = Client::builder()
            .danger_accept_invalid_certs(true)
            .build()
            .expect("failed to build insecure proxy http client");

        Self {
            config,
            auth,
            health,
            events,
            proxy_client,
            proxy_client_insecure,
        }
    }

    pub fn client_for(&self, skip_tls_verify: bool) -> &Client {
        if skip_tls_verify { &self.proxy_client_insecure } else { &self.proxy_client }
    }
}
