//! Periodic health monitor: one probe per enabled app per tick, fanned out
//! concurrently but bounded by a semaphore sized to the app count so a tick
//! never holds more than one in-flight request per app. Redirects up to
//! `HEALTH_MAX_REDIRECTS` are followed; TLS errors on an app configured with
//! `skip_tls_verify` are swallowed by using a non-verifying client for it.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use dashmap::DashMap;
use reqwest::Client;
use serde::Serialize;
use tokio::sync::Semaphore;

use crate::config::schema::AppConfig;
use crate::constants::{DEFAULT_HEALTH_INTERVAL_SECS, DEFAULT_HEALTH_TIMEOUT_SECS, HEALTH_MAX_REDIRECTS};
use crate::events::{Event, Hub};

fn now_secs() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap().as_secs()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    Healthy,
    Unhealthy,
    Unknown,
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthRecord {
    pub status: Status,
    pub last_checked: u64,
    pub consecutive_failures: u32,
    pub latency_ms: Option<u64>,
    checks_total: u64,
    checks_healthy: u64,
}

impl HealthRecord {
    fn new() -> Self {
        Self {
            status: Status::Unknown,
            last_checked: 0,
            consecutive_failures: 0,
            latency_ms: None,
            checks_total: 0,
            checks_healthy: 0,
        }
    }

    pub fn uptime_percent(&self) -> f64 {
        if self.checks_total == 0 {
            100.0
        } else {
            (self.checks_healthy as f64 / self.checks_total as f64) * 100.0
        }
    }
}

pub struct Monitor {
    verifying: Client,
    non_verifying: Client,
    records: DashMap<String, HealthRecord>,
    events: Arc<Hub>,
}

impl Monitor {
    pub fn new(events: Arc<Hub>) -> Self {
        let timeout = Duration::from_secs(DEFAULT_HEALTH_TIMEOUT_SECS);
        let verifying = Client::builder()
            .timeout(timeout)
            .redirect(reqwest::redirect::Policy::limited(HEALTH_MAX_REDIRECTS))
            .build()
            .expect("failed to build health-check http client");
        let non_verifying = Client::builder()
            .timeout(timeout)
            .redirect(reqwest::redirect::Policy::limited(HEALTH_MAX_REDIRECTS))
            .danger_accept_invalid_certs(true)
            .build()
            .expect("failed to build non-verifying health-check http client");
        Self {
            verifying,
            non_verifying,
            records: DashMap::new(),
            events,
        }
    }

    pub fn snapshot(&self, slug: &str) -> Option<HealthRecord> {
        self.records.get(slug).map(|r| r.clone())
    }

    pub fn all(&self) -> HashMap<String, HealthRecord> {
        self.records.iter().map(|e| (e.key().clone(), e.value().clone())).collect()
    }

    /// Run one tick over `apps`, probing every app with `health_check` set,
    /// regardless of `enabled` (an app can be health-checked without being
    /// routable). Emits `app_health_changed` per transition and a single
    /// batched `health_changed` at the end of the tick if anything changed.
    pub async fn tick(&self, apps: &[AppConfig]) {
        let targets: Vec<&AppConfig> = apps.iter().filter(|a| a.health_check).collect();
        if targets.is_empty() {
            return;
        }

        let semaphore = Arc::new(Semaphore::new(targets.len()));
        let mut handles = Vec::with_capacity(targets.len());

        for app in targets {
            let permit = semaphore.clone().acquire_owned().await.unwrap();
            let client = if app.skip_tls_verify {
                self.non_verifying.clone()
            } else {
                self.verifying.clone()
            };
            let url = app.health_url.clone().unwrap_or_else(|| app.url.clone());
            let slug = app.slug.clone();
            handles.push(tokio::spawn(async move {
                let _permit = permit;
                let started = Instant::now();
                let result = client.get(&url).send().await;
                let latency = started.elapsed();
                (slug, result, latency)
            }));
        }

        let mut changed = false;
        for handle in handles {
            let Ok((slug, result, latency)) = handle.await else {
                continue;
            };
            let healthy = matches!(&result, Ok(resp) if resp.status().is_success());
            let record = {
                let mut entry = self.records.entry(slug.clone()).or_insert_with(HealthRecord::new);
                let previous_status = entry.status;

                entry.last_checked = now_secs();
                entry.latency_ms = Some(latency.as_millis() as u64);
                entry.checks_total += 1;
                if healthy {
                    entry.checks_healthy += 1;
                    entry.consecutive_failures = 0;
                    entry.status = Status::Healthy;
                } else {
                    entry.consecutive_failures += 1;
                    entry.status = Status::Unhealthy;
                }

                (entry.status != previous_status).then(|| entry.clone())
            };

            if let Some(record) = record {
                changed = true;
                self.events.publish(Event::AppHealthChanged { app: slug.clone(), health: record });
            }
        }

        if changed {
            self.events.publish(Event::HealthChanged { apps: self.all() });
        }
    }

    /// Background loop: ticks every `interval_secs`, and drains `trigger`
    /// for off-cycle manual checks (triggered from the admin API).
    pub async fn run(
        self: Arc<Self>,
        config: Arc<crate::config::ConfigStore>,
        interval_secs: u64,
        mut trigger: tokio::sync::mpsc::Receiver<()>,
    ) {
        let interval = Duration::from_secs(interval_secs.max(1));
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.tick(&config.current().apps).await;
                }
                received = trigger.recv() => {
                    if received.is_none() {
                        break;
                    }
                    self.tick(&config.current().apps).await;
                }
            }
        }
    }
}

pub fn default_interval_secs(configured: Option<u64>) -> u64 {
    configured.unwrap_or(DEFAULT_HEALTH_INTERVAL_SECS)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn app(slug: &str, url: &str) -> AppConfig {
        AppConfig {
            name: slug.to_string(),
            slug: slug.to_string(),
            url: url.to_string(),
            health_check: true,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn tick_marks_unreachable_app_unhealthy() {
        let hub = Arc::new(Hub::new());
        let monitor = Monitor::new(hub);
        let apps = vec![app("dead", "http://127.0.0.1:1")];
        monitor.tick(&apps).await;
        let record = monitor.snapshot("dead").unwrap();
        assert_eq!(record.status, Status::Unhealthy);
        assert_eq!(record.consecutive_failures, 1);
    }

    #[tokio::test]
    async fn apps_without_health_check_are_skipped() {
        let hub = Arc::new(Hub::new());
        let monitor = Monitor::new(hub);
        let mut quiet = app("quiet", "http://127.0.0.1:1");
        quiet.health_check = false;
        monitor.tick(&[quiet]).await;
        assert!(monitor.snapshot("quiet").is_none());
    }

    #[test]
    fn uptime_percent_is_100_with_no_checks_yet() {
        let record = HealthRecord::new();
        assert_eq!(record.uptime_percent(), 100.0);
    }
}
