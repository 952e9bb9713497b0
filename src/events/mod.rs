//! Event bus + WebSocket hub (spec.md §4.F). A registry mutex guards client
//! add/remove; publishing itself never blocks on a client — each client has
//! its own bounded `mpsc` channel and a full queue means that client is
//! dropped rather than the producer stalling (spec.md §5 "publishing is
//! lock-free against each client via that client's bounded channel").
//!
//! Grounded on the homeroute handler's `broadcast::Sender<HttpTrafficEvent>`
//! pattern, adapted to per-client bounded channels so one slow admin UI tab
//! can't back-pressure the whole bus.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;
use serde_json::Value;
use tokio::sync::mpsc;

use crate::config::ConfigSnapshot;
use crate::config::snapshot::Observer;
use crate::constants::{EVENT_QUEUE_CAPACITY, LOG_RING_CAPACITY};
use crate::health::HealthRecord;

#[derive(Debug, Clone, Serialize)]
pub struct LogEntry {
    pub timestamp: u64,
    pub level: String,
    pub target: String,
    pub message: String,
}

/// The four event kinds of spec.md §4.F, fanned out to every connected
/// client. Internally tagged so a browser client can switch on `"type"`.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// Snapshot-shaped payload with secrets stripped; built by the caller
    /// (the admin config routes), not reconstructed here.
    ConfigUpdated { config: Value },
    /// Full list of health results, emitted at most once per monitor tick.
    HealthChanged { apps: HashMap<String, HealthRecord> },
    AppHealthChanged { app: String, health: HealthRecord },
    LogEntry { entry: LogEntry },
}

struct Client {
    id: u64,
    tx: mpsc::Sender<Event>,
}

pub struct Hub {
    clients: Mutex<Vec<Client>>,
    next_id: AtomicU64,
    log_ring: Mutex<VecDeque<LogEntry>>,
}

impl Hub {
    pub fn new() -> Self {
        Self {
            clients: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(1),
            log_ring: Mutex::new(VecDeque::with_capacity(LOG_RING_CAPACITY)),
        }
    }

    /// Register a new subscriber (called when a browser opens `/ws`).
    /// Returns its id (for `unregister`) and the receiving half of its
    /// bounded channel.
    pub fn register(&self) -> (u64, mpsc::Receiver<Event>) {
        let (tx, rx) = mpsc::channel(EVENT_QUEUE_CAPACITY);
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        self.clients.lock().unwrap().push(Client { id, tx });
        (id, rx)
    }

    pub fn unregister(&self, id: u64) {
        self.clients.lock().unwrap().retain(|c| c.id != id);
    }

    /// Fan out `event` to every connected client, dropping (unregistering)
    /// any whose queue is full. Synchronous and non-blocking: safe to call
    /// from the health monitor's tick loop or a `tracing::Layer::on_event`.
    pub fn publish(&self, event: Event) {
        if let Event::LogEntry { entry } = &event {
            let mut ring = self.log_ring.lock().unwrap();
            if ring.len() >= LOG_RING_CAPACITY {
                ring.pop_front();
            }
            ring.push_back(entry.clone());
        }

        self.clients.lock().unwrap().retain(|c| c.tx.try_send(event.clone()).is_ok());
    }

    pub fn recent_logs(&self) -> Vec<LogEntry> {
        self.log_ring.lock().unwrap().iter().cloned().collect()
    }

    pub fn client_count(&self) -> usize {
        self.clients.lock().unwrap().len()
    }
}

impl Default for Hub {
    fn default() -> Self {
        Self::new()
    }
}

/// Registered alongside `AuthPlane` so every committed config change fans
/// out a `config_updated` event with secrets already stripped.
impl Observer for Hub {
    fn on_config_change(&self, snapshot: &ConfigSnapshot) {
        self.publish(Event::ConfigUpdated { config: crate::config::redacted_value(snapshot) });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registered_client_receives_published_event() {
        let hub = Hub::new();
        let (_id, mut rx) = hub.register();
        hub.publish(Event::HealthChanged { apps: HashMap::new() });
        assert!(rx.try_recv().is_ok());
    }

    #[test]
    fn full_queue_drops_the_client_instead_of_blocking() {
        let hub = Hub::new();
        let (id, _rx) = hub.register();
        for _ in 0..(EVENT_QUEUE_CAPACITY + 10) {
            hub.publish(Event::HealthChanged { apps: HashMap::new() });
        }
        assert_eq!(hub.client_count(), 0);
        hub.unregister(id);
    }

    #[test]
    fn log_entries_are_retained_in_ring_buffer() {
        let hub = Hub::new();
        hub.publish(Event::LogEntry {
            entry: LogEntry {
                timestamp: 1,
                level: "info".into(),
                target: "test".into(),
                message: "hello".into(),
            },
        });
        assert_eq!(hub.recent_logs().len(), 1);
    }

    #[test]
    fn ring_buffer_is_bounded() {
        let hub = Hub::new();
        for i in 0..(LOG_RING_CAPACITY + 5) {
            hub.publish(Event::LogEntry {
                entry: LogEntry {
                    timestamp: i as u64,
                    level: "info".into(),
                    target: "test".into(),
                    message: "x".into(),
                },
            });
        }
        assert_eq!(hub.recent_logs().len(), LOG_RING_CAPACITY);
    }

    #[test]
    fn unregister_removes_client() {
        let hub = Hub::new();
        let (id, _rx) = hub.register();
        assert_eq!(hub.client_count(), 1);
        hub.unregister(id);
        assert_eq!(hub.client_count(), 0);
    }
}
