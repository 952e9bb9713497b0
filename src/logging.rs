//! Tracing setup (spec.md ambient stack). Grounded on the teacher's
//! `main.rs` `tracing_subscriber::registry().with(EnvFilter...).with(fmt::layer()).init()`
//! pattern, with one addition that has no teacher analog: a `Layer` that
//! feeds every emitted event into the event bus's `log_entry` stream and
//! ring buffer (spec.md §4.F `log_entry`), so a connected admin UI tab sees
//! the same log lines as the process's own stdout.

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use tracing::field::{Field, Visit};
use tracing::{Event, Subscriber};
use tracing_subscriber::layer::{Context, SubscriberExt};
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

use crate::events::{Event as BusEvent, Hub, LogEntry};

fn now_secs() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap().as_secs()
}

#[derive(Default)]
struct MessageVisitor(String);

impl Visit for MessageVisitor {
    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        if field.name() == "message" {
            self.0 = format!("{value:?}");
        }
    }
}

struct EventBusLayer {
    hub: Arc<Hub>,
}

impl<S: Subscriber> Layer<S> for EventBusLayer {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let mut visitor = MessageVisitor::default();
        event.record(&mut visitor);
        let entry = LogEntry {
            timestamp: now_secs(),
            level: event.metadata().level().to_string(),
            target: event.metadata().target().to_string(),
            message: visitor.0,
        };
        self.hub.publish(BusEvent::LogEntry { entry });
    }
}

/// Installs the global subscriber: `RUST_LOG`-driven filtering (defaulting
/// to `info`), human-readable output on stdout, and the ring-buffer/event
/// bus layer above. Call once, at process start.
pub fn init(hub: Arc<Hub>) {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .with(EventBusLayer { hub })
        .init();
}
