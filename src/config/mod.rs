pub mod loader;
pub mod redact;
pub mod schema;
pub mod snapshot;

pub use redact::{redact_secrets, redacted_value};
pub use schema::{AppConfig, PortalConfig, Role, slugify};
pub use snapshot::{ConfigSnapshot, ConfigStore, Observer};
