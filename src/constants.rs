/// Name of the session cookie set by the builtin and OIDC auth methods.
pub const SESSION_COOKIE_NAME: &str = "muximux_session";

/// Default sliding session lifetime (24h), refreshed on every authenticated request.
pub const DEFAULT_SESSION_MAX_AGE_SECS: u64 = 24 * 60 * 60;

/// Interval between session-store and OIDC-state-store expiry sweeps.
pub const SWEEP_INTERVAL_SECS: u64 = 5 * 60;

/// OIDC pending-state lifetime; a callback arriving after this is rejected with 400.
pub const OIDC_STATE_TTL_SECS: u64 = 10 * 60;

/// Default backend response deadline for proxied (non-WebSocket) requests.
pub const DEFAULT_PROXY_TIMEOUT_SECS: u64 = 30;

/// Default per-app health probe timeout.
pub const DEFAULT_HEALTH_TIMEOUT_SECS: u64 = 5;

/// Default interval between health monitor ticks.
pub const DEFAULT_HEALTH_INTERVAL_SECS: u64 = 60;

/// Maximum redirects the health prober follows.
pub const HEALTH_MAX_REDIRECTS: usize = 3;

/// Login/setup rate limit window and budget: 5 requests per source IP per minute.
pub const LOGIN_RATE_LIMIT_WINDOW_SECS: u64 = 60;
pub const LOGIN_RATE_LIMIT_MAX_ATTEMPTS: u32 = 5;

/// Bound on each event-hub client's outgoing queue; a slower-draining client is dropped.
pub const EVENT_QUEUE_CAPACITY: usize = 64;

/// Capacity of the in-memory log ring buffer surfaced at `/api/logs/recent`.
pub const LOG_RING_CAPACITY: usize = 500;

/// Group names that grant the `admin` role under forward-auth and OIDC, matched
/// case-insensitively after trimming.
pub const ADMIN_GROUP_NAMES: &[&str] = &["admin", "admins", "administrators"];

/// Config keys recognised for safe-mode base-path rewriting in JS/JSON/XML bodies.
pub const BASE_PATH_CONFIG_KEYS: &[&str] = &["urlBase", "baseUrl", "basePath", "apiRoot"];

/// Default OIDC scope when a provider config omits one.
pub const DEFAULT_OIDC_SCOPE: &str = "openid profile email";

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const GIT_HASH: &str = env!("GIT_HASH");
pub const BUILD_TIME: &str = env!("BUILD_TIME");
