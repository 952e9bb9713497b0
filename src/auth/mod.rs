pub mod bypass;
pub mod forward_auth;
pub mod identity;
pub mod middleware;
pub mod oidc;
pub mod plane;
pub mod ratelimit;
pub mod session;
pub mod snapshot;

pub use identity::Identity;
pub use oidc::OidcClient;
pub use plane::AuthPlane;
pub use ratelimit::LoginRateLimiter;
pub use session::{Session, SessionStore};
pub use snapshot::AuthSnapshot;
