//! The identity [`super::middleware::require_auth`] attaches to a request's
//! extensions, and the extractor handlers use to read it back.

use axum::extract::FromRequestParts;
use axum::http::request::Parts;

use crate::config::schema::Role;
use crate::error::AppError;

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct Identity {
    pub user_id: String,
    pub username: String,
    pub role: Role,
}

/// Extracts the identity attached by `require_auth`. Rejects with 401 if
/// the request was admitted via a bypass rule without ever authenticating.
impl<S> FromRequestParts<S> for Identity
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts.extensions.get::<Identity>().cloned().ok_or(AppError::Unauthenticated)
    }
}

/// Like [`Identity`], but yields `None` instead of rejecting when absent —
/// for handlers (e.g. health-check bypass endpoints) that behave
/// differently when an identity happens to be present versus not.
pub struct MaybeIdentity(pub Option<Identity>);

impl<S> FromRequestParts<S> for MaybeIdentity
where
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(MaybeIdentity(parts.extensions.get::<Identity>().cloned()))
    }
}

/// 401 if unauthenticated, 403 if the identity's role is outside `allowed`
/// (spec.md §4.C `RequireRole`).
pub fn require_role(identity: &Identity, allowed: &[Role]) -> Result<(), AppError> {
    if allowed.contains(&identity.role) {
        Ok(())
    } else {
        Err(AppError::Forbidden)
    }
}

/// `min_role` check for app access (spec.md §3 App "Policy"): the
/// identity's role must be >= the app's minimum, ordered `user < power-user
/// < admin` by the derived `Ord` on [`Role`].
pub fn meets_min_role(identity: &Identity, min_role: Option<Role>) -> bool {
    match min_role {
        Some(min) => identity.role >= min,
        None => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn identity(role: Role) -> Identity {
        Identity {
            user_id: "u1".into(),
            username: "alice".into(),
            role,
        }
    }

    #[test]
    fn require_role_rejects_insufficient_role() {
        let id = identity(Role::User);
        assert!(matches!(require_role(&id, &[Role::Admin]), Err(AppError::Forbidden)));
    }

    #[test]
    fn require_role_allows_listed_role() {
        let id = identity(Role::PowerUser);
        assert!(require_role(&id, &[Role::PowerUser, Role::Admin]).is_ok());
    }

    #[test]
    fn min_role_ordering_admin_satisfies_user_requirement() {
        let id = identity(Role::Admin);
        assert!(meets_min_role(&id, Some(Role::User)));
    }

    #[test]
    fn min_role_ordering_user_fails_admin_requirement() {
        let id = identity(Role::User);
        assert!(!meets_min_role(&id, Some(Role::Admin)));
    }
}
