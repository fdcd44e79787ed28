//! Request guard: credential → session → user → permission check.

use crate::error::{AuthError, AuthResult};
use crate::models::{Session, User};
use crate::services::{store_call, PermissionRegistry, SessionResolver};
use crate::store::CredentialStore;
use std::fmt;
use std::sync::Arc;

/// A `(resource, action)` pair a handler demands.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Requirement {
    /// Resource category.
    pub resource: String,
    /// Action on the resource.
    pub action: String,
}

impl Requirement {
    /// Require `action` on `resource`.
    #[must_use]
    pub fn new(resource: impl Into<String>, action: impl Into<String>) -> Self {
        Self {
            resource: resource.into(),
            action: action.into(),
        }
    }
}

impl fmt::Display for Requirement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.resource, self.action)
    }
}

/// Identity attached to an authorized request.
#[derive(Debug, Clone)]
pub struct AuthContext {
    /// Authenticated administrator.
    pub user: User,
    /// Session the request presented.
    pub session: Session,
}

/// Composes session resolution with permission evaluation.
#[derive(Debug, Clone)]
pub struct AuthGuard {
    sessions: SessionResolver,
    registry: Arc<PermissionRegistry>,
    store: Arc<dyn CredentialStore>,
    store_timeout: std::time::Duration,
}

impl AuthGuard {
    /// Create a guard.
    #[must_use]
    pub fn new(
        sessions: SessionResolver,
        registry: Arc<PermissionRegistry>,
        store: Arc<dyn CredentialStore>,
        store_timeout: std::time::Duration,
    ) -> Self {
        Self {
            sessions,
            registry,
            store,
            store_timeout,
        }
    }

    /// Authorize a request carrying `credential`.
    ///
    /// # Errors
    ///
    /// - [`AuthError::NotAuthenticated`] when the credential is absent, unknown,
    ///   expired, or belongs to a missing or inactive administrator
    /// - [`AuthError::Forbidden`] when the role lacks `requirement`
    /// - [`AuthError::Internal`] if the store fails
    pub async fn authorize(
        &self,
        credential: Option<&str>,
        requirement: Option<&Requirement>,
    ) -> AuthResult<AuthContext> {
        let Some(credential) = credential else {
            return Err(AuthError::NotAuthenticated);
        };
        let Some(session) = self.sessions.resolve(credential).await? else {
            tracing::debug!(scope = "auth.guard", "no live session for credential");
            return Err(AuthError::NotAuthenticated);
        };

        let user = store_call(
            self.store_timeout,
            "find_user",
            self.store.find_user(session.user_id),
        )
        .await?;
        let Some(user) = user.filter(User::is_active) else {
            tracing::warn!(
                scope = "auth.guard",
                session_id = %session.session_id,
                user_id = %session.user_id,
                "session owner missing or inactive"
            );
            return Err(AuthError::NotAuthenticated);
        };

        if let Some(requirement) = requirement {
            if !self
                .registry
                .evaluate(&user, &requirement.resource, &requirement.action)
            {
                tracing::warn!(
                    scope = "auth.guard",
                    user_id = %user.id,
                    role = %user.role,
                    requirement = %requirement,
                    "permission denied"
                );
                return Err(AuthError::Forbidden {
                    resource: requirement.resource.clone(),
                    action: requirement.action.clone(),
                });
            }
        }

        Ok(AuthContext { user, session })
    }

    /// Session resolver used by this guard.
    #[must_use]
    pub const fn sessions(&self) -> &SessionResolver {
        &self.sessions
    }

    /// Permission registry used by this guard.
    #[must_use]
    pub fn registry(&self) -> &PermissionRegistry {
        &self.registry
    }
}
