//! Session lookup and revocation.

use super::store_call;
use crate::clock::{digest_secret, Clock};
use crate::error::AuthResult;
use crate::models::Session;
use crate::store::CredentialStore;
use std::sync::Arc;
use uuid::Uuid;

/// Resolves client credentials to live sessions.
///
/// Sessions are never renewed on use; the only early end is [`logout`](Self::logout).
#[derive(Debug, Clone)]
pub struct SessionResolver {
    store: Arc<dyn CredentialStore>,
    clock: Arc<dyn Clock>,
    store_timeout: std::time::Duration,
}

impl SessionResolver {
    /// Create a resolver over the store.
    #[must_use]
    pub fn new(
        store: Arc<dyn CredentialStore>,
        clock: Arc<dyn Clock>,
        store_timeout: std::time::Duration,
    ) -> Self {
        Self {
            store,
            clock,
            store_timeout,
        }
    }

    /// Session for `credential`, or `None` if it is unknown or expired.
    ///
    /// # Errors
    ///
    /// Returns [`crate::AuthError::Internal`] if the store fails.
    pub async fn resolve(&self, credential: &str) -> AuthResult<Option<Session>> {
        if credential.is_empty() {
            return Ok(None);
        }
        let session = store_call(
            self.store_timeout,
            "find_session",
            self.store.find_session(&digest_secret(credential)),
        )
        .await?;

        let now = self.clock.now();
        Ok(session.filter(|session| {
            let live = !session.is_expired(now);
            if !live {
                tracing::debug!(
                    scope = "auth.session",
                    session_id = %session.session_id,
                    "session expired"
                );
            }
            live
        }))
    }

    /// Revoke a session. Returns whether one existed.
    ///
    /// # Errors
    ///
    /// Returns [`crate::AuthError::Internal`] if the store fails.
    pub async fn logout(&self, session_id: Uuid) -> AuthResult<bool> {
        let removed = store_call(
            self.store_timeout,
            "delete_session",
            self.store.delete_session(session_id),
        )
        .await?;
        tracing::info!(scope = "auth.session", session_id = %session_id, removed, "logout");
        Ok(removed)
    }
}
