//! Magic-link redemption and session creation.

use super::issuer::MagicLinkSettings;
use super::store_call;
use crate::clock::{digest_secret, generate_secret, Clock, Entropy};
use crate::error::{AuthError, AuthResult};
use crate::models::{ClientInfo, Session, User};
use crate::store::{ClaimOutcome, CredentialStore};
use chrono::Duration;
use std::sync::Arc;
use uuid::Uuid;

/// Random bytes per session credential.
const CREDENTIAL_BYTES: usize = 32;

/// A successful redemption.
#[derive(Debug, Clone)]
pub struct LoginOutcome {
    /// Opaque value the client presents from now on. Never stored.
    pub credential: String,
    /// Authenticated administrator, with `last_login` updated.
    pub user: User,
    /// New session record.
    pub session: Session,
}

/// Redeems tokens exactly once and mints sessions.
#[derive(Debug, Clone)]
pub struct MagicLinkVerifier {
    store: Arc<dyn CredentialStore>,
    clock: Arc<dyn Clock>,
    entropy: Arc<dyn Entropy>,
    link: MagicLinkSettings,
    session_ttl: Duration,
    store_timeout: std::time::Duration,
}

impl MagicLinkVerifier {
    /// Create a verifier over its collaborators.
    #[must_use]
    pub fn new(
        store: Arc<dyn CredentialStore>,
        clock: Arc<dyn Clock>,
        entropy: Arc<dyn Entropy>,
        link: MagicLinkSettings,
        session_ttl: Duration,
        store_timeout: std::time::Duration,
    ) -> Self {
        Self {
            store,
            clock,
            entropy,
            link,
            session_ttl,
            store_timeout,
        }
    }

    /// Redeem `token` and open a session for its owner.
    ///
    /// # Errors
    ///
    /// - [`AuthError::InvalidInput`] if the token is empty
    /// - [`AuthError::InvalidToken`] if the token is unknown, bound to another
    ///   client, or its owner can no longer sign in
    /// - [`AuthError::AlreadyUsed`] if another redemption won
    /// - [`AuthError::ExpiredToken`] if the token outlived its TTL
    /// - [`AuthError::Internal`] if the store fails
    pub async fn verify_magic_link(
        &self,
        token: &str,
        client: &ClientInfo,
    ) -> AuthResult<LoginOutcome> {
        let token = token.trim();
        if token.is_empty() {
            return Err(AuthError::InvalidInput("token is required".to_string()));
        }
        let token_hash = digest_secret(token);

        if self.link.bind_client {
            self.check_binding(&token_hash, client).await?;
        }

        let now = self.clock.now();
        let claimed = match store_call(
            self.store_timeout,
            "claim_token",
            self.store.claim_token(&token_hash, now),
        )
        .await?
        {
            ClaimOutcome::Claimed(record) => record,
            ClaimOutcome::AlreadyUsed => {
                tracing::warn!(scope = "auth.verify", "redemption of consumed token");
                return Err(AuthError::AlreadyUsed);
            }
            ClaimOutcome::Expired => {
                tracing::info!(scope = "auth.verify", "redemption of expired token");
                return Err(AuthError::ExpiredToken);
            }
            ClaimOutcome::NotFound => {
                tracing::warn!(
                    scope = "auth.verify",
                    ip = client.ip.as_deref().unwrap_or("-"),
                    "redemption of unknown token"
                );
                return Err(AuthError::InvalidToken);
            }
        };

        let user = store_call(
            self.store_timeout,
            "find_user_by_email",
            self.store.find_user_by_email(&claimed.email),
        )
        .await?;
        let Some(mut user) = user.filter(User::is_active) else {
            tracing::warn!(
                scope = "auth.verify",
                email = %claimed.email,
                "token owner missing or inactive"
            );
            return Err(AuthError::InvalidToken);
        };

        let credential = generate_secret(self.entropy.as_ref(), CREDENTIAL_BYTES);
        let session = Session {
            session_id: Uuid::new_v4(),
            credential_hash: digest_secret(&credential),
            user_id: user.id,
            created_at: now,
            expires_at: now + self.session_ttl,
            ip_address: client.ip.clone(),
            user_agent: client.user_agent.clone(),
        };
        store_call(
            self.store_timeout,
            "insert_session",
            self.store.insert_session(session.clone()),
        )
        .await?;
        store_call(
            self.store_timeout,
            "record_login",
            self.store.record_login(user.id, now),
        )
        .await?;
        user.last_login = Some(now);

        tracing::info!(
            scope = "auth.verify",
            user_id = %user.id,
            session_id = %session.session_id,
            "session created"
        );

        Ok(LoginOutcome {
            credential,
            user,
            session,
        })
    }

    /// Compare the redeeming client with the one that requested the link.
    /// Runs before the claim so a mismatch leaves the token usable.
    async fn check_binding(&self, token_hash: &str, client: &ClientInfo) -> AuthResult<()> {
        let record = store_call(
            self.store_timeout,
            "find_token",
            self.store.find_token(token_hash),
        )
        .await?;
        let Some(record) = record else {
            // Unknown tokens are classified by the claim.
            return Ok(());
        };
        if record.request_ip != client.ip || record.request_user_agent != client.user_agent {
            tracing::warn!(
                scope = "auth.verify",
                ip = client.ip.as_deref().unwrap_or("-"),
                "redemption from a different client than issuance"
            );
            return Err(AuthError::InvalidToken);
        }
        Ok(())
    }

    /// Session lifetime.
    #[must_use]
    pub const fn session_ttl(&self) -> Duration {
        self.session_ttl
    }
}
