//! Credential store: persistence for tokens, sessions and the admin directory.
//!
//! Backends implement [`CredentialStore`]. The one operation with a hard
//! atomicity requirement is [`CredentialStore::claim_token`]: among any number
//! of concurrent callers presenting the same token, at most one observes
//! [`ClaimOutcome::Claimed`].

mod memory;
mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

use crate::models::{MagicLinkToken, Session, User};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::fmt;
use std::future::Future;
use std::time::Duration;
use uuid::Uuid;

/// Result alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Store failures. Always surfaced to callers as an internal error.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Backend-specific failure.
    #[error("backend error: {0}")]
    Backend(String),

    /// Database driver failure.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Operation did not complete within the configured bound.
    #[error("{operation} timed out after {after:?}")]
    Timeout {
        /// Operation that timed out.
        operation: &'static str,
        /// Bound that elapsed.
        after: Duration,
    },

    /// A persisted row could not be decoded.
    #[error("corrupt record: {0}")]
    Corrupt(String),
}

/// Result of an atomic token claim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClaimOutcome {
    /// This caller won; the returned record carries `consumed_at`.
    Claimed(MagicLinkToken),
    /// The token had already been consumed.
    AlreadyUsed,
    /// The token reached its expiry unconsumed.
    Expired,
    /// No token with that digest exists.
    NotFound,
}

/// Counts of records removed by [`CredentialStore::purge_expired`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PurgeReport {
    /// Tokens removed (expired or consumed).
    pub tokens: u64,
    /// Sessions removed (expired).
    pub sessions: u64,
}

/// Persistence contract for the authentication subsystem.
#[async_trait]
pub trait CredentialStore: Send + Sync + fmt::Debug {
    /// Short backend name for logs.
    fn backend(&self) -> &'static str;

    /// Persist a freshly issued token.
    async fn insert_token(&self, token: MagicLinkToken) -> StoreResult<()>;

    /// Read a token without changing it.
    async fn find_token(&self, token_hash: &str) -> StoreResult<Option<MagicLinkToken>>;

    /// Atomically mark a token consumed if it is unconsumed and unexpired.
    ///
    /// Classification order for losers: missing, consumed, expired.
    async fn claim_token(&self, token_hash: &str, now: DateTime<Utc>)
        -> StoreResult<ClaimOutcome>;

    /// Persist a new session.
    async fn insert_session(&self, session: Session) -> StoreResult<()>;

    /// Look up a session by the digest of its client credential.
    async fn find_session(&self, credential_hash: &str) -> StoreResult<Option<Session>>;

    /// Remove a session. Returns whether one existed.
    async fn delete_session(&self, session_id: Uuid) -> StoreResult<bool>;

    /// Look up an administrator by normalized email.
    async fn find_user_by_email(&self, email: &str) -> StoreResult<Option<User>>;

    /// Look up an administrator by id.
    async fn find_user(&self, id: Uuid) -> StoreResult<Option<User>>;

    /// Insert or replace an administrator, keyed by email.
    async fn upsert_user(&self, user: User) -> StoreResult<User>;

    /// Stamp a successful login.
    async fn record_login(&self, user_id: Uuid, at: DateTime<Utc>) -> StoreResult<()>;

    /// Drop expired or consumed tokens and expired sessions.
    async fn purge_expired(&self, now: DateTime<Utc>) -> StoreResult<PurgeReport>;
}

/// Run a store operation under a deadline.
///
/// # Errors
///
/// Returns the operation's own error, or [`StoreError::Timeout`] when the
/// deadline elapses first.
pub async fn within<T, F>(deadline: Duration, operation: &'static str, fut: F) -> StoreResult<T>
where
    F: Future<Output = StoreResult<T>>,
{
    tokio::time::timeout(deadline, fut)
        .await
        .map_err(|_| StoreError::Timeout {
            operation,
            after: deadline,
        })?
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn within_passes_through_results() {
        let ok = within(Duration::from_secs(1), "noop", async { Ok::<_, StoreError>(7) }).await;
        assert_eq!(ok.unwrap(), 7);

        let err = within(Duration::from_secs(1), "noop", async {
            Err::<(), _>(StoreError::Backend("boom".into()))
        })
        .await;
        assert!(matches!(err, Err(StoreError::Backend(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn within_times_out_slow_operations() {
        let result = within(Duration::from_millis(50), "slow", async {
            tokio::time::sleep(Duration::from_secs(10)).await;
            Ok::<_, StoreError>(())
        })
        .await;

        assert!(matches!(
            result,
            Err(StoreError::Timeout {
                operation: "slow",
                ..
            })
        ));
    }
}
