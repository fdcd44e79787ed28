//! In-process store for development and tests.

use super::{ClaimOutcome, CredentialStore, PurgeReport, StoreResult};
use crate::models::{MagicLinkToken, Session, User};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::HashMap;
use uuid::Uuid;

#[derive(Debug, Default)]
struct State {
    tokens: HashMap<String, MagicLinkToken>,
    sessions: HashMap<Uuid, Session>,
    sessions_by_credential: HashMap<String, Uuid>,
    users: HashMap<Uuid, User>,
    users_by_email: HashMap<String, Uuid>,
}

/// Mutex-guarded maps. Every operation is one critical section, which is
/// what makes [`CredentialStore::claim_token`] atomic here.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<State>,
}

impl MemoryStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of tokens currently held.
    #[must_use]
    pub fn token_count(&self) -> usize {
        self.state.lock().tokens.len()
    }

    /// Number of sessions currently held.
    #[must_use]
    pub fn session_count(&self) -> usize {
        self.state.lock().sessions.len()
    }
}

#[async_trait]
impl CredentialStore for MemoryStore {
    fn backend(&self) -> &'static str {
        "memory"
    }

    async fn insert_token(&self, token: MagicLinkToken) -> StoreResult<()> {
        self.state
            .lock()
            .tokens
            .insert(token.token_hash.clone(), token);
        Ok(())
    }

    async fn find_token(&self, token_hash: &str) -> StoreResult<Option<MagicLinkToken>> {
        Ok(self.state.lock().tokens.get(token_hash).cloned())
    }

    async fn claim_token(
        &self,
        token_hash: &str,
        now: DateTime<Utc>,
    ) -> StoreResult<ClaimOutcome> {
        let mut state = self.state.lock();
        let Some(token) = state.tokens.get_mut(token_hash) else {
            return Ok(ClaimOutcome::NotFound);
        };
        if token.is_consumed() {
            return Ok(ClaimOutcome::AlreadyUsed);
        }
        if token.is_expired(now) {
            return Ok(ClaimOutcome::Expired);
        }
        token.consumed_at = Some(now);
        Ok(ClaimOutcome::Claimed(token.clone()))
    }

    async fn insert_session(&self, session: Session) -> StoreResult<()> {
        let mut state = self.state.lock();
        state
            .sessions_by_credential
            .insert(session.credential_hash.clone(), session.session_id);
        state.sessions.insert(session.session_id, session);
        Ok(())
    }

    async fn find_session(&self, credential_hash: &str) -> StoreResult<Option<Session>> {
        let state = self.state.lock();
        Ok(state
            .sessions_by_credential
            .get(credential_hash)
            .and_then(|id| state.sessions.get(id))
            .cloned())
    }

    async fn delete_session(&self, session_id: Uuid) -> StoreResult<bool> {
        let mut state = self.state.lock();
        let Some(session) = state.sessions.remove(&session_id) else {
            return Ok(false);
        };
        state.sessions_by_credential.remove(&session.credential_hash);
        Ok(true)
    }

    async fn find_user_by_email(&self, email: &str) -> StoreResult<Option<User>> {
        let state = self.state.lock();
        Ok(state
            .users_by_email
            .get(email)
            .and_then(|id| state.users.get(id))
            .cloned())
    }

    async fn find_user(&self, id: Uuid) -> StoreResult<Option<User>> {
        Ok(self.state.lock().users.get(&id).cloned())
    }

    async fn upsert_user(&self, mut user: User) -> StoreResult<User> {
        let mut state = self.state.lock();
        if let Some(existing) = state
            .users_by_email
            .get(&user.email)
            .and_then(|id| state.users.get(id))
        {
            user.id = existing.id;
            user.created_at = existing.created_at;
            user.last_login = existing.last_login;
        }
        state.users_by_email.insert(user.email.clone(), user.id);
        state.users.insert(user.id, user.clone());
        Ok(user)
    }

    async fn record_login(&self, user_id: Uuid, at: DateTime<Utc>) -> StoreResult<()> {
        if let Some(user) = self.state.lock().users.get_mut(&user_id) {
            user.last_login = Some(at);
        }
        Ok(())
    }

    async fn purge_expired(&self, now: DateTime<Utc>) -> StoreResult<PurgeReport> {
        let mut state = self.state.lock();
        let tokens_before = state.tokens.len();
        state
            .tokens
            .retain(|_, token| !token.is_consumed() && !token.is_expired(now));

        let expired: Vec<Session> = state
            .sessions
            .values()
            .filter(|session| session.is_expired(now))
            .cloned()
            .collect();
        for session in &expired {
            state.sessions.remove(&session.session_id);
            state.sessions_by_credential.remove(&session.credential_hash);
        }

        Ok(PurgeReport {
            tokens: (tokens_before - state.tokens.len()) as u64,
            sessions: expired.len() as u64,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use std::sync::Arc;

    fn token(hash: &str, now: DateTime<Utc>) -> MagicLinkToken {
        MagicLinkToken {
            token_hash: hash.to_string(),
            email: "admin@x.com".to_string(),
            issued_at: now,
            expires_at: now + Duration::minutes(15),
            consumed_at: None,
            request_ip: Some("10.0.0.1".to_string()),
            request_user_agent: Some("test".to_string()),
        }
    }

    fn session(user_id: Uuid, credential_hash: &str, now: DateTime<Utc>) -> Session {
        Session {
            session_id: Uuid::new_v4(),
            credential_hash: credential_hash.to_string(),
            user_id,
            created_at: now,
            expires_at: now + Duration::hours(24),
            ip_address: None,
            user_agent: None,
        }
    }

    #[tokio::test]
    async fn claim_classifies_every_state() {
        let store = MemoryStore::new();
        let now = Utc::now();
        store.insert_token(token("t1", now)).await.unwrap();

        assert_eq!(
            store.claim_token("missing", now).await.unwrap(),
            ClaimOutcome::NotFound
        );

        let claimed = store.claim_token("t1", now).await.unwrap();
        assert!(matches!(claimed, ClaimOutcome::Claimed(ref t) if t.consumed_at == Some(now)));

        assert_eq!(
            store.claim_token("t1", now).await.unwrap(),
            ClaimOutcome::AlreadyUsed
        );

        store.insert_token(token("t2", now)).await.unwrap();
        assert_eq!(
            store
                .claim_token("t2", now + Duration::minutes(15))
                .await
                .unwrap(),
            ClaimOutcome::Expired
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_claims_have_one_winner() {
        let store = Arc::new(MemoryStore::new());
        let now = Utc::now();
        store.insert_token(token("race", now)).await.unwrap();

        let handles: Vec<_> = (0..16)
            .map(|_| {
                let store = Arc::clone(&store);
                tokio::spawn(async move { store.claim_token("race", now).await.unwrap() })
            })
            .collect();

        let mut winners = 0;
        for handle in handles {
            match handle.await.unwrap() {
                ClaimOutcome::Claimed(_) => winners += 1,
                ClaimOutcome::AlreadyUsed => {}
                other => panic!("unexpected outcome: {other:?}"),
            }
        }
        assert_eq!(winners, 1);
    }

    #[tokio::test]
    async fn sessions_are_found_by_credential_and_deleted_by_id() {
        let store = MemoryStore::new();
        let now = Utc::now();
        let s = session(Uuid::new_v4(), "cred", now);
        store.insert_session(s.clone()).await.unwrap();

        assert_eq!(store.find_session("cred").await.unwrap(), Some(s.clone()));
        assert!(store.delete_session(s.session_id).await.unwrap());
        assert!(store.find_session("cred").await.unwrap().is_none());
        assert!(!store.delete_session(s.session_id).await.unwrap());
    }

    #[tokio::test]
    async fn upsert_keeps_identity_for_same_email() {
        let store = MemoryStore::new();
        let now = Utc::now();
        let first = store
            .upsert_user(User::new("admin@x.com", "Admin", "admin", now))
            .await
            .unwrap();
        let second = store
            .upsert_user(User::new("ADMIN@x.com", "Renamed", "editor", now))
            .await
            .unwrap();

        assert_eq!(first.id, second.id);
        let loaded = store.find_user_by_email("admin@x.com").await.unwrap().unwrap();
        assert_eq!(loaded.name, "Renamed");
        assert_eq!(loaded.role, "editor");
    }

    #[tokio::test]
    async fn purge_drops_spent_records() {
        let store = MemoryStore::new();
        let now = Utc::now();
        store.insert_token(token("live", now)).await.unwrap();
        store.insert_token(token("used", now)).await.unwrap();
        store.claim_token("used", now).await.unwrap();
        store
            .insert_token(token("old", now - Duration::hours(1)))
            .await
            .unwrap();

        let user = Uuid::new_v4();
        store.insert_session(session(user, "fresh", now)).await.unwrap();
        store
            .insert_session(session(user, "stale", now - Duration::hours(25)))
            .await
            .unwrap();

        let report = store.purge_expired(now).await.unwrap();
        assert_eq!(report, PurgeReport { tokens: 2, sessions: 1 });
        assert_eq!(store.token_count(), 1);
        assert_eq!(store.session_count(), 1);
        assert!(store.find_session("stale").await.unwrap().is_none());
    }
}
