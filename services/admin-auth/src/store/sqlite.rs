//! Relational store backed by SQLite through `sqlx`.
//!
//! Timestamps are stored as Unix milliseconds so range predicates compare
//! numerically. The token claim is a single conditional `UPDATE ... RETURNING`;
//! SQLite serializes writers, so only one statement can flip `consumed_at`.

use super::{ClaimOutcome, CredentialStore, PurgeReport, StoreError, StoreResult};
use crate::models::{MagicLinkToken, Session, User, UserStatus};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::Row;
use std::str::FromStr;
use tracing::Instrument;
use uuid::Uuid;

const SCHEMA: [&str; 4] = [
    r"CREATE TABLE IF NOT EXISTS admin_users (
        id TEXT PRIMARY KEY,
        email TEXT NOT NULL UNIQUE,
        name TEXT NOT NULL,
        role TEXT NOT NULL,
        status TEXT NOT NULL,
        last_login INTEGER,
        created_at INTEGER NOT NULL,
        metadata TEXT NOT NULL DEFAULT 'null'
    )",
    r"CREATE TABLE IF NOT EXISTS magic_link_tokens (
        token_hash TEXT PRIMARY KEY,
        email TEXT NOT NULL,
        issued_at INTEGER NOT NULL,
        expires_at INTEGER NOT NULL,
        consumed_at INTEGER,
        request_ip TEXT,
        request_user_agent TEXT
    )",
    r"CREATE TABLE IF NOT EXISTS admin_sessions (
        session_id TEXT PRIMARY KEY,
        credential_hash TEXT NOT NULL UNIQUE,
        user_id TEXT NOT NULL,
        created_at INTEGER NOT NULL,
        expires_at INTEGER NOT NULL,
        ip_address TEXT,
        user_agent TEXT
    )",
    r"CREATE INDEX IF NOT EXISTS idx_admin_sessions_expires ON admin_sessions (expires_at)",
];

const TOKEN_COLUMNS: &str =
    "token_hash, email, issued_at, expires_at, consumed_at, request_ip, request_user_agent";
const SESSION_COLUMNS: &str =
    "session_id, credential_hash, user_id, created_at, expires_at, ip_address, user_agent";
const USER_COLUMNS: &str = "id, email, name, role, status, last_login, created_at, metadata";

/// SQLite-backed [`CredentialStore`].
#[derive(Debug, Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Connect to `url` and create the schema if needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the URL is invalid, the database cannot be opened,
    /// or the schema cannot be created.
    pub async fn connect(url: &str, max_connections: u32) -> StoreResult<Self> {
        let options = SqliteConnectOptions::from_str(url)?.create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections.max(1))
            .connect_with(options)
            .await?;
        Self::from_pool(pool).await
    }

    /// Private in-memory database on a single pinned connection.
    ///
    /// # Errors
    ///
    /// Returns an error if the schema cannot be created.
    pub async fn in_memory() -> StoreResult<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?;
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None::<std::time::Duration>)
            .max_lifetime(None::<std::time::Duration>)
            .connect_with(options)
            .await?;
        Self::from_pool(pool).await
    }

    /// Wrap an existing pool and create the schema if needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the schema cannot be created.
    pub async fn from_pool(pool: SqlitePool) -> StoreResult<Self> {
        for statement in SCHEMA {
            sqlx::query(statement).execute(&pool).await?;
        }
        Ok(Self { pool })
    }
}

fn db_span(operation: &'static str) -> tracing::Span {
    tracing::debug_span!("db.query", db.system = "sqlite", db.operation = operation)
}

fn to_millis(at: DateTime<Utc>) -> i64 {
    at.timestamp_millis()
}

fn from_millis(ms: i64, column: &str) -> StoreResult<DateTime<Utc>> {
    DateTime::from_timestamp_millis(ms)
        .ok_or_else(|| StoreError::Corrupt(format!("{column} out of range: {ms}")))
}

fn from_optional_millis(ms: Option<i64>, column: &str) -> StoreResult<Option<DateTime<Utc>>> {
    ms.map(|ms| from_millis(ms, column)).transpose()
}

fn parse_uuid(value: &str, column: &str) -> StoreResult<Uuid> {
    Uuid::parse_str(value).map_err(|e| StoreError::Corrupt(format!("{column}: {e}")))
}

fn token_from_row(row: &SqliteRow) -> StoreResult<MagicLinkToken> {
    Ok(MagicLinkToken {
        token_hash: row.try_get("token_hash")?,
        email: row.try_get("email")?,
        issued_at: from_millis(row.try_get("issued_at")?, "issued_at")?,
        expires_at: from_millis(row.try_get("expires_at")?, "expires_at")?,
        consumed_at: from_optional_millis(row.try_get("consumed_at")?, "consumed_at")?,
        request_ip: row.try_get("request_ip")?,
        request_user_agent: row.try_get("request_user_agent")?,
    })
}

fn session_from_row(row: &SqliteRow) -> StoreResult<Session> {
    let session_id: String = row.try_get("session_id")?;
    let user_id: String = row.try_get("user_id")?;
    Ok(Session {
        session_id: parse_uuid(&session_id, "session_id")?,
        credential_hash: row.try_get("credential_hash")?,
        user_id: parse_uuid(&user_id, "user_id")?,
        created_at: from_millis(row.try_get("created_at")?, "created_at")?,
        expires_at: from_millis(row.try_get("expires_at")?, "expires_at")?,
        ip_address: row.try_get("ip_address")?,
        user_agent: row.try_get("user_agent")?,
    })
}

fn user_from_row(row: &SqliteRow) -> StoreResult<User> {
    let id: String = row.try_get("id")?;
    let status: String = row.try_get("status")?;
    let metadata: String = row.try_get("metadata")?;
    Ok(User {
        id: parse_uuid(&id, "id")?,
        email: row.try_get("email")?,
        name: row.try_get("name")?,
        role: row.try_get("role")?,
        status: UserStatus::from_str(&status).map_err(StoreError::Corrupt)?,
        last_login: from_optional_millis(row.try_get("last_login")?, "last_login")?,
        created_at: from_millis(row.try_get("created_at")?, "created_at")?,
        metadata: serde_json::from_str(&metadata)
            .map_err(|e| StoreError::Corrupt(format!("metadata: {e}")))?,
    })
}

#[async_trait]
impl CredentialStore for SqliteStore {
    fn backend(&self) -> &'static str {
        "sqlite"
    }

    async fn insert_token(&self, token: MagicLinkToken) -> StoreResult<()> {
        let query = format!("INSERT INTO magic_link_tokens ({TOKEN_COLUMNS}) VALUES (?, ?, ?, ?, ?, ?, ?)");
        sqlx::query(&query)
            .bind(&token.token_hash)
            .bind(&token.email)
            .bind(to_millis(token.issued_at))
            .bind(to_millis(token.expires_at))
            .bind(token.consumed_at.map(to_millis))
            .bind(&token.request_ip)
            .bind(&token.request_user_agent)
            .execute(&self.pool)
            .instrument(db_span("INSERT"))
            .await?;
        Ok(())
    }

    async fn find_token(&self, token_hash: &str) -> StoreResult<Option<MagicLinkToken>> {
        let query = format!("SELECT {TOKEN_COLUMNS} FROM magic_link_tokens WHERE token_hash = ?");
        let row = sqlx::query(&query)
            .bind(token_hash)
            .fetch_optional(&self.pool)
            .instrument(db_span("SELECT"))
            .await?;
        row.as_ref().map(token_from_row).transpose()
    }

    async fn claim_token(
        &self,
        token_hash: &str,
        now: DateTime<Utc>,
    ) -> StoreResult<ClaimOutcome> {
        let now_ms = to_millis(now);
        let query = format!(
            "UPDATE magic_link_tokens SET consumed_at = ? \
             WHERE token_hash = ? AND consumed_at IS NULL AND expires_at > ? \
             RETURNING {TOKEN_COLUMNS}"
        );
        let claimed = sqlx::query(&query)
            .bind(now_ms)
            .bind(token_hash)
            .bind(now_ms)
            .fetch_optional(&self.pool)
            .instrument(db_span("UPDATE"))
            .await?;

        if let Some(row) = claimed {
            return Ok(ClaimOutcome::Claimed(token_from_row(&row)?));
        }

        // Nothing changed; classify why without writing.
        Ok(match self.find_token(token_hash).await? {
            None => ClaimOutcome::NotFound,
            Some(token) if token.is_consumed() => ClaimOutcome::AlreadyUsed,
            Some(_) => ClaimOutcome::Expired,
        })
    }

    async fn insert_session(&self, session: Session) -> StoreResult<()> {
        let query =
            format!("INSERT INTO admin_sessions ({SESSION_COLUMNS}) VALUES (?, ?, ?, ?, ?, ?, ?)");
        sqlx::query(&query)
            .bind(session.session_id.to_string())
            .bind(&session.credential_hash)
            .bind(session.user_id.to_string())
            .bind(to_millis(session.created_at))
            .bind(to_millis(session.expires_at))
            .bind(&session.ip_address)
            .bind(&session.user_agent)
            .execute(&self.pool)
            .instrument(db_span("INSERT"))
            .await?;
        Ok(())
    }

    async fn find_session(&self, credential_hash: &str) -> StoreResult<Option<Session>> {
        let query =
            format!("SELECT {SESSION_COLUMNS} FROM admin_sessions WHERE credential_hash = ?");
        let row = sqlx::query(&query)
            .bind(credential_hash)
            .fetch_optional(&self.pool)
            .instrument(db_span("SELECT"))
            .await?;
        row.as_ref().map(session_from_row).transpose()
    }

    async fn delete_session(&self, session_id: Uuid) -> StoreResult<bool> {
        let result = sqlx::query("DELETE FROM admin_sessions WHERE session_id = ?")
            .bind(session_id.to_string())
            .execute(&self.pool)
            .instrument(db_span("DELETE"))
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn find_user_by_email(&self, email: &str) -> StoreResult<Option<User>> {
        let query = format!("SELECT {USER_COLUMNS} FROM admin_users WHERE email = ?");
        let row = sqlx::query(&query)
            .bind(email)
            .fetch_optional(&self.pool)
            .instrument(db_span("SELECT"))
            .await?;
        row.as_ref().map(user_from_row).transpose()
    }

    async fn find_user(&self, id: Uuid) -> StoreResult<Option<User>> {
        let query = format!("SELECT {USER_COLUMNS} FROM admin_users WHERE id = ?");
        let row = sqlx::query(&query)
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .instrument(db_span("SELECT"))
            .await?;
        row.as_ref().map(user_from_row).transpose()
    }

    async fn upsert_user(&self, user: User) -> StoreResult<User> {
        let metadata = serde_json::to_string(&user.metadata)
            .map_err(|e| StoreError::Corrupt(format!("metadata: {e}")))?;
        let query = format!(
            "INSERT INTO admin_users ({USER_COLUMNS}) VALUES (?, ?, ?, ?, ?, ?, ?, ?) \
             ON CONFLICT (email) DO UPDATE SET \
                name = excluded.name, \
                role = excluded.role, \
                status = excluded.status, \
                metadata = excluded.metadata \
             RETURNING {USER_COLUMNS}"
        );
        let row = sqlx::query(&query)
            .bind(user.id.to_string())
            .bind(&user.email)
            .bind(&user.name)
            .bind(&user.role)
            .bind(user.status.as_str())
            .bind(user.last_login.map(to_millis))
            .bind(to_millis(user.created_at))
            .bind(metadata)
            .fetch_one(&self.pool)
            .instrument(db_span("UPSERT"))
            .await?;
        user_from_row(&row)
    }

    async fn record_login(&self, user_id: Uuid, at: DateTime<Utc>) -> StoreResult<()> {
        sqlx::query("UPDATE admin_users SET last_login = ? WHERE id = ?")
            .bind(to_millis(at))
            .bind(user_id.to_string())
            .execute(&self.pool)
            .instrument(db_span("UPDATE"))
            .await?;
        Ok(())
    }

    async fn purge_expired(&self, now: DateTime<Utc>) -> StoreResult<PurgeReport> {
        let now_ms = to_millis(now);
        let tokens = sqlx::query(
            "DELETE FROM magic_link_tokens WHERE consumed_at IS NOT NULL OR expires_at <= ?",
        )
        .bind(now_ms)
        .execute(&self.pool)
        .instrument(db_span("DELETE"))
        .await?
        .rows_affected();

        let sessions = sqlx::query("DELETE FROM admin_sessions WHERE expires_at <= ?")
            .bind(now_ms)
            .execute(&self.pool)
            .instrument(db_span("DELETE"))
            .await?
            .rows_affected();

        Ok(PurgeReport { tokens, sessions })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use std::sync::Arc;

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 2, 9, 0, 0).unwrap()
    }

    fn token(hash: &str, now: DateTime<Utc>) -> MagicLinkToken {
        MagicLinkToken {
            token_hash: hash.to_string(),
            email: "admin@x.com".to_string(),
            issued_at: now,
            expires_at: now + Duration::minutes(15),
            consumed_at: None,
            request_ip: Some("203.0.113.7".to_string()),
            request_user_agent: None,
        }
    }

    #[tokio::test]
    async fn token_round_trips_and_claims_once() {
        let store = SqliteStore::in_memory().await.unwrap();
        let now = start();
        store.insert_token(token("t1", now)).await.unwrap();

        let loaded = store.find_token("t1").await.unwrap().unwrap();
        assert_eq!(loaded, token("t1", now));

        let outcome = store.claim_token("t1", now + Duration::minutes(1)).await.unwrap();
        let ClaimOutcome::Claimed(claimed) = outcome else {
            panic!("expected the first claim to win");
        };
        assert_eq!(claimed.consumed_at, Some(now + Duration::minutes(1)));

        assert_eq!(
            store.claim_token("t1", now + Duration::minutes(2)).await.unwrap(),
            ClaimOutcome::AlreadyUsed
        );
        assert_eq!(
            store.claim_token("nope", now).await.unwrap(),
            ClaimOutcome::NotFound
        );
    }

    #[tokio::test]
    async fn claim_at_expiry_reports_expired() {
        let store = SqliteStore::in_memory().await.unwrap();
        let now = start();
        store.insert_token(token("t1", now)).await.unwrap();

        assert_eq!(
            store.claim_token("t1", now + Duration::minutes(15)).await.unwrap(),
            ClaimOutcome::Expired
        );
        let untouched = store.find_token("t1").await.unwrap().unwrap();
        assert!(untouched.consumed_at.is_none());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_claims_have_one_winner() {
        let store = Arc::new(SqliteStore::in_memory().await.unwrap());
        let now = start();
        store.insert_token(token("race", now)).await.unwrap();

        let handles: Vec<_> = (0..8)
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
    async fn users_upsert_and_record_login() {
        let store = SqliteStore::in_memory().await.unwrap();
        let now = start();
        let user = store
            .upsert_user(User::new("admin@x.com", "Admin", "admin", now))
            .await
            .unwrap();
        assert_eq!(user.status, UserStatus::Active);

        let again = store
            .upsert_user(
                User::new("admin@x.com", "Admin Two", "editor", now)
                    .with_status(UserStatus::Suspended),
            )
            .await
            .unwrap();
        assert_eq!(again.id, user.id);
        assert_eq!(again.role, "editor");
        assert_eq!(again.status, UserStatus::Suspended);

        store.record_login(user.id, now).await.unwrap();
        let loaded = store.find_user(user.id).await.unwrap().unwrap();
        assert_eq!(loaded.last_login, Some(now));
        assert_eq!(
            store.find_user_by_email("admin@x.com").await.unwrap().map(|u| u.id),
            Some(user.id)
        );
    }

    #[tokio::test]
    async fn sessions_insert_find_delete_and_purge() {
        let store = SqliteStore::in_memory().await.unwrap();
        let now = start();
        let session = Session {
            session_id: Uuid::new_v4(),
            credential_hash: "cred".to_string(),
            user_id: Uuid::new_v4(),
            created_at: now,
            expires_at: now + Duration::hours(24),
            ip_address: Some("203.0.113.7".to_string()),
            user_agent: Some("browser".to_string()),
        };
        store.insert_session(session.clone()).await.unwrap();
        assert_eq!(store.find_session("cred").await.unwrap(), Some(session.clone()));

        let report = store.purge_expired(now + Duration::hours(24)).await.unwrap();
        assert_eq!(report.sessions, 1);
        assert!(store.find_session("cred").await.unwrap().is_none());
        assert!(!store.delete_session(session.session_id).await.unwrap());
    }
}
