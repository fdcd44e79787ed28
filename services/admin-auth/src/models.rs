//! Records owned by the credential store.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Origin metadata captured from the request that triggered an operation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClientInfo {
    /// Remote address, after proxy header resolution.
    pub ip: Option<String>,
    /// `User-Agent` header value.
    pub user_agent: Option<String>,
}

impl ClientInfo {
    /// Set the remote address.
    #[must_use]
    pub fn with_ip(mut self, ip: impl Into<String>) -> Self {
        self.ip = Some(ip.into());
        self
    }

    /// Set the user agent.
    #[must_use]
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = Some(user_agent.into());
        self
    }
}

/// A single-use sign-in token delivered by email.
///
/// Only the digest of the raw token is kept here.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MagicLinkToken {
    /// Digest of the raw token, see [`crate::clock::digest_secret`].
    pub token_hash: String,
    /// Normalized destination address.
    pub email: String,
    /// When the token was minted.
    pub issued_at: DateTime<Utc>,
    /// First instant at which the token is no longer redeemable.
    pub expires_at: DateTime<Utc>,
    /// Set once, by the redemption that wins the claim.
    pub consumed_at: Option<DateTime<Utc>>,
    /// Address that requested the link.
    pub request_ip: Option<String>,
    /// User agent that requested the link.
    pub request_user_agent: Option<String>,
}

impl MagicLinkToken {
    /// True once `now` has reached `expires_at`.
    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    /// True once the token has been redeemed.
    #[must_use]
    pub const fn is_consumed(&self) -> bool {
        self.consumed_at.is_some()
    }
}

/// An authenticated administrator session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    /// Opaque session identifier, unrelated to the client credential.
    pub session_id: Uuid,
    /// Digest of the credential held by the client.
    #[serde(skip_serializing)]
    pub credential_hash: String,
    /// Owning administrator.
    pub user_id: Uuid,
    /// Creation instant.
    pub created_at: DateTime<Utc>,
    /// First instant at which the session is no longer valid.
    pub expires_at: DateTime<Utc>,
    /// Address that redeemed the link.
    pub ip_address: Option<String>,
    /// User agent that redeemed the link.
    pub user_agent: Option<String>,
}

impl Session {
    /// True once `now` has reached `expires_at`.
    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

/// Account state of an administrator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserStatus {
    /// May sign in.
    Active,
    /// Blocked by an operator.
    Suspended,
    /// Created but not yet enabled.
    Invited,
}

impl UserStatus {
    /// Storage representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Suspended => "suspended",
            Self::Invited => "invited",
        }
    }
}

impl fmt::Display for UserStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for UserStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(Self::Active),
            "suspended" => Ok(Self::Suspended),
            "invited" => Ok(Self::Invited),
            other => Err(format!("unknown user status: {other}")),
        }
    }
}

/// An administrator account.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    /// Stable identifier.
    pub id: Uuid,
    /// Normalized email address.
    pub email: String,
    /// Display name.
    pub name: String,
    /// Role name, expanded through the permission registry.
    pub role: String,
    /// Account state.
    pub status: UserStatus,
    /// Last successful redemption.
    pub last_login: Option<DateTime<Utc>>,
    /// Creation instant.
    pub created_at: DateTime<Utc>,
    /// Free-form attributes owned by the user-management layer.
    #[serde(default)]
    pub metadata: serde_json::Value,
}

impl User {
    /// Create an active user.
    #[must_use]
    pub fn new(
        email: impl Into<String>,
        name: impl Into<String>,
        role: impl Into<String>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            email: normalize_email(&email.into()),
            name: name.into(),
            role: role.into(),
            status: UserStatus::Active,
            last_login: None,
            created_at,
            metadata: serde_json::Value::Null,
        }
    }

    /// Override the account state.
    #[must_use]
    pub const fn with_status(mut self, status: UserStatus) -> Self {
        self.status = status;
        self
    }

    /// True when the account may sign in.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.status == UserStatus::Active
    }
}

/// A `(resource, action)` grant.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Permission {
    /// Resource category, e.g. `pages`.
    pub resource: String,
    /// Operation on the resource, e.g. `write`.
    pub action: String,
    /// Human-readable summary.
    pub description: String,
}

impl Permission {
    /// True when this grant is exactly `(resource, action)`.
    #[must_use]
    pub fn matches(&self, resource: &str, action: &str) -> bool {
        self.resource == resource && self.action == action
    }
}

/// Normalize an email for lookup and rate-limit keys.
#[must_use]
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn normalize_email_trims_and_lowercases() {
        assert_eq!(normalize_email("  Admin@Example.COM "), "admin@example.com");
    }

    #[test]
    fn token_expires_at_boundary() {
        let now = Utc::now();
        let token = MagicLinkToken {
            token_hash: "h".into(),
            email: "a@x.com".into(),
            issued_at: now,
            expires_at: now + Duration::minutes(15),
            consumed_at: None,
            request_ip: None,
            request_user_agent: None,
        };
        assert!(!token.is_expired(now + Duration::minutes(14)));
        assert!(token.is_expired(now + Duration::minutes(15)));
        assert!(!token.is_consumed());
    }

    #[test]
    fn user_status_round_trips_through_str() {
        for status in [UserStatus::Active, UserStatus::Suspended, UserStatus::Invited] {
            assert_eq!(status.as_str().parse::<UserStatus>(), Ok(status));
        }
        assert!("deleted".parse::<UserStatus>().is_err());
    }

    #[test]
    fn session_serialization_hides_credential_hash() {
        let now = Utc::now();
        let session = Session {
            session_id: Uuid::new_v4(),
            credential_hash: "secret-digest".into(),
            user_id: Uuid::new_v4(),
            created_at: now,
            expires_at: now + Duration::hours(24),
            ip_address: Some("10.0.0.1".into()),
            user_agent: None,
        };
        let json = serde_json::to_value(&session).unwrap();
        assert!(json.get("credentialHash").is_none());
        assert!(json.get("sessionId").is_some());
        assert_eq!(json["ipAddress"], "10.0.0.1");
    }
}
