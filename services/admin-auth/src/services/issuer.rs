//! Magic-link issuance.

use super::mailer::{EmailSender, MagicLinkEmail};
use super::rate_limiter::RateLimiter;
use super::store_call;
use crate::clock::{digest_secret, generate_secret, Clock, Entropy};
use crate::error::{AuthError, AuthResult};
use crate::models::{normalize_email, ClientInfo, MagicLinkToken};
use crate::store::CredentialStore;
use chrono::Duration;
use std::sync::Arc;
use validator::ValidateEmail;

/// Response text for every accepted issuance request, whether or not a link was sent.
pub const ISSUED_MESSAGE: &str =
    "If that address belongs to an administrator, a sign-in link has been sent.";

/// Token lifetime and link shape.
#[derive(Debug, Clone)]
pub struct MagicLinkSettings {
    /// Time from issuance to expiry.
    pub ttl: Duration,
    /// Random bytes per token.
    pub token_bytes: usize,
    /// Absolute URL the token is appended to, e.g. `https://x.com/auth/verify`.
    pub verify_url: String,
    /// Refuse redemptions from a different address or user agent.
    pub bind_client: bool,
}

impl Default for MagicLinkSettings {
    fn default() -> Self {
        Self {
            ttl: Duration::minutes(15),
            token_bytes: 32,
            verify_url: "http://localhost:3000/auth/verify".to_string(),
            bind_client: false,
        }
    }
}

impl MagicLinkSettings {
    /// Link delivered for `token`.
    #[must_use]
    pub fn link_for(&self, token: &str) -> String {
        let separator = if self.verify_url.contains('?') { '&' } else { '?' };
        format!("{}{separator}token={token}", self.verify_url)
    }
}

/// Outcome of an accepted issuance request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssueReceipt {
    /// Uniform message for the caller.
    pub message: &'static str,
}

/// Creates, rate-limits and dispatches sign-in links.
#[derive(Debug, Clone)]
pub struct MagicLinkIssuer {
    store: Arc<dyn CredentialStore>,
    limiter: Arc<RateLimiter>,
    mailer: Arc<dyn EmailSender>,
    clock: Arc<dyn Clock>,
    entropy: Arc<dyn Entropy>,
    settings: MagicLinkSettings,
    store_timeout: std::time::Duration,
}

impl MagicLinkIssuer {
    /// Create an issuer over its collaborators.
    #[must_use]
    pub fn new(
        store: Arc<dyn CredentialStore>,
        limiter: Arc<RateLimiter>,
        mailer: Arc<dyn EmailSender>,
        clock: Arc<dyn Clock>,
        entropy: Arc<dyn Entropy>,
        settings: MagicLinkSettings,
        store_timeout: std::time::Duration,
    ) -> Self {
        Self {
            store,
            limiter,
            mailer,
            clock,
            entropy,
            settings,
            store_timeout,
        }
    }

    /// Issue a sign-in link for `email` if it belongs to an active administrator.
    ///
    /// The answer is identical for unknown, inactive and active addresses.
    ///
    /// # Errors
    ///
    /// - [`AuthError::InvalidEmail`] if the address fails the format check
    /// - [`AuthError::RateLimited`] if the address or origin is over its limit
    /// - [`AuthError::Internal`] if the store fails
    pub async fn request_magic_link(
        &self,
        email: &str,
        client: &ClientInfo,
    ) -> AuthResult<IssueReceipt> {
        let email = normalize_email(email);
        if !email.validate_email() {
            return Err(AuthError::InvalidEmail);
        }

        if !self.admit(&email, client) {
            tracing::warn!(
                scope = "auth.login",
                email = %email,
                ip = client.ip.as_deref().unwrap_or("-"),
                "sign-in request rate limited"
            );
            return Err(AuthError::RateLimited);
        }

        let receipt = IssueReceipt {
            message: ISSUED_MESSAGE,
        };

        let user = store_call(
            self.store_timeout,
            "find_user_by_email",
            self.store.find_user_by_email(&email),
        )
        .await?;
        let Some(user) = user.filter(crate::models::User::is_active) else {
            tracing::info!(scope = "auth.login", email = %email, "no active administrator for address");
            return Ok(receipt);
        };

        let raw = generate_secret(self.entropy.as_ref(), self.settings.token_bytes);
        let issued_at = self.clock.now();
        let token = MagicLinkToken {
            token_hash: digest_secret(&raw),
            email: user.email.clone(),
            issued_at,
            expires_at: issued_at + self.settings.ttl,
            consumed_at: None,
            request_ip: client.ip.clone(),
            request_user_agent: client.user_agent.clone(),
        };
        let expires_at = token.expires_at;

        store_call(self.store_timeout, "insert_token", self.store.insert_token(token)).await?;

        let message = MagicLinkEmail {
            to: user.email.clone(),
            link: self.settings.link_for(&raw),
            expires_at,
        };
        // Response time must not depend on whether the address is registered.
        let mailer = Arc::clone(&self.mailer);
        let user_id = user.id;
        tokio::spawn(async move {
            match mailer.send_magic_link(&message).await {
                Ok(()) => {
                    tracing::info!(scope = "auth.login", user_id = %user_id, "magic link issued");
                }
                Err(e) => {
                    tracing::error!(
                        scope = "auth.login",
                        user_id = %user_id,
                        error = %e,
                        "failed to hand magic link to mailer"
                    );
                }
            }
        });

        Ok(receipt)
    }

    /// Both the address and the origin must have room in their windows; a
    /// refused request charges neither.
    fn admit(&self, email: &str, client: &ClientInfo) -> bool {
        let email_key = RateLimiter::email_key(email);
        match client.ip.as_deref().map(RateLimiter::ip_key) {
            Some(ip_key) => self.limiter.allow_all(&[email_key.as_str(), ip_key.as_str()]),
            None => self.limiter.allow(&email_key),
        }
    }

    /// Active link settings.
    #[must_use]
    pub const fn settings(&self) -> &MagicLinkSettings {
        &self.settings
    }
}
