//! Authentication services: issuance, redemption, sessions, permissions.

pub mod issuer;
pub mod mailer;
pub mod permissions;
pub mod rate_limiter;
pub mod sessions;
pub mod verifier;

pub use issuer::{IssueReceipt, MagicLinkIssuer, MagicLinkSettings, ISSUED_MESSAGE};
pub use mailer::{EmailSender, MagicLinkEmail, MailError, OutboxMailer, TracingMailer};
pub use permissions::{PermissionRegistry, RegistryError, ResourceDescriptor};
pub use rate_limiter::{RateLimiter, RateLimiterConfig, RateLimiterStats};
pub use sessions::SessionResolver;
pub use verifier::{LoginOutcome, MagicLinkVerifier};

use crate::error::{AuthError, AuthResult};
use crate::store::{within, StoreResult};
use std::future::Future;
use std::time::Duration;

/// Run a store operation under the deadline, turning failures into
/// [`AuthError::Internal`].
pub(crate) async fn store_call<T, F>(deadline: Duration, operation: &'static str, fut: F) -> AuthResult<T>
where
    F: Future<Output = StoreResult<T>>,
{
    within(deadline, operation, fut)
        .await
        .map_err(|e| AuthError::internal(operation, e))
}
