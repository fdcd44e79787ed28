//! Passwordless administrator authentication.
//!
//! Issues single-use magic links, redeems them into sessions, and guards
//! administrative routes with a resource/action permission model.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod agents;
pub mod bootstrap;
pub mod clock;
pub mod config;
pub mod error;
pub mod guard;
pub mod http;
pub mod models;
pub mod services;
pub mod store;

// Re-export key types for convenience
pub use agents::{CredentialSweeperAgent, SweepExpired, SweepReport};
pub use bootstrap::{connect_store, seed_admins, AuthServices};
pub use clock::{Clock, Entropy, ManualClock, OsEntropy, SystemClock};
pub use config::AdminAuthConfig;
pub use error::{AuthError, AuthResult};
pub use guard::{AuthContext, AuthGuard, Requirement};
pub use http::{router, AppState, RequireAuthLayer};
pub use models::{ClientInfo, MagicLinkToken, Permission, Session, User, UserStatus};
pub use services::{
    EmailSender, MagicLinkIssuer, MagicLinkVerifier, OutboxMailer, PermissionRegistry,
    RateLimiter, SessionResolver, TracingMailer,
};
pub use store::{ClaimOutcome, CredentialStore, MemoryStore, SqliteStore};
