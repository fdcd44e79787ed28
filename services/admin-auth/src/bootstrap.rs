//! Startup wiring: store selection, admin seeding, service graph.

use crate::agents::SweepTargets;
use crate::clock::{Clock, Entropy};
use crate::config::{AdminAuthConfig, BootstrapAdmin, StoreBackend, StoreConfig};
use crate::guard::AuthGuard;
use crate::http::AppState;
use crate::models::User;
use crate::services::{
    EmailSender, MagicLinkIssuer, MagicLinkVerifier, PermissionRegistry, RateLimiter,
    RegistryError, SessionResolver,
};
use crate::store::{CredentialStore, MemoryStore, SqliteStore, StoreResult};
use std::sync::Arc;

/// Open the configured store backend.
///
/// # Errors
///
/// Returns error if the database cannot be opened or migrated.
pub async fn connect_store(config: &StoreConfig) -> StoreResult<Arc<dyn CredentialStore>> {
    let store: Arc<dyn CredentialStore> = match config.backend {
        StoreBackend::Memory => Arc::new(MemoryStore::new()),
        StoreBackend::Sqlite => {
            Arc::new(SqliteStore::connect(&config.url, config.max_connections).await?)
        }
    };
    tracing::info!(backend = store.backend(), "credential store ready");
    Ok(store)
}

/// Create or refresh the configured administrators. Returns how many were written.
///
/// Existing accounts keep their id, creation time and last login.
///
/// # Errors
///
/// Returns the first store failure.
pub async fn seed_admins(
    store: &dyn CredentialStore,
    admins: &[BootstrapAdmin],
    clock: &dyn Clock,
) -> StoreResult<usize> {
    for admin in admins {
        let user = store
            .upsert_user(User::new(&admin.email, &admin.name, &admin.role, clock.now()))
            .await?;
        tracing::info!(user_id = %user.id, email = %user.email, role = %user.role, "bootstrap administrator");
    }
    Ok(admins.len())
}

/// The service graph built from configuration.
#[derive(Debug, Clone)]
pub struct AuthServices {
    /// Link issuance.
    pub issuer: MagicLinkIssuer,
    /// Link redemption.
    pub verifier: MagicLinkVerifier,
    /// Request guard.
    pub guard: AuthGuard,
    /// Shared issuance limiter.
    pub limiter: Arc<RateLimiter>,
    /// Backing store.
    pub store: Arc<dyn CredentialStore>,
    /// Time source.
    pub clock: Arc<dyn Clock>,
    store_timeout: std::time::Duration,
}

impl AuthServices {
    /// Wire every service over the given collaborators.
    ///
    /// # Errors
    ///
    /// Returns error if the configured role overrides do not fit the catalog.
    pub fn build(
        config: &AdminAuthConfig,
        store: Arc<dyn CredentialStore>,
        mailer: Arc<dyn EmailSender>,
        clock: Arc<dyn Clock>,
        entropy: Arc<dyn Entropy>,
    ) -> Result<Self, RegistryError> {
        let store_timeout = config.store_timeout();
        let registry = Arc::new(PermissionRegistry::from_config(&config.permissions)?);
        let limiter = Arc::new(RateLimiter::new(config.rate_limiter_config(), clock.clone()));
        let link = config.magic_link_settings();

        let issuer = MagicLinkIssuer::new(
            store.clone(),
            limiter.clone(),
            mailer,
            clock.clone(),
            entropy.clone(),
            link.clone(),
            store_timeout,
        );
        let verifier = MagicLinkVerifier::new(
            store.clone(),
            clock.clone(),
            entropy,
            link,
            config.session_ttl(),
            store_timeout,
        );
        let sessions = SessionResolver::new(store.clone(), clock.clone(), store_timeout);
        let guard = AuthGuard::new(sessions, registry, store.clone(), store_timeout);

        Ok(Self {
            issuer,
            verifier,
            guard,
            limiter,
            store,
            clock,
            store_timeout,
        })
    }

    /// Handler state for the router.
    #[must_use]
    pub fn app_state(&self, config: &AdminAuthConfig) -> AppState {
        AppState {
            issuer: self.issuer.clone(),
            verifier: self.verifier.clone(),
            guard: self.guard.clone(),
            cookies: config.cookie_settings(),
            client_address: config.client_address_policy(),
        }
    }

    /// Inputs for the sweeper agent.
    #[must_use]
    pub fn sweep_targets(&self) -> SweepTargets {
        SweepTargets {
            store: self.store.clone(),
            limiter: self.limiter.clone(),
            clock: self.clock.clone(),
            store_timeout: self.store_timeout,
        }
    }
}
