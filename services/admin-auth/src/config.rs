//! Configuration for the admin auth service.

use crate::http::{ClientAddressPolicy, CookieSettings, SameSite, SESSION_COOKIE_NAME};
use crate::services::{MagicLinkSettings, RateLimiterConfig};
use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::Deserialize;
use std::collections::BTreeMap;

/// Smallest token size accepted, in bytes (128 bits).
const MIN_TOKEN_BYTES: usize = 16;

/// Configuration rejected by [`AdminAuthConfig::validate`].
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    /// A value is out of range.
    #[error("invalid {field}: {reason}")]
    Invalid {
        /// Dotted path of the offending key.
        field: &'static str,
        /// What is wrong with it.
        reason: &'static str,
    },
}

/// Admin auth service configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AdminAuthConfig {
    /// Service configuration.
    pub service: ServiceConfig,
    /// Magic link configuration.
    pub magic_link: MagicLinkConfig,
    /// Session configuration.
    pub session: SessionConfig,
    /// Rate limit configuration.
    pub rate_limit: RateLimitConfig,
    /// Credential store configuration.
    pub store: StoreConfig,
    /// Role grant overrides, `role -> ["resource:action", ...]`.
    pub permissions: BTreeMap<String, Vec<String>>,
    /// Administrators seeded at startup.
    pub bootstrap: Vec<BootstrapAdmin>,
}

/// Service endpoint configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceConfig {
    /// Port to listen on.
    #[serde(default = "default_port")]
    pub port: u16,
    /// Host to bind to.
    #[serde(default = "default_host")]
    pub host: String,
    /// Externally visible origin used to build links.
    #[serde(default = "default_public_url")]
    pub public_url: String,
    /// Take the client address from `X-Forwarded-For` / `X-Real-IP`.
    ///
    /// Only enable behind a reverse proxy that overwrites these headers;
    /// otherwise callers choose their own address.
    #[serde(default)]
    pub trust_forwarded_headers: bool,
}

/// Magic link configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct MagicLinkConfig {
    /// Token TTL in seconds.
    #[serde(default = "default_link_ttl")]
    pub ttl_seconds: u64,
    /// Token length in bytes.
    #[serde(default = "default_token_bytes")]
    pub token_bytes: usize,
    /// Path of the redemption endpoint.
    #[serde(default = "default_verify_path")]
    pub verify_path: String,
    /// Refuse redemption from a different client than issuance.
    #[serde(default)]
    pub bind_client: bool,
}

/// Session configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct SessionConfig {
    /// Session TTL in seconds.
    #[serde(default = "default_session_ttl")]
    pub ttl_seconds: u64,
    /// Cookie carrying the credential.
    #[serde(default = "default_cookie_name")]
    pub cookie_name: String,
    /// Mark the cookie `Secure`.
    #[serde(default = "default_true")]
    pub cookie_secure: bool,
    /// SameSite policy.
    #[serde(default)]
    pub same_site: SameSite,
    /// Cleanup interval in seconds.
    #[serde(default = "default_cleanup_interval")]
    pub cleanup_interval_seconds: u64,
}

/// Rate limit configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct RateLimitConfig {
    /// Whether issuance is rate limited.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Attempts per window, per address and per origin.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Window length in seconds.
    #[serde(default = "default_window")]
    pub window_seconds: u64,
}

/// Store backend selector.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    /// Process memory; lost on restart.
    #[default]
    Memory,
    /// SQLite via sqlx.
    Sqlite,
}

/// Credential store configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    /// Backend to use.
    #[serde(default)]
    pub backend: StoreBackend,
    /// Database URL for relational backends.
    #[serde(default = "default_store_url")]
    pub url: String,
    /// Connection pool size.
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    /// Per-operation timeout in milliseconds.
    #[serde(default = "default_store_timeout")]
    pub timeout_ms: u64,
}

/// An administrator created or refreshed at startup.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct BootstrapAdmin {
    /// Email address.
    pub email: String,
    /// Display name.
    pub name: String,
    /// Role name.
    #[serde(default = "default_bootstrap_role")]
    pub role: String,
}

// Default value functions
const fn default_port() -> u16 {
    3000
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_public_url() -> String {
    "http://localhost:3000".to_string()
}

const fn default_link_ttl() -> u64 {
    900 // 15 minutes
}

const fn default_token_bytes() -> usize {
    32
}

fn default_verify_path() -> String {
    "/auth/verify".to_string()
}

const fn default_session_ttl() -> u64 {
    86400 // 24 hours
}

fn default_cookie_name() -> String {
    SESSION_COOKIE_NAME.to_string()
}

const fn default_true() -> bool {
    true
}

const fn default_cleanup_interval() -> u64 {
    300 // 5 minutes
}

const fn default_max_attempts() -> u32 {
    5
}

const fn default_window() -> u64 {
    900 // 15 minutes
}

fn default_store_url() -> String {
    "sqlite://admin-auth.db".to_string()
}

const fn default_max_connections() -> u32 {
    5
}

const fn default_store_timeout() -> u64 {
    5000
}

fn default_bootstrap_role() -> String {
    "super_admin".to_string()
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            host: default_host(),
            public_url: default_public_url(),
            trust_forwarded_headers: false,
        }
    }
}

impl Default for MagicLinkConfig {
    fn default() -> Self {
        Self {
            ttl_seconds: default_link_ttl(),
            token_bytes: default_token_bytes(),
            verify_path: default_verify_path(),
            bind_client: false,
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            ttl_seconds: default_session_ttl(),
            cookie_name: default_cookie_name(),
            cookie_secure: true,
            same_site: SameSite::Strict,
            cleanup_interval_seconds: default_cleanup_interval(),
        }
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_attempts: default_max_attempts(),
            window_seconds: default_window(),
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::default(),
            url: default_store_url(),
            max_connections: default_max_connections(),
            timeout_ms: default_store_timeout(),
        }
    }
}

/// Saturates at `u32::MAX` seconds so timestamp arithmetic cannot overflow.
fn seconds(value: u64) -> chrono::Duration {
    chrono::Duration::seconds(i64::from(u32::try_from(value).unwrap_or(u32::MAX)))
}

impl AdminAuthConfig {
    /// Load configuration from files and environment.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration cannot be loaded.
    pub fn load() -> Result<Self, Box<figment::Error>> {
        Self::from_figment(
            Figment::new()
                .merge(Toml::file("config/default.toml"))
                .merge(Toml::file("config/local.toml"))
                .merge(Env::prefixed("ADMIN_AUTH_").split("__")),
        )
    }

    /// Extract configuration from an assembled figment.
    ///
    /// # Errors
    ///
    /// Returns an error if a provider fails or a value has the wrong shape.
    pub fn from_figment(figment: Figment) -> Result<Self, Box<figment::Error>> {
        figment.extract().map_err(Box::new)
    }

    /// Reject values the services cannot run with.
    ///
    /// # Errors
    ///
    /// Returns the first offending key.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |field: &'static str, reason: &'static str| {
            Err(ConfigError::Invalid { field, reason })
        };
        if self.magic_link.token_bytes < MIN_TOKEN_BYTES {
            return invalid("magic_link.token_bytes", "must be at least 16");
        }
        if self.magic_link.ttl_seconds == 0 {
            return invalid("magic_link.ttl_seconds", "must be positive");
        }
        if self.session.ttl_seconds == 0 {
            return invalid("session.ttl_seconds", "must be positive");
        }
        if self.session.cleanup_interval_seconds == 0 {
            return invalid("session.cleanup_interval_seconds", "must be positive");
        }
        if self.rate_limit.window_seconds == 0 {
            return invalid("rate_limit.window_seconds", "must be positive");
        }
        if self.rate_limit.max_attempts == 0 {
            return invalid("rate_limit.max_attempts", "must be positive");
        }
        if self.store.timeout_ms == 0 {
            return invalid("store.timeout_ms", "must be positive");
        }
        Ok(())
    }

    /// Settings for the issuer and verifier.
    #[must_use]
    pub fn magic_link_settings(&self) -> MagicLinkSettings {
        MagicLinkSettings {
            ttl: seconds(self.magic_link.ttl_seconds),
            token_bytes: self.magic_link.token_bytes,
            verify_url: format!(
                "{}{}",
                self.service.public_url.trim_end_matches('/'),
                self.magic_link.verify_path
            ),
            bind_client: self.magic_link.bind_client,
        }
    }

    /// Limiter settings.
    #[must_use]
    pub fn rate_limiter_config(&self) -> RateLimiterConfig {
        RateLimiterConfig::new()
            .with_enabled(self.rate_limit.enabled)
            .with_max_attempts(self.rate_limit.max_attempts)
            .with_window(seconds(self.rate_limit.window_seconds))
    }

    /// Session cookie attributes.
    #[must_use]
    pub fn cookie_settings(&self) -> CookieSettings {
        CookieSettings {
            name: self.session.cookie_name.clone(),
            secure: self.session.cookie_secure,
            same_site: self.session.same_site,
            max_age_secs: seconds(self.session.ttl_seconds).num_seconds(),
            ..CookieSettings::default()
        }
    }

    /// Where the client address comes from.
    #[must_use]
    pub const fn client_address_policy(&self) -> ClientAddressPolicy {
        ClientAddressPolicy {
            trust_forwarded_headers: self.service.trust_forwarded_headers,
        }
    }

    /// Session lifetime.
    #[must_use]
    pub fn session_ttl(&self) -> chrono::Duration {
        seconds(self.session.ttl_seconds)
    }

    /// Per-operation store deadline.
    #[must_use]
    pub const fn store_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.store.timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AdminAuthConfig::default();
        assert_eq!(config.service.port, 3000);
        assert_eq!(config.magic_link.ttl_seconds, 900);
        assert_eq!(config.magic_link.token_bytes, 32);
        assert_eq!(config.session.ttl_seconds, 86400);
        assert_eq!(config.session.cookie_name, "admin_session");
        assert_eq!(config.rate_limit.max_attempts, 5);
        assert_eq!(config.store.backend, StoreBackend::Memory);
        assert!(!config.client_address_policy().trust_forwarded_headers);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn toml_overrides_defaults() {
        let toml = r#"
            [service]
            public_url = "https://example.com/"
            trust_forwarded_headers = true

            [session]
            same_site = "lax"
            cookie_secure = false

            [store]
            backend = "sqlite"
            url = "sqlite::memory:"

            [permissions]
            editor = ["pages:read"]

            [[bootstrap]]
            email = "owner@example.com"
            name = "Owner"
        "#;
        let config = AdminAuthConfig::from_figment(Figment::from(Toml::string(toml))).unwrap();

        assert_eq!(config.session.same_site, SameSite::Lax);
        assert!(!config.session.cookie_secure);
        assert_eq!(config.session.ttl_seconds, 86400);
        assert_eq!(config.store.backend, StoreBackend::Sqlite);
        assert_eq!(config.permissions["editor"], vec!["pages:read"]);
        assert_eq!(config.bootstrap[0].role, "super_admin");
        assert_eq!(
            config.magic_link_settings().verify_url,
            "https://example.com/auth/verify"
        );
        assert_eq!(config.cookie_settings().max_age_secs, 86400);
        assert!(config.client_address_policy().trust_forwarded_headers);
    }

    #[test]
    fn validate_rejects_weak_tokens_and_zero_windows() {
        let mut config = AdminAuthConfig::default();
        config.magic_link.token_bytes = 8;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Invalid { field: "magic_link.token_bytes", .. })
        ));

        let mut config = AdminAuthConfig::default();
        config.rate_limit.window_seconds = 0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Invalid { field: "rate_limit.window_seconds", .. })
        ));
    }
}
