//! Axum web boundary.

pub mod cookies;
mod extract;
pub mod middleware;
pub mod routes;

pub use cookies::{CookieSettings, SameSite, SESSION_COOKIE_NAME};
pub use extract::ClientAddressPolicy;
pub use middleware::{RequireAuth, RequireAuthLayer};
pub use routes::{router, AppState};
