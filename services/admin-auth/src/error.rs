//! Error taxonomy surfaced by every auth operation.
//!
//! Business-rule failures are ordinary values of [`AuthError`]. Only store
//! failures become [`AuthError::Internal`], which is logged where it is raised
//! and rendered without detail.

use crate::store::StoreError;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

/// Result alias for auth operations.
pub type AuthResult<T> = Result<T, AuthError>;

/// Failure kinds of the authentication subsystem.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    /// Malformed request body or parameters.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Address failed the format check.
    #[error("invalid email address")]
    InvalidEmail,

    /// Unknown or unusable token.
    #[error("invalid token")]
    InvalidToken,

    /// Token reached its expiry before redemption.
    #[error("token expired")]
    ExpiredToken,

    /// Token was already redeemed.
    #[error("token already used")]
    AlreadyUsed,

    /// Too many attempts for this address or origin.
    #[error("rate limited")]
    RateLimited,

    /// No valid session was presented.
    #[error("not authenticated")]
    NotAuthenticated,

    /// Authenticated, but the role lacks the grant.
    #[error("forbidden: {resource}:{action}")]
    Forbidden {
        /// Resource that was requested.
        resource: String,
        /// Action that was requested.
        action: String,
    },

    /// Store or IO failure.
    #[error("internal error during {operation}")]
    Internal {
        /// Operation that failed.
        operation: &'static str,
        /// Underlying store failure.
        #[source]
        source: StoreError,
    },
}

impl AuthError {
    /// Wrap a store failure, logging it with full context.
    #[must_use]
    pub fn internal(operation: &'static str, source: StoreError) -> Self {
        tracing::error!(scope = "auth.store", operation, error = %source, "credential store failure");
        Self::Internal { operation, source }
    }

    /// Stable machine-readable code.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::InvalidInput(_) => "INVALID_INPUT",
            Self::InvalidEmail => "INVALID_EMAIL",
            Self::InvalidToken => "INVALID_TOKEN",
            Self::ExpiredToken => "EXPIRED_TOKEN",
            Self::AlreadyUsed => "ALREADY_USED",
            Self::RateLimited => "RATE_LIMITED",
            Self::NotAuthenticated => "NOT_AUTHENTICATED",
            Self::Forbidden { .. } => "FORBIDDEN",
            Self::Internal { .. } => "INTERNAL_ERROR",
        }
    }

    /// HTTP status for the web boundary.
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        match self {
            Self::InvalidInput(_)
            | Self::InvalidEmail
            | Self::InvalidToken
            | Self::ExpiredToken
            | Self::AlreadyUsed => StatusCode::BAD_REQUEST,
            Self::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            Self::NotAuthenticated => StatusCode::UNAUTHORIZED,
            Self::Forbidden { .. } => StatusCode::FORBIDDEN,
            Self::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Human-readable message safe to show to the caller.
    #[must_use]
    pub fn message(&self) -> String {
        match self {
            Self::InvalidInput(detail) => format!("Invalid request: {detail}"),
            Self::InvalidEmail => "Please provide a valid email address.".to_string(),
            Self::InvalidToken => "This sign-in link is not valid.".to_string(),
            Self::ExpiredToken => {
                "This sign-in link has expired. Please request a new one.".to_string()
            }
            Self::AlreadyUsed => {
                "This sign-in link has already been used. Please request a new one.".to_string()
            }
            Self::RateLimited => {
                "Too many sign-in attempts. Please wait a few minutes and try again.".to_string()
            }
            Self::NotAuthenticated => "Authentication required.".to_string(),
            Self::Forbidden { .. } => {
                "You do not have permission to perform this action.".to_string()
            }
            Self::Internal { .. } => "An internal error occurred.".to_string(),
        }
    }
}

/// Failure body: `{success: false, error, message}`.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    /// Always false.
    pub success: bool,
    /// Stable code, see [`AuthError::code`].
    pub error: &'static str,
    /// Human-readable message.
    pub message: String,
}

impl From<&AuthError> for ErrorBody {
    fn from(err: &AuthError) -> Self {
        Self {
            success: false,
            error: err.code(),
            message: err.message(),
        }
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        (self.status(), Json(ErrorBody::from(&self))).into_response()
    }
}
