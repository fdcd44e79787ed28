//! Authentication middleware.
//!
//! Wraps a handler so it only runs for requests carrying a live session whose
//! role satisfies an optional [`Requirement`]. On success the [`AuthContext`]
//! is inserted into the request extensions; on failure the handler is not
//! called and the error body is returned instead.

use super::cookies::extract_credential;
use crate::guard::{AuthGuard, Requirement};
use axum::{
    body::Body,
    extract::Request,
    response::{IntoResponse, Response},
};
use std::sync::Arc;
use std::task::{Context, Poll};
use tower::{Layer, Service};

/// Layer that guards every route it wraps.
#[derive(Clone, Debug)]
pub struct RequireAuthLayer {
    guard: AuthGuard,
    cookie_name: Arc<str>,
    requirement: Option<Requirement>,
}

impl RequireAuthLayer {
    /// Require a live session, read from `cookie_name` or a bearer header.
    #[must_use]
    pub fn new(guard: AuthGuard, cookie_name: &str) -> Self {
        Self {
            guard,
            cookie_name: Arc::from(cookie_name),
            requirement: None,
        }
    }

    /// Additionally require `requirement` on the session owner's role.
    #[must_use]
    pub fn requiring(mut self, requirement: Requirement) -> Self {
        self.requirement = Some(requirement);
        self
    }
}

impl<S> Layer<S> for RequireAuthLayer {
    type Service = RequireAuth<S>;

    fn layer(&self, inner: S) -> Self::Service {
        RequireAuth {
            inner,
            guard: self.guard.clone(),
            cookie_name: Arc::clone(&self.cookie_name),
            requirement: self.requirement.clone().map(Arc::new),
        }
    }
}

/// Service produced by [`RequireAuthLayer`].
#[derive(Clone, Debug)]
pub struct RequireAuth<S> {
    inner: S,
    guard: AuthGuard,
    cookie_name: Arc<str>,
    requirement: Option<Arc<Requirement>>,
}

impl<S> Service<Request> for RequireAuth<S>
where
    S: Service<Request, Response = Response<Body>> + Clone + Send + 'static,
    S::Future: Send + 'static,
{
    type Response = Response<Body>;
    type Error = S::Error;
    type Future = std::pin::Pin<
        Box<dyn std::future::Future<Output = Result<Self::Response, Self::Error>> + Send>,
    >;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut req: Request) -> Self::Future {
        let guard = self.guard.clone();
        let requirement = self.requirement.clone();
        let credential = extract_credential(req.headers(), &self.cookie_name);
        // The clone that was polled ready is the one that must be called.
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);

        Box::pin(async move {
            match guard
                .authorize(credential.as_deref(), requirement.as_deref())
                .await
            {
                Ok(context) => {
                    req.extensions_mut().insert(context);
                    inner.call(req).await
                }
                Err(err) => Ok(err.into_response()),
            }
        })
    }
}
