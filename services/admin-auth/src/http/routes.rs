//! HTTP surface: `/auth/login`, `/auth/verify`, `/auth/logout`, `/auth/me`.

use super::cookies::{append_set_cookie, CookieSettings};
use super::extract::ClientAddressPolicy;
use super::middleware::RequireAuthLayer;
use crate::error::{AuthError, AuthResult};
use crate::guard::{AuthContext, AuthGuard};
use crate::models::{ClientInfo, Permission, Session, User};
use crate::services::{MagicLinkIssuer, MagicLinkVerifier, ResourceDescriptor};
use axum::{
    extract::{rejection::JsonRejection, rejection::QueryRejection, FromRef, Query, State},
    http::HeaderMap,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tower_http::trace::TraceLayer;

/// Shared handler state.
#[derive(Clone, Debug)]
pub struct AppState {
    /// Link issuance.
    pub issuer: MagicLinkIssuer,
    /// Link redemption.
    pub verifier: MagicLinkVerifier,
    /// Session and permission guard.
    pub guard: AuthGuard,
    /// Session cookie attributes.
    pub cookies: CookieSettings,
    /// Source of the caller's address.
    pub client_address: ClientAddressPolicy,
}

impl FromRef<AppState> for ClientAddressPolicy {
    fn from_ref(state: &AppState) -> Self {
        state.client_address
    }
}

impl AppState {
    /// Layer requiring a live session, using this state's cookie name.
    #[must_use]
    pub fn require_auth(&self) -> RequireAuthLayer {
        RequireAuthLayer::new(self.guard.clone(), &self.cookies.name)
    }
}

/// Build the auth router.
pub fn router(state: AppState) -> Router {
    let protected = Router::new()
        .route("/auth/logout", post(logout))
        .route("/auth/me", get(me))
        .route_layer(state.require_auth());

    Router::new()
        .route("/auth/login", post(login))
        .route("/auth/verify", get(verify))
        .merge(protected)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[derive(Debug, Deserialize)]
struct LoginRequest {
    email: String,
}

#[derive(Debug, Deserialize)]
struct VerifyParams {
    token: Option<String>,
}

/// `{success: true, message}`
#[derive(Debug, Serialize)]
struct MessageBody {
    success: bool,
    message: &'static str,
}

/// `{success: true, data}`
#[derive(Debug, Serialize)]
struct DataBody<T> {
    success: bool,
    data: T,
}

impl<T> DataBody<T> {
    const fn ok(data: T) -> Self {
        Self {
            success: true,
            data,
        }
    }
}

#[derive(Debug, Serialize)]
struct LoginData {
    token: String,
    user: User,
    session: Session,
}

#[derive(Debug, Serialize)]
struct MeData<'a> {
    user: User,
    session: Session,
    permissions: Vec<Permission>,
    resources: &'a BTreeMap<String, ResourceDescriptor>,
}

async fn login(
    State(state): State<AppState>,
    client: ClientInfo,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> AuthResult<Json<MessageBody>> {
    let Json(request) = payload.map_err(|e| AuthError::InvalidInput(e.body_text()))?;
    let receipt = state
        .issuer
        .request_magic_link(&request.email, &client)
        .await?;
    Ok(Json(MessageBody {
        success: true,
        message: receipt.message,
    }))
}

async fn verify(
    State(state): State<AppState>,
    client: ClientInfo,
    params: Result<Query<VerifyParams>, QueryRejection>,
) -> AuthResult<impl IntoResponse> {
    let Query(params) = params.map_err(|e| AuthError::InvalidInput(e.body_text()))?;
    let token = params
        .token
        .ok_or_else(|| AuthError::InvalidInput("token is required".to_string()))?;

    let outcome = state.verifier.verify_magic_link(&token, &client).await?;

    let mut headers = HeaderMap::new();
    append_set_cookie(&mut headers, &state.cookies.issue(&outcome.credential));
    Ok((
        headers,
        Json(DataBody::ok(LoginData {
            token: outcome.credential,
            user: outcome.user,
            session: outcome.session,
        })),
    ))
}

async fn logout(
    State(state): State<AppState>,
    context: AuthContext,
) -> AuthResult<impl IntoResponse> {
    state
        .guard
        .sessions()
        .logout(context.session.session_id)
        .await?;

    let mut headers = HeaderMap::new();
    append_set_cookie(&mut headers, &state.cookies.clear());
    Ok((
        headers,
        Json(MessageBody {
            success: true,
            message: "Signed out.",
        }),
    ))
}

async fn me(State(state): State<AppState>, context: AuthContext) -> impl IntoResponse {
    let registry = state.guard.registry();
    let permissions = registry.get_user_permissions(&context.user);
    Json(DataBody::ok(MeData {
        user: context.user,
        session: context.session,
        permissions,
        resources: registry.get_available_resources(),
    }))
    .into_response()
}
