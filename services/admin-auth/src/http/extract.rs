//! Request extractors for auth handlers.

use crate::error::AuthError;
use crate::guard::AuthContext;
use crate::models::ClientInfo;
use axum::{
    extract::{ConnectInfo, FromRef, FromRequestParts},
    http::{header::USER_AGENT, request::Parts, HeaderMap},
};
use std::convert::Infallible;
use std::net::SocketAddr;

/// Authenticated identity placed in the request extensions by
/// [`RequireAuthLayer`](super::RequireAuthLayer).
///
/// Handlers behind the layer take it as an argument; outside the layer the
/// extraction fails with `NOT_AUTHENTICATED`.
impl<S> FromRequestParts<S> for AuthContext
where
    S: Send + Sync,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<Self>()
            .cloned()
            .ok_or(AuthError::NotAuthenticated)
    }
}

/// Where [`ClientInfo::ip`] is read from.
///
/// By default only the socket peer counts. Forwarding headers are honoured
/// when the service sits behind a proxy that overwrites them.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ClientAddressPolicy {
    /// Prefer `X-Forwarded-For`, then `X-Real-IP`, over the peer address.
    pub trust_forwarded_headers: bool,
}

/// Origin address and user agent of the caller.
impl<S> FromRequestParts<S> for ClientInfo
where
    ClientAddressPolicy: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let policy = ClientAddressPolicy::from_ref(state);
        let peer = parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| addr.ip().to_string());
        let ip = if policy.trust_forwarded_headers {
            forwarded_ip(&parts.headers).or(peer)
        } else {
            peer
        };

        Ok(Self {
            ip,
            user_agent: parts
                .headers
                .get(USER_AGENT)
                .and_then(|v| v.to_str().ok())
                .map(str::to_owned),
        })
    }
}

/// First hop of `X-Forwarded-For`, then `X-Real-IP`.
fn forwarded_ip(headers: &HeaderMap) -> Option<String> {
    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
    };

    header("x-forwarded-for")
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .or_else(|| header("x-real-ip"))
        .map(str::to_owned)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;

    const TRUSTING: ClientAddressPolicy = ClientAddressPolicy {
        trust_forwarded_headers: true,
    };

    async fn client_info(request: Request<()>, policy: ClientAddressPolicy) -> ClientInfo {
        let (mut parts, ()) = request.into_parts();
        ClientInfo::from_request_parts(&mut parts, &policy).await.unwrap()
    }

    fn peer() -> ConnectInfo<SocketAddr> {
        ConnectInfo(SocketAddr::from(([127, 0, 0, 1], 4000)))
    }

    #[tokio::test]
    async fn forged_headers_are_ignored_by_default() {
        let request = Request::builder()
            .header("x-forwarded-for", "198.51.100.1")
            .header("x-real-ip", "198.51.100.2")
            .header(USER_AGENT, "curl/8")
            .extension(peer())
            .body(())
            .unwrap();

        let info = client_info(request, ClientAddressPolicy::default()).await;
        assert_eq!(info.ip.as_deref(), Some("127.0.0.1"));
        assert_eq!(info.user_agent.as_deref(), Some("curl/8"));

        let request = Request::builder()
            .header("x-forwarded-for", "198.51.100.1")
            .body(())
            .unwrap();
        let info = client_info(request, ClientAddressPolicy::default()).await;
        assert_eq!(info.ip, None);
    }

    #[tokio::test]
    async fn forwarded_header_wins_when_trusted() {
        let request = Request::builder()
            .header("x-forwarded-for", "203.0.113.7, 10.0.0.1")
            .header("x-real-ip", "10.9.9.9")
            .extension(peer())
            .body(())
            .unwrap();

        let info = client_info(request, TRUSTING).await;
        assert_eq!(info.ip.as_deref(), Some("203.0.113.7"));
    }

    #[tokio::test]
    async fn trusted_lookup_falls_back_to_real_ip_then_peer() {
        let request = Request::builder()
            .header("x-real-ip", "10.9.9.9")
            .body(())
            .unwrap();
        assert_eq!(client_info(request, TRUSTING).await.ip.as_deref(), Some("10.9.9.9"));

        let request = Request::builder().extension(peer()).body(()).unwrap();
        assert_eq!(client_info(request, TRUSTING).await.ip.as_deref(), Some("127.0.0.1"));

        let info = client_info(Request::new(()), TRUSTING).await;
        assert_eq!(info, ClientInfo::default());
    }

    #[tokio::test]
    async fn auth_context_requires_the_layer() {
        let (mut parts, ()) = Request::new(()).into_parts();
        let err = AuthContext::from_request_parts(&mut parts, &()).await.unwrap_err();
        assert!(matches!(err, AuthError::NotAuthenticated));
    }
}
