//! Authenticated principal extraction.

use std::sync::Arc;

use axum::extract::{FromRef, FromRequestParts, OptionalFromRequestParts};
use axum::http::request::Parts;
use axum_client_ip::ClientIp;
use derive_more::Deref;
use omnidesk_core::{Principal, SecurityGateway};

use crate::TRACING_TARGET_AUTHENTICATION;
use crate::extract::AuthHeader;
use crate::handler::{Error, ErrorKind, Result};

/// Fully authenticated request principal.
///
/// Extraction runs the gateway's inbound chain: lockout check for the
/// client address, token verification and, for session-bound tokens,
/// sliding the session's idle window. The resolved [`Principal`] is
/// cached in the request extensions, so stacking this extractor in a
/// middleware and a handler verifies the token once.
///
/// Requires an `axum_client_ip::ClientIpSource` extension on the router
/// so the client address can be resolved behind proxies.
#[must_use]
#[derive(Debug, Clone, Deref)]
pub struct AuthState(pub Principal);

impl AuthState {
    /// Consumes the extractor and returns the principal.
    #[inline]
    pub fn into_principal(self) -> Principal {
        self.0
    }
}

impl<S> FromRequestParts<S> for AuthState
where
    S: Send + Sync,
    Arc<SecurityGateway>: FromRef<S>,
{
    type Rejection = Error<'static>;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        // Return the cached state if available to avoid re-verification
        if let Some(auth_state) = parts.extensions.get::<Self>() {
            return Ok(auth_state.clone());
        }

        let gateway = Arc::<SecurityGateway>::from_ref(state);
        let auth_header = AuthHeader::from_request_parts(parts, state).await?;

        let ClientIp(origin_ip) = ClientIp::from_request_parts(parts, state)
            .await
            .map_err(|_| {
                tracing::error!(
                    target: TRACING_TARGET_AUTHENTICATION,
                    "client ip source is not configured on the router"
                );
                ErrorKind::InternalServerError
                    .with_context("Client address unavailable")
                    .with_resource("authentication")
            })?;

        let principal = gateway.authenticate(auth_header.token(), origin_ip).await?;

        tracing::debug!(
            target: TRACING_TARGET_AUTHENTICATION,
            user_id = principal.user_id,
            %origin_ip,
            "request authenticated"
        );

        let auth_state = Self(principal);
        // Cache for subsequent extractors in the same request
        parts.extensions.insert(auth_state.clone());
        Ok(auth_state)
    }
}

impl<S> OptionalFromRequestParts<S> for AuthState
where
    S: Send + Sync,
    Arc<SecurityGateway>: FromRef<S>,
{
    type Rejection = Error<'static>;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &S,
    ) -> Result<Option<Self>, Self::Rejection> {
        match <Self as FromRequestParts<S>>::from_request_parts(parts, state).await {
            Ok(auth_state) => Ok(Some(auth_state)),
            Err(error) if error.kind() == ErrorKind::MissingAuthToken => Ok(None),
            Err(error) => Err(error),
        }
    }
}

#[cfg(test)]
mod tests {
    use axum::Router;
    use axum::routing::get;
    use axum_client_ip::ClientIpSource;
    use axum_test::TestServer;
    use omnidesk_core::{Role, SecurityConfig, TokenType};

    use super::AuthState;
    use crate::handler::Result;
    use crate::service::ServiceState;

    async fn whoami(auth_state: AuthState) -> Result<String> {
        Ok(auth_state.user_id.clone())
    }

    async fn whoami_optional(auth_state: Option<AuthState>) -> Result<String> {
        Ok(match auth_state {
            Some(state) => state.into_principal().user_id,
            None => "anonymous".to_owned(),
        })
    }

    fn test_server(state: ServiceState) -> anyhow::Result<TestServer> {
        let router = Router::new()
            .route("/whoami", get(whoami))
            .route("/optional", get(whoami_optional))
            .layer(ClientIpSource::XRealIp.into_extension())
            .with_state(state);
        Ok(TestServer::new(router)?)
    }

    #[tokio::test]
    async fn valid_token_resolves_principal() -> anyhow::Result<()> {
        let state = ServiceState::in_memory(SecurityConfig::new("extract-test-secret"));
        let issued = state
            .gateway()
            .tokens()
            .issue("user-7", Some(Role::Agent), TokenType::Access)?;
        let server = test_server(state)?;

        let response = server
            .get("/whoami")
            .add_header("authorization", format!("Bearer {}", issued.token))
            .add_header("x-real-ip", "203.0.113.9")
            .await;
        response.assert_status_ok();
        assert_eq!(response.text(), "user-7");
        Ok(())
    }

    #[tokio::test]
    async fn garbage_token_is_rejected() -> anyhow::Result<()> {
        let state = ServiceState::in_memory(SecurityConfig::new("extract-test-secret"));
        let server = test_server(state)?;

        let response = server
            .get("/whoami")
            .add_header("authorization", "Bearer not.a.token")
            .add_header("x-real-ip", "203.0.113.9")
            .await;
        response.assert_status_unauthorized();
        assert!(response.text().contains("malformed_auth_token"));
        Ok(())
    }

    #[tokio::test]
    async fn revoked_token_is_rejected() -> anyhow::Result<()> {
        let state = ServiceState::in_memory(SecurityConfig::new("extract-test-secret"));
        let issued = state
            .gateway()
            .tokens()
            .issue("user-7", Some(Role::Agent), TokenType::Access)?;
        state.gateway().tokens().revoke(&issued.token).await?;
        let server = test_server(state)?;

        let response = server
            .get("/whoami")
            .add_header("authorization", format!("Bearer {}", issued.token))
            .add_header("x-real-ip", "203.0.113.9")
            .await;
        response.assert_status_unauthorized();
        assert!(response.text().contains("revoked_auth_token"));
        Ok(())
    }

    #[tokio::test]
    async fn refresh_token_is_the_wrong_type() -> anyhow::Result<()> {
        let state = ServiceState::in_memory(SecurityConfig::new("extract-test-secret"));
        let issued = state
            .gateway()
            .tokens()
            .issue("user-7", Some(Role::Agent), TokenType::Refresh)?;
        let server = test_server(state)?;

        let response = server
            .get("/whoami")
            .add_header("authorization", format!("Bearer {}", issued.token))
            .add_header("x-real-ip", "203.0.113.9")
            .await;
        response.assert_status_unauthorized();
        assert!(response.text().contains("wrong_token_type"));
        Ok(())
    }

    #[tokio::test]
    async fn optional_extraction_allows_anonymous() -> anyhow::Result<()> {
        let state = ServiceState::in_memory(SecurityConfig::new("extract-test-secret"));
        let issued = state
            .gateway()
            .tokens()
            .issue("user-7", Some(Role::User), TokenType::Access)?;
        let server = test_server(state)?;

        let anonymous = server
            .get("/optional")
            .add_header("x-real-ip", "203.0.113.9")
            .await;
        anonymous.assert_status_ok();
        assert_eq!(anonymous.text(), "anonymous");

        // A present but invalid token still fails.
        let garbage = server
            .get("/optional")
            .add_header("authorization", "Bearer not.a.token")
            .add_header("x-real-ip", "203.0.113.9")
            .await;
        garbage.assert_status_unauthorized();

        let authenticated = server
            .get("/optional")
            .add_header("authorization", format!("Bearer {}", issued.token))
            .add_header("x-real-ip", "203.0.113.9")
            .await;
        authenticated.assert_status_ok();
        assert_eq!(authenticated.text(), "user-7");
        Ok(())
    }
}
