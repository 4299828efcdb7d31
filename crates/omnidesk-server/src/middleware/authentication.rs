//! Authentication middleware for validating request credentials.

use axum::Router;
use axum::extract::Request;
use axum::middleware::{Next, from_fn_with_state};
use axum::response::Response;

use crate::extract::AuthState;
use crate::service::ServiceState;

/// Extension trait for `axum::`[`Router`] to apply authentication middleware.
pub trait RouterAuthExt {
    /// Requires valid authentication for all routes.
    ///
    /// The middleware runs the full gateway chain (lockout, token
    /// verification, session touch) and caches the principal, so
    /// handlers extracting [`AuthState`] pay nothing extra.
    fn with_authentication(self, state: ServiceState) -> Self;
}

impl<S> RouterAuthExt for Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    fn with_authentication(self, state: ServiceState) -> Self {
        self.layer(from_fn_with_state(state, require_authentication))
    }
}

/// Requires a valid authentication token to proceed with the request.
///
/// Extraction failures map to 401/429/503 responses via the extractor's
/// rejection; the resolved principal stays cached in request extensions.
pub async fn require_authentication(
    AuthState(_): AuthState,
    request: Request,
    next: Next,
) -> Response {
    next.run(request).await
}

#[cfg(test)]
mod tests {
    use axum::Router;
    use axum::routing::get;
    use axum_client_ip::ClientIpSource;
    use axum_test::TestServer;
    use omnidesk_core::{Role, SecurityConfig, TokenType};

    use super::RouterAuthExt;
    use crate::service::ServiceState;

    async fn handler() -> &'static str {
        "ok"
    }

    fn test_server(state: ServiceState) -> anyhow::Result<TestServer> {
        let router = Router::new()
            .route("/private", get(handler))
            .with_authentication(state.clone())
            .layer(ClientIpSource::XRealIp.into_extension())
            .with_state(state);
        Ok(TestServer::new(router)?)
    }

    #[tokio::test]
    async fn unauthenticated_requests_are_rejected() -> anyhow::Result<()> {
        let state = ServiceState::in_memory(SecurityConfig::new("middleware-test-secret"));
        let server = test_server(state)?;

        let response = server.get("/private").add_header("x-real-ip", "198.51.100.4").await;
        response.assert_status_unauthorized();
        assert!(response.text().contains("missing_auth_token"));
        Ok(())
    }

    #[tokio::test]
    async fn authenticated_requests_pass_through() -> anyhow::Result<()> {
        let state = ServiceState::in_memory(SecurityConfig::new("middleware-test-secret"));
        let issued = state
            .gateway()
            .tokens()
            .issue("user-1", Some(Role::User), TokenType::Access)?;
        let server = test_server(state)?;

        let response = server
            .get("/private")
            .add_header("authorization", format!("Bearer {}", issued.token))
            .add_header("x-real-ip", "198.51.100.4")
            .await;
        response.assert_status_ok();
        assert_eq!(response.text(), "ok");
        Ok(())
    }

    #[tokio::test]
    async fn blocked_address_gets_retry_after() -> anyhow::Result<()> {
        let state = ServiceState::in_memory(SecurityConfig::new("middleware-test-secret"));
        let ip: std::net::IpAddr = "198.51.100.4".parse()?;
        for _ in 0..5 {
            state.gateway().lockout().record_failure("user-1", ip).await;
        }
        let issued = state
            .gateway()
            .tokens()
            .issue("user-1", Some(Role::User), TokenType::Access)?;
        let server = test_server(state)?;

        let response = server
            .get("/private")
            .add_header("authorization", format!("Bearer {}", issued.token))
            .add_header("x-real-ip", "198.51.100.4")
            .await;
        response.assert_status(axum::http::StatusCode::TOO_MANY_REQUESTS);
        assert!(response.text().contains("account_locked"));
        assert!(response.headers().get("retry-after").is_some());
        Ok(())
    }
}
