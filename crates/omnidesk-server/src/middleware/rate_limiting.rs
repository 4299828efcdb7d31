//! IP-based rate limiting middleware.

use std::sync::Arc;

use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum_client_ip::ClientIp;
use omnidesk_core::{RateLimitKey, SecurityGateway};

use crate::TRACING_TARGET_RATE_LIMITING;
use crate::handler::Error;

/// Rate limits requests by client address with the default per-minute
/// budget.
///
/// Rejected requests are not recorded against the window, so a throttled
/// client recovers as soon as its admitted requests age out.
pub async fn rate_limit_by_ip(
    ClientIp(ip_address): ClientIp,
    State(gateway): State<Arc<SecurityGateway>>,
    request: Request,
    next: Next,
) -> Response {
    let key = RateLimitKey::per_ip("http", ip_address);

    match gateway.rate_limit_default(&key).await {
        Ok(_) => next.run(request).await,
        Err(error) => {
            tracing::debug!(
                target: TRACING_TARGET_RATE_LIMITING,
                %ip_address,
                "request throttled"
            );
            Error::from(error).into_response()
        }
    }
}

/// Rate limits requests by client address with the stricter budget for
/// authentication endpoints.
///
/// Apply to login, token refresh and password reset routes to slow
/// brute-force and credential-stuffing attempts.
pub async fn rate_limit_auth(
    ClientIp(ip_address): ClientIp,
    State(gateway): State<Arc<SecurityGateway>>,
    request: Request,
    next: Next,
) -> Response {
    let key = RateLimitKey::per_ip("auth", ip_address);

    match gateway.rate_limit_auth(&key).await {
        Ok(_) => next.run(request).await,
        Err(error) => {
            tracing::debug!(
                target: TRACING_TARGET_RATE_LIMITING,
                %ip_address,
                "authentication attempt throttled"
            );
            Error::from(error).into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use axum::Router;
    use axum::http::StatusCode;
    use axum::middleware::from_fn_with_state;
    use axum::routing::get;
    use axum_client_ip::ClientIpSource;
    use axum_test::TestServer;
    use omnidesk_core::SecurityConfig;

    use super::rate_limit_auth;
    use crate::service::ServiceState;

    async fn handler() -> &'static str {
        "ok"
    }

    fn test_server(state: ServiceState) -> anyhow::Result<TestServer> {
        let router: Router = Router::new()
            .route("/login", get(handler))
            .layer(from_fn_with_state(state.clone(), rate_limit_auth))
            .layer(ClientIpSource::XRealIp.into_extension())
            .with_state(state);
        Ok(TestServer::new(router)?)
    }

    #[tokio::test]
    async fn throttles_after_the_auth_budget() -> anyhow::Result<()> {
        let mut config = SecurityConfig::new("rate-limit-test-secret");
        config.auth_rate_limit = 2;
        let server = test_server(ServiceState::in_memory(config))?;

        for _ in 0..2 {
            let response = server
                .get("/login")
                .add_header("x-real-ip", "192.0.2.1")
                .await;
            response.assert_status_ok();
        }

        let throttled = server
            .get("/login")
            .add_header("x-real-ip", "192.0.2.1")
            .await;
        throttled.assert_status(StatusCode::TOO_MANY_REQUESTS);
        assert!(throttled.text().contains("too_many_requests"));
        assert_eq!(
            throttled.headers().get("x-ratelimit-remaining").map(|v| v.to_str().unwrap()),
            Some("0")
        );
        assert!(throttled.headers().get("x-ratelimit-reset").is_some());
        assert!(throttled.headers().get("retry-after").is_some());
        Ok(())
    }

    #[tokio::test]
    async fn addresses_are_throttled_independently() -> anyhow::Result<()> {
        let mut config = SecurityConfig::new("rate-limit-test-secret");
        config.auth_rate_limit = 1;
        let server = test_server(ServiceState::in_memory(config))?;

        let first = server
            .get("/login")
            .add_header("x-real-ip", "192.0.2.1")
            .await;
        first.assert_status_ok();

        let throttled = server
            .get("/login")
            .add_header("x-real-ip", "192.0.2.1")
            .await;
        throttled.assert_status(StatusCode::TOO_MANY_REQUESTS);

        // A different client is unaffected.
        let other = server
            .get("/login")
            .add_header("x-real-ip", "192.0.2.2")
            .await;
        other.assert_status_ok();
        Ok(())
    }
}
