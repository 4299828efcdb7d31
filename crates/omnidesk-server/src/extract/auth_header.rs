//! Bearer token extraction from the `Authorization` header.

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum_extra::TypedHeader;
use axum_extra::headers::Authorization;
use axum_extra::headers::authorization::Bearer;
use axum_extra::typed_header::TypedHeaderRejectionReason;

use crate::handler::{Error, ErrorKind, Result};

/// Raw bearer token from the `Authorization` header.
///
/// This extractor only parses the header; it performs no verification.
/// Use [`AuthState`] for the full authentication chain.
///
/// [`AuthState`]: crate::extract::AuthState
#[must_use]
#[derive(Debug, Clone)]
pub struct AuthHeader {
    token: String,
}

impl AuthHeader {
    /// Returns the bearer token.
    #[inline]
    pub fn token(&self) -> &str {
        &self.token
    }

    /// Consumes the extractor and returns the bearer token.
    #[inline]
    pub fn into_token(self) -> String {
        self.token
    }
}

impl<S> FromRequestParts<S> for AuthHeader
where
    S: Send + Sync,
{
    type Rejection = Error<'static>;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        // Return the cached header if available to avoid re-parsing
        if let Some(auth_header) = parts.extensions.get::<Self>() {
            return Ok(auth_header.clone());
        }

        type AuthBearerHeader = TypedHeader<Authorization<Bearer>>;

        match AuthBearerHeader::from_request_parts(parts, state).await {
            Ok(bearer_header) => {
                let auth_header = Self {
                    token: bearer_header.token().to_owned(),
                };
                // Cache for subsequent extractors in the same request
                parts.extensions.insert(auth_header.clone());
                Ok(auth_header)
            }
            Err(rejection) => {
                let error = match rejection.reason() {
                    TypedHeaderRejectionReason::Missing => ErrorKind::MissingAuthToken
                        .with_message("Authentication required")
                        .with_context("Missing Authorization header with Bearer token")
                        .with_resource("authentication"),
                    TypedHeaderRejectionReason::Error(_) => ErrorKind::MalformedAuthToken
                        .with_message("Invalid token format")
                        .with_context("Authorization header must contain a valid Bearer token")
                        .with_resource("authentication"),
                    _ => ErrorKind::InternalServerError
                        .with_context("Unexpected error during header extraction")
                        .with_resource("authentication"),
                };
                Err(error)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use axum::Router;
    use axum::routing::get;
    use axum_test::TestServer;

    use super::AuthHeader;
    use crate::handler::Result;

    async fn handler(auth_header: AuthHeader) -> Result<String> {
        Ok(auth_header.into_token())
    }

    fn test_server() -> anyhow::Result<TestServer> {
        let router: Router = Router::new().route("/", get(handler));
        Ok(TestServer::new(router)?)
    }

    #[tokio::test]
    async fn extracts_bearer_token() -> anyhow::Result<()> {
        let server = test_server()?;

        let response = server
            .get("/")
            .add_header("authorization", "Bearer some-opaque-token")
            .await;
        response.assert_status_ok();
        assert_eq!(response.text(), "some-opaque-token");
        Ok(())
    }

    #[tokio::test]
    async fn missing_header_is_unauthorized() -> anyhow::Result<()> {
        let server = test_server()?;

        let response = server.get("/").await;
        response.assert_status_unauthorized();
        assert!(response.text().contains("missing_auth_token"));
        Ok(())
    }

    #[tokio::test]
    async fn non_bearer_scheme_is_malformed() -> anyhow::Result<()> {
        let server = test_server()?;

        let response = server
            .get("/")
            .add_header("authorization", "Basic dXNlcjpwYXNz")
            .await;
        response.assert_status_unauthorized();
        assert!(response.text().contains("malformed_auth_token"));
        Ok(())
    }
}
