//! HTTP error handling with builder pattern for dynamic error responses.

use std::borrow::Cow;
use std::fmt;
use std::time::Duration;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use jiff::Timestamp;
use omnidesk_core::{AuthError, Permission};

use crate::handler::response::ErrorResponse;

/// The error type for HTTP handlers in the server.
///
/// Carries an [`ErrorKind`] plus optional message, context and resource
/// overrides, and the structured metadata (missing permissions, retry
/// and rate-limit windows) that ends up in the response body and headers.
#[derive(Clone)]
#[must_use = "errors do nothing unless serialized"]
pub struct Error<'a> {
    kind: ErrorKind,
    context: Option<Cow<'a, str>>,
    message: Option<Cow<'a, str>>,
    resource: Option<Cow<'a, str>>,
    missing_permissions: Option<Vec<Permission>>,
    retry_after_secs: Option<u64>,
    rate_limit: Option<(u32, Timestamp)>,
}

impl Error<'static> {
    /// Creates a new [`Error`] with the specified kind.
    #[inline]
    pub fn new(kind: ErrorKind) -> Self {
        Self {
            kind,
            context: None,
            message: None,
            resource: None,
            missing_permissions: None,
            retry_after_secs: None,
            rate_limit: None,
        }
    }
}

impl<'a> Error<'a> {
    /// Attaches context information to the error.
    ///
    /// Context is logged server-side and never serialized to the client.
    #[inline]
    pub fn with_context(self, context: impl Into<Cow<'a, str>>) -> Self {
        Self {
            context: Some(context.into()),
            ..self
        }
    }

    /// Sets a custom user-facing message for the error.
    #[inline]
    pub fn with_message(self, message: impl Into<Cow<'a, str>>) -> Self {
        Self {
            message: Some(message.into()),
            ..self
        }
    }

    /// Sets the resource that caused the error.
    #[inline]
    pub fn with_resource(self, resource: impl Into<Cow<'a, str>>) -> Self {
        Self {
            resource: Some(resource.into()),
            ..self
        }
    }

    /// Lists the permissions the caller lacks.
    #[inline]
    pub fn with_missing_permissions(self, missing: Vec<Permission>) -> Self {
        Self {
            missing_permissions: Some(missing),
            ..self
        }
    }

    /// Sets the retry window communicated via `Retry-After`.
    #[inline]
    pub fn with_retry_after(self, retry_after: Duration) -> Self {
        Self {
            retry_after_secs: Some(retry_after.as_secs()),
            ..self
        }
    }

    /// Attaches rate-limit state for the `X-RateLimit-*` headers.
    #[inline]
    pub fn with_rate_limit(self, remaining: u32, reset_at: Timestamp) -> Self {
        Self {
            rate_limit: Some((remaining, reset_at)),
            ..self
        }
    }

    /// Returns the error kind.
    #[inline]
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// Returns the context if present.
    #[inline]
    pub fn context(&self) -> Option<&str> {
        self.context.as_deref()
    }

    /// Returns the custom message if present.
    #[inline]
    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    /// Returns the resource if present.
    #[inline]
    pub fn resource(&self) -> Option<&str> {
        self.resource.as_deref()
    }
}

impl Default for Error<'static> {
    #[inline]
    fn default() -> Self {
        Self::new(ErrorKind::default())
    }
}

impl fmt::Debug for Error<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let response = self.kind.response();

        let mut debug_struct = f.debug_struct("Error");
        debug_struct
            .field("kind", &self.kind)
            .field("name", &response.name)
            .field("status", &response.status);

        if let Some(ref context) = self.context {
            debug_struct.field("context", context);
        }

        if let Some(ref message) = self.message {
            debug_struct.field("message", message);
        }

        if let Some(ref resource) = self.resource {
            debug_struct.field("resource", resource);
        }

        if let Some(ref missing) = self.missing_permissions {
            debug_struct.field("missing_permissions", missing);
        }

        debug_struct.finish()
    }
}

impl fmt::Display for Error<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let response = self.kind.response();
        let message = self.message.as_deref().unwrap_or(&response.message);

        write!(f, "{} ({}): {}", response.name, response.status, message)?;

        if let Some(ref context) = self.context {
            write!(f, " - {}", context)?;
        }

        if let Some(ref resource) = self.resource {
            write!(f, " [resource: {}]", resource)?;
        }

        Ok(())
    }
}

impl std::error::Error for Error<'_> {}

impl IntoResponse for Error<'_> {
    fn into_response(self) -> Response {
        let mut response = self.kind.response();

        if let Some(message) = self.message {
            response = response.with_message(message);
        }

        if let Some(resource) = self.resource {
            response = response.with_resource(resource);
        }

        if let Some(context) = self.context {
            response = response.with_context(context);
        }

        if let Some(missing) = self.missing_permissions {
            response = response.with_missing_permissions(missing);
        }

        if let Some(secs) = self.retry_after_secs {
            response = response.with_retry_after_secs(secs);
        }

        if let Some((remaining, reset_at)) = self.rate_limit {
            response = response.with_rate_limit(remaining, reset_at);
        }

        response.into_response()
    }
}

impl From<ErrorKind> for Error<'static> {
    #[inline]
    fn from(kind: ErrorKind) -> Self {
        Self::new(kind)
    }
}

impl From<AuthError> for Error<'static> {
    fn from(error: AuthError) -> Self {
        match error {
            AuthError::TokenExpired => ErrorKind::ExpiredAuthToken.into_error(),
            AuthError::TokenMalformed => ErrorKind::MalformedAuthToken.into_error(),
            AuthError::TokenRevoked => ErrorKind::RevokedAuthToken.into_error(),
            AuthError::TokenWrongType => ErrorKind::WrongTokenType.into_error(),
            AuthError::SessionExpired => ErrorKind::SessionExpired.into_error(),
            AuthError::PermissionDenied { missing } => ErrorKind::Forbidden
                .into_error()
                .with_missing_permissions(missing),
            AuthError::RateLimitExceeded { remaining, reset_at } => ErrorKind::TooManyRequests
                .into_error()
                .with_rate_limit(remaining, reset_at),
            AuthError::AccountLocked { retry_after } => ErrorKind::AccountLocked
                .into_error()
                .with_retry_after(retry_after),
            AuthError::StoreUnavailable => ErrorKind::ServiceUnavailable.into_error(),
        }
    }
}

/// A specialized [`Result`] type for HTTP operations.
///
/// [`Result`]: std::result::Result
pub type Result<T, E = Error<'static>> = std::result::Result<T, E>;

/// Enumeration of all error kinds the security surface produces.
///
/// Each variant corresponds to one HTTP status code and error name.
#[must_use = "error kinds do nothing unless used to create errors"]
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    // 4xx Client Errors
    /// 400 Bad Request - Invalid request data
    BadRequest,
    /// 401 Unauthorized - Missing authentication token
    MissingAuthToken,
    /// 401 Unauthorized - Malformed or unverifiable authentication token
    MalformedAuthToken,
    /// 401 Unauthorized - Authentication token past its expiry
    ExpiredAuthToken,
    /// 401 Unauthorized - Authentication token was revoked
    RevokedAuthToken,
    /// 401 Unauthorized - Token of the wrong type presented
    WrongTokenType,
    /// 401 Unauthorized - Bound session no longer live
    SessionExpired,
    /// 401 Unauthorized - Invalid credentials
    Unauthorized,
    /// 403 Forbidden - Caller lacks required permissions
    Forbidden,
    /// 404 Not Found - Resource not found
    NotFound,
    /// 429 Too Many Requests - Origin address temporarily blocked
    AccountLocked,
    /// 429 Too Many Requests - Rate limit exceeded
    TooManyRequests,

    // 5xx Server Errors
    /// 500 Internal Server Error - Unexpected server error
    #[default]
    InternalServerError,
    /// 503 Service Unavailable - Security store unreachable
    ServiceUnavailable,
}

impl ErrorKind {
    /// Converts this error kind into a full [`Error`].
    #[inline]
    pub fn into_error(self) -> Error<'static> {
        Error::new(self)
    }

    /// Creates an [`Error`] with the specified context.
    #[inline]
    pub fn with_context<'a>(self, context: impl Into<Cow<'a, str>>) -> Error<'a> {
        Error::new(self).with_context(context)
    }

    /// Creates an [`Error`] with the specified message.
    #[inline]
    pub fn with_message<'a>(self, message: impl Into<Cow<'a, str>>) -> Error<'a> {
        Error::new(self).with_message(message)
    }

    /// Creates an [`Error`] with the specified resource.
    #[inline]
    pub fn with_resource<'a>(self, resource: impl Into<Cow<'a, str>>) -> Error<'a> {
        Error::new(self).with_resource(resource)
    }

    /// Returns the HTTP status code for this error kind.
    #[inline]
    pub fn status_code(self) -> StatusCode {
        self.response().status
    }

    /// Returns the response preset for this error kind.
    #[inline]
    pub fn response(self) -> ErrorResponse<'static> {
        match self {
            Self::BadRequest => ErrorResponse::BAD_REQUEST,
            Self::MissingAuthToken => ErrorResponse::MISSING_AUTH_TOKEN,
            Self::MalformedAuthToken => ErrorResponse::MALFORMED_AUTH_TOKEN,
            Self::ExpiredAuthToken => ErrorResponse::EXPIRED_AUTH_TOKEN,
            Self::RevokedAuthToken => ErrorResponse::REVOKED_AUTH_TOKEN,
            Self::WrongTokenType => ErrorResponse::WRONG_TOKEN_TYPE,
            Self::SessionExpired => ErrorResponse::SESSION_EXPIRED,
            Self::Unauthorized => ErrorResponse::UNAUTHORIZED,
            Self::Forbidden => ErrorResponse::FORBIDDEN,
            Self::NotFound => ErrorResponse::NOT_FOUND,
            Self::AccountLocked => ErrorResponse::ACCOUNT_LOCKED,
            Self::TooManyRequests => ErrorResponse::TOO_MANY_REQUESTS,
            Self::InternalServerError => ErrorResponse::INTERNAL_SERVER_ERROR,
            Self::ServiceUnavailable => ErrorResponse::SERVICE_UNAVAILABLE,
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.response().name.as_ref())
    }
}

impl IntoResponse for ErrorKind {
    #[inline]
    fn into_response(self) -> Response {
        self.response().into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_http_error() {
        let error = Error::default();
        assert_eq!(error.kind(), ErrorKind::InternalServerError);
        let _ = error.into_response();
    }

    #[test]
    fn error_builder_chaining() {
        let error = ErrorKind::Forbidden
            .with_message("Agents cannot close tickets")
            .with_resource("ticket")
            .with_context("role: agent");

        assert_eq!(error.kind(), ErrorKind::Forbidden);
        assert_eq!(error.message(), Some("Agents cannot close tickets"));
        assert_eq!(error.resource(), Some("ticket"));
        assert_eq!(error.context(), Some("role: agent"));
    }

    #[test]
    fn std_fmt_display() {
        let error = ErrorKind::Forbidden
            .with_message("Access denied for this ticket")
            .with_resource("ticket")
            .with_context("user: u-1");

        let display = format!("{}", error);
        assert!(display.contains("forbidden"));
        assert!(display.contains("403"));
        assert!(display.contains("Access denied for this ticket"));
        assert!(display.contains("user: u-1"));
        assert!(display.contains("ticket"));
    }

    #[test]
    fn token_errors_map_to_unauthorized() {
        let cases = [
            (AuthError::TokenExpired, ErrorKind::ExpiredAuthToken),
            (AuthError::TokenMalformed, ErrorKind::MalformedAuthToken),
            (AuthError::TokenRevoked, ErrorKind::RevokedAuthToken),
            (AuthError::TokenWrongType, ErrorKind::WrongTokenType),
            (AuthError::SessionExpired, ErrorKind::SessionExpired),
        ];

        for (auth_error, expected) in cases {
            let error = Error::from(auth_error);
            assert_eq!(error.kind(), expected);
            assert_eq!(error.kind().status_code(), StatusCode::UNAUTHORIZED);
        }
    }

    #[test]
    fn permission_denied_maps_to_forbidden() {
        let error = Error::from(AuthError::PermissionDenied {
            missing: vec![Permission::ManageSystem],
        });
        assert_eq!(error.kind(), ErrorKind::Forbidden);
        assert_eq!(error.kind().status_code(), StatusCode::FORBIDDEN);
    }

    #[test]
    fn throttling_errors_map_to_too_many_requests() {
        let rate_limited = Error::from(AuthError::RateLimitExceeded {
            remaining: 0,
            reset_at: Timestamp::now(),
        });
        assert_eq!(rate_limited.kind(), ErrorKind::TooManyRequests);
        assert_eq!(
            rate_limited.kind().status_code(),
            StatusCode::TOO_MANY_REQUESTS
        );

        let locked = Error::from(AuthError::AccountLocked {
            retry_after: Duration::from_secs(120),
        });
        assert_eq!(locked.kind(), ErrorKind::AccountLocked);
        assert_eq!(locked.kind().status_code(), StatusCode::TOO_MANY_REQUESTS);
    }

    #[test]
    fn store_outage_maps_to_service_unavailable() {
        let error = Error::from(AuthError::StoreUnavailable);
        assert_eq!(error.kind(), ErrorKind::ServiceUnavailable);
        assert_eq!(
            error.kind().status_code(),
            StatusCode::SERVICE_UNAVAILABLE
        );
    }

    #[test]
    fn all_error_kinds_have_responses() {
        let kinds = [
            ErrorKind::BadRequest,
            ErrorKind::MissingAuthToken,
            ErrorKind::MalformedAuthToken,
            ErrorKind::ExpiredAuthToken,
            ErrorKind::RevokedAuthToken,
            ErrorKind::WrongTokenType,
            ErrorKind::SessionExpired,
            ErrorKind::Unauthorized,
            ErrorKind::Forbidden,
            ErrorKind::NotFound,
            ErrorKind::AccountLocked,
            ErrorKind::TooManyRequests,
            ErrorKind::InternalServerError,
            ErrorKind::ServiceUnavailable,
        ];

        for kind in kinds {
            let response = kind.response();
            assert!(!response.name.is_empty());
            assert!(response.status.as_u16() >= 400);
            let _ = kind.into_response();
        }
    }
}
