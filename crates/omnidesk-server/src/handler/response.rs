//! Serialized error bodies with security-conscious defaults.

use std::borrow::Cow;

use axum::Json;
use axum::http::header::{HeaderName, HeaderValue, RETRY_AFTER};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use jiff::Timestamp;
use omnidesk_core::Permission;
use serde::Serialize;

const X_RATE_LIMIT_REMAINING: HeaderName = HeaderName::from_static("x-ratelimit-remaining");
const X_RATE_LIMIT_RESET: HeaderName = HeaderName::from_static("x-ratelimit-reset");

/// HTTP error response representation.
///
/// Contains the error name, a client-safe message and the structured
/// metadata serialized into the JSON body. Internal context and the
/// status code are logged but never serialized.
#[must_use = "error responses do nothing unless serialized"]
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorResponse<'a> {
    /// The error name/type identifier
    pub name: Cow<'a, str>,
    /// User-facing error message safe for client display
    pub message: Cow<'a, str>,
    /// The resource that the error relates to (optional, set by handler)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resource: Option<Cow<'a, str>>,
    /// Permissions the caller lacks, for 403 responses
    #[serde(skip_serializing_if = "Option::is_none")]
    pub missing_permissions: Option<Vec<Permission>>,
    /// Seconds until the caller may retry, for lockout responses
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after_secs: Option<u64>,
    /// Requests left in the current window, for rate-limit responses
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remaining: Option<u32>,
    /// When the rate-limit window resets
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reset_at: Option<Timestamp>,

    /// Internal context for debugging (not exposed to the client)
    #[serde(skip)]
    pub context: Option<Cow<'a, str>>,
    /// HTTP status code (not serialized in JSON)
    #[serde(skip)]
    pub status: StatusCode,
}

impl<'a> ErrorResponse<'a> {
    // 4xx Client Errors
    pub const ACCOUNT_LOCKED: Self = Self::new(
        "account_locked",
        "Too many failed attempts, try again later.",
        StatusCode::TOO_MANY_REQUESTS,
    );
    pub const BAD_REQUEST: Self = Self::new(
        "bad_request",
        "Invalid request data.",
        StatusCode::BAD_REQUEST,
    );
    pub const EXPIRED_AUTH_TOKEN: Self = Self::new(
        "expired_auth_token",
        "Auth token expired.",
        StatusCode::UNAUTHORIZED,
    );
    pub const FORBIDDEN: Self = Self::new("forbidden", "Access denied.", StatusCode::FORBIDDEN);
    // 5xx Server Errors
    pub const INTERNAL_SERVER_ERROR: Self = Self::new(
        "internal_server_error",
        "Internal server error.",
        StatusCode::INTERNAL_SERVER_ERROR,
    );
    pub const MALFORMED_AUTH_TOKEN: Self = Self::new(
        "malformed_auth_token",
        "Malformed auth token.",
        StatusCode::UNAUTHORIZED,
    );
    pub const MISSING_AUTH_TOKEN: Self = Self::new(
        "missing_auth_token",
        "Missing auth token.",
        StatusCode::UNAUTHORIZED,
    );
    pub const NOT_FOUND: Self =
        Self::new("not_found", "Resource not found.", StatusCode::NOT_FOUND);
    pub const REVOKED_AUTH_TOKEN: Self = Self::new(
        "revoked_auth_token",
        "Auth token revoked.",
        StatusCode::UNAUTHORIZED,
    );
    pub const SERVICE_UNAVAILABLE: Self = Self::new(
        "service_unavailable",
        "Service unavailable.",
        StatusCode::SERVICE_UNAVAILABLE,
    );
    pub const SESSION_EXPIRED: Self = Self::new(
        "session_expired",
        "Session expired.",
        StatusCode::UNAUTHORIZED,
    );
    pub const TOO_MANY_REQUESTS: Self = Self::new(
        "too_many_requests",
        "Rate limit exceeded.",
        StatusCode::TOO_MANY_REQUESTS,
    );
    pub const UNAUTHORIZED: Self = Self::new(
        "unauthorized",
        "Invalid credentials.",
        StatusCode::UNAUTHORIZED,
    );
    pub const WRONG_TOKEN_TYPE: Self = Self::new(
        "wrong_token_type",
        "Wrong token type.",
        StatusCode::UNAUTHORIZED,
    );

    /// Creates a new error response.
    #[inline]
    pub const fn new(name: &'a str, message: &'a str, status: StatusCode) -> Self {
        Self {
            name: Cow::Borrowed(name),
            message: Cow::Borrowed(message),
            resource: None,
            missing_permissions: None,
            retry_after_secs: None,
            remaining: None,
            reset_at: None,
            context: None,
            status,
        }
    }

    /// Sets a custom resource on the error response.
    /// If a resource already exists, it merges them with a separator.
    pub fn with_resource(mut self, resource: impl Into<Cow<'a, str>>) -> Self {
        let new_resource = resource.into();
        self.resource = Some(match self.resource {
            Some(existing) => Cow::Owned(format!("{}/{}", existing, new_resource)),
            None => new_resource,
        });
        self
    }

    /// Appends a custom message to the existing message.
    pub fn with_message(mut self, message: impl Into<Cow<'a, str>>) -> Self {
        let new_message = message.into();
        let base = self.message.trim_end_matches('.');
        self.message = Cow::Owned(format!("{}. {}", base, new_message));
        self
    }

    /// Attaches context to the error response.
    /// If context already exists, it merges them with a separator.
    pub fn with_context(mut self, context: impl Into<Cow<'a, str>>) -> Self {
        let new_context = context.into();
        self.context = Some(match self.context {
            Some(existing) => Cow::Owned(format!("{}; {}", existing, new_context)),
            None => new_context,
        });
        self
    }

    /// Lists the permissions the caller lacks.
    pub fn with_missing_permissions(mut self, missing: Vec<Permission>) -> Self {
        self.missing_permissions = Some(missing);
        self
    }

    /// Sets the retry window in seconds.
    pub fn with_retry_after_secs(mut self, secs: u64) -> Self {
        self.retry_after_secs = Some(secs);
        self
    }

    /// Attaches rate-limit window state.
    pub fn with_rate_limit(mut self, remaining: u32, reset_at: Timestamp) -> Self {
        self.remaining = Some(remaining);
        self.reset_at = Some(reset_at);
        self
    }
}

impl Default for ErrorResponse<'_> {
    #[inline]
    fn default() -> Self {
        Self::INTERNAL_SERVER_ERROR
    }
}

impl IntoResponse for ErrorResponse<'_> {
    fn into_response(self) -> Response {
        tracing::warn!(
            status = %self.status,
            name = %self.name,
            message = %self.message,
            resource = ?self.resource,
            context = ?self.context,
            "HTTP error response"
        );

        let retry_after_secs = self.retry_after_secs.or_else(|| {
            // A rate-limited caller can also retry, once the window resets.
            self.reset_at.map(|reset_at| {
                let until_reset = reset_at.duration_since(Timestamp::now());
                until_reset.as_secs().max(0) as u64
            })
        });
        let remaining = self.remaining;
        let reset_at_secs = self.reset_at.map(|reset_at| reset_at.as_second());

        let status = self.status;
        let mut response = (status, Json(self)).into_response();
        let headers = response.headers_mut();

        if let Some(secs) = retry_after_secs {
            headers.insert(RETRY_AFTER, HeaderValue::from(secs));
        }
        if let Some(remaining) = remaining {
            headers.insert(X_RATE_LIMIT_REMAINING, HeaderValue::from(remaining));
        }
        if let Some(reset) = reset_at_secs {
            headers.insert(X_RATE_LIMIT_RESET, HeaderValue::from(reset));
        }

        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_response_merging_resource() {
        let response = ErrorResponse::NOT_FOUND
            .with_resource("session")
            .with_resource("user");

        assert_eq!(response.resource.as_deref(), Some("session/user"));
    }

    #[test]
    fn error_response_merging_message() {
        let response = ErrorResponse::BAD_REQUEST
            .with_message("Invalid format")
            .with_message("Missing required field");

        assert_eq!(
            &response.message,
            "Invalid request data. Invalid format. Missing required field"
        );
    }

    #[test]
    fn error_response_merging_context() {
        let response = ErrorResponse::SERVICE_UNAVAILABLE
            .with_context("store unreachable")
            .with_context("retried 3 times");

        assert_eq!(
            response.context.as_deref(),
            Some("store unreachable; retried 3 times")
        );
    }

    #[test]
    fn error_response_serialization() {
        let response = ErrorResponse::FORBIDDEN
            .with_resource("ticket")
            .with_context("internal detail")
            .with_missing_permissions(vec![Permission::ManageSystem]);

        let json = serde_json::to_string(&response).unwrap();

        assert!(json.contains("\"name\":\"forbidden\""));
        assert!(json.contains("\"resource\":\"ticket\""));
        assert!(json.contains("\"missingPermissions\":[\"manage_system\"]"));

        // Internal fields never reach the client.
        assert!(!json.contains("internal detail"));
        assert!(!json.contains("status"));
    }

    #[test]
    fn lockout_response_carries_retry_after_header() {
        let response = ErrorResponse::ACCOUNT_LOCKED
            .with_retry_after_secs(120)
            .into_response();

        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(
            response.headers().get("retry-after"),
            Some(&HeaderValue::from(120u64))
        );
        assert!(response.headers().get("x-ratelimit-remaining").is_none());
    }

    #[test]
    fn rate_limited_response_carries_window_headers() {
        let reset_at = Timestamp::now() + jiff::SignedDuration::from_secs(30);
        let response = ErrorResponse::TOO_MANY_REQUESTS
            .with_rate_limit(0, reset_at)
            .into_response();

        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(
            response.headers().get("x-ratelimit-remaining"),
            Some(&HeaderValue::from(0u32))
        );
        assert_eq!(
            response.headers().get("x-ratelimit-reset"),
            Some(&HeaderValue::from(reset_at.as_second()))
        );

        let retry_after: u64 = response.headers()["retry-after"]
            .to_str()
            .unwrap()
            .parse()
            .unwrap();
        assert!(retry_after <= 30);
    }
}
