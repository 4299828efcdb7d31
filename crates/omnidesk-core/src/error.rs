//! Error types for the security core.
//!
//! [`AuthError`] is the taxonomy surfaced to callers; every variant maps
//! deterministically to a transport response in the HTTP layer. [`StoreError`]
//! covers backing-store failures and is collapsed into
//! [`AuthError::StoreUnavailable`] at the component boundary so connection
//! details never reach a user-visible message.

use std::time::Duration;

use jiff::Timestamp;
use thiserror::Error;

use crate::access::Permission;

/// Result type for security-core operations.
pub type Result<T, E = AuthError> = std::result::Result<T, E>;

/// Result type for backing-store operations.
pub type StoreResult<T, E = StoreError> = std::result::Result<T, E>;

/// Typed error taxonomy for authentication and authorization decisions.
///
/// Recoverable conditions (expiry, rate limits, lockout) carry the metadata
/// the caller needs to respond correctly; none of the variants embed store
/// details or secret material.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum AuthError {
    /// The token's `exp` claim is in the past.
    #[error("authentication token has expired")]
    TokenExpired,

    /// The token failed structural or signature validation.
    #[error("authentication token is malformed")]
    TokenMalformed,

    /// The token's `jti` has an active revocation entry.
    #[error("authentication token has been revoked")]
    TokenRevoked,

    /// An access token was presented where a refresh token was expected,
    /// or vice versa.
    #[error("authentication token has the wrong type for this operation")]
    TokenWrongType,

    /// The session referenced by the token no longer exists.
    #[error("session has expired or is unknown")]
    SessionExpired,

    /// The sliding-window rate limit for this key is exhausted.
    #[error("rate limit exceeded, resets at {reset_at}")]
    RateLimitExceeded {
        /// Requests left in the current window (always zero on rejection).
        remaining: u32,
        /// Instant at which the oldest window entry falls out of scope.
        reset_at: Timestamp,
    },

    /// The request origin is blocked by the progressive lockout policy.
    #[error("account temporarily locked, retry after {retry_after:?}")]
    AccountLocked {
        /// Remaining block duration.
        retry_after: Duration,
    },

    /// The principal lacks one or more required permissions.
    #[error("permission denied, missing: {missing:?}")]
    PermissionDenied {
        /// Exactly the permissions in `required \ granted`.
        missing: Vec<Permission>,
    },

    /// The backing store could not be reached within the operation timeout.
    #[error("security store is unavailable")]
    StoreUnavailable,
}

impl AuthError {
    /// Returns whether the caller can recover by retrying or
    /// re-authenticating, as opposed to an infrastructure fault.
    #[must_use]
    pub const fn is_recoverable(&self) -> bool {
        !matches!(self, Self::StoreUnavailable)
    }
}

/// Errors produced by [`SecurityStore`](crate::store::SecurityStore) backends.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The store could not be reached or the call timed out.
    #[error("store unavailable: {reason}")]
    Unavailable {
        /// Backend-specific failure description; logged, never surfaced.
        reason: String,
    },

    /// A stored value could not be encoded or decoded.
    #[error("store serialization error")]
    Serialization(#[from] serde_json::Error),

    /// An optimistic-concurrency update lost too many races in a row.
    #[error("store conflict on key '{key}' after {attempts} attempts")]
    Conflict {
        /// Contended key.
        key: String,
        /// Number of compare-and-swap attempts made.
        attempts: u32,
    },
}

impl StoreError {
    /// Creates an [`StoreError::Unavailable`] with the given reason.
    pub fn unavailable(reason: impl Into<String>) -> Self {
        Self::Unavailable {
            reason: reason.into(),
        }
    }

    /// Creates a [`StoreError::Conflict`] for the given key.
    pub fn conflict(key: impl Into<String>, attempts: u32) -> Self {
        Self::Conflict {
            key: key.into(),
            attempts,
        }
    }
}

impl From<StoreError> for AuthError {
    fn from(err: StoreError) -> Self {
        // The reason stays in the log record at the call site; the caller
        // only ever learns that the store was unreachable.
        tracing::debug!(error = %err, "store error collapsed to StoreUnavailable");
        Self::StoreUnavailable
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_error_collapses_without_details() {
        let err = StoreError::unavailable("redis://10.0.0.1:6379 refused");
        let auth: AuthError = err.into();
        assert_eq!(auth, AuthError::StoreUnavailable);
        assert!(!auth.to_string().contains("10.0.0.1"));
    }

    #[test]
    fn recoverable_classification() {
        assert!(AuthError::TokenExpired.is_recoverable());
        assert!(
            AuthError::AccountLocked {
                retry_after: Duration::from_secs(60)
            }
            .is_recoverable()
        );
        assert!(!AuthError::StoreUnavailable.is_recoverable());
    }
}
