//! Sliding-window rate limiting over the shared store.
//!
//! Each key owns a window of request timestamps under `ratelimit:{key}`.
//! A check counts the timestamps still inside the window and, only when
//! the request is admitted, records a new one. Rejected requests leave no
//! trace, so a client hammering a saturated limit recovers as soon as the
//! oldest admitted request ages out rather than being locked out forever.
//!
//! The limiter is fail-open: when the store cannot answer, requests are
//! admitted and the outage is logged.

use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

use jiff::{SignedDuration, Timestamp};

use crate::TRACING_TARGET_RATE_LIMIT;
use crate::error::{AuthError, Result};
use crate::store::SecurityStore;

/// Identifies the client and operation a limit applies to.
///
/// The wrapped string becomes part of the storage key, so two keys are
/// the same limit iff they render identically.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RateLimitKey(String);

impl RateLimitKey {
    /// A limit scoped to a client address, e.g. `login:203.0.113.9`.
    pub fn per_ip(scope: &str, addr: IpAddr) -> Self {
        Self(format!("{scope}:{addr}"))
    }

    /// A limit scoped to an authenticated user.
    pub fn per_user(scope: &str, user_id: &str) -> Self {
        Self(format!("{scope}:user:{user_id}"))
    }

    /// A limit with a caller-chosen key.
    pub fn custom(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    fn storage_key(&self) -> String {
        format!("ratelimit:{}", self.0)
    }
}

impl std::fmt::Display for RateLimitKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Outcome of a rate-limit check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitDecision {
    /// Whether the request was admitted.
    pub allowed: bool,
    /// Requests left in the current window after this one.
    pub remaining: u32,
    /// When the oldest recorded request leaves the window.
    pub reset_at: Timestamp,
}

impl RateLimitDecision {
    /// Converts a denial into the corresponding error.
    pub fn into_result(self) -> Result<Self> {
        if self.allowed {
            Ok(self)
        } else {
            Err(AuthError::RateLimitExceeded {
                remaining: self.remaining,
                reset_at: self.reset_at,
            })
        }
    }
}

/// Sliding-window rate limiter.
#[derive(Clone)]
pub struct RateLimiter {
    store: Arc<dyn SecurityStore>,
}

impl RateLimiter {
    /// Creates a limiter over the given store.
    pub fn new(store: Arc<dyn SecurityStore>) -> Self {
        Self { store }
    }

    /// Checks `key` against `limit` requests per `window` and records the
    /// request if admitted.
    pub async fn check(
        &self,
        key: &RateLimitKey,
        limit: u32,
        window: Duration,
    ) -> RateLimitDecision {
        let now = Timestamp::now();
        let span = SignedDuration::try_from(window).unwrap_or(SignedDuration::MAX);
        let cutoff = now.checked_sub(span).unwrap_or(Timestamp::UNIX_EPOCH);
        let storage_key = key.storage_key();

        let snapshot = match self.store.count_window(&storage_key, cutoff).await {
            Ok(snapshot) => snapshot,
            Err(error) => {
                tracing::warn!(
                    target: TRACING_TARGET_RATE_LIMIT,
                    error = %error,
                    key = %key,
                    "store unavailable, admitting request"
                );
                return RateLimitDecision {
                    allowed: true,
                    remaining: limit.saturating_sub(1),
                    reset_at: now.checked_add(span).unwrap_or(now),
                };
            }
        };

        let reset_at = snapshot
            .oldest
            .and_then(|oldest| oldest.checked_add(span).ok())
            .unwrap_or_else(|| now.checked_add(span).unwrap_or(now));

        if snapshot.count >= limit {
            tracing::debug!(
                target: TRACING_TARGET_RATE_LIMIT,
                key = %key,
                count = snapshot.count,
                limit,
                reset_at = %reset_at,
                "rate limit exceeded"
            );
            return RateLimitDecision {
                allowed: false,
                remaining: 0,
                reset_at,
            };
        }

        // Recorded only for admitted requests. Entries carry a TTL one
        // window past their own expiry as a backstop for keys that stop
        // being checked.
        if let Err(error) = self.store.push_window(&storage_key, now, window * 2).await {
            tracing::warn!(
                target: TRACING_TARGET_RATE_LIMIT,
                error = %error,
                key = %key,
                "failed to record admitted request"
            );
        }

        RateLimitDecision {
            allowed: true,
            remaining: limit.saturating_sub(snapshot.count + 1),
            reset_at,
        }
    }

    /// Like [`check`](Self::check) but turns a denial into
    /// [`AuthError::RateLimitExceeded`].
    pub async fn enforce(
        &self,
        key: &RateLimitKey,
        limit: u32,
        window: Duration,
    ) -> Result<RateLimitDecision> {
        self.check(key, limit, window).await.into_result()
    }
}

impl std::fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimiter").finish_non_exhaustive()
    }
}
