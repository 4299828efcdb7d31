//! Progressive lockout for repeated authentication failures.
//!
//! Failures are counted per `(identifier, ip)` pair under a rolling
//! window. Once the count reaches the configured threshold a block record
//! is written for the address, with a duration that grows linearly with
//! the count up to a cap. A successful authentication clears both the
//! counter and any active block for the pair.
//!
//! Reads are fail-open: a store outage never locks out a legitimate user.

use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

use jiff::{SignedDuration, Timestamp};
use serde::{Deserialize, Serialize};

use crate::TRACING_TARGET_LOCKOUT;
use crate::config::LockoutConfig;
use crate::error::{AuthError, Result};
use crate::store::SecurityStore;

/// Block record stored under `lockout:{ip}`.
///
/// The expiry is embedded so a check can report how long the caller has
/// to wait, independent of the backend's TTL granularity.
#[derive(Debug, Serialize, Deserialize)]
struct BlockRecord {
    blocked_until: Timestamp,
    failure_count: u64,
}

/// Tracks authentication failures and blocks abusive addresses.
#[derive(Clone)]
pub struct LockoutGuard {
    store: Arc<dyn SecurityStore>,
    config: LockoutConfig,
}

impl LockoutGuard {
    /// Creates a guard over the given store.
    pub fn new(store: Arc<dyn SecurityStore>, config: LockoutConfig) -> Self {
        Self { store, config }
    }

    fn failures_key(identifier: &str, ip: IpAddr) -> String {
        format!("failures:{identifier}:{ip}")
    }

    fn block_key(ip: IpAddr) -> String {
        format!("lockout:{ip}")
    }

    /// Errors with [`AuthError::AccountLocked`] while a block for `ip` is
    /// active.
    ///
    /// A store outage or an unreadable record admits the caller.
    pub async fn check(&self, ip: IpAddr) -> Result<()> {
        let raw = match self.store.get(&Self::block_key(ip)).await {
            Ok(raw) => raw,
            Err(error) => {
                tracing::warn!(
                    target: TRACING_TARGET_LOCKOUT,
                    error = %error,
                    %ip,
                    "store unavailable, skipping lockout check"
                );
                return Ok(());
            }
        };
        let Some(raw) = raw else {
            return Ok(());
        };

        let record: BlockRecord = match serde_json::from_slice(&raw) {
            Ok(record) => record,
            Err(error) => {
                tracing::warn!(
                    target: TRACING_TARGET_LOCKOUT,
                    error = %error,
                    %ip,
                    "discarding unreadable block record"
                );
                return Ok(());
            }
        };

        let remaining = record.blocked_until.duration_since(Timestamp::now());
        if remaining.is_positive() {
            return Err(AuthError::AccountLocked {
                retry_after: Duration::from_secs(remaining.as_secs().max(1) as u64),
            });
        }
        Ok(())
    }

    /// Records one failed attempt and blocks the address once the count
    /// reaches the threshold.
    ///
    /// Returns the failure count inside the current window, or zero when
    /// the store is unavailable. A count below the configured threshold
    /// means no block was written and further attempts are still allowed;
    /// at or above it, [`check`](Self::check) rejects until the block
    /// expires.
    pub async fn record_failure(&self, identifier: &str, ip: IpAddr) -> u64 {
        let count = match self
            .store
            .increment(&Self::failures_key(identifier, ip), self.config.failure_window())
            .await
        {
            Ok(count) => count,
            Err(error) => {
                tracing::warn!(
                    target: TRACING_TARGET_LOCKOUT,
                    error = %error,
                    identifier,
                    %ip,
                    "store unavailable, failure not recorded"
                );
                return 0;
            }
        };

        if count < self.config.failure_threshold {
            tracing::debug!(
                target: TRACING_TARGET_LOCKOUT,
                identifier,
                %ip,
                count,
                threshold = self.config.failure_threshold,
                "recorded authentication failure"
            );
            return count;
        }

        let duration = self.config.block_duration(count);
        let span = SignedDuration::try_from(duration).unwrap_or(SignedDuration::MAX);
        let record = BlockRecord {
            blocked_until: Timestamp::now()
                .checked_add(span)
                .unwrap_or(Timestamp::MAX),
            failure_count: count,
        };

        match serde_json::to_vec(&record) {
            Ok(raw) => {
                if let Err(error) = self.store.put(&Self::block_key(ip), raw, duration).await {
                    tracing::warn!(
                        target: TRACING_TARGET_LOCKOUT,
                        error = %error,
                        %ip,
                        "failed to write block record"
                    );
                } else {
                    tracing::warn!(
                        target: TRACING_TARGET_LOCKOUT,
                        identifier,
                        %ip,
                        count,
                        block_secs = duration.as_secs(),
                        "blocked address after repeated failures"
                    );
                }
            }
            Err(error) => {
                tracing::error!(
                    target: TRACING_TARGET_LOCKOUT,
                    error = %error,
                    %ip,
                    "failed to serialize block record"
                );
            }
        }

        count
    }

    /// Clears the failure counter and any active block for the pair.
    pub async fn record_success(&self, identifier: &str, ip: IpAddr) {
        for key in [Self::failures_key(identifier, ip), Self::block_key(ip)] {
            if let Err(error) = self.store.delete(&key).await {
                tracing::warn!(
                    target: TRACING_TARGET_LOCKOUT,
                    error = %error,
                    key,
                    "failed to clear lockout state"
                );
            }
        }
    }
}

impl std::fmt::Debug for LockoutGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LockoutGuard")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use crate::store::testing::FailingStore;

    const IP: IpAddr = IpAddr::V4(std::net::Ipv4Addr::new(203, 0, 113, 9));

    fn guard() -> LockoutGuard {
        LockoutGuard::new(Arc::new(MemoryStore::new()), LockoutConfig::default())
    }

    #[tokio::test]
    async fn below_threshold_stays_unblocked() {
        let guard = guard();
        for _ in 0..4 {
            guard.record_failure("alice", IP).await;
        }
        assert!(guard.check(IP).await.is_ok());
    }

    #[tokio::test]
    async fn threshold_blocks_with_progressive_retry_after() {
        let guard = guard();
        for expected in 1..=5 {
            assert_eq!(guard.record_failure("alice", IP).await, expected);
        }

        let error = guard.check(IP).await.unwrap_err();
        let AuthError::AccountLocked { retry_after } = error else {
            panic!("expected AccountLocked, got {error:?}");
        };
        // Five failures at sixty seconds each.
        assert!(retry_after <= Duration::from_secs(300));
        assert!(retry_after > Duration::from_secs(290));

        // Another failure extends the block.
        guard.record_failure("alice", IP).await;
        let error = guard.check(IP).await.unwrap_err();
        let AuthError::AccountLocked { retry_after } = error else {
            panic!("expected AccountLocked, got {error:?}");
        };
        assert!(retry_after > Duration::from_secs(300));
        assert!(retry_after <= Duration::from_secs(360));
    }

    #[tokio::test]
    async fn block_duration_is_capped() {
        let config = LockoutConfig {
            failure_threshold: 2,
            base_block_unit_secs: 60,
            max_block_secs: 120,
            ..LockoutConfig::default()
        };
        let guard = LockoutGuard::new(Arc::new(MemoryStore::new()), config);

        for _ in 0..10 {
            guard.record_failure("alice", IP).await;
        }
        let AuthError::AccountLocked { retry_after } = guard.check(IP).await.unwrap_err() else {
            panic!("expected AccountLocked");
        };
        assert!(retry_after <= Duration::from_secs(120));
    }

    #[tokio::test]
    async fn success_clears_counter_and_block() {
        let guard = guard();
        for _ in 0..5 {
            guard.record_failure("alice", IP).await;
        }
        assert!(guard.check(IP).await.is_err());

        guard.record_success("alice", IP).await;
        assert!(guard.check(IP).await.is_ok());
        // Counter restarted, so a single new failure stays below threshold.
        assert_eq!(guard.record_failure("alice", IP).await, 1);
    }

    #[tokio::test]
    async fn counters_are_scoped_per_identifier() {
        let guard = guard();
        for _ in 0..3 {
            guard.record_failure("alice", IP).await;
        }
        assert_eq!(guard.record_failure("bob", IP).await, 1);
    }

    #[tokio::test]
    async fn store_outage_fails_open() {
        let guard = LockoutGuard::new(Arc::new(FailingStore), LockoutConfig::default());
        assert_eq!(guard.record_failure("alice", IP).await, 0);
        assert!(guard.check(IP).await.is_ok());
    }
}
