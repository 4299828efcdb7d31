//! Shared key-value store seam for all mutable security state.
//!
//! Revocation entries, rate-limit windows, lockout records and session sets
//! all live behind [`SecurityStore`] so that a deployment-wide backend (NATS
//! KV, see `omnidesk-nats`) can be shared by every worker process. The
//! in-process [`MemoryStore`] serves tests and single-node setups.
//!
//! # Key layout
//!
//! - `revocation:{jti}`: TTL = remaining token life
//! - `ratelimit:{key}`: sliding window, TTL = window length
//! - `lockout:{ip}` / `failures:{identifier}:{ip}`: TTL per lockout policy
//! - `session:{sessionId}` / `sessions:{userId}`: TTL = idle timeout
//!
//! # Atomicity
//!
//! Each method call is atomic with respect to other calls on the same
//! backend. Check-then-act sequences composed from several calls (the rate
//! limiter's count-then-push in particular) tolerate slight over-admission
//! when two callers race at the window boundary; they never under-admit.

mod memory;
#[cfg(test)]
pub(crate) mod testing;

use std::time::Duration;

use async_trait::async_trait;
use jiff::Timestamp;

pub use memory::MemoryStore;

use crate::error::StoreResult;

/// Snapshot of a sliding window after pruning expired entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowSnapshot {
    /// Entries with timestamps at or after the cutoff.
    pub count: u32,
    /// Oldest surviving timestamp, if any entry survived.
    pub oldest: Option<Timestamp>,
}

impl WindowSnapshot {
    /// An empty window.
    pub const EMPTY: Self = Self {
        count: 0,
        oldest: None,
    };
}

/// Network-accessible key-value store with TTL-based expiry.
///
/// All operations are non-blocking calls bounded by the backend's own
/// per-call timeout; failures surface as
/// [`StoreError`](crate::error::StoreError) and each component applies its
/// own fail-open or fail-closed policy.
#[async_trait]
pub trait SecurityStore: Send + Sync + 'static {
    /// Returns the value at `key`, or `None` if absent or expired.
    async fn get(&self, key: &str) -> StoreResult<Option<Vec<u8>>>;

    /// Writes `value` at `key` with the given time-to-live.
    async fn put(&self, key: &str, value: Vec<u8>, ttl: Duration) -> StoreResult<()>;

    /// Removes `key`; absent keys are not an error.
    async fn delete(&self, key: &str) -> StoreResult<()>;

    /// Atomically increments the counter at `key` and refreshes its TTL,
    /// creating it at 1 when absent or expired. Returns the new value.
    async fn increment(&self, key: &str, ttl: Duration) -> StoreResult<u64>;

    /// Prunes window entries older than `cutoff` and returns a snapshot of
    /// the survivors.
    async fn count_window(&self, key: &str, cutoff: Timestamp) -> StoreResult<WindowSnapshot>;

    /// Appends a timestamp to the window at `key`, refreshing its TTL.
    async fn push_window(&self, key: &str, at: Timestamp, ttl: Duration) -> StoreResult<()>;

    /// Adds `member` to the set at `key`, refreshing its TTL, and returns
    /// the resulting cardinality. Members keep insertion order.
    async fn set_insert(&self, key: &str, member: &str, ttl: Duration) -> StoreResult<usize>;

    /// Removes `member` from the set at `key`.
    async fn set_remove(&self, key: &str, member: &str) -> StoreResult<()>;

    /// Returns the members of the set at `key` in insertion order.
    async fn set_members(&self, key: &str) -> StoreResult<Vec<String>>;
}
