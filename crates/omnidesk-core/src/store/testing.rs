//! Store doubles for exercising degraded-backend behavior in tests.

use std::time::Duration;

use async_trait::async_trait;
use jiff::Timestamp;

use super::{SecurityStore, WindowSnapshot};
use crate::error::{StoreError, StoreResult};

/// Store whose every operation reports an outage.
pub(crate) struct FailingStore;

impl FailingStore {
    fn outage<T>() -> StoreResult<T> {
        Err(StoreError::unavailable("backend unreachable"))
    }
}

#[async_trait]
impl SecurityStore for FailingStore {
    async fn get(&self, _key: &str) -> StoreResult<Option<Vec<u8>>> {
        Self::outage()
    }

    async fn put(&self, _key: &str, _value: Vec<u8>, _ttl: Duration) -> StoreResult<()> {
        Self::outage()
    }

    async fn delete(&self, _key: &str) -> StoreResult<()> {
        Self::outage()
    }

    async fn increment(&self, _key: &str, _ttl: Duration) -> StoreResult<u64> {
        Self::outage()
    }

    async fn count_window(&self, _key: &str, _cutoff: Timestamp) -> StoreResult<WindowSnapshot> {
        Self::outage()
    }

    async fn push_window(&self, _key: &str, _at: Timestamp, _ttl: Duration) -> StoreResult<()> {
        Self::outage()
    }

    async fn set_insert(&self, _key: &str, _member: &str, _ttl: Duration) -> StoreResult<usize> {
        Self::outage()
    }

    async fn set_remove(&self, _key: &str, _member: &str) -> StoreResult<()> {
        Self::outage()
    }

    async fn set_members(&self, _key: &str) -> StoreResult<Vec<String>> {
        Self::outage()
    }
}
