//! In-process [`SecurityStore`] backend.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use jiff::{SignedDuration, Timestamp};
use tokio::sync::Mutex;

use super::{SecurityStore, WindowSnapshot};
use crate::error::StoreResult;

/// In-memory store with per-entry expiry.
///
/// Every trait call takes the single mutex, so each operation is atomic
/// within the process. Suitable for tests and single-node deployments; a
/// multi-process deployment needs a shared backend instead.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, Entry>>,
}

#[derive(Debug)]
struct Entry {
    expires_at: Timestamp,
    value: Value,
}

#[derive(Debug)]
enum Value {
    Bytes(Vec<u8>),
    Counter(u64),
    Window(Vec<Timestamp>),
    Set(Vec<String>),
}

impl MemoryStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    fn expiry(ttl: Duration) -> Timestamp {
        let now = Timestamp::now();
        now.checked_add(SignedDuration::try_from(ttl).unwrap_or(SignedDuration::MAX))
            .unwrap_or(now)
    }

    fn live<'a>(entries: &'a mut HashMap<String, Entry>, key: &str) -> Option<&'a mut Entry> {
        let expired = entries
            .get(key)
            .is_some_and(|entry| entry.expires_at <= Timestamp::now());
        if expired {
            entries.remove(key);
        }
        entries.get_mut(key)
    }
}

#[async_trait]
impl SecurityStore for MemoryStore {
    async fn get(&self, key: &str) -> StoreResult<Option<Vec<u8>>> {
        let mut entries = self.entries.lock().await;
        Ok(Self::live(&mut entries, key).and_then(|entry| match &entry.value {
            Value::Bytes(bytes) => Some(bytes.clone()),
            _ => None,
        }))
    }

    async fn put(&self, key: &str, value: Vec<u8>, ttl: Duration) -> StoreResult<()> {
        let mut entries = self.entries.lock().await;
        entries.insert(
            key.to_owned(),
            Entry {
                expires_at: Self::expiry(ttl),
                value: Value::Bytes(value),
            },
        );
        Ok(())
    }

    async fn delete(&self, key: &str) -> StoreResult<()> {
        let mut entries = self.entries.lock().await;
        entries.remove(key);
        Ok(())
    }

    async fn increment(&self, key: &str, ttl: Duration) -> StoreResult<u64> {
        let mut entries = self.entries.lock().await;
        let next = match Self::live(&mut entries, key) {
            Some(Entry {
                value: Value::Counter(count),
                ..
            }) => *count + 1,
            _ => 1,
        };
        entries.insert(
            key.to_owned(),
            Entry {
                expires_at: Self::expiry(ttl),
                value: Value::Counter(next),
            },
        );
        Ok(next)
    }

    async fn count_window(&self, key: &str, cutoff: Timestamp) -> StoreResult<WindowSnapshot> {
        let mut entries = self.entries.lock().await;
        let Some(entry) = Self::live(&mut entries, key) else {
            return Ok(WindowSnapshot::EMPTY);
        };
        if let Value::Window(timestamps) = &mut entry.value {
            timestamps.retain(|ts| *ts >= cutoff);
            Ok(WindowSnapshot {
                count: timestamps.len() as u32,
                oldest: timestamps.iter().min().copied(),
            })
        } else {
            Ok(WindowSnapshot::EMPTY)
        }
    }

    async fn push_window(&self, key: &str, at: Timestamp, ttl: Duration) -> StoreResult<()> {
        let mut entries = self.entries.lock().await;
        let expires_at = Self::expiry(ttl);
        match Self::live(&mut entries, key) {
            Some(entry) => {
                entry.expires_at = expires_at;
                if let Value::Window(timestamps) = &mut entry.value {
                    timestamps.push(at);
                } else {
                    entry.value = Value::Window(vec![at]);
                }
            }
            None => {
                entries.insert(
                    key.to_owned(),
                    Entry {
                        expires_at,
                        value: Value::Window(vec![at]),
                    },
                );
            }
        }
        Ok(())
    }

    async fn set_insert(&self, key: &str, member: &str, ttl: Duration) -> StoreResult<usize> {
        let mut entries = self.entries.lock().await;
        let expires_at = Self::expiry(ttl);
        match Self::live(&mut entries, key) {
            Some(entry) => {
                entry.expires_at = expires_at;
                if let Value::Set(members) = &mut entry.value {
                    if !members.iter().any(|m| m == member) {
                        members.push(member.to_owned());
                    }
                    Ok(members.len())
                } else {
                    entry.value = Value::Set(vec![member.to_owned()]);
                    Ok(1)
                }
            }
            None => {
                entries.insert(
                    key.to_owned(),
                    Entry {
                        expires_at,
                        value: Value::Set(vec![member.to_owned()]),
                    },
                );
                Ok(1)
            }
        }
    }

    async fn set_remove(&self, key: &str, member: &str) -> StoreResult<()> {
        let mut entries = self.entries.lock().await;
        if let Some(entry) = Self::live(&mut entries, key)
            && let Value::Set(members) = &mut entry.value
        {
            members.retain(|m| m != member);
            if members.is_empty() {
                entries.remove(key);
            }
        }
        Ok(())
    }

    async fn set_members(&self, key: &str) -> StoreResult<Vec<String>> {
        let mut entries = self.entries.lock().await;
        Ok(match Self::live(&mut entries, key) {
            Some(Entry {
                value: Value::Set(members),
                ..
            }) => members.clone(),
            _ => Vec::new(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn values_expire_after_ttl() -> anyhow::Result<()> {
        let store = MemoryStore::new();
        store
            .put("k", b"v".to_vec(), Duration::from_millis(50))
            .await?;
        assert_eq!(store.get("k").await?, Some(b"v".to_vec()));

        tokio::time::sleep(Duration::from_millis(80)).await;
        assert_eq!(store.get("k").await?, None);
        Ok(())
    }

    #[tokio::test]
    async fn increment_restarts_after_expiry() -> anyhow::Result<()> {
        let store = MemoryStore::new();
        assert_eq!(store.increment("c", Duration::from_millis(50)).await?, 1);
        assert_eq!(store.increment("c", Duration::from_millis(50)).await?, 2);

        tokio::time::sleep(Duration::from_millis(80)).await;
        assert_eq!(store.increment("c", Duration::from_millis(50)).await?, 1);
        Ok(())
    }

    #[tokio::test]
    async fn window_prunes_below_cutoff() -> anyhow::Result<()> {
        let store = MemoryStore::new();
        let ttl = Duration::from_secs(60);
        let now = Timestamp::now();
        let old = now - SignedDuration::from_secs(120);

        store.push_window("w", old, ttl).await?;
        store.push_window("w", now, ttl).await?;

        let snapshot = store
            .count_window("w", now - SignedDuration::from_secs(60))
            .await?;
        assert_eq!(snapshot.count, 1);
        assert_eq!(snapshot.oldest, Some(now));
        Ok(())
    }

    #[tokio::test]
    async fn set_preserves_insertion_order_and_dedupes() -> anyhow::Result<()> {
        let store = MemoryStore::new();
        let ttl = Duration::from_secs(60);

        assert_eq!(store.set_insert("s", "a", ttl).await?, 1);
        assert_eq!(store.set_insert("s", "b", ttl).await?, 2);
        assert_eq!(store.set_insert("s", "a", ttl).await?, 2);
        assert_eq!(store.set_members("s").await?, vec!["a", "b"]);

        store.set_remove("s", "a").await?;
        assert_eq!(store.set_members("s").await?, vec!["b"]);
        Ok(())
    }
}
