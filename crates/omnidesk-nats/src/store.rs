//! [`SecurityStore`] implementation over a NATS JetStream KV bucket.
//!
//! All security state shares one bucket. Every record is a JSON
//! [`StoredEntry`] carrying its own expiry; an entry past it is treated
//! as absent and purged on the next read. The bucket's `max_age` is only
//! a garbage-collection backstop for keys nothing reads again.
//!
//! Counters, windows and sets are read-modify-write sequences, made
//! atomic with optimistic concurrency on KV revisions: a concurrent
//! writer bumps the revision, the update is refused, and the operation
//! retries from a fresh read. Exhausted retries surface as
//! [`StoreError::Conflict`].

use std::time::Duration;

use async_nats::jetstream::kv;
use async_trait::async_trait;
use jiff::{SignedDuration, Timestamp};
use omnidesk_core::{SecurityStore, StoreError, StoreResult, WindowSnapshot};
use serde::{Deserialize, Serialize};

use crate::{Error, NatsClient, Result, TRACING_TARGET_STORE};

const BUCKET_NAME: &str = "omnidesk_security";
const BUCKET_DESCRIPTION: &str = "OmniDesk security state: revocations, limits, lockouts, sessions";
/// GC backstop; must outlive the longest logical TTL (refresh tokens).
const BUCKET_MAX_AGE: Duration = Duration::from_secs(14 * 24 * 60 * 60);

const CAS_MAX_ATTEMPTS: u32 = 4;
const CAS_RETRY_DELAY: Duration = Duration::from_millis(15);

/// One record in the bucket.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredEntry {
    expires_at: Timestamp,
    #[serde(flatten)]
    kind: EntryKind,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
enum EntryKind {
    Bytes { data: Vec<u8> },
    Counter { count: u64 },
    Window { entries: Vec<Timestamp> },
    Set { members: Vec<String> },
}

impl StoredEntry {
    fn new(kind: EntryKind, ttl: Duration) -> Self {
        Self {
            expires_at: expiry(ttl),
            kind,
        }
    }

    fn is_expired(&self) -> bool {
        self.expires_at <= Timestamp::now()
    }
}

fn expiry(ttl: Duration) -> Timestamp {
    let span = SignedDuration::try_from(ttl).unwrap_or(SignedDuration::MAX);
    Timestamp::now().checked_add(span).unwrap_or(Timestamp::MAX)
}

/// Encodes a logical key into the NATS KV key character set.
///
/// `[A-Za-z0-9_-]` pass through, the `:` separator becomes `.`, and any
/// other byte becomes `=XX` (uppercase hex). `=` and literal `.` are
/// escaped too, so the encoding is injective.
fn encode_key(key: &str) -> String {
    let mut encoded = String::with_capacity(key.len());
    for byte in key.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'_' | b'-' => {
                encoded.push(byte as char);
            }
            b':' => encoded.push('.'),
            other => {
                encoded.push('=');
                encoded.push_str(&format!("{other:02X}"));
            }
        }
    }
    encoded
}

enum CasOutcome {
    Write(StoredEntry),
    Delete,
    Keep,
}

/// Shared security store backed by a NATS JetStream KV bucket.
#[derive(Debug, Clone)]
pub struct NatsSecurityStore {
    bucket: kv::Store,
}

impl NatsSecurityStore {
    /// Opens the security bucket, creating it on first use.
    pub async fn new(client: &NatsClient) -> Result<Self> {
        let jetstream = client.jetstream();
        let bucket = match jetstream.get_key_value(BUCKET_NAME).await {
            Ok(bucket) => {
                tracing::debug!(
                    target: TRACING_TARGET_STORE,
                    bucket = BUCKET_NAME,
                    "using existing KV bucket"
                );
                bucket
            }
            Err(_) => {
                tracing::debug!(
                    target: TRACING_TARGET_STORE,
                    bucket = BUCKET_NAME,
                    max_age_secs = BUCKET_MAX_AGE.as_secs(),
                    "creating KV bucket"
                );
                jetstream
                    .create_key_value(kv::Config {
                        bucket: BUCKET_NAME.to_string(),
                        description: BUCKET_DESCRIPTION.to_string(),
                        max_age: BUCKET_MAX_AGE,
                        ..Default::default()
                    })
                    .await
                    .map_err(|e| Error::bucket(BUCKET_NAME, e.to_string()))?
            }
        };

        Ok(Self { bucket })
    }

    /// Reads an entry together with its revision, treating unreadable
    /// records as absent.
    async fn read(&self, key: &str) -> StoreResult<Option<(StoredEntry, u64)>> {
        let entry = self
            .bucket
            .entry(key)
            .await
            .map_err(|e| StoreError::unavailable(e.to_string()))?;
        let Some(entry) = entry else {
            return Ok(None);
        };
        if matches!(entry.operation, kv::Operation::Delete | kv::Operation::Purge) {
            return Ok(None);
        }

        match serde_json::from_slice::<StoredEntry>(&entry.value) {
            Ok(stored) => Ok(Some((stored, entry.revision))),
            Err(error) => {
                tracing::warn!(
                    target: TRACING_TARGET_STORE,
                    key,
                    error = %error,
                    "dropping unreadable record"
                );
                Ok(None)
            }
        }
    }

    /// Like [`read`](Self::read), but an expired entry counts as absent.
    async fn read_live(&self, key: &str) -> StoreResult<Option<(StoredEntry, u64)>> {
        Ok(self.read(key).await?.filter(|(stored, _)| !stored.is_expired()))
    }

    async fn write_raw(&self, key: &str, entry: &StoredEntry) -> StoreResult<()> {
        let payload = serde_json::to_vec(entry)?;
        self.bucket
            .put(key, payload.into())
            .await
            .map_err(|e| StoreError::unavailable(e.to_string()))?;
        Ok(())
    }

    /// Read-modify-write with revision checks and bounded retry.
    ///
    /// `mutate` sees the live entry (expired entries appear as `None`)
    /// and decides what to write back.
    async fn compare_and_swap<T>(
        &self,
        key: &str,
        mut mutate: impl FnMut(Option<&StoredEntry>) -> (CasOutcome, T) + Send,
    ) -> StoreResult<T>
    where
        T: Send,
    {
        for attempt in 1..=CAS_MAX_ATTEMPTS {
            let current = self.read(key).await?;
            let live = current
                .as_ref()
                .filter(|(stored, _)| !stored.is_expired())
                .map(|(stored, _)| stored);

            let (outcome, value) = mutate(live);
            match outcome {
                CasOutcome::Keep => return Ok(value),
                CasOutcome::Delete => {
                    // Purge is unconditional; a racing writer recreates
                    // the key afterwards, which is the last-write-wins
                    // semantics sets need.
                    self.bucket
                        .purge(key)
                        .await
                        .map_err(|e| StoreError::unavailable(e.to_string()))?;
                    return Ok(value);
                }
                CasOutcome::Write(entry) => {
                    let payload = serde_json::to_vec(&entry)?;
                    let written = match current {
                        Some((_, revision)) => self
                            .bucket
                            .update(key, payload.into(), revision)
                            .await
                            .map(|_| ())
                            .is_ok(),
                        None => match self.bucket.create(key, payload.into()).await {
                            Ok(_) => true,
                            Err(e) if e.kind() == kv::CreateErrorKind::AlreadyExists => false,
                            Err(e) => return Err(StoreError::unavailable(e.to_string())),
                        },
                    };
                    if written {
                        return Ok(value);
                    }

                    tracing::debug!(
                        target: TRACING_TARGET_STORE,
                        key,
                        attempt,
                        "revision conflict, retrying"
                    );
                    tokio::time::sleep(CAS_RETRY_DELAY).await;
                }
            }
        }

        Err(StoreError::conflict(key, CAS_MAX_ATTEMPTS))
    }
}

#[async_trait]
impl SecurityStore for NatsSecurityStore {
    async fn get(&self, key: &str) -> StoreResult<Option<Vec<u8>>> {
        let encoded = encode_key(key);
        match self.read(&encoded).await? {
            Some((stored, _)) if stored.is_expired() => {
                // Lazy expiry; best-effort cleanup.
                let _ = self.bucket.purge(&encoded).await;
                Ok(None)
            }
            Some((stored, _)) => match stored.kind {
                EntryKind::Bytes { data } => Ok(Some(data)),
                _ => {
                    tracing::warn!(
                        target: TRACING_TARGET_STORE,
                        key,
                        "record is not a bytes entry"
                    );
                    Ok(None)
                }
            },
            None => Ok(None),
        }
    }

    async fn put(&self, key: &str, value: Vec<u8>, ttl: Duration) -> StoreResult<()> {
        let entry = StoredEntry::new(EntryKind::Bytes { data: value }, ttl);
        self.write_raw(&encode_key(key), &entry).await
    }

    async fn delete(&self, key: &str) -> StoreResult<()> {
        self.bucket
            .purge(encode_key(key))
            .await
            .map_err(|e| StoreError::unavailable(e.to_string()))
    }

    async fn increment(&self, key: &str, ttl: Duration) -> StoreResult<u64> {
        self.compare_and_swap(&encode_key(key), |live| {
            let count = match live.map(|stored| &stored.kind) {
                Some(EntryKind::Counter { count }) => count + 1,
                _ => 1,
            };
            (
                CasOutcome::Write(StoredEntry::new(EntryKind::Counter { count }, ttl)),
                count,
            )
        })
        .await
    }

    async fn count_window(&self, key: &str, cutoff: Timestamp) -> StoreResult<WindowSnapshot> {
        let Some((stored, _)) = self.read_live(&encode_key(key)).await? else {
            return Ok(WindowSnapshot::EMPTY);
        };
        let EntryKind::Window { entries } = stored.kind else {
            return Ok(WindowSnapshot::EMPTY);
        };

        let surviving: Vec<Timestamp> = entries.into_iter().filter(|at| *at >= cutoff).collect();
        Ok(WindowSnapshot {
            count: surviving.len() as u32,
            oldest: surviving.iter().min().copied(),
        })
    }

    async fn push_window(&self, key: &str, at: Timestamp, ttl: Duration) -> StoreResult<()> {
        // Entries older than one TTL behind the new timestamp can no
        // longer satisfy any cutoff the caller will ask about.
        let span = SignedDuration::try_from(ttl).unwrap_or(SignedDuration::MAX);
        let prune_before = at.checked_sub(span).unwrap_or(Timestamp::UNIX_EPOCH);

        self.compare_and_swap(&encode_key(key), |live| {
            let mut entries = match live.map(|stored| &stored.kind) {
                Some(EntryKind::Window { entries }) => entries.clone(),
                _ => Vec::new(),
            };
            entries.retain(|entry| *entry >= prune_before);
            entries.push(at);
            (
                CasOutcome::Write(StoredEntry::new(EntryKind::Window { entries }, ttl)),
                (),
            )
        })
        .await
    }

    async fn set_insert(&self, key: &str, member: &str, ttl: Duration) -> StoreResult<usize> {
        self.compare_and_swap(&encode_key(key), |live| {
            let mut members = match live.map(|stored| &stored.kind) {
                Some(EntryKind::Set { members }) => members.clone(),
                _ => Vec::new(),
            };
            if !members.iter().any(|m| m == member) {
                members.push(member.to_owned());
            }
            let cardinality = members.len();
            (
                CasOutcome::Write(StoredEntry::new(EntryKind::Set { members }, ttl)),
                cardinality,
            )
        })
        .await
    }

    async fn set_remove(&self, key: &str, member: &str) -> StoreResult<()> {
        self.compare_and_swap(&encode_key(key), |live| {
            let Some(StoredEntry {
                expires_at,
                kind: EntryKind::Set { members },
            }) = live
            else {
                return (CasOutcome::Keep, ());
            };

            let mut members = members.clone();
            members.retain(|m| m != member);
            if members.is_empty() {
                (CasOutcome::Delete, ())
            } else {
                (
                    CasOutcome::Write(StoredEntry {
                        expires_at: *expires_at,
                        kind: EntryKind::Set { members },
                    }),
                    (),
                )
            }
        })
        .await
    }

    async fn set_members(&self, key: &str) -> StoreResult<Vec<String>> {
        let Some((stored, _)) = self.read_live(&encode_key(key)).await? else {
            return Ok(Vec::new());
        };
        match stored.kind {
            EntryKind::Set { members } => Ok(members),
            _ => Ok(Vec::new()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_encoding_uses_allowed_charset() {
        let encoded = encode_key("session:AbC123_-xyz");
        assert_eq!(encoded, "session.AbC123_-xyz");
        assert!(
            encoded
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-' | '='))
        );
    }

    #[test]
    fn key_encoding_escapes_everything_else() {
        assert_eq!(encode_key("failures:a@b.c:10.0.0.1"), "failures.a=40b=2Ec.10=2E0=2E0=2E1");
        // IPv6 separators collapse into the same '.' as the layout separator,
        // which stays injective because ':' is the only byte mapped there.
        assert_eq!(encode_key("lockout:::1"), "lockout...1");
    }

    #[test]
    fn key_encoding_is_injective_on_lookalikes() {
        let pairs = [
            ("a:b", "a.b"),
            ("a.b", "a=2Eb"),
            ("a=b", "a=3Db"),
            ("a=2Eb", "a=3D2Eb"),
        ];
        let mut seen = std::collections::HashSet::new();
        for (raw, expected) in pairs {
            let encoded = encode_key(raw);
            assert_eq!(encoded, expected);
            assert!(seen.insert(encoded));
        }
    }

    #[test]
    fn stored_entry_roundtrips_all_kinds() -> anyhow::Result<()> {
        let kinds = [
            EntryKind::Bytes { data: vec![1, 2, 3] },
            EntryKind::Counter { count: 7 },
            EntryKind::Window {
                entries: vec![Timestamp::UNIX_EPOCH],
            },
            EntryKind::Set {
                members: vec!["a".to_owned(), "b".to_owned()],
            },
        ];

        for kind in kinds {
            let entry = StoredEntry::new(kind, Duration::from_secs(60));
            let json = serde_json::to_vec(&entry)?;
            let parsed: StoredEntry = serde_json::from_slice(&json)?;
            assert!(!parsed.is_expired());
        }
        Ok(())
    }

    #[test]
    fn expired_entries_read_as_expired() {
        let entry = StoredEntry {
            expires_at: Timestamp::UNIX_EPOCH,
            kind: EntryKind::Counter { count: 1 },
        };
        assert!(entry.is_expired());
    }
}
