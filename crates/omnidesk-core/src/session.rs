//! Session registry with a per-user concurrency bound.
//!
//! Sessions live under `session:{id}` with a sliding idle TTL, and each
//! user owns a membership set under `sessions:{userId}` kept in creation
//! order. Creating a session past the configured bound evicts the user's
//! oldest live session rather than rejecting the new one.
//!
//! Unlike the rate limiter, the registry is fail-closed: a store outage
//! surfaces as an error instead of silently granting or dropping sessions.

use std::net::IpAddr;
use std::sync::Arc;

use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use jiff::Timestamp;
use rand::RngCore as _;
use serde::{Deserialize, Serialize};

use crate::TRACING_TARGET_SESSION;
use crate::config::SecurityConfig;
use crate::error::{AuthError, Result};
use crate::store::SecurityStore;

/// Bytes of entropy behind every session id.
const SESSION_ID_BYTES: usize = 32;

/// Client details captured when the session was created.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionMetadata {
    /// Address the session was established from.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip: Option<IpAddr>,
    /// Client user agent, if presented.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
}

/// A live session as stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    /// Opaque URL-safe id.
    pub id: String,
    /// Owning user.
    pub user_id: String,
    /// Creation time.
    pub created_at: Timestamp,
    /// Last time the session was presented.
    pub last_active: Timestamp,
    /// Client details.
    #[serde(default)]
    pub metadata: SessionMetadata,
}

/// Creates, refreshes and revokes sessions over the shared store.
#[derive(Clone)]
pub struct SessionRegistry {
    store: Arc<dyn SecurityStore>,
    max_sessions: usize,
    idle_timeout: std::time::Duration,
}

impl SessionRegistry {
    /// Creates a registry with the configured bound and idle timeout.
    pub fn new(store: Arc<dyn SecurityStore>, config: &SecurityConfig) -> Self {
        Self::with_limits(
            store,
            config.max_concurrent_sessions,
            config.session_idle_timeout(),
        )
    }

    /// Creates a registry with explicit limits.
    pub fn with_limits(
        store: Arc<dyn SecurityStore>,
        max_sessions: usize,
        idle_timeout: std::time::Duration,
    ) -> Self {
        Self {
            store,
            max_sessions,
            idle_timeout,
        }
    }

    fn session_key(session_id: &str) -> String {
        format!("session:{session_id}")
    }

    fn user_key(user_id: &str) -> String {
        format!("sessions:{user_id}")
    }

    fn generate_id() -> String {
        let mut bytes = [0u8; SESSION_ID_BYTES];
        rand::rng().fill_bytes(&mut bytes);
        URL_SAFE_NO_PAD.encode(bytes)
    }

    /// Creates a session for `user_id`, evicting the oldest live session
    /// once the user's bound is reached.
    pub async fn create(&self, user_id: &str, metadata: SessionMetadata) -> Result<Session> {
        let mut live = self.live_sessions(user_id).await?;
        // The stored set can exceed the bound when the bound was lowered,
        // so evict oldest-first until the new session fits.
        live.sort_by_key(|session| session.created_at);
        while live.len() >= self.max_sessions && !live.is_empty() {
            let oldest = live.remove(0);
            tracing::info!(
                target: TRACING_TARGET_SESSION,
                user_id,
                evicted = oldest.id,
                bound = self.max_sessions,
                "session bound reached, evicting oldest"
            );
            self.revoke(&oldest.id).await?;
        }

        let now = Timestamp::now();
        let session = Session {
            id: Self::generate_id(),
            user_id: user_id.to_owned(),
            created_at: now,
            last_active: now,
            metadata,
        };

        self.store
            .put(
                &Self::session_key(&session.id),
                serde_json::to_vec(&session).map_err(crate::error::StoreError::from)?,
                self.idle_timeout,
            )
            .await?;
        // Set entries share the idle TTL so an abandoned user set ages out
        // with its last session.
        self.store
            .set_insert(&Self::user_key(user_id), &session.id, self.idle_timeout)
            .await?;

        tracing::debug!(
            target: TRACING_TARGET_SESSION,
            user_id,
            session_id = session.id,
            "created session"
        );
        Ok(session)
    }

    /// Loads a session and slides its idle window forward.
    ///
    /// # Errors
    ///
    /// [`AuthError::SessionExpired`] when the id is unknown or has idled
    /// out; store outages are
    /// [`AuthError::StoreUnavailable`].
    pub async fn touch(&self, session_id: &str) -> Result<Session> {
        let raw = self
            .store
            .get(&Self::session_key(session_id))
            .await?
            .ok_or(AuthError::SessionExpired)?;
        let mut session: Session =
            serde_json::from_slice(&raw).map_err(crate::error::StoreError::from)?;

        session.last_active = Timestamp::now();
        self.store
            .put(
                &Self::session_key(session_id),
                serde_json::to_vec(&session).map_err(crate::error::StoreError::from)?,
                self.idle_timeout,
            )
            .await?;
        self.store
            .set_insert(&Self::user_key(&session.user_id), session_id, self.idle_timeout)
            .await?;
        Ok(session)
    }

    /// Returns a session without refreshing its idle window.
    pub async fn get(&self, session_id: &str) -> Result<Session> {
        let raw = self
            .store
            .get(&Self::session_key(session_id))
            .await?
            .ok_or(AuthError::SessionExpired)?;
        let session = serde_json::from_slice(&raw).map_err(crate::error::StoreError::from)?;
        Ok(session)
    }

    /// Revokes a single session. Revoking an unknown id is a no-op.
    pub async fn revoke(&self, session_id: &str) -> Result<()> {
        if let Some(raw) = self.store.get(&Self::session_key(session_id)).await? {
            if let Ok(session) = serde_json::from_slice::<Session>(&raw) {
                self.store
                    .set_remove(&Self::user_key(&session.user_id), session_id)
                    .await?;
            }
            self.store.delete(&Self::session_key(session_id)).await?;
            tracing::debug!(
                target: TRACING_TARGET_SESSION,
                session_id,
                "revoked session"
            );
        }
        Ok(())
    }

    /// Revokes every session of a user, returning how many were live.
    pub async fn revoke_all(&self, user_id: &str) -> Result<usize> {
        let live = self.live_sessions(user_id).await?;
        for session in &live {
            self.store.delete(&Self::session_key(&session.id)).await?;
        }
        self.store.delete(&Self::user_key(user_id)).await?;

        tracing::info!(
            target: TRACING_TARGET_SESSION,
            user_id,
            revoked = live.len(),
            "revoked all sessions"
        );
        Ok(live.len())
    }

    /// Lists a user's live sessions in creation order.
    pub async fn list(&self, user_id: &str) -> Result<Vec<Session>> {
        self.live_sessions(user_id).await
    }

    /// Resolves the user's membership set to live sessions, pruning ids
    /// whose session record has expired.
    async fn live_sessions(&self, user_id: &str) -> Result<Vec<Session>> {
        let members = self.store.set_members(&Self::user_key(user_id)).await?;
        let mut live = Vec::with_capacity(members.len());

        for session_id in members {
            match self.store.get(&Self::session_key(&session_id)).await? {
                Some(raw) => match serde_json::from_slice(&raw) {
                    Ok(session) => live.push(session),
                    Err(error) => {
                        tracing::warn!(
                            target: TRACING_TARGET_SESSION,
                            session_id,
                            error = %error,
                            "dropping unreadable session record"
                        );
                        self.store
                            .set_remove(&Self::user_key(user_id), &session_id)
                            .await?;
                    }
                },
                None => {
                    self.store
                        .set_remove(&Self::user_key(user_id), &session_id)
                        .await?;
                }
            }
        }
        Ok(live)
    }
}

impl std::fmt::Debug for SessionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionRegistry")
            .field("max_sessions", &self.max_sessions)
            .field("idle_timeout", &self.idle_timeout)
            .finish_non_exhaustive()
    }
}
