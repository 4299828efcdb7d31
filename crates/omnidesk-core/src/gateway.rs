//! Composition root tying the security components together.
//!
//! A [`SecurityGateway`] is built explicitly from a [`SecurityConfig`] and
//! a shared [`SecurityStore`]; embedding applications construct one at
//! startup and pass it down, there is no process-global instance.
//!
//! `authenticate` runs the full inbound chain: lockout check for the
//! origin address, access-token verification (signature, expiry, type,
//! revocation), then session validation when the token is bound to one.
//! The result is a [`Principal`] carrying the resolved permission set.

use std::collections::HashSet;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

use uuid::Uuid;

use crate::TRACING_TARGET_GATEWAY;
use crate::access::{AccessControl, Permission, Role};
use crate::config::SecurityConfig;
use crate::credential::CredentialManager;
use crate::error::Result;
use crate::lockout::LockoutGuard;
use crate::rate_limit::{RateLimitDecision, RateLimitKey, RateLimiter};
use crate::session::SessionRegistry;
use crate::store::SecurityStore;
use crate::token::{TokenService, TokenType};

/// An authenticated caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    /// Subject from the verified token.
    pub user_id: String,
    /// Role carried by the token, if any.
    pub role: Option<Role>,
    /// Permission set resolved from the role.
    pub permissions: HashSet<Permission>,
    /// Session the token is bound to, if any.
    pub session_id: Option<String>,
    /// Id of the presented token.
    pub token_id: Uuid,
}

impl Principal {
    /// Whether the principal holds a single permission.
    #[must_use]
    pub fn has_permission(&self, permission: Permission) -> bool {
        self.permissions.contains(&permission)
    }

    /// Checks the principal against a required permission set.
    ///
    /// # Errors
    ///
    /// [`AuthError::PermissionDenied`](crate::AuthError::PermissionDenied)
    /// listing exactly the permissions the principal lacks.
    pub fn require(&self, required: &[Permission]) -> Result<()> {
        AccessControl::authorize(&self.permissions, required)
    }
}

/// Entry point for all authentication and authorization decisions.
#[derive(Debug, Clone)]
pub struct SecurityGateway {
    config: SecurityConfig,
    credentials: CredentialManager,
    tokens: Arc<TokenService>,
    rate_limiter: RateLimiter,
    lockout: LockoutGuard,
    sessions: SessionRegistry,
}

impl SecurityGateway {
    /// Builds a gateway with every component sharing the given store.
    pub fn new(config: SecurityConfig, store: Arc<dyn SecurityStore>) -> Self {
        let tokens = Arc::new(TokenService::new(&config, Arc::clone(&store)));
        let rate_limiter = RateLimiter::new(Arc::clone(&store));
        let lockout = LockoutGuard::new(Arc::clone(&store), config.lockout.clone());
        let sessions = SessionRegistry::new(store, &config);

        Self {
            credentials: CredentialManager::new(),
            tokens,
            rate_limiter,
            lockout,
            sessions,
            config,
        }
    }

    /// The configuration this gateway was built from.
    #[inline]
    pub fn config(&self) -> &SecurityConfig {
        &self.config
    }

    /// Password hashing and policy validation.
    #[inline]
    pub fn credentials(&self) -> &CredentialManager {
        &self.credentials
    }

    /// Token issuance, verification and revocation.
    #[inline]
    pub fn tokens(&self) -> &TokenService {
        &self.tokens
    }

    /// The sliding-window rate limiter.
    #[inline]
    pub fn rate_limiter(&self) -> &RateLimiter {
        &self.rate_limiter
    }

    /// Failure tracking and address blocking.
    #[inline]
    pub fn lockout(&self) -> &LockoutGuard {
        &self.lockout
    }

    /// The session registry.
    #[inline]
    pub fn sessions(&self) -> &SessionRegistry {
        &self.sessions
    }

    /// Authenticates a bearer token presented from `origin_ip`.
    ///
    /// Runs the lockout check first so a blocked address learns nothing
    /// about token validity, then verifies the token and, when it is
    /// bound to a session, slides that session's idle window.
    pub async fn authenticate(&self, bearer: &str, origin_ip: IpAddr) -> Result<Principal> {
        self.lockout.check(origin_ip).await?;

        let claims = self.tokens.verify(bearer, TokenType::Access).await?;

        if let Some(session_id) = &claims.sid {
            self.sessions.touch(session_id).await?;
        }

        let permissions = claims
            .role
            .map(AccessControl::permissions_for)
            .unwrap_or_default();

        tracing::debug!(
            target: TRACING_TARGET_GATEWAY,
            user_id = claims.sub,
            role = ?claims.role,
            %origin_ip,
            "authenticated principal"
        );

        Ok(Principal {
            user_id: claims.sub,
            role: claims.role,
            permissions,
            session_id: claims.sid,
            token_id: claims.jti,
        })
    }

    /// Checks a principal against a required permission set.
    pub fn authorize(&self, principal: &Principal, required: &[Permission]) -> Result<()> {
        principal.require(required)
    }

    /// Enforces a rate limit, recording the request only when admitted.
    pub async fn rate_limit(
        &self,
        key: &RateLimitKey,
        limit: u32,
        window: Duration,
    ) -> Result<RateLimitDecision> {
        self.rate_limiter.enforce(key, limit, window).await
    }

    /// Enforces the configured per-minute limit for ordinary requests.
    pub async fn rate_limit_default(&self, key: &RateLimitKey) -> Result<RateLimitDecision> {
        self.rate_limit(key, self.config.default_rate_limit, Duration::from_secs(60))
            .await
    }

    /// Enforces the stricter per-minute limit for authentication
    /// operations.
    pub async fn rate_limit_auth(&self, key: &RateLimitKey) -> Result<RateLimitDecision> {
        self.rate_limit(key, self.config.auth_rate_limit, Duration::from_secs(60))
            .await
    }
}
