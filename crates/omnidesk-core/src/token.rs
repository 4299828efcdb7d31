//! Signed token issuance, verification and revocation.
//!
//! Tokens are HS256 JWTs carrying a unique `jti` so individual tokens can
//! be revoked before expiry. Revocation markers live in the shared store
//! under `revocation:{jti}` with a TTL equal to the token's remaining
//! lifetime, so they expire exactly when the token would have.
//!
//! Verification is fail-closed: if the store cannot answer the revocation
//! check, the token is rejected.

use std::sync::Arc;
use std::time::Duration;

use jiff::Timestamp;
use jsonwebtoken::errors::ErrorKind as JwtErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::access::Role;
use crate::config::SecurityConfig;
use crate::error::{AuthError, Result};
use crate::store::SecurityStore;
use crate::TRACING_TARGET_TOKEN;

/// Distinguishes short-lived access tokens from long-lived refresh tokens.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    strum::AsRefStr,
    strum::IntoStaticStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum TokenType {
    /// Short-lived, presented on every request.
    Access,
    /// Long-lived, exchanged for new access tokens.
    Refresh,
}

/// JWT claims for authentication tokens.
///
/// Registered claim timestamps are unix seconds so the signature library
/// can validate expiry natively.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenClaims {
    /// Subject, the authenticated user id.
    pub sub: String,
    /// Expiration time as unix seconds.
    pub exp: i64,
    /// Issued-at as unix seconds.
    pub iat: i64,
    /// Unique token id, the revocation handle.
    pub jti: Uuid,
    /// Access or refresh.
    #[serde(rename = "type")]
    pub token_type: TokenType,
    /// Role granted to the subject, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<Role>,
    /// Session this token is bound to, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sid: Option<String>,
}

impl TokenClaims {
    /// Returns the expiration as a timestamp.
    ///
    /// Claims are only constructed from in-range timestamps, so an
    /// out-of-range `exp` falls back to the epoch (already expired).
    #[must_use]
    pub fn expires_at(&self) -> Timestamp {
        Timestamp::from_second(self.exp).unwrap_or(Timestamp::UNIX_EPOCH)
    }

    /// Remaining lifetime from now, or zero if already expired.
    #[must_use]
    pub fn remaining_lifetime(&self) -> Duration {
        let remaining = self.exp - Timestamp::now().as_second();
        Duration::from_secs(remaining.max(0) as u64)
    }
}

/// A freshly issued token together with the claims embedded in it.
#[derive(Debug, Clone)]
pub struct IssuedToken {
    /// The signed compact JWT.
    pub token: String,
    /// Claims as encoded, including the generated `jti`.
    pub claims: TokenClaims,
}

/// Symmetric signing key pair.
///
/// Held as a pair so a future migration to asymmetric or rotated keys
/// only touches this struct.
struct SigningKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
}

impl SigningKeys {
    fn from_secret(secret: &str) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
        }
    }
}

/// Issues, verifies and revokes signed tokens.
pub struct TokenService {
    keys: SigningKeys,
    store: Arc<dyn SecurityStore>,
    access_ttl: Duration,
    refresh_ttl: Duration,
}

impl TokenService {
    const REVOCATION_PREFIX: &str = "revocation";

    /// Creates a token service signing with the configured shared secret.
    pub fn new(config: &SecurityConfig, store: Arc<dyn SecurityStore>) -> Self {
        Self {
            keys: SigningKeys::from_secret(&config.secret_key),
            store,
            access_ttl: config.access_token_ttl(),
            refresh_ttl: config.refresh_token_ttl(),
        }
    }

    fn revocation_key(jti: &Uuid) -> String {
        format!("{}:{jti}", Self::REVOCATION_PREFIX)
    }

    fn ttl_for(&self, token_type: TokenType) -> Duration {
        match token_type {
            TokenType::Access => self.access_ttl,
            TokenType::Refresh => self.refresh_ttl,
        }
    }

    /// Issues a signed token for the given subject.
    ///
    /// Every call generates a fresh `jti`, so two tokens for the same
    /// subject are always independently revocable.
    ///
    /// # Errors
    ///
    /// Fails only if the signing primitive fails, which is reported as a
    /// store outage since the caller cannot act on the distinction.
    pub fn issue(
        &self,
        subject: &str,
        role: Option<Role>,
        token_type: TokenType,
    ) -> Result<IssuedToken> {
        self.issue_bound(subject, role, token_type, None)
    }

    /// Issues a token bound to a session, so presenting it also requires
    /// that session to still be live.
    pub fn issue_bound(
        &self,
        subject: &str,
        role: Option<Role>,
        token_type: TokenType,
        session_id: Option<String>,
    ) -> Result<IssuedToken> {
        let now = Timestamp::now().as_second();
        let ttl = self.ttl_for(token_type);
        let claims = TokenClaims {
            sub: subject.to_owned(),
            exp: now + ttl.as_secs() as i64,
            iat: now,
            jti: Uuid::new_v4(),
            token_type,
            role,
            sid: session_id,
        };

        let token = encode(&Header::new(Algorithm::HS256), &claims, &self.keys.encoding)
            .map_err(|error| {
                tracing::error!(
                    target: TRACING_TARGET_TOKEN,
                    error = %error,
                    subject,
                    "failed to encode token"
                );
                AuthError::StoreUnavailable
            })?;

        tracing::debug!(
            target: TRACING_TARGET_TOKEN,
            subject,
            jti = %claims.jti,
            token_type = token_type.as_ref(),
            "issued token"
        );

        Ok(IssuedToken { token, claims })
    }

    /// Verifies a token's signature, expiry, type and revocation status.
    ///
    /// # Errors
    ///
    /// * [`AuthError::TokenExpired`] when past `exp`
    /// * [`AuthError::TokenMalformed`] for any other signature or claims
    ///   defect
    /// * [`AuthError::TokenWrongType`] when the type claim does not match
    ///   `expected`
    /// * [`AuthError::TokenRevoked`] when a revocation marker exists
    /// * [`AuthError::StoreUnavailable`] when the revocation check cannot
    ///   be performed
    pub async fn verify(&self, token: &str, expected: TokenType) -> Result<TokenClaims> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        validation.validate_aud = false;
        validation.set_required_spec_claims(&["sub", "exp", "iat", "jti"]);

        let data = decode::<TokenClaims>(token, &self.keys.decoding, &validation).map_err(
            |error| match error.kind() {
                JwtErrorKind::ExpiredSignature => AuthError::TokenExpired,
                _ => {
                    tracing::debug!(
                        target: TRACING_TARGET_TOKEN,
                        error = %error,
                        "token failed validation"
                    );
                    AuthError::TokenMalformed
                }
            },
        )?;
        let claims = data.claims;

        if claims.token_type != expected {
            tracing::warn!(
                target: TRACING_TARGET_TOKEN,
                jti = %claims.jti,
                presented = claims.token_type.as_ref(),
                expected = expected.as_ref(),
                "token type mismatch"
            );
            return Err(AuthError::TokenWrongType);
        }

        // Fail-closed: a store error propagates instead of admitting the
        // token unchecked.
        let marker = self.store.get(&Self::revocation_key(&claims.jti)).await?;
        if marker.is_some() {
            tracing::warn!(
                target: TRACING_TARGET_TOKEN,
                jti = %claims.jti,
                subject = claims.sub,
                "rejected revoked token"
            );
            return Err(AuthError::TokenRevoked);
        }

        Ok(claims)
    }

    /// Revokes a token for the remainder of its lifetime.
    ///
    /// The token's signature must be valid, but an already-expired token
    /// revokes as a no-op since it can no longer be presented.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::TokenMalformed`] for an unparseable token and
    /// [`AuthError::StoreUnavailable`] when the marker cannot be written.
    pub async fn revoke(&self, token: &str) -> Result<()> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        validation.validate_exp = false;
        validation.validate_aud = false;
        validation.set_required_spec_claims(&["sub", "exp", "iat", "jti"]);

        let data = decode::<TokenClaims>(token, &self.keys.decoding, &validation)
            .map_err(|_| AuthError::TokenMalformed)?;
        let claims = data.claims;

        let remaining = claims.remaining_lifetime();
        if remaining.is_zero() {
            tracing::debug!(
                target: TRACING_TARGET_TOKEN,
                jti = %claims.jti,
                "token already expired, nothing to revoke"
            );
            return Ok(());
        }

        self.store
            .put(&Self::revocation_key(&claims.jti), vec![1], remaining)
            .await?;

        tracing::info!(
            target: TRACING_TARGET_TOKEN,
            jti = %claims.jti,
            subject = claims.sub,
            ttl_secs = remaining.as_secs(),
            "revoked token"
        );
        Ok(())
    }

    /// Revokes by token id directly, for callers that already hold
    /// verified claims.
    pub async fn revoke_id(&self, jti: &Uuid, remaining: Duration) -> Result<()> {
        if remaining.is_zero() {
            return Ok(());
        }
        self.store
            .put(&Self::revocation_key(jti), vec![1], remaining)
            .await?;
        Ok(())
    }
}

impl std::fmt::Debug for TokenService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenService")
            .field("access_ttl", &self.access_ttl)
            .field("refresh_ttl", &self.refresh_ttl)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use crate::store::testing::FailingStore;

    fn test_config() -> SecurityConfig {
        SecurityConfig::new("unit-test-secret")
    }

    fn service_with(store: Arc<dyn SecurityStore>) -> TokenService {
        TokenService::new(&test_config(), store)
    }

    #[tokio::test]
    async fn issue_then_verify_access_token() -> anyhow::Result<()> {
        let service = service_with(Arc::new(MemoryStore::new()));

        let issued = service.issue("user-7", Some(Role::Agent), TokenType::Access)?;
        let claims = service.verify(&issued.token, TokenType::Access).await?;

        assert_eq!(claims, issued.claims);
        assert_eq!(claims.sub, "user-7");
        assert_eq!(claims.role, Some(Role::Agent));
        assert!(claims.exp > claims.iat);
        Ok(())
    }

    #[tokio::test]
    async fn refresh_token_rejected_where_access_expected() -> anyhow::Result<()> {
        let service = service_with(Arc::new(MemoryStore::new()));

        let issued = service.issue("user-7", None, TokenType::Refresh)?;
        let error = service
            .verify(&issued.token, TokenType::Access)
            .await
            .unwrap_err();

        assert_eq!(error, AuthError::TokenWrongType);
        Ok(())
    }

    #[tokio::test]
    async fn expired_token_is_reported_as_expired() -> anyhow::Result<()> {
        let service = service_with(Arc::new(MemoryStore::new()));

        let now = Timestamp::now().as_second();
        let claims = TokenClaims {
            sub: "user-7".to_owned(),
            exp: now - 10,
            iat: now - 100,
            jti: Uuid::new_v4(),
            token_type: TokenType::Access,
            role: None,
            sid: None,
        };
        let token = encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(b"unit-test-secret"),
        )?;

        let error = service.verify(&token, TokenType::Access).await.unwrap_err();
        assert_eq!(error, AuthError::TokenExpired);
        Ok(())
    }

    #[tokio::test]
    async fn tampered_token_is_malformed() -> anyhow::Result<()> {
        let service = service_with(Arc::new(MemoryStore::new()));

        let issued = service.issue("user-7", None, TokenType::Access)?;
        let mut tampered = issued.token.clone();
        // Flip the final signature character.
        let last = if tampered.ends_with('A') { 'B' } else { 'A' };
        tampered.pop();
        tampered.push(last);

        let error = service
            .verify(&tampered, TokenType::Access)
            .await
            .unwrap_err();
        assert_eq!(error, AuthError::TokenMalformed);
        Ok(())
    }

    #[tokio::test]
    async fn wrong_secret_is_malformed() -> anyhow::Result<()> {
        let issuer = service_with(Arc::new(MemoryStore::new()));
        let mut other_config = test_config();
        other_config.secret_key = "a different secret".to_owned();
        let verifier = TokenService::new(&other_config, Arc::new(MemoryStore::new()));

        let issued = issuer.issue("user-7", None, TokenType::Access)?;
        let error = verifier
            .verify(&issued.token, TokenType::Access)
            .await
            .unwrap_err();
        assert_eq!(error, AuthError::TokenMalformed);
        Ok(())
    }

    #[tokio::test]
    async fn revoked_token_is_rejected_until_expiry() -> anyhow::Result<()> {
        let service = service_with(Arc::new(MemoryStore::new()));

        let issued = service.issue("user-7", None, TokenType::Access)?;
        service.verify(&issued.token, TokenType::Access).await?;

        service.revoke(&issued.token).await?;
        let error = service
            .verify(&issued.token, TokenType::Access)
            .await
            .unwrap_err();
        assert_eq!(error, AuthError::TokenRevoked);
        Ok(())
    }

    #[tokio::test]
    async fn revoking_one_token_leaves_siblings_valid() -> anyhow::Result<()> {
        let service = service_with(Arc::new(MemoryStore::new()));

        let first = service.issue("user-7", None, TokenType::Access)?;
        let second = service.issue("user-7", None, TokenType::Access)?;
        assert_ne!(first.claims.jti, second.claims.jti);

        service.revoke(&first.token).await?;
        assert!(service.verify(&first.token, TokenType::Access).await.is_err());
        assert!(service.verify(&second.token, TokenType::Access).await.is_ok());
        Ok(())
    }

    #[tokio::test]
    async fn revocation_check_fails_closed_on_store_outage() -> anyhow::Result<()> {
        let healthy = service_with(Arc::new(MemoryStore::new()));
        let issued = healthy.issue("user-7", None, TokenType::Access)?;

        let degraded = service_with(Arc::new(FailingStore));
        let error = degraded
            .verify(&issued.token, TokenType::Access)
            .await
            .unwrap_err();
        assert_eq!(error, AuthError::StoreUnavailable);
        Ok(())
    }
}
