//! Security configuration with sensible defaults.

use std::time::Duration;

#[cfg(feature = "config")]
use clap::Args;
use serde::{Deserialize, Serialize};

/// Top-level configuration for the security core.
///
/// Every threshold recognized by the gateway lives here; component
/// constructors take a reference and copy what they need.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "config", derive(Args))]
pub struct SecurityConfig {
    /// Shared secret for token signing (HS256).
    #[cfg_attr(feature = "config", arg(long, env = "SECURITY_SECRET_KEY"))]
    pub secret_key: String,

    /// Access token lifetime in seconds.
    #[cfg_attr(
        feature = "config",
        arg(long, env = "SECURITY_ACCESS_TOKEN_TTL_SECS", default_value_t = SecurityConfig::DEFAULT_ACCESS_TTL_SECS)
    )]
    #[serde(default = "SecurityConfig::default_access_ttl_secs")]
    pub access_token_ttl_secs: u64,

    /// Refresh token lifetime in seconds.
    #[cfg_attr(
        feature = "config",
        arg(long, env = "SECURITY_REFRESH_TOKEN_TTL_SECS", default_value_t = SecurityConfig::DEFAULT_REFRESH_TTL_SECS)
    )]
    #[serde(default = "SecurityConfig::default_refresh_ttl_secs")]
    pub refresh_token_ttl_secs: u64,

    /// Default per-key rate limit (requests per minute).
    #[cfg_attr(
        feature = "config",
        arg(long, env = "SECURITY_DEFAULT_RATE_LIMIT", default_value_t = 100)
    )]
    #[serde(default = "SecurityConfig::default_rate_limit")]
    pub default_rate_limit: u32,

    /// Rate limit for authentication operations (attempts per minute).
    #[cfg_attr(
        feature = "config",
        arg(long, env = "SECURITY_AUTH_RATE_LIMIT", default_value_t = 5)
    )]
    #[serde(default = "SecurityConfig::default_auth_rate_limit")]
    pub auth_rate_limit: u32,

    /// Maximum concurrent sessions per user.
    #[cfg_attr(
        feature = "config",
        arg(long, env = "SECURITY_MAX_CONCURRENT_SESSIONS", default_value_t = 3)
    )]
    #[serde(default = "SecurityConfig::default_max_sessions")]
    pub max_concurrent_sessions: usize,

    /// Session idle timeout in seconds.
    #[cfg_attr(
        feature = "config",
        arg(long, env = "SECURITY_SESSION_IDLE_TIMEOUT_SECS", default_value_t = 3600)
    )]
    #[serde(default = "SecurityConfig::default_session_idle_secs")]
    pub session_idle_timeout_secs: u64,

    /// Password policy thresholds.
    #[cfg_attr(feature = "config", command(flatten))]
    #[serde(default)]
    pub password_policy: PasswordPolicy,

    /// Progressive lockout thresholds.
    #[cfg_attr(feature = "config", command(flatten))]
    #[serde(default)]
    pub lockout: LockoutConfig,
}

impl SecurityConfig {
    const DEFAULT_ACCESS_TTL_SECS: u64 = 30 * 60;
    const DEFAULT_REFRESH_TTL_SECS: u64 = 7 * 24 * 60 * 60;

    /// Creates a configuration with the given signing secret and defaults
    /// for everything else.
    pub fn new(secret_key: impl Into<String>) -> Self {
        Self {
            secret_key: secret_key.into(),
            access_token_ttl_secs: Self::DEFAULT_ACCESS_TTL_SECS,
            refresh_token_ttl_secs: Self::DEFAULT_REFRESH_TTL_SECS,
            default_rate_limit: 100,
            auth_rate_limit: 5,
            max_concurrent_sessions: 3,
            session_idle_timeout_secs: 3600,
            password_policy: PasswordPolicy::default(),
            lockout: LockoutConfig::default(),
        }
    }

    /// Returns the access token lifetime as a [`Duration`].
    #[inline]
    pub const fn access_token_ttl(&self) -> Duration {
        Duration::from_secs(self.access_token_ttl_secs)
    }

    /// Returns the refresh token lifetime as a [`Duration`].
    #[inline]
    pub const fn refresh_token_ttl(&self) -> Duration {
        Duration::from_secs(self.refresh_token_ttl_secs)
    }

    /// Returns the session idle timeout as a [`Duration`].
    #[inline]
    pub const fn session_idle_timeout(&self) -> Duration {
        Duration::from_secs(self.session_idle_timeout_secs)
    }

    fn default_access_ttl_secs() -> u64 {
        Self::DEFAULT_ACCESS_TTL_SECS
    }

    fn default_refresh_ttl_secs() -> u64 {
        Self::DEFAULT_REFRESH_TTL_SECS
    }

    fn default_rate_limit() -> u32 {
        100
    }

    fn default_auth_rate_limit() -> u32 {
        5
    }

    fn default_max_sessions() -> usize {
        3
    }

    fn default_session_idle_secs() -> u64 {
        3600
    }
}

/// Password policy thresholds.
///
/// Each check is evaluated independently so that strength validation can
/// report every violation at once.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "config", derive(Args))]
pub struct PasswordPolicy {
    /// Minimum password length.
    #[cfg_attr(
        feature = "config",
        arg(long, env = "SECURITY_PASSWORD_MIN_LENGTH", default_value_t = 8)
    )]
    #[serde(default = "PasswordPolicy::default_min_length")]
    pub min_length: usize,

    /// Require at least one uppercase letter.
    #[cfg_attr(
        feature = "config",
        arg(long, env = "SECURITY_PASSWORD_REQUIRE_UPPERCASE", default_value_t = true)
    )]
    #[serde(default = "PasswordPolicy::default_true")]
    pub require_uppercase: bool,

    /// Require at least one lowercase letter.
    #[cfg_attr(
        feature = "config",
        arg(long, env = "SECURITY_PASSWORD_REQUIRE_LOWERCASE", default_value_t = true)
    )]
    #[serde(default = "PasswordPolicy::default_true")]
    pub require_lowercase: bool,

    /// Require at least one decimal digit.
    #[cfg_attr(
        feature = "config",
        arg(long, env = "SECURITY_PASSWORD_REQUIRE_DIGIT", default_value_t = true)
    )]
    #[serde(default = "PasswordPolicy::default_true")]
    pub require_digit: bool,

    /// Require at least one special character.
    #[cfg_attr(
        feature = "config",
        arg(long, env = "SECURITY_PASSWORD_REQUIRE_SPECIAL", default_value_t = true)
    )]
    #[serde(default = "PasswordPolicy::default_true")]
    pub require_special: bool,
}

impl PasswordPolicy {
    fn default_min_length() -> usize {
        8
    }

    fn default_true() -> bool {
        true
    }
}

impl Default for PasswordPolicy {
    fn default() -> Self {
        Self {
            min_length: 8,
            require_uppercase: true,
            require_lowercase: true,
            require_digit: true,
            require_special: true,
        }
    }
}

/// Progressive lockout thresholds.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "config", derive(Args))]
pub struct LockoutConfig {
    /// Failures within the window before a block is written.
    #[cfg_attr(
        feature = "config",
        arg(long, env = "SECURITY_LOCKOUT_FAILURE_THRESHOLD", default_value_t = 5)
    )]
    #[serde(default = "LockoutConfig::default_threshold")]
    pub failure_threshold: u64,

    /// Rolling window after which an idle failure counter resets, in seconds.
    #[cfg_attr(
        feature = "config",
        arg(long, env = "SECURITY_LOCKOUT_FAILURE_WINDOW_SECS", default_value_t = 3600)
    )]
    #[serde(default = "LockoutConfig::default_window_secs")]
    pub failure_window_secs: u64,

    /// Block duration unit multiplied by the failure count, in seconds.
    #[cfg_attr(
        feature = "config",
        arg(long, env = "SECURITY_LOCKOUT_BASE_BLOCK_UNIT_SECS", default_value_t = 60)
    )]
    #[serde(default = "LockoutConfig::default_base_unit_secs")]
    pub base_block_unit_secs: u64,

    /// Upper bound on any single block duration, in seconds.
    #[cfg_attr(
        feature = "config",
        arg(long, env = "SECURITY_LOCKOUT_MAX_BLOCK_SECS", default_value_t = 3600)
    )]
    #[serde(default = "LockoutConfig::default_max_block_secs")]
    pub max_block_secs: u64,
}

impl LockoutConfig {
    /// Returns the rolling failure window as a [`Duration`].
    #[inline]
    pub const fn failure_window(&self) -> Duration {
        Duration::from_secs(self.failure_window_secs)
    }

    /// Computes the block duration for the given failure count,
    /// capped at the configured maximum.
    #[must_use]
    pub fn block_duration(&self, failure_count: u64) -> Duration {
        let secs = failure_count
            .saturating_mul(self.base_block_unit_secs)
            .min(self.max_block_secs);
        Duration::from_secs(secs)
    }

    fn default_threshold() -> u64 {
        5
    }

    fn default_window_secs() -> u64 {
        3600
    }

    fn default_base_unit_secs() -> u64 {
        60
    }

    fn default_max_block_secs() -> u64 {
        3600
    }
}

impl Default for LockoutConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            failure_window_secs: 3600,
            base_block_unit_secs: 60,
            max_block_secs: 3600,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn block_duration_grows_and_caps() {
        let lockout = LockoutConfig::default();
        assert_eq!(lockout.block_duration(5), Duration::from_secs(300));
        assert_eq!(lockout.block_duration(10), Duration::from_secs(600));
        // 120 * 60s would be two hours; capped at one.
        assert_eq!(lockout.block_duration(120), Duration::from_secs(3600));
    }

    #[test]
    fn config_defaults_roundtrip_through_serde() -> anyhow::Result<()> {
        let config: SecurityConfig = serde_json::from_str(r#"{"secret_key": "s3cret"}"#)?;
        assert_eq!(config.access_token_ttl(), Duration::from_secs(1800));
        assert_eq!(config.max_concurrent_sessions, 3);
        assert_eq!(config.lockout.failure_threshold, 5);
        assert!(config.password_policy.require_special);
        Ok(())
    }
}
