#![forbid(unsafe_code)]
#![cfg_attr(docsrs, feature(doc_cfg))]
#![doc = include_str!("../README.md")]

/// Tracing target for credential hashing and policy checks.
pub const TRACING_TARGET_CREDENTIAL: &str = "omnidesk_core::credential";

/// Tracing target for token issuance, verification and revocation.
pub const TRACING_TARGET_TOKEN: &str = "omnidesk_core::token";

/// Tracing target for rate limiter decisions.
pub const TRACING_TARGET_RATE_LIMIT: &str = "omnidesk_core::rate_limit";

/// Tracing target for lockout tracking.
pub const TRACING_TARGET_LOCKOUT: &str = "omnidesk_core::lockout";

/// Tracing target for session registry operations.
pub const TRACING_TARGET_SESSION: &str = "omnidesk_core::session";

/// Tracing target for the security gateway.
pub const TRACING_TARGET_GATEWAY: &str = "omnidesk_core::gateway";

mod access;
mod config;
mod credential;
mod error;
mod gateway;
mod lockout;
mod rate_limit;
mod session;
mod token;

pub mod store;

pub use access::{AccessControl, Permission, Role};
pub use config::{LockoutConfig, PasswordPolicy, SecurityConfig};
pub use credential::{Credential, CredentialError, CredentialManager, PolicyViolation, StrengthReport};
pub use error::{AuthError, Result, StoreError, StoreResult};
pub use gateway::{Principal, SecurityGateway};
pub use lockout::LockoutGuard;
pub use rate_limit::{RateLimitDecision, RateLimitKey, RateLimiter};
pub use session::{Session, SessionMetadata, SessionRegistry};
pub use store::{MemoryStore, SecurityStore, WindowSnapshot};
pub use token::{IssuedToken, TokenClaims, TokenService, TokenType};
