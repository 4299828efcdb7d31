//! Middleware for `axum::Router`.
//!
//! Authentication middleware rejects requests without a valid principal
//! before they reach a handler; rate-limiting middleware throttles by
//! client address with the gateway's sliding windows.

mod authentication;
mod rate_limiting;

pub use crate::middleware::authentication::{RouterAuthExt, require_authentication};
pub use crate::middleware::rate_limiting::{rate_limit_auth, rate_limit_by_ip};
