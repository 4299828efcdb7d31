#![forbid(unsafe_code)]
#![cfg_attr(docsrs, feature(doc_cfg))]
#![doc = include_str!("../README.md")]

pub mod extract;
pub mod handler;
pub mod middleware;
pub mod service;

/// Token and principal verification on incoming requests.
pub const TRACING_TARGET_AUTHENTICATION: &str = "omnidesk_server::authentication";
/// Permission checks on authenticated principals.
pub const TRACING_TARGET_AUTHORIZATION: &str = "omnidesk_server::authorization";
/// Request throttling decisions.
pub const TRACING_TARGET_RATE_LIMITING: &str = "omnidesk_server::rate_limiting";
