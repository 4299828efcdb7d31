#![forbid(unsafe_code)]
#![cfg_attr(docsrs, feature(doc_cfg))]
#![doc = include_str!("../README.md")]

/// Tracing target for NATS connection establishment and lifecycle.
pub const TRACING_TARGET_CONNECTION: &str = "omnidesk_nats::connection";

/// Tracing target for security store operations against the KV bucket.
pub const TRACING_TARGET_STORE: &str = "omnidesk_nats::store";

mod client;
mod error;
mod store;

pub use client::{NatsClient, NatsConfig};
pub use error::{Error, Result};
pub use store::NatsSecurityStore;
