//! Error types for NATS connection and bucket management.

use std::time::Duration;

/// Result type for connection and bucket operations in this crate.
///
/// Store operations themselves return
/// [`StoreResult`](omnidesk_core::StoreResult) so the core's failure
/// policy applies uniformly.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Connection-level error.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Failed to reach or authenticate with the NATS cluster.
    #[error("NATS connection error: {0}")]
    Connection(#[from] async_nats::Error),

    /// Connecting took longer than the configured timeout.
    #[error("connection timed out after {timeout:?}")]
    Timeout { timeout: Duration },

    /// The configuration cannot produce a working client.
    #[error("invalid configuration: {reason}")]
    InvalidConfig { reason: String },

    /// Creating or opening the KV bucket failed.
    #[error("KV bucket '{bucket}' unavailable: {details}")]
    Bucket { bucket: String, details: String },
}

impl Error {
    /// Creates an invalid configuration error.
    pub fn invalid_config(reason: impl Into<String>) -> Self {
        Self::InvalidConfig {
            reason: reason.into(),
        }
    }

    /// Creates a bucket error.
    pub fn bucket(bucket: impl Into<String>, details: impl Into<String>) -> Self {
        Self::Bucket {
            bucket: bucket.into(),
            details: details.into(),
        }
    }
}
