//! Handler-facing error types and response bodies.
//!
//! Handlers return [`Result`] and convert gateway failures with `?`;
//! the [`From`] impl on [`Error`] fixes the status code, JSON body and
//! response headers for every [`AuthError`] variant.
//!
//! [`AuthError`]: omnidesk_core::AuthError

mod error;
mod response;

pub use crate::handler::error::{Error, ErrorKind, Result};
pub use crate::handler::response::ErrorResponse;
