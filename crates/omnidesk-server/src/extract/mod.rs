//! Request extractors for the security surface.
//!
//! [`AuthHeader`] pulls the raw bearer token out of the `Authorization`
//! header; [`AuthState`] runs the full gateway authentication chain and
//! yields the resolved principal. Both cache their result in the request
//! extensions so layered middleware and handlers extract them only once.

mod auth_header;
mod auth_state;

pub use crate::extract::auth_header::AuthHeader;
pub use crate::extract::auth_state::AuthState;
