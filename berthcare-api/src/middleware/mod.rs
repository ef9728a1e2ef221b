//! The per-request pipeline: request-id scoping and completion logging,
//! bearer authentication, and per-endpoint rate limiting.

pub mod auth;
pub mod context;
pub mod rate_limit;

pub use auth::{AccessToken, require_auth};
pub use context::request_context;
