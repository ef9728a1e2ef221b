//! # BerthCare API
//!
//! The HTTP surface and domain services. Every request runs the same
//! pipeline: request-id assignment, structured completion logging,
//! authentication, rate limiting, validation, the service call, then
//! cache invalidation. Handlers translate nothing themselves; typed
//! errors flow out of services and the envelope layer turns them into the
//! wire format exactly once.
//!
//! Construction happens in one place ([`state::AppState`]); there is no
//! global runtime state.

pub mod envelope;
pub mod handlers;
pub mod middleware;
pub mod routes;
pub mod services;
pub mod state;
pub mod validation;

pub use routes::app;
pub use state::AppState;
