//! # BerthCare Core
//!
//! Shared foundation for the BerthCare server crates:
//!
//! - **`error`**: the closed wire error-code set and the typed `ApiError`
//!   every service returns. The HTTP layer is the only place these are
//!   translated into response envelopes.
//! - **`principal`**: the authenticated identity attached to each request
//!   and the role/zone/ownership predicates applied uniformly, including
//!   on cache hits.
//! - **`config`**: environment-driven configuration assembled once at boot
//!   and passed explicitly; there is no global runtime state.

pub mod config;
pub mod error;
pub mod patch;
pub mod principal;

pub use config::AppConfig;
pub use error::{ApiError, ErrorCode, Result};
pub use patch::Patch;
pub use principal::{Principal, Role};
