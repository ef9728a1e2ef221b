//! # BerthCare Cache
//!
//! Redis-backed concerns that are deliberately *advisory*: the cache, the
//! access-token blacklist and the rate limiter. A Redis outage degrades
//! each of them (miss, skip, admit) with a logged warning; it never takes
//! authentication or reads down with it, and the service never serves
//! stale data instead of degrading.
//!
//! Keys are principal-scoped (see [`keys`]): a cache key never spans
//! principals whose authorized view of the same logical query differs.

pub mod blacklist;
pub mod cache;
pub mod keys;
pub mod rate_limit;

pub use blacklist::TokenBlacklist;
pub use cache::Cache;
pub use rate_limit::{RateDecision, RateLimiter, RatePolicy};

use fred::prelude::{Builder, Client, ClientLike, Config};
use std::time::Duration;

/// Redis commands are short metadata operations; anything slower than
/// this is treated as an outage for the request at hand.
pub const COMMAND_TIMEOUT: Duration = Duration::from_millis(200);

/// Build and connect the shared multiplexed client.
pub async fn connect(url: &str) -> Result<Client, fred::error::Error> {
    let config = Config::from_url(url)?;
    let client = Builder::from_config(config)
        .with_performance_config(|perf| {
            perf.default_command_timeout = COMMAND_TIMEOUT;
        })
        .build()?;
    client.init().await?;
    Ok(client)
}

/// Build the client without connecting. Every command fails, which is
/// exactly the degraded state tests exercise.
pub fn connect_lazy(url: &str) -> Result<Client, fred::error::Error> {
    let config = Config::from_url(url)?;
    Builder::from_config(config)
        .with_performance_config(|perf| {
            perf.default_command_timeout = COMMAND_TIMEOUT;
        })
        .build()
}
