//! Cache-aside access to the upstream allow/block predictions.
//!
//! - [`PredictionResolver`]: per-request lookup, Fast Store first, authoritative
//!   store on miss
//! - [`PredictionWarmer`]: bulk pre-population of the cache at startup (and,
//!   optionally, on an interval)
//!
//! Both write the same key (`<prefix>:prediction:<user>`) with the same TTL.
//! Writes are idempotent overwrites, so the warmer may overlap live traffic.

mod resolver;
pub use resolver::*;

mod warmer;
pub use warmer::*;
