//! Redis-backed [`FastStore`](crate::FastStore) provider.
//!
//! Enables several gateway instances to share per-user rate counters, cached
//! predictions and the request log.

mod client;
pub use client::*;

mod redis_fast_store;
pub use redis_fast_store::*;
