#![doc = include_str!("../README.md")]
#![deny(missing_docs)]
#![forbid(unsafe_code)]
#![cfg_attr(docsrs, feature(doc_cfg))]

mod turnstile;
pub use turnstile::*;

mod store;
pub use store::*;

mod options;
pub use options::*;

mod rate_limiter;
pub use rate_limiter::*;

mod prediction;
pub use prediction::*;

mod request_log;
pub use request_log::*;

mod admin;
pub use admin::*;

mod pipeline;
pub use pipeline::*;

pub mod response;

pub mod local;

pub mod sql;

#[cfg(feature = "redis-tokio")]
#[cfg_attr(docsrs, doc(cfg(feature = "redis-tokio")))]
pub mod redis;

mod error;
pub use error::*;

mod common;
pub use common::{
    KeyPrefix, MAX_EXPIRY_SECONDS, Prediction, PredictionTtlSeconds, RateCheck, RequestThreshold, StoreTimeoutMs,
    UserId, WindowSizeSeconds,
};

mod runtime;

#[cfg(test)]
mod tests;
