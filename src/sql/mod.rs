//! SQL-backed [`PredictionSource`](crate::PredictionSource) provider.
//!
//! Reads the prediction history written by the upstream batch job. This crate
//! never writes to it.

mod sql_prediction_source;
pub use sql_prediction_source::*;
