//! In-process store provider.
//!
//! The local provider keeps all state inside the current process using
//! thread-safe data structures ([`DashMap`](dashmap::DashMap)).
//!
//! # Key Characteristics
//!
//! - **Thread-safe:** Safe for concurrent use across tasks and threads
//! - **Zero external dependencies:** No network or database required
//! - **Process-scoped:** Counters, cached predictions and the request log are
//!   not shared across processes and do not survive restarts
//!
//! # When to Use
//!
//! ✅ **Use local provider when:**
//! - Running a single gateway instance
//! - Writing tests or benchmarks for the admission pipeline
//!
//! ❌ **Don't use local provider when:**
//! - Several gateway instances must share per-user limits
//! - Admin tooling in another process needs to read the request log
//!
//! # Examples
//!
//! ```no_run
//! # async fn demo() -> Result<(), turnstile::TurnstileError> {
//! use std::sync::Arc;
//! use turnstile::{Turnstile, TurnstileOptions, UserId};
//! use turnstile::local::{LocalFastStore, LocalPredictionSource};
//!
//! let predictions = Arc::new(LocalPredictionSource::new());
//! predictions.record(UserId::try_from("alice")?, 1_700_000_000_000, true);
//!
//! let gate = Turnstile::new(
//!     TurnstileOptions::default(),
//!     Arc::new(LocalFastStore::new()),
//!     predictions,
//! );
//!
//! let decision = gate.pipeline().admit(&UserId::try_from("alice")?, "/api/predict").await?;
//! assert!(decision.outcome.is_allowed());
//! # Ok(())
//! # }
//! ```

mod local_fast_store;
pub use local_fast_store::*;

mod local_prediction_source;
pub use local_prediction_source::*;
