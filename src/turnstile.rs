//! Top-level entrypoint that wires the admission components to the two stores.

use std::sync::Arc;

use crate::{
    AdminView, AdmissionPipeline, FastStore, PredictionResolver, PredictionSource,
    PredictionWarmer, RateLimiter, RequestLogger, TurnstileOptions, common::KeyGenerator,
};

/// Admission-control gateway core.
///
/// Built once at startup from explicit store handles; the handles are shared by
/// every component and by every concurrent request. Dropping the last
/// `Turnstile` (and any component clones) releases them.
///
/// # Startup
///
/// ```no_run
/// # async fn demo(
/// #     fast: std::sync::Arc<dyn turnstile::FastStore>,
/// #     source: std::sync::Arc<dyn turnstile::PredictionSource>,
/// # ) -> Result<(), turnstile::TurnstileError> {
/// use turnstile::{Turnstile, TurnstileOptions};
///
/// let gate = Turnstile::new(TurnstileOptions::default(), fast, source);
///
/// // Fill the prediction cache before accepting traffic.
/// let report = gate.warmer().warm_all().await?;
/// println!("warmed {} predictions", report.warmed);
///
/// let decision = gate.pipeline().admit_header(Some("alice"), "/api/predict").await?;
/// # Ok(())
/// # }
/// ```
pub struct Turnstile {
    options: TurnstileOptions,
    pipeline: AdmissionPipeline,
    warmer: Arc<PredictionWarmer>,
    admin: AdminView,
}

impl Turnstile {
    /// Create a new [`Turnstile`].
    pub fn new(
        options: TurnstileOptions,
        fast: Arc<dyn FastStore>,
        source: Arc<dyn PredictionSource>,
    ) -> Self {
        let keys = KeyGenerator::new(&options.prefix);
        let timeout = options.store_timeout_ms;

        let rate_limiter = RateLimiter::new(fast.clone(), keys.clone(), &options.rate_limit, timeout);
        let resolver = PredictionResolver::new(
            fast.clone(),
            source.clone(),
            keys.clone(),
            &options.prediction,
            timeout,
        );
        let logger = RequestLogger::new(fast.clone(), keys.clone(), &options.request_log, timeout);
        let warmer = Arc::new(PredictionWarmer::new(
            fast.clone(),
            source,
            keys.clone(),
            &options.prediction,
            timeout,
        ));
        let admin = AdminView::new(fast, keys, timeout, options.request_log.read_limit);

        Self {
            options,
            pipeline: AdmissionPipeline::new(rate_limiter, resolver, logger),
            warmer,
            admin,
        }
    }

    /// Per-request admission pipeline.
    pub fn pipeline(&self) -> &AdmissionPipeline {
        &self.pipeline
    }

    /// Prediction cache warmer.
    pub fn warmer(&self) -> &Arc<PredictionWarmer> {
        &self.warmer
    }

    /// Read-only operator view.
    pub fn admin(&self) -> &AdminView {
        &self.admin
    }

    /// Options this instance was built with.
    pub fn options(&self) -> &TurnstileOptions {
        &self.options
    }
}
