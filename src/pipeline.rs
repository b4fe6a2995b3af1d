use std::fmt;

use serde::Serialize;

use crate::{PredictionResolver, RateLimiter, RequestLogger, TurnstileError, UserId};

/// Progress of one request through the pipeline.
///
/// `Received → RateChecked → PredictionResolved → Logged → Decided`. A
/// rate-limited request skips `PredictionResolved`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AdmissionStage {
    /// The request entered the pipeline.
    Received,
    /// The rate counter was incremented.
    RateChecked,
    /// The user's prediction was resolved.
    PredictionResolved,
    /// The decision was written (or failed to be written) to the request log.
    Logged,
    /// The decision was returned.
    Decided,
}

impl fmt::Display for AdmissionStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AdmissionStage::Received => "received",
            AdmissionStage::RateChecked => "rate_checked",
            AdmissionStage::PredictionResolved => "prediction_resolved",
            AdmissionStage::Logged => "logged",
            AdmissionStage::Decided => "decided",
        };
        f.write_str(name)
    }
}

/// Terminal, non-error outcome of an admission check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AdmissionOutcome {
    /// Under the rate limit and predicted allowed.
    Allowed,
    /// Over the per-window threshold. The prediction was not consulted.
    RateLimited,
    /// Under the rate limit but predicted blocked.
    PredictionBlocked,
}

impl AdmissionOutcome {
    /// `true` only for [`AdmissionOutcome::Allowed`].
    pub fn is_allowed(&self) -> bool {
        matches!(self, AdmissionOutcome::Allowed)
    }
}

/// Result of a completed admission check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdmissionDecision {
    /// Requesting user.
    pub user_id: UserId,
    /// Final outcome.
    pub outcome: AdmissionOutcome,
    /// Post-increment request count in the user's current window.
    pub request_count: u64,
    /// `false` when the request-log write failed. The outcome is unaffected.
    pub logged: bool,
}

/// Per-request orchestration: rate limiter, then prediction, then request log.
///
/// # Flow
///
/// 1. Increment the user's rate counter. Over the threshold: log a blocked
///    decision and return [`AdmissionOutcome::RateLimited`] without looking at
///    the prediction.
/// 2. Resolve the prediction. Any error ends the request with that error;
///    no decision is guessed.
/// 3. Log the decision. A log failure is warned about and reflected in
///    [`AdmissionDecision::logged`] only.
/// 4. Return [`AdmissionOutcome::Allowed`] or
///    [`AdmissionOutcome::PredictionBlocked`].
///
/// The pipeline holds no per-request state; one instance serves every
/// concurrent request.
#[derive(Clone)]
pub struct AdmissionPipeline {
    rate_limiter: RateLimiter,
    resolver: PredictionResolver,
    logger: RequestLogger,
}

impl AdmissionPipeline {
    pub(crate) fn new(
        rate_limiter: RateLimiter,
        resolver: PredictionResolver,
        logger: RequestLogger,
    ) -> Self {
        Self {
            rate_limiter,
            resolver,
            logger,
        }
    }

    /// Decide whether `user_id` may call `endpoint`.
    pub async fn admit(
        &self,
        user_id: &UserId,
        endpoint: &str,
    ) -> Result<AdmissionDecision, TurnstileError> {
        tracing::trace!(user_id = %user_id, endpoint, stage = %AdmissionStage::Received, "admission");

        let rate = self
            .rate_limiter
            .check_and_increment(user_id)
            .await
            .inspect_err(|err| {
                tracing::error!(user_id = %user_id, stage = %AdmissionStage::Received, error = ?err, "admission.error, rate check failed");
            })?;
        tracing::trace!(user_id = %user_id, count = rate.count, stage = %AdmissionStage::RateChecked, "admission");

        let outcome = if rate.limit_exceeded {
            AdmissionOutcome::RateLimited
        } else {
            let allowed = self.resolver.resolve(user_id).await.inspect_err(|err| {
                tracing::error!(user_id = %user_id, stage = %AdmissionStage::RateChecked, error = ?err, "admission.error, prediction lookup failed");
            })?;
            tracing::trace!(user_id = %user_id, allowed, stage = %AdmissionStage::PredictionResolved, "admission");

            if allowed {
                AdmissionOutcome::Allowed
            } else {
                AdmissionOutcome::PredictionBlocked
            }
        };

        let logged = match self
            .logger
            .record(user_id, endpoint, outcome.is_allowed())
            .await
        {
            Ok(()) => true,
            Err(err) => {
                tracing::warn!(user_id = %user_id, endpoint, error = ?err, "admission.log.error, failed to record decision");
                false
            }
        };
        tracing::trace!(user_id = %user_id, logged, stage = %AdmissionStage::Logged, "admission");

        tracing::debug!(user_id = %user_id, outcome = ?outcome, count = rate.count, stage = %AdmissionStage::Decided, "admission");

        Ok(AdmissionDecision {
            user_id: user_id.clone(),
            outcome,
            request_count: rate.count,
            logged,
        })
    } // end method admit

    /// [`admit`](AdmissionPipeline::admit) for a raw identity header value.
    ///
    /// A missing or invalid header is a [`TurnstileError::Validation`]; no
    /// store is touched.
    pub async fn admit_header(
        &self,
        user_header: Option<&str>,
        endpoint: &str,
    ) -> Result<AdmissionDecision, TurnstileError> {
        let user_id = UserId::from_header(user_header)?;
        self.admit(&user_id, endpoint).await
    }

    /// The rate limiter used by this pipeline.
    pub fn rate_limiter(&self) -> &RateLimiter {
        &self.rate_limiter
    }

    /// The prediction resolver used by this pipeline.
    pub fn resolver(&self) -> &PredictionResolver {
        &self.resolver
    }

    /// The request logger used by this pipeline.
    pub fn logger(&self) -> &RequestLogger {
        &self.logger
    }
}
