//! Transport-facing response shape.
//!
//! Maps an admission result onto the JSON body and status code the HTTP layer
//! sends back. No server lives in this crate.

use serde::{Deserialize, Serialize};

use crate::{AdmissionDecision, AdmissionOutcome, TurnstileError};

/// JSON body returned to callers: `{"status": "...", "message": "..."}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiResponse {
    /// `"success"` or `"error"`.
    pub status: String,
    /// Human readable explanation.
    pub message: String,
}

impl ApiResponse {
    /// A `"success"` body.
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            status: "success".to_string(),
            message: message.into(),
        }
    }

    /// An `"error"` body.
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            status: "error".to_string(),
            message: message.into(),
        }
    }

    /// Status code and body for a pipeline result.
    ///
    /// - 200: allowed
    /// - 400: validation failure
    /// - 429: rate limited or blocked by prediction
    /// - 500: anything else (store failures included)
    pub fn from_admission(result: &Result<AdmissionDecision, TurnstileError>) -> (u16, Self) {
        match result {
            Ok(decision) => {
                let user_id = &decision.user_id;
                match decision.outcome {
                    AdmissionOutcome::Allowed => (
                        200,
                        Self::success(format!(
                            "Request allowed for user {user_id} (AI allowed=true)"
                        )),
                    ),
                    AdmissionOutcome::RateLimited => (
                        429,
                        Self::error(format!("Rate limit exceeded for user {user_id}")),
                    ),
                    AdmissionOutcome::PredictionBlocked => {
                        (429, Self::error(format!("AI model blocked user {user_id}")))
                    }
                }
            }
            Err(TurnstileError::Validation(message)) => (400, Self::error(message.clone())),
            Err(err) => {
                if !err.is_store_failure() {
                    tracing::error!(error = ?err, "response, unexpected admission error");
                }
                (500, Self::error("Internal server error"))
            }
        }
    }

    /// Body for a request that used the wrong HTTP method.
    pub fn method_not_allowed() -> (u16, Self) {
        (405, Self::error("Only POST allowed"))
    }
}
