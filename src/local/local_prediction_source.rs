use async_trait::async_trait;
use dashmap::DashMap;

use crate::{Prediction, PredictionRows, PredictionSource, TurnstileError, UserId};

/// In-memory prediction history.
///
/// Rows are appended per user in any timestamp order; the current prediction is
/// the row with the greatest timestamp, and among rows sharing that timestamp
/// the one appended last.
#[derive(Debug, Default)]
pub struct LocalPredictionSource {
    history: DashMap<UserId, Vec<(i64, bool)>>,
}

impl LocalPredictionSource {
    /// Create an empty history.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one scored row for `user_id`.
    pub fn record(&self, user_id: UserId, timestamp: i64, allowed: bool) {
        self.history
            .entry(user_id)
            .or_default()
            .push((timestamp, allowed));
    }

    /// Number of users with at least one row.
    pub fn user_count(&self) -> usize {
        self.history.len()
    }
}

fn current(rows: &[(i64, bool)]) -> Option<(i64, bool)> {
    rows.iter()
        .copied()
        .fold(None, |best, row| match best {
            Some((timestamp, _)) if timestamp > row.0 => best,
            _ => Some(row),
        })
}

#[async_trait]
impl PredictionSource for LocalPredictionSource {
    async fn latest_prediction(&self, user_id: &UserId) -> Result<Option<bool>, TurnstileError> {
        Ok(self
            .history
            .get(user_id)
            .and_then(|rows| current(&rows))
            .map(|(_, allowed)| allowed))
    }

    async fn latest_predictions(&self) -> Result<PredictionRows, TurnstileError> {
        Ok(self
            .history
            .iter()
            .filter_map(|entry| {
                current(entry.value()).map(|(timestamp, allowed)| {
                    Ok(Prediction {
                        user_id: entry.key().clone(),
                        timestamp,
                        allowed,
                    })
                })
            })
            .collect())
    }
}
