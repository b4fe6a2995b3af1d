use std::time::Duration;

use async_trait::async_trait;
use sqlx::{Row, SqlitePool, sqlite::SqlitePoolOptions, sqlite::SqliteRow};

use crate::{Prediction, PredictionRows, PredictionSource, TurnstileError, UserId};

/// Connection and schema options for [`SqlPredictionSource`].
#[derive(Clone, Debug)]
pub struct SqlPredictionSourceOptions {
    /// Table holding `(user_id, timestamp, predicted_allowed)` rows.
    ///
    /// Must be a plain identifier (ASCII letters, digits, `_`).
    pub table: String,
    /// Upper bound on pooled connections.
    pub max_connections: u32,
    /// How long to wait for a pooled connection before failing.
    pub acquire_timeout: Duration,
}

impl Default for SqlPredictionSourceOptions {
    fn default() -> Self {
        Self {
            table: "predictions".to_string(),
            max_connections: 5,
            acquire_timeout: Duration::from_secs(3),
        }
    }
}

/// Prediction history stored in a SQL table.
///
/// Expected schema:
///
/// ```sql
/// CREATE TABLE predictions (
///     user_id           TEXT    NOT NULL,
///     timestamp         INTEGER NOT NULL, -- unix milliseconds
///     predicted_allowed BOOLEAN NOT NULL
/// );
/// ```
///
/// The current prediction is the row with the greatest `timestamp` for the
/// user; ties go to the row inserted last.
#[derive(Clone, Debug)]
pub struct SqlPredictionSource {
    pool: SqlitePool,
    latest_query: String,
    bulk_query: String,
}

fn validate_table(table: &str) -> Result<(), TurnstileError> {
    let valid = !table.is_empty()
        && table.len() <= 128
        && table
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_')
        && !table.starts_with(|c: char| c.is_ascii_digit());

    if valid {
        Ok(())
    } else {
        Err(TurnstileError::InvalidConfig(format!(
            "invalid prediction table name {table:?}"
        )))
    }
}

impl SqlPredictionSource {
    /// Open a pool against `url` (for example `sqlite://predictions.db`).
    pub async fn connect(
        url: &str,
        options: SqlPredictionSourceOptions,
    ) -> Result<Self, TurnstileError> {
        validate_table(&options.table)?;

        let pool = SqlitePoolOptions::new()
            .max_connections(options.max_connections)
            .acquire_timeout(options.acquire_timeout)
            .connect(url)
            .await?;

        Self::from_pool(pool, &options.table)
    }

    /// Wrap an existing pool.
    pub fn from_pool(pool: SqlitePool, table: &str) -> Result<Self, TurnstileError> {
        validate_table(table)?;

        let latest_query = format!(
            "SELECT predicted_allowed FROM {table} \
             WHERE user_id = ? \
             ORDER BY timestamp DESC, rowid DESC \
             LIMIT 1"
        );

        let bulk_query = format!(
            "SELECT p.user_id, p.timestamp, p.predicted_allowed FROM {table} p \
             WHERE p.timestamp = ( \
                 SELECT MAX(p2.timestamp) FROM {table} p2 WHERE p2.user_id = p.user_id \
             ) \
             ORDER BY p.user_id, p.rowid"
        );

        Ok(Self {
            pool,
            latest_query,
            bulk_query,
        })
    }

    /// Underlying pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Close every pooled connection. Further queries fail.
    pub async fn close(&self) {
        self.pool.close().await;
    }
}

fn decode_row(row: &SqliteRow) -> Result<Prediction, TurnstileError> {
    let user_id: String = row
        .try_get("user_id")
        .map_err(|err| TurnstileError::DataIntegrity(format!("bad user_id column: {err}")))?;
    let timestamp: i64 = row
        .try_get("timestamp")
        .map_err(|err| TurnstileError::DataIntegrity(format!("bad timestamp column: {err}")))?;
    let allowed: bool = row.try_get("predicted_allowed").map_err(|err| {
        TurnstileError::DataIntegrity(format!("bad predicted_allowed column: {err}"))
    })?;

    let user_id = UserId::try_from(user_id)
        .map_err(|err| TurnstileError::DataIntegrity(format!("bad user_id value: {err}")))?;

    Ok(Prediction {
        user_id,
        timestamp,
        allowed,
    })
}

#[async_trait]
impl PredictionSource for SqlPredictionSource {
    async fn latest_prediction(&self, user_id: &UserId) -> Result<Option<bool>, TurnstileError> {
        let row = sqlx::query(&self.latest_query)
            .bind(user_id.as_str())
            .fetch_optional(&self.pool)
            .await?;

        match row {
            None => Ok(None),
            Some(row) => row.try_get::<bool, _>("predicted_allowed").map(Some).map_err(|err| {
                TurnstileError::DataIntegrity(format!("bad predicted_allowed column: {err}"))
            }),
        }
    }

    async fn latest_predictions(&self) -> Result<PredictionRows, TurnstileError> {
        let rows = sqlx::query(&self.bulk_query)
            .fetch_all(&self.pool)
            .await?;

        Ok(rows.iter().map(decode_row).collect())
    }
}
