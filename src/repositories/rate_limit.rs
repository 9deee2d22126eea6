use chrono::{Duration, Utc};
use sqlx::MySqlPool;
use uuid::Uuid;

use crate::error::OAuthError;

/// Durable, window-counter backing store for the rate limiter. One row per
/// identifier/endpoint pair; `window_start` resets whenever the previous window has lapsed.
#[derive(Clone)]
pub struct RateLimitRepository {
    pool: MySqlPool,
}

impl RateLimitRepository {
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }

    /// Increments the counter for `identifier`/`endpoint` and returns the count after
    /// incrementing. Starts a fresh window (count = 1) if the previous one has lapsed.
    pub async fn increment(
        &self,
        identifier: &str,
        endpoint: &str,
        window_seconds: i64,
    ) -> Result<i32, OAuthError> {
        let id = Uuid::new_v4();
        let window_start = Utc::now() - Duration::seconds(window_seconds);

        let result = sqlx::query(
            r#"
            UPDATE rate_limit_entries
            SET request_count = request_count + 1
            WHERE identifier = ? AND endpoint = ? AND window_start > ?
            "#,
        )
        .bind(identifier)
        .bind(endpoint)
        .bind(window_start)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() > 0 {
            let count = sqlx::query_scalar::<_, i32>(
                r#"
                SELECT request_count
                FROM rate_limit_entries
                WHERE identifier = ? AND endpoint = ? AND window_start > ?
                "#,
            )
            .bind(identifier)
            .bind(endpoint)
            .bind(window_start)
            .fetch_one(&self.pool)
            .await?;

            return Ok(count);
        }

        sqlx::query("DELETE FROM rate_limit_entries WHERE identifier = ? AND endpoint = ?")
            .bind(identifier)
            .bind(endpoint)
            .execute(&self.pool)
            .await?;

        sqlx::query(
            r#"
            INSERT INTO rate_limit_entries (id, identifier, endpoint, request_count, window_start)
            VALUES (?, ?, ?, 1, NOW())
            "#,
        )
        .bind(id.to_string())
        .bind(identifier)
        .bind(endpoint)
        .execute(&self.pool)
        .await?;

        Ok(1)
    }
}
