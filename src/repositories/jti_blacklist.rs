use chrono::{DateTime, Utc};
use sqlx::MySqlPool;

use crate::error::OAuthError;

/// Authoritative JWT-ID revocation list consulted by every token verification. A JTI
/// is blacklisted the moment its token is revoked, by rotation, by consent revocation, or by
/// reuse-detection cascade; this table is the only source of truth for "is this token dead".
#[derive(Clone)]
pub struct JtiBlacklistRepository {
    pool: MySqlPool,
}

impl JtiBlacklistRepository {
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }

    /// Idempotent: blacklisting an already-blacklisted JTI is a no-op.
    pub async fn blacklist(&self, jti: &str, expires_at: DateTime<Utc>) -> Result<(), OAuthError> {
        sqlx::query(
            "INSERT INTO oauth_jti_blacklist (jti, expires_at) VALUES (?, ?) \
             ON DUPLICATE KEY UPDATE expires_at = expires_at",
        )
        .bind(jti)
        .bind(expires_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn is_blacklisted(&self, jti: &str) -> Result<bool, OAuthError> {
        let count = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM oauth_jti_blacklist WHERE jti = ? AND expires_at > NOW()",
        )
        .bind(jti)
        .fetch_one(&self.pool)
        .await?;

        Ok(count > 0)
    }
}
