use chrono::{Duration, Utc};
use sqlx::MySqlPool;
use uuid::Uuid;

use crate::error::OAuthError;
use crate::models::AuthorizationCode;

/// Authorization codes never outlive 10 minutes, regardless of what a caller asks for.
const MAX_CODE_TTL_SECONDS: i64 = 600;

const CODE_COLUMNS: &str = "id, code_hash, client_id, user_id, redirect_uri, scopes, \
     code_challenge, code_challenge_method, expires_at, consumed_at, created_at";

/// Storage for authorization codes. Consumption is a single atomic UPDATE guarded by
/// `consumed_at IS NULL`, which is what makes code reuse detectable at all: a second redemption
/// attempt always sees zero rows affected.
#[derive(Clone)]
pub struct AuthorizationCodeRepository {
    pool: MySqlPool,
}

impl AuthorizationCodeRepository {
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }

    #[allow(clippy::too_many_arguments)]
    pub async fn create(
        &self,
        code_hash: &str,
        client_id: Uuid,
        user_id: Uuid,
        redirect_uri: &str,
        scopes: &[String],
        code_challenge: &str,
        code_challenge_method: &str,
        expires_in_seconds: i64,
    ) -> Result<AuthorizationCode, OAuthError> {
        let id = Uuid::new_v4();
        let expires_at = Utc::now() + Duration::seconds(expires_in_seconds.min(MAX_CODE_TTL_SECONDS));
        let scopes_json = serde_json::to_value(scopes)
            .map_err(|e| OAuthError::ServerError(format!("failed to serialize scopes: {e}")))?;

        sqlx::query(
            r#"
            INSERT INTO oauth_authorization_codes
            (id, code_hash, client_id, user_id, redirect_uri, scopes, code_challenge, code_challenge_method, expires_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(id.to_string())
        .bind(code_hash)
        .bind(client_id.to_string())
        .bind(user_id.to_string())
        .bind(redirect_uri)
        .bind(&scopes_json)
        .bind(code_challenge)
        .bind(code_challenge_method)
        .bind(expires_at)
        .execute(&self.pool)
        .await?;

        self.find_by_id(id)
            .await?
            .ok_or_else(|| OAuthError::ServerError("failed to fetch created authorization code".to_string()))
    }

    pub async fn find_by_id(&self, id: Uuid) -> Result<Option<AuthorizationCode>, OAuthError> {
        let code = sqlx::query_as::<_, AuthorizationCode>(&format!(
            "SELECT {CODE_COLUMNS} FROM oauth_authorization_codes WHERE id = ?"
        ))
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await?;

        Ok(code)
    }

    pub async fn find_by_code_hash(&self, code_hash: &str) -> Result<Option<AuthorizationCode>, OAuthError> {
        let code = sqlx::query_as::<_, AuthorizationCode>(&format!(
            "SELECT {CODE_COLUMNS} FROM oauth_authorization_codes WHERE code_hash = ?"
        ))
        .bind(code_hash)
        .fetch_optional(&self.pool)
        .await?;

        Ok(code)
    }

    /// Marks the code consumed iff it hadn't been already. `true` means this caller won the
    /// race and may proceed to issue tokens; `false` means the code was already consumed and
    /// every token issued from it must be revoked (reuse detection).
    pub async fn try_consume(&self, id: Uuid) -> Result<bool, OAuthError> {
        let result = sqlx::query(
            "UPDATE oauth_authorization_codes SET consumed_at = NOW() WHERE id = ? AND consumed_at IS NULL",
        )
        .bind(id.to_string())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Revokes every access and refresh token that was ever issued from this code, as part of
    /// reuse-detection cascade revocation.
    pub async fn revoke_tokens_issued_from_code(&self, code_id: Uuid) -> Result<(), OAuthError> {
        sqlx::query(
            "INSERT INTO oauth_jti_blacklist (jti, expires_at) \
             SELECT jti, expires_at FROM oauth_access_tokens WHERE auth_code_id = ? \
             ON DUPLICATE KEY UPDATE expires_at = expires_at",
        )
        .bind(code_id.to_string())
        .execute(&self.pool)
        .await?;
        sqlx::query(
            "INSERT INTO oauth_jti_blacklist (jti, expires_at) \
             SELECT jti, expires_at FROM oauth_refresh_tokens WHERE auth_code_id = ? \
             ON DUPLICATE KEY UPDATE expires_at = expires_at",
        )
        .bind(code_id.to_string())
        .execute(&self.pool)
        .await?;

        sqlx::query("UPDATE oauth_access_tokens SET revoked = true WHERE auth_code_id = ?")
            .bind(code_id.to_string())
            .execute(&self.pool)
            .await?;

        sqlx::query(
            "UPDATE oauth_refresh_tokens SET revoked = true, revoked_at = NOW() WHERE auth_code_id = ?",
        )
        .bind(code_id.to_string())
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
