use chrono::{Duration, Utc};
use sqlx::MySqlPool;
use uuid::Uuid;

use crate::error::OAuthError;
use crate::models::AccessToken;

const TOKEN_COLUMNS: &str = "id, token_hash, jti, client_id, user_id, auth_code_id, scopes, \
     expires_at, revoked, created_at";

/// Storage for issued access tokens. `token_hash` is the SHA-256 hex of the signed JWT, never
/// the token itself; lookups by hash exist only for introspection/revocation, not for the
/// steady-state verification path (which checks the JWT signature plus the JTI blacklist).
#[derive(Clone)]
pub struct AccessTokenRepository {
    pool: MySqlPool,
}

impl AccessTokenRepository {
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }

    #[allow(clippy::too_many_arguments)]
    pub async fn create(
        &self,
        token_hash: &str,
        jti: Uuid,
        client_id: Uuid,
        user_id: Option<Uuid>,
        auth_code_id: Option<Uuid>,
        scopes: &[String],
        expires_in_seconds: i64,
    ) -> Result<AccessToken, OAuthError> {
        let id = Uuid::new_v4();
        let expires_at = Utc::now() + Duration::seconds(expires_in_seconds);
        let scopes_json = serde_json::to_value(scopes)
            .map_err(|e| OAuthError::ServerError(format!("failed to serialize scopes: {e}")))?;

        sqlx::query(
            r#"
            INSERT INTO oauth_access_tokens
            (id, token_hash, jti, client_id, user_id, auth_code_id, scopes, expires_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(id.to_string())
        .bind(token_hash)
        .bind(jti.to_string())
        .bind(client_id.to_string())
        .bind(user_id.map(|u| u.to_string()))
        .bind(auth_code_id.map(|c| c.to_string()))
        .bind(&scopes_json)
        .bind(expires_at)
        .execute(&self.pool)
        .await?;

        self.find_by_id(id)
            .await?
            .ok_or_else(|| OAuthError::ServerError("failed to fetch created access token".to_string()))
    }

    pub async fn find_by_id(&self, id: Uuid) -> Result<Option<AccessToken>, OAuthError> {
        let token = sqlx::query_as::<_, AccessToken>(&format!(
            "SELECT {TOKEN_COLUMNS} FROM oauth_access_tokens WHERE id = ?"
        ))
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await?;

        Ok(token)
    }

    pub async fn revoke_by_jti(&self, jti: Uuid) -> Result<(), OAuthError> {
        sqlx::query(
            "INSERT INTO oauth_jti_blacklist (jti, expires_at) \
             SELECT jti, expires_at FROM oauth_access_tokens WHERE jti = ? \
             ON DUPLICATE KEY UPDATE expires_at = expires_at",
        )
        .bind(jti.to_string())
        .execute(&self.pool)
        .await?;

        sqlx::query("UPDATE oauth_access_tokens SET revoked = true WHERE jti = ?")
            .bind(jti.to_string())
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    /// Revokes every still-valid access token issued to this user under this client, used when
    /// consent is revoked so previously-issued tokens stop working immediately.
    pub async fn revoke_all_for_user_client(&self, user_id: Uuid, client_id: Uuid) -> Result<u64, OAuthError> {
        sqlx::query(
            "INSERT INTO oauth_jti_blacklist (jti, expires_at) \
             SELECT jti, expires_at FROM oauth_access_tokens WHERE user_id = ? AND client_id = ? \
             ON DUPLICATE KEY UPDATE expires_at = expires_at",
        )
        .bind(user_id.to_string())
        .bind(client_id.to_string())
        .execute(&self.pool)
        .await?;

        let result = sqlx::query(
            "UPDATE oauth_access_tokens SET revoked = true WHERE user_id = ? AND client_id = ? AND revoked = false",
        )
        .bind(user_id.to_string())
        .bind(client_id.to_string())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }
}
