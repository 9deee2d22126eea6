use chrono::{Duration, Utc};
use sqlx::MySqlPool;
use uuid::Uuid;

use crate::error::OAuthError;
use crate::models::RefreshToken;

const TOKEN_COLUMNS: &str = "id, token_hash, jti, client_id, user_id, auth_code_id, scopes, \
     expires_at, revoked, revoked_at, previous_token_id, replaced_by_token_id, created_at";

/// Storage and rotation-chain bookkeeping for refresh tokens.
///
/// Rotation never mutates a row in place: redeeming token A creates a new token B with
/// `previous_token_id = A.id`, sets `A.replaced_by_token_id = B.id`, and revokes A. If A is
/// presented again after that, every token reachable by walking `previous_token_id` and
/// `replaced_by_token_id` in both directions from A is revoked.
#[derive(Clone)]
pub struct RefreshTokenRepository {
    pool: MySqlPool,
}

impl RefreshTokenRepository {
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
        previous_token_id: Option<Uuid>,
    ) -> Result<RefreshToken, OAuthError> {
        let id = Uuid::new_v4();
        let expires_at = Utc::now() + Duration::seconds(expires_in_seconds);
        let scopes_json = serde_json::to_value(scopes)
            .map_err(|e| OAuthError::ServerError(format!("failed to serialize scopes: {e}")))?;

        sqlx::query(
            r#"
            INSERT INTO oauth_refresh_tokens
            (id, token_hash, jti, client_id, user_id, auth_code_id, scopes, expires_at, previous_token_id)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
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
        .bind(previous_token_id.map(|id| id.to_string()))
        .execute(&self.pool)
        .await?;

        self.find_by_id(id)
            .await?
            .ok_or_else(|| OAuthError::ServerError("failed to fetch created refresh token".to_string()))
    }

    pub async fn find_by_id(&self, id: Uuid) -> Result<Option<RefreshToken>, OAuthError> {
        let token = sqlx::query_as::<_, RefreshToken>(&format!(
            "SELECT {TOKEN_COLUMNS} FROM oauth_refresh_tokens WHERE id = ?"
        ))
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await?;

        Ok(token)
    }

    pub async fn find_by_jti(&self, jti: Uuid) -> Result<Option<RefreshToken>, OAuthError> {
        let token = sqlx::query_as::<_, RefreshToken>(&format!(
            "SELECT {TOKEN_COLUMNS} FROM oauth_refresh_tokens WHERE jti = ?"
        ))
        .bind(jti.to_string())
        .fetch_optional(&self.pool)
        .await?;

        Ok(token)
    }

    /// Atomically revokes `old_id` and links it to its replacement, only if `old_id` was still
    /// valid. `false` means the token had already been revoked/rotated — the reuse case.
    pub async fn rotate(&self, old_id: Uuid, new_id: Uuid) -> Result<bool, OAuthError> {
        let result = sqlx::query(
            r#"
            UPDATE oauth_refresh_tokens
            SET revoked = true, revoked_at = NOW(), replaced_by_token_id = ?
            WHERE id = ? AND revoked = false
            "#,
        )
        .bind(new_id.to_string())
        .bind(old_id.to_string())
        .execute(&self.pool)
        .await?;

        let rotated = result.rows_affected() > 0;
        if rotated {
            sqlx::query(
                "INSERT INTO oauth_jti_blacklist (jti, expires_at) \
                 SELECT jti, expires_at FROM oauth_refresh_tokens WHERE id = ? \
                 ON DUPLICATE KEY UPDATE expires_at = expires_at",
            )
            .bind(old_id.to_string())
            .execute(&self.pool)
            .await?;
        }

        Ok(rotated)
    }

    /// Revokes the entire rotation chain reachable from `id`, walking `previous_token_id`
    /// ancestors and `replaced_by_token_id` descendants until both directions are exhausted.
    pub async fn revoke_chain(&self, id: Uuid) -> Result<u64, OAuthError> {
        let mut seen = std::collections::HashSet::new();
        let mut frontier = vec![id];
        let mut revoked_count = 0u64;

        while let Some(current) = frontier.pop() {
            if !seen.insert(current) {
                continue;
            }

            let Some(token) = self.find_by_id(current).await? else {
                continue;
            };

            if !token.revoked {
                let result = sqlx::query(
                    "UPDATE oauth_refresh_tokens SET revoked = true, revoked_at = NOW() WHERE id = ?",
                )
                .bind(current.to_string())
                .execute(&self.pool)
                .await?;
                revoked_count += result.rows_affected();

                sqlx::query(
                    "INSERT INTO oauth_jti_blacklist (jti, expires_at) VALUES (?, ?) \
                     ON DUPLICATE KEY UPDATE expires_at = expires_at",
                )
                .bind(token.jti.to_string())
                .bind(token.expires_at)
                .execute(&self.pool)
                .await?;
            }

            if let Some(prev) = token.previous_token_id {
                frontier.push(prev);
            }
            if let Some(next) = token.replaced_by_token_id {
                frontier.push(next);
            }
        }

        Ok(revoked_count)
    }

    pub async fn revoke_all_for_user_client(&self, user_id: Uuid, client_id: Uuid) -> Result<u64, OAuthError> {
        sqlx::query(
            "INSERT INTO oauth_jti_blacklist (jti, expires_at) \
             SELECT jti, expires_at FROM oauth_refresh_tokens WHERE user_id = ? AND client_id = ? \
             ON DUPLICATE KEY UPDATE expires_at = expires_at",
        )
        .bind(user_id.to_string())
        .bind(client_id.to_string())
        .execute(&self.pool)
        .await?;

        let result = sqlx::query(
            "UPDATE oauth_refresh_tokens SET revoked = true, revoked_at = NOW() \
             WHERE user_id = ? AND client_id = ? AND revoked = false",
        )
        .bind(user_id.to_string())
        .bind(client_id.to_string())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }
}
