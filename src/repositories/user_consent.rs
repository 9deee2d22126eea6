use sqlx::MySqlPool;
use uuid::Uuid;

use crate::error::OAuthError;
use crate::models::UserConsent;

/// Standing record that a user has approved a client for a given scope set.
#[derive(Clone)]
pub struct UserConsentRepository {
    pool: MySqlPool,
}

impl UserConsentRepository {
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }

    pub async fn upsert(
        &self,
        user_id: Uuid,
        client_id: Uuid,
        scopes: &[String],
    ) -> Result<UserConsent, OAuthError> {
        let id = Uuid::new_v4();
        let scopes_json = serde_json::to_value(scopes)
            .map_err(|e| OAuthError::ServerError(format!("failed to serialize scopes: {}", e)))?;

        // Use INSERT ... ON DUPLICATE KEY UPDATE for upsert
        sqlx::query(
            r#"
            INSERT INTO user_consents (id, user_id, client_id, scopes)
            VALUES (?, ?, ?, ?)
            ON DUPLICATE KEY UPDATE scopes = VALUES(scopes), granted_at = CURRENT_TIMESTAMP
            "#,
        )
        .bind(id.to_string())
        .bind(user_id.to_string())
        .bind(client_id.to_string())
        .bind(&scopes_json)
        .execute(&self.pool)
        .await
        .map_err(|e| OAuthError::ServerError(format!("database error: {}", e)))?;

        self.find_by_user_and_client(user_id, client_id)
            .await?
            .ok_or_else(|| OAuthError::ServerError("Failed to fetch consent".to_string()))
    }

    pub async fn find_by_user_and_client(
        &self,
        user_id: Uuid,
        client_id: Uuid,
    ) -> Result<Option<UserConsent>, OAuthError> {
        let consent = sqlx::query_as::<_, UserConsent>(
            r#"
            SELECT id, user_id, client_id, scopes, granted_at
            FROM user_consents
            WHERE user_id = ? AND client_id = ?
            "#,
        )
        .bind(user_id.to_string())
        .bind(client_id.to_string())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| OAuthError::ServerError(format!("database error: {}", e)))?;

        Ok(consent)
    }

    pub async fn delete(&self, user_id: Uuid, client_id: Uuid) -> Result<(), OAuthError> {
        let result = sqlx::query(
            r#"
            DELETE FROM user_consents
            WHERE user_id = ? AND client_id = ?
            "#,
        )
        .bind(user_id.to_string())
        .bind(client_id.to_string())
        .execute(&self.pool)
        .await
        .map_err(|e| OAuthError::ServerError(format!("database error: {}", e)))?;

        if result.rows_affected() == 0 {
            return Err(OAuthError::InvalidGrant("Consent not found".to_string()));
        }

        Ok(())
    }

}
