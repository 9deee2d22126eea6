use sqlx::MySqlPool;
use uuid::Uuid;

use crate::error::OAuthError;
use crate::models::User;

/// Read-only access to user records. Users are owned by an identity collaborator outside
/// this core (registration, password management, etc. are out of scope); the core only ever
/// looks a user up by id to populate ID token claims and to check `is_active`.
#[derive(Clone)]
pub struct UserRepository {
    pool: MySqlPool,
}

impl UserRepository {
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }

    pub async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, OAuthError> {
        sqlx::query_as::<_, User>(
            r#"
            SELECT id, email, email_verified, username, given_name, family_name, is_active, created_at
            FROM users
            WHERE id = ?
            "#,
        )
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| OAuthError::ServerError(format!("database error: {e}")))
    }

    /// Permission codes effectively granted to this user. Sourced from whatever authorization
    /// model the collaborator maintains; here, a flat per-user permission table.
    pub async fn effective_permissions(&self, user_id: Uuid) -> Result<Vec<String>, OAuthError> {
        let rows: Vec<(String,)> = sqlx::query_as(
            r#"
            SELECT permission_code
            FROM user_permissions
            WHERE user_id = ?
            "#,
        )
        .bind(user_id.to_string())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| OAuthError::ServerError(format!("database error: {e}")))?;

        Ok(rows.into_iter().map(|(code,)| code).collect())
    }
}
