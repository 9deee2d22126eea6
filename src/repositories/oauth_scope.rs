use sqlx::MySqlPool;

use crate::error::OAuthError;
use crate::models::OAuthScope;

const SCOPE_COLUMNS: &str = "id, name, description, is_public, is_active, created_at";

/// Read access to the catalog of OAuth scopes a client may request.
#[derive(Clone)]
pub struct OAuthScopeRepository {
    pool: MySqlPool,
}

impl OAuthScopeRepository {
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }

    /// Resolve scope names to rows, silently dropping ones that don't exist or are inactive.
    /// Callers compare `result.len()` against the input to detect unknown scopes.
    pub async fn find_by_names(&self, names: &[String]) -> Result<Vec<OAuthScope>, OAuthError> {
        if names.is_empty() {
            return Ok(vec![]);
        }

        let placeholders = names.iter().map(|_| "?").collect::<Vec<_>>().join(", ");
        let query = format!(
            "SELECT {SCOPE_COLUMNS} FROM oauth_scopes WHERE name IN ({placeholders}) AND is_active = true"
        );

        let mut query_builder = sqlx::query_as::<_, OAuthScope>(&query);
        for name in names {
            query_builder = query_builder.bind(name);
        }

        let scopes = query_builder.fetch_all(&self.pool).await?;
        Ok(scopes)
    }

    /// All active scopes a PUBLIC client is permitted to request, i.e. `is_public = true`.
    pub async fn list_public(&self) -> Result<Vec<OAuthScope>, OAuthError> {
        let scopes = sqlx::query_as::<_, OAuthScope>(&format!(
            "SELECT {SCOPE_COLUMNS} FROM oauth_scopes WHERE is_public = true AND is_active = true ORDER BY name ASC"
        ))
        .fetch_all(&self.pool)
        .await?;

        Ok(scopes)
    }
}
