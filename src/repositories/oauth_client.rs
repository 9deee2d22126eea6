use sqlx::MySqlPool;
use uuid::Uuid;

use crate::error::OAuthError;
use crate::models::OAuthClient;

const CLIENT_COLUMNS: &str = "id, client_id, secret_hash, secret_expires_at, name, client_type, \
     redirect_uris, allowed_scopes, grant_types, jwks_uri, require_pkce, is_active, \
     access_token_ttl_secs, refresh_token_ttl_secs, created_at";

/// Read access to registered OAuth clients. Client registration/rotation is an admin-flow
/// collaborator concern outside this core; the repository only reads.
#[derive(Clone)]
pub struct OAuthClientRepository {
    pool: MySqlPool,
}

impl OAuthClientRepository {
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }

    pub async fn find_by_id(&self, id: Uuid) -> Result<Option<OAuthClient>, OAuthError> {
        let client = sqlx::query_as::<_, OAuthClient>(&format!(
            "SELECT {CLIENT_COLUMNS} FROM oauth_clients WHERE id = ?"
        ))
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await?;

        Ok(client)
    }

    /// The lookup the client authenticator actually uses: only an active client can
    /// authenticate or have tokens issued on its behalf.
    pub async fn find_active_by_client_id(&self, client_id: &str) -> Result<Option<OAuthClient>, OAuthError> {
        let client = sqlx::query_as::<_, OAuthClient>(&format!(
            "SELECT {CLIENT_COLUMNS} FROM oauth_clients WHERE client_id = ? AND is_active = true"
        ))
        .bind(client_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(client)
    }
}
