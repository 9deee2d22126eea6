use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Access Token record. The signed JWT itself is never stored — only its SHA-256 hex hash,
/// so a stolen database dump cannot be replayed as a bearer token directly.
///
/// Invariant: `(token_hash, jti)` uniquely identifies the token; revocation is expressed both
/// as `revoked = true` here and as a JTI blacklist entry, so either check alone is sufficient.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessToken {
    pub id: Uuid,
    pub token_hash: String,
    pub jti: Uuid,
    pub client_id: Uuid,
    pub user_id: Option<Uuid>,
    pub auth_code_id: Option<Uuid>,
    pub scopes: Vec<String>,
    pub expires_at: DateTime<Utc>,
    pub revoked: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow)]
pub struct AccessTokenRow {
    pub id: String,
    pub token_hash: String,
    pub jti: String,
    pub client_id: String,
    pub user_id: Option<String>,
    pub auth_code_id: Option<String>,
    pub scopes: serde_json::Value,
    pub expires_at: DateTime<Utc>,
    pub revoked: bool,
    pub created_at: DateTime<Utc>,
}

impl From<AccessTokenRow> for AccessToken {
    fn from(row: AccessTokenRow) -> Self {
        Self {
            id: Uuid::parse_str(&row.id).unwrap_or_default(),
            token_hash: row.token_hash,
            jti: Uuid::parse_str(&row.jti).unwrap_or_default(),
            client_id: Uuid::parse_str(&row.client_id).unwrap_or_default(),
            user_id: row.user_id.and_then(|id| Uuid::parse_str(&id).ok()),
            auth_code_id: row.auth_code_id.and_then(|id| Uuid::parse_str(&id).ok()),
            scopes: serde_json::from_value(row.scopes).unwrap_or_default(),
            expires_at: row.expires_at,
            revoked: row.revoked,
            created_at: row.created_at,
        }
    }
}

impl<'r> sqlx::FromRow<'r, sqlx::mysql::MySqlRow> for AccessToken {
    fn from_row(row: &'r sqlx::mysql::MySqlRow) -> Result<Self, sqlx::Error> {
        AccessTokenRow::from_row(row).map(AccessToken::from)
    }
}

impl AccessToken {
    pub fn is_expired(&self) -> bool {
        Utc::now() > self.expires_at
    }

    pub fn is_valid(&self) -> bool {
        !self.revoked && !self.is_expired()
    }

    pub fn has_scope(&self, scope: &str) -> bool {
        self.scopes.iter().any(|s| s == scope)
    }

    pub fn has_all_scopes(&self, required: &[String]) -> bool {
        required.iter().all(|s| self.has_scope(s))
    }
}
