use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// OAuth Scope - a permission label a client may request.
///
/// Invariant: a PUBLIC client may only be granted scopes where `is_public = true`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OAuthScope {
    pub id: Uuid,
    pub name: String,
    pub description: String,
    pub is_public: bool,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow)]
pub struct OAuthScopeRow {
    pub id: String,
    pub name: String,
    pub description: String,
    pub is_public: bool,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

impl From<OAuthScopeRow> for OAuthScope {
    fn from(row: OAuthScopeRow) -> Self {
        Self {
            id: Uuid::parse_str(&row.id).unwrap_or_default(),
            name: row.name,
            description: row.description,
            is_public: row.is_public,
            is_active: row.is_active,
            created_at: row.created_at,
        }
    }
}

impl<'r> sqlx::FromRow<'r, sqlx::mysql::MySqlRow> for OAuthScope {
    fn from_row(row: &'r sqlx::mysql::MySqlRow) -> Result<Self, sqlx::Error> {
        OAuthScopeRow::from_row(row).map(OAuthScope::from)
    }
}
