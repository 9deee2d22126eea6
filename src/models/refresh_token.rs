use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Refresh Token record. Unlike a simple opaque secret, a refresh token is itself a signed
/// JWT (same engine as access tokens) carrying `token_type = "refresh_token"`; only its hash
/// is persisted here.
///
/// Invariant: valid iff `!revoked`, not expired, bound to the authenticating client, and part
/// of a consistent rotation chain. `previous_token_id` points at the token this one replaced;
/// `replaced_by_token_id` is filled in once *this* token itself gets rotated away.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefreshToken {
    pub id: Uuid,
    pub token_hash: String,
    pub jti: Uuid,
    pub client_id: Uuid,
    pub user_id: Option<Uuid>,
    pub auth_code_id: Option<Uuid>,
    pub scopes: Vec<String>,
    pub expires_at: DateTime<Utc>,
    pub revoked: bool,
    pub revoked_at: Option<DateTime<Utc>>,
    pub previous_token_id: Option<Uuid>,
    pub replaced_by_token_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow)]
pub struct RefreshTokenRow {
    pub id: String,
    pub token_hash: String,
    pub jti: String,
    pub client_id: String,
    pub user_id: Option<String>,
    pub auth_code_id: Option<String>,
    pub scopes: serde_json::Value,
    pub expires_at: DateTime<Utc>,
    pub revoked: bool,
    pub revoked_at: Option<DateTime<Utc>>,
    pub previous_token_id: Option<String>,
    pub replaced_by_token_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl From<RefreshTokenRow> for RefreshToken {
    fn from(row: RefreshTokenRow) -> Self {
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
            revoked_at: row.revoked_at,
            previous_token_id: row.previous_token_id.and_then(|id| Uuid::parse_str(&id).ok()),
            replaced_by_token_id: row
                .replaced_by_token_id
                .and_then(|id| Uuid::parse_str(&id).ok()),
            created_at: row.created_at,
        }
    }
}

impl<'r> sqlx::FromRow<'r, sqlx::mysql::MySqlRow> for RefreshToken {
    fn from_row(row: &'r sqlx::mysql::MySqlRow) -> Result<Self, sqlx::Error> {
        RefreshTokenRow::from_row(row).map(RefreshToken::from)
    }
}

impl RefreshToken {
    pub fn is_expired(&self) -> bool {
        Utc::now() > self.expires_at
    }

    pub fn is_valid(&self) -> bool {
        !self.revoked && !self.is_expired()
    }
}
