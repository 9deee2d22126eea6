use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Authorization Code - single-use credential issued after consent, redeemed at the token endpoint.
///
/// Invariant: `consumed_at` only ever moves from `None` to `Some(_)`; a second consumption
/// attempt must revoke every access/refresh token issued from this code (see the repository's
/// `revoke_tokens_issued_from_code`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthorizationCode {
    pub id: Uuid,
    pub code_hash: String,
    pub client_id: Uuid,
    pub user_id: Uuid,
    pub redirect_uri: String,
    pub scopes: Vec<String>,
    pub code_challenge: String,
    pub code_challenge_method: String,
    pub expires_at: DateTime<Utc>,
    pub consumed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow)]
pub struct AuthorizationCodeRow {
    pub id: String,
    pub code_hash: String,
    pub client_id: String,
    pub user_id: String,
    pub redirect_uri: String,
    pub scopes: serde_json::Value,
    pub code_challenge: String,
    pub code_challenge_method: String,
    pub expires_at: DateTime<Utc>,
    pub consumed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl From<AuthorizationCodeRow> for AuthorizationCode {
    fn from(row: AuthorizationCodeRow) -> Self {
        Self {
            id: Uuid::parse_str(&row.id).unwrap_or_default(),
            code_hash: row.code_hash,
            client_id: Uuid::parse_str(&row.client_id).unwrap_or_default(),
            user_id: Uuid::parse_str(&row.user_id).unwrap_or_default(),
            redirect_uri: row.redirect_uri,
            scopes: serde_json::from_value(row.scopes).unwrap_or_default(),
            code_challenge: row.code_challenge,
            code_challenge_method: row.code_challenge_method,
            expires_at: row.expires_at,
            consumed_at: row.consumed_at,
            created_at: row.created_at,
        }
    }
}

impl<'r> sqlx::FromRow<'r, sqlx::mysql::MySqlRow> for AuthorizationCode {
    fn from_row(row: &'r sqlx::mysql::MySqlRow) -> Result<Self, sqlx::Error> {
        AuthorizationCodeRow::from_row(row).map(AuthorizationCode::from)
    }
}

impl AuthorizationCode {
    pub fn is_expired(&self) -> bool {
        Utc::now() > self.expires_at
    }

    pub fn is_consumed(&self) -> bool {
        self.consumed_at.is_some()
    }

    pub fn is_redeemable(&self) -> bool {
        !self.is_consumed() && !self.is_expired()
    }
}
