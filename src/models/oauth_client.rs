use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Whether a client can hold a secret server-side (CONFIDENTIAL) or not (PUBLIC, e.g. mobile/SPA).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ClientType {
    Confidential,
    Public,
}

impl ClientType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ClientType::Confidential => "CONFIDENTIAL",
            ClientType::Public => "PUBLIC",
        }
    }

    pub fn from_str_lenient(s: &str) -> Self {
        match s.to_ascii_uppercase().as_str() {
            "PUBLIC" => ClientType::Public,
            _ => ClientType::Confidential,
        }
    }
}

/// OAuth Client - a registered party that may request tokens from this server.
///
/// Invariant: `client_type == Public` implies `secret_hash.is_none()` and `require_pkce`.
/// Clients are read-only to the core; creation/mutation is an admin-flow collaborator concern.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OAuthClient {
    pub id: Uuid,
    pub client_id: String,
    #[serde(skip_serializing)]
    pub secret_hash: Option<String>,
    pub secret_expires_at: Option<DateTime<Utc>>,
    pub name: String,
    pub client_type: ClientType,
    pub redirect_uris: Vec<String>,
    pub allowed_scopes: Vec<String>,
    pub grant_types: Vec<String>,
    pub jwks_uri: Option<String>,
    pub require_pkce: bool,
    pub is_active: bool,
    pub access_token_ttl_secs: Option<i64>,
    pub refresh_token_ttl_secs: Option<i64>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow)]
pub struct OAuthClientRow {
    pub id: String,
    pub client_id: String,
    pub secret_hash: Option<String>,
    pub secret_expires_at: Option<DateTime<Utc>>,
    pub name: String,
    pub client_type: String,
    pub redirect_uris: serde_json::Value,
    pub allowed_scopes: serde_json::Value,
    pub grant_types: serde_json::Value,
    pub jwks_uri: Option<String>,
    pub require_pkce: bool,
    pub is_active: bool,
    pub access_token_ttl_secs: Option<i64>,
    pub refresh_token_ttl_secs: Option<i64>,
    pub created_at: DateTime<Utc>,
}

impl From<OAuthClientRow> for OAuthClient {
    fn from(row: OAuthClientRow) -> Self {
        Self {
            id: Uuid::parse_str(&row.id).unwrap_or_default(),
            client_id: row.client_id,
            secret_hash: row.secret_hash,
            secret_expires_at: row.secret_expires_at,
            name: row.name,
            client_type: ClientType::from_str_lenient(&row.client_type),
            redirect_uris: serde_json::from_value(row.redirect_uris).unwrap_or_default(),
            allowed_scopes: serde_json::from_value(row.allowed_scopes).unwrap_or_default(),
            grant_types: serde_json::from_value(row.grant_types).unwrap_or_default(),
            jwks_uri: row.jwks_uri,
            require_pkce: row.require_pkce,
            is_active: row.is_active,
            access_token_ttl_secs: row.access_token_ttl_secs,
            refresh_token_ttl_secs: row.refresh_token_ttl_secs,
            created_at: row.created_at,
        }
    }
}

impl<'r> sqlx::FromRow<'r, sqlx::mysql::MySqlRow> for OAuthClient {
    fn from_row(row: &'r sqlx::mysql::MySqlRow) -> Result<Self, sqlx::Error> {
        OAuthClientRow::from_row(row).map(OAuthClient::from)
    }
}

impl OAuthClient {
    pub fn is_public(&self) -> bool {
        self.client_type == ClientType::Public
    }

    pub fn pkce_required(&self) -> bool {
        self.is_public() || self.require_pkce
    }

    pub fn has_redirect_uri(&self, uri: &str) -> bool {
        self.redirect_uris.iter().any(|u| u == uri)
    }

    pub fn supports_grant(&self, grant_type: &str) -> bool {
        self.grant_types.iter().any(|g| g == grant_type)
    }

    pub fn secret_is_expired(&self) -> bool {
        self.secret_expires_at
            .map(|exp| Utc::now() > exp)
            .unwrap_or(false)
    }
}
