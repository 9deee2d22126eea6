use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Who performed the audited action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ActorType {
    User,
    Client,
    System,
}

impl ActorType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActorType::User => "USER",
            ActorType::Client => "CLIENT",
            ActorType::System => "SYSTEM",
        }
    }
}

/// Terminal outcome of the audited action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AuditStatus {
    Success,
    Failure,
}

impl AuditStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditStatus::Success => "SUCCESS",
            AuditStatus::Failure => "FAILURE",
        }
    }
}

/// One audit record. Every endpoint call produces exactly one of these, success or failure;
/// a write failure here must not fail the originating request (it is logged locally instead).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditLogEntry {
    pub id: Uuid,
    pub action: String,
    pub actor_type: ActorType,
    pub actor_id: Option<String>,
    pub status: AuditStatus,
    pub ip: Option<String>,
    pub user_agent: Option<String>,
    pub resource: Option<String>,
    pub details: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow)]
pub struct AuditLogEntryRow {
    pub id: String,
    pub action: String,
    pub actor_type: String,
    pub actor_id: Option<String>,
    pub status: String,
    pub ip: Option<String>,
    pub user_agent: Option<String>,
    pub resource: Option<String>,
    pub details: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
}

impl From<AuditLogEntryRow> for AuditLogEntry {
    fn from(row: AuditLogEntryRow) -> Self {
        Self {
            id: Uuid::parse_str(&row.id).unwrap_or_default(),
            action: row.action,
            actor_type: match row.actor_type.as_str() {
                "CLIENT" => ActorType::Client,
                "SYSTEM" => ActorType::System,
                _ => ActorType::User,
            },
            actor_id: row.actor_id,
            status: match row.status.as_str() {
                "FAILURE" => AuditStatus::Failure,
                _ => AuditStatus::Success,
            },
            ip: row.ip,
            user_agent: row.user_agent,
            resource: row.resource,
            details: row.details,
            created_at: row.created_at,
        }
    }
}

impl<'r> sqlx::FromRow<'r, sqlx::mysql::MySqlRow> for AuditLogEntry {
    fn from_row(row: &'r sqlx::mysql::MySqlRow) -> Result<Self, sqlx::Error> {
        AuditLogEntryRow::from_row(row).map(AuditLogEntry::from)
    }
}

/// OAuth-specific audit actions. Kept as an enum (rather than free-form strings) so call sites
/// can't typo an action name; `as_str` is what actually gets persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OAuthAction {
    AuthorizationRequested,
    ConsentGranted,
    ConsentDenied,
    AuthorizationCodeIssued,
    AuthorizationCodeReused,
    TokenIssued,
    TokenRefreshed,
    RefreshTokenReused,
    TokenRevoked,
    ConsentRevoked,
    ClientAuthFailed,
    BearerVerificationFailed,
    KeyRotated,
}

impl OAuthAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            OAuthAction::AuthorizationRequested => "authorization_requested",
            OAuthAction::ConsentGranted => "consent_granted",
            OAuthAction::ConsentDenied => "consent_denied",
            OAuthAction::AuthorizationCodeIssued => "authorization_code_issued",
            OAuthAction::AuthorizationCodeReused => "authorization_code_reused",
            OAuthAction::TokenIssued => "token_issued",
            OAuthAction::TokenRefreshed => "token_refreshed",
            OAuthAction::RefreshTokenReused => "refresh_token_reused",
            OAuthAction::TokenRevoked => "token_revoked",
            OAuthAction::ConsentRevoked => "consent_revoked",
            OAuthAction::ClientAuthFailed => "client_auth_failed",
            OAuthAction::BearerVerificationFailed => "bearer_verification_failed",
            OAuthAction::KeyRotated => "key_rotated",
        }
    }
}

impl std::fmt::Display for OAuthAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
