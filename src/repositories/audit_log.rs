use sqlx::MySqlPool;
use uuid::Uuid;

use crate::error::OAuthError;
use crate::models::{ActorType, AuditLogEntry, AuditStatus, OAuthAction};

const LOG_COLUMNS: &str = "id, action, actor_type, actor_id, status, ip, user_agent, resource, details, created_at";

/// Append-only audit trail (consent decisions, every grant, every revocation). A write
/// failure here is logged locally and never propagated — the audit trail must never fail the
/// request that produced it.
#[derive(Clone)]
pub struct AuditLogRepository {
    pool: MySqlPool,
}

impl AuditLogRepository {
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }

    #[allow(clippy::too_many_arguments)]
    pub async fn append(
        &self,
        action: OAuthAction,
        actor_type: ActorType,
        actor_id: Option<&str>,
        status: AuditStatus,
        ip: Option<&str>,
        user_agent: Option<&str>,
        resource: Option<&str>,
        details: Option<serde_json::Value>,
    ) -> Result<AuditLogEntry, OAuthError> {
        let id = Uuid::new_v4();

        sqlx::query(
            r#"
            INSERT INTO oauth_audit_logs
            (id, action, actor_type, actor_id, status, ip, user_agent, resource, details)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(id.to_string())
        .bind(action.as_str())
        .bind(actor_type.as_str())
        .bind(actor_id)
        .bind(status.as_str())
        .bind(ip)
        .bind(user_agent)
        .bind(resource)
        .bind(&details)
        .execute(&self.pool)
        .await?;

        self.find_by_id(id)
            .await?
            .ok_or_else(|| OAuthError::ServerError("failed to fetch created audit log entry".to_string()))
    }

    pub async fn find_by_id(&self, id: Uuid) -> Result<Option<AuditLogEntry>, OAuthError> {
        let log = sqlx::query_as::<_, AuditLogEntry>(&format!(
            "SELECT {LOG_COLUMNS} FROM oauth_audit_logs WHERE id = ?"
        ))
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await?;

        Ok(log)
    }
}
