//! Thin convenience wrapper over `OAuthRepository::append_audit_log` for call sites that sit
//! outside `OAuthService` (client authentication, bearer verification, key rotation) and want
//! to attach request metadata (`ip`, `user_agent`) the core orchestration never sees.

use std::sync::Arc;

use crate::models::{ActorType, AuditStatus, OAuthAction};
use crate::repositories::OAuthRepository;

pub struct AuditService {
    repo: Arc<dyn OAuthRepository>,
}

impl AuditService {
    pub fn new(repo: Arc<dyn OAuthRepository>) -> Self {
        Self { repo }
    }

    pub async fn log_authorization_requested(&self, client_id: &str, ip: Option<&str>, user_agent: Option<&str>) {
        self.append(OAuthAction::AuthorizationRequested, ActorType::Client, Some(client_id), AuditStatus::Success, ip, user_agent, None)
            .await;
    }

    pub async fn log_client_auth_failed(&self, client_id: Option<&str>, ip: Option<&str>, user_agent: Option<&str>) {
        self.append(OAuthAction::ClientAuthFailed, ActorType::Client, client_id, AuditStatus::Failure, ip, user_agent, None)
            .await;
    }

    pub async fn log_bearer_verification_failed(&self, ip: Option<&str>, user_agent: Option<&str>, resource: Option<&str>) {
        self.append(OAuthAction::BearerVerificationFailed, ActorType::System, None, AuditStatus::Failure, ip, user_agent, resource)
            .await;
    }

    pub async fn log_key_rotated(&self, version: &str) {
        self.append(
            OAuthAction::KeyRotated,
            ActorType::System,
            None,
            AuditStatus::Success,
            None,
            None,
            None,
        )
        .await;
        tracing::info!(version, "signing key rotated");
    }

    async fn append(
        &self,
        action: OAuthAction,
        actor_type: ActorType,
        actor_id: Option<&str>,
        status: AuditStatus,
        ip: Option<&str>,
        user_agent: Option<&str>,
        resource: Option<&str>,
    ) {
        if let Err(e) = self
            .repo
            .append_audit_log(action, actor_type, actor_id, status, ip, user_agent, resource, None)
            .await
        {
            tracing::error!(error = %e, "failed to append audit log entry");
        }
    }
}
