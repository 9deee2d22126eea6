//! Consent bookkeeping. Rendering HTML consent screens is a collaborator's concern; this
//! service only answers "has the user already approved these scopes for this client" so a
//! collaborator can skip re-prompting, and handles revocation.

use std::sync::Arc;

use uuid::Uuid;

use crate::error::OAuthError;
use crate::repositories::OAuthRepository;

pub struct ConsentService {
    repo: Arc<dyn OAuthRepository>,
}

impl ConsentService {
    pub fn new(repo: Arc<dyn OAuthRepository>) -> Self {
        Self { repo }
    }

    /// `true` if the user has a standing consent record covering every requested scope. An
    /// empty scope request never needs consent.
    pub async fn has_sufficient_consent(
        &self,
        user_id: Uuid,
        client_id: Uuid,
        scopes: &[String],
    ) -> Result<bool, OAuthError> {
        if scopes.is_empty() {
            return Ok(true);
        }
        match self.repo.find_consent(user_id, client_id).await? {
            Some(consent) => Ok(consent.covers_scopes(scopes)),
            None => Ok(false),
        }
    }

    /// Revokes a client's consent and, per the repository's cascade, every access/refresh
    /// token issued to that user for that client.
    pub async fn revoke(&self, user_id: Uuid, client_id: Uuid) -> Result<(), OAuthError> {
        self.repo.revoke_consent(user_id, client_id).await?;
        self.repo
            .append_audit_log(
                crate::models::OAuthAction::ConsentRevoked,
                crate::models::ActorType::User,
                Some(&user_id.to_string()),
                crate::models::AuditStatus::Success,
                None,
                None,
                None,
                Some(serde_json::json!({ "client_id": client_id })),
            )
            .await
            .ok();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::UserConsent;
    use chrono::Utc;

    #[test]
    fn consent_covers_scopes_subset_only() {
        let consent = UserConsent {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            client_id: Uuid::new_v4(),
            scopes: vec!["openid".to_string(), "profile".to_string()],
            granted_at: Utc::now(),
        };
        assert!(consent.covers_scopes(&["openid".to_string()]));
        assert!(!consent.covers_scopes(&["admin".to_string()]));
    }
}
