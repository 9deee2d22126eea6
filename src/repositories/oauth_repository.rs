use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::MySqlPool;
use uuid::Uuid;

use crate::error::OAuthError;
use crate::models::{
    AccessToken, ActorType, AuditLogEntry, AuditStatus, AuthorizationCode, OAuthAction, OAuthClient,
    OAuthScope, RefreshToken, User, UserConsent,
};

use super::{
    AccessTokenRepository, AuditLogRepository, AuthorizationCodeRepository, JtiBlacklistRepository,
    OAuthClientRepository, OAuthScopeRepository, RefreshTokenRepository, UserConsentRepository,
    UserRepository,
};

/// The single seam every service in this crate talks to instead of `sqlx` directly.
/// Resolved as an Open Question in favor of a plain async trait over a concrete struct: the
/// services layer only ever needs one live implementation, but tests substitute an in-memory
/// fake without touching MySQL, and the trait boundary documents exactly what persistence the
/// protocol engine requires.
#[async_trait]
pub trait OAuthRepository: Send + Sync {
    async fn find_client_by_id(&self, id: Uuid) -> Result<Option<OAuthClient>, OAuthError>;
    async fn find_active_client(&self, client_id: &str) -> Result<Option<OAuthClient>, OAuthError>;

    async fn find_scopes_by_names(&self, names: &[String]) -> Result<Vec<OAuthScope>, OAuthError>;
    async fn list_public_scopes(&self) -> Result<Vec<OAuthScope>, OAuthError>;

    #[allow(clippy::too_many_arguments)]
    async fn create_authorization_code(
        &self,
        code_hash: &str,
        client_id: Uuid,
        user_id: Uuid,
        redirect_uri: &str,
        scopes: &[String],
        code_challenge: &str,
        code_challenge_method: &str,
        expires_in_seconds: i64,
    ) -> Result<AuthorizationCode, OAuthError>;
    async fn find_authorization_code_by_hash(&self, code_hash: &str) -> Result<Option<AuthorizationCode>, OAuthError>;
    async fn try_consume_authorization_code(&self, id: Uuid) -> Result<bool, OAuthError>;
    async fn revoke_tokens_issued_from_code(&self, code_id: Uuid) -> Result<(), OAuthError>;

    #[allow(clippy::too_many_arguments)]
    async fn create_access_token(
        &self,
        token_hash: &str,
        jti: Uuid,
        client_id: Uuid,
        user_id: Option<Uuid>,
        auth_code_id: Option<Uuid>,
        scopes: &[String],
        expires_in_seconds: i64,
    ) -> Result<AccessToken, OAuthError>;
    async fn revoke_access_token_by_jti(&self, jti: Uuid) -> Result<(), OAuthError>;
    async fn revoke_all_access_tokens_for_user_client(&self, user_id: Uuid, client_id: Uuid) -> Result<u64, OAuthError>;

    #[allow(clippy::too_many_arguments)]
    async fn create_refresh_token(
        &self,
        token_hash: &str,
        jti: Uuid,
        client_id: Uuid,
        user_id: Option<Uuid>,
        auth_code_id: Option<Uuid>,
        scopes: &[String],
        expires_in_seconds: i64,
        previous_token_id: Option<Uuid>,
    ) -> Result<RefreshToken, OAuthError>;
    async fn find_refresh_token_by_jti(&self, jti: Uuid) -> Result<Option<RefreshToken>, OAuthError>;
    async fn rotate_refresh_token(&self, old_id: Uuid, new_id: Uuid) -> Result<bool, OAuthError>;
    async fn revoke_refresh_token_chain(&self, id: Uuid) -> Result<u64, OAuthError>;
    async fn revoke_all_refresh_tokens_for_user_client(&self, user_id: Uuid, client_id: Uuid) -> Result<u64, OAuthError>;

    async fn blacklist_jti(&self, jti: &str, expires_at: DateTime<Utc>) -> Result<(), OAuthError>;
    async fn is_jti_blacklisted(&self, jti: &str) -> Result<bool, OAuthError>;

    async fn find_user_by_id(&self, id: Uuid) -> Result<Option<User>, OAuthError>;
    async fn user_effective_permissions(&self, user_id: Uuid) -> Result<Vec<String>, OAuthError>;

    async fn find_consent(&self, user_id: Uuid, client_id: Uuid) -> Result<Option<UserConsent>, OAuthError>;
    async fn upsert_consent(&self, user_id: Uuid, client_id: Uuid, scopes: &[String]) -> Result<UserConsent, OAuthError>;
    async fn revoke_consent(&self, user_id: Uuid, client_id: Uuid) -> Result<(), OAuthError>;

    #[allow(clippy::too_many_arguments)]
    async fn append_audit_log(
        &self,
        action: OAuthAction,
        actor_type: ActorType,
        actor_id: Option<&str>,
        status: AuditStatus,
        ip: Option<&str>,
        user_agent: Option<&str>,
        resource: Option<&str>,
        details: Option<serde_json::Value>,
    ) -> Result<AuditLogEntry, OAuthError>;
}

/// The only production implementation: straight delegation to the per-entity MySQL repositories.
#[derive(Clone)]
pub struct MySqlOAuthRepository {
    clients: OAuthClientRepository,
    scopes: OAuthScopeRepository,
    auth_codes: AuthorizationCodeRepository,
    access_tokens: AccessTokenRepository,
    refresh_tokens: RefreshTokenRepository,
    jti_blacklist: JtiBlacklistRepository,
    users: UserRepository,
    consents: UserConsentRepository,
    audit_log: AuditLogRepository,
}

impl MySqlOAuthRepository {
    pub fn new(pool: MySqlPool) -> Self {
        Self {
            clients: OAuthClientRepository::new(pool.clone()),
            scopes: OAuthScopeRepository::new(pool.clone()),
            auth_codes: AuthorizationCodeRepository::new(pool.clone()),
            access_tokens: AccessTokenRepository::new(pool.clone()),
            refresh_tokens: RefreshTokenRepository::new(pool.clone()),
            jti_blacklist: JtiBlacklistRepository::new(pool.clone()),
            users: UserRepository::new(pool.clone()),
            consents: UserConsentRepository::new(pool.clone()),
            audit_log: AuditLogRepository::new(pool),
        }
    }
}

#[async_trait]
impl OAuthRepository for MySqlOAuthRepository {
    async fn find_client_by_id(&self, id: Uuid) -> Result<Option<OAuthClient>, OAuthError> {
        self.clients.find_by_id(id).await
    }

    async fn find_active_client(&self, client_id: &str) -> Result<Option<OAuthClient>, OAuthError> {
        self.clients.find_active_by_client_id(client_id).await
    }

    async fn find_scopes_by_names(&self, names: &[String]) -> Result<Vec<OAuthScope>, OAuthError> {
        self.scopes.find_by_names(names).await
    }

    async fn list_public_scopes(&self) -> Result<Vec<OAuthScope>, OAuthError> {
        self.scopes.list_public().await
    }

    async fn create_authorization_code(
        &self,
        code_hash: &str,
        client_id: Uuid,
        user_id: Uuid,
        redirect_uri: &str,
        scopes: &[String],
        code_challenge: &str,
        code_challenge_method: &str,
        expires_in_seconds: i64,
    ) -> Result<AuthorizationCode, OAuthError> {
        self.auth_codes
            .create(
                code_hash,
                client_id,
                user_id,
                redirect_uri,
                scopes,
                code_challenge,
                code_challenge_method,
                expires_in_seconds,
            )
            .await
    }

    async fn find_authorization_code_by_hash(&self, code_hash: &str) -> Result<Option<AuthorizationCode>, OAuthError> {
        self.auth_codes.find_by_code_hash(code_hash).await
    }

    async fn try_consume_authorization_code(&self, id: Uuid) -> Result<bool, OAuthError> {
        self.auth_codes.try_consume(id).await
    }

    async fn revoke_tokens_issued_from_code(&self, code_id: Uuid) -> Result<(), OAuthError> {
        self.auth_codes.revoke_tokens_issued_from_code(code_id).await
    }

    async fn create_access_token(
        &self,
        token_hash: &str,
        jti: Uuid,
        client_id: Uuid,
        user_id: Option<Uuid>,
        auth_code_id: Option<Uuid>,
        scopes: &[String],
        expires_in_seconds: i64,
    ) -> Result<AccessToken, OAuthError> {
        self.access_tokens
            .create(token_hash, jti, client_id, user_id, auth_code_id, scopes, expires_in_seconds)
            .await
    }

    async fn revoke_access_token_by_jti(&self, jti: Uuid) -> Result<(), OAuthError> {
        self.access_tokens.revoke_by_jti(jti).await
    }

    async fn revoke_all_access_tokens_for_user_client(&self, user_id: Uuid, client_id: Uuid) -> Result<u64, OAuthError> {
        self.access_tokens.revoke_all_for_user_client(user_id, client_id).await
    }

    async fn create_refresh_token(
        &self,
        token_hash: &str,
        jti: Uuid,
        client_id: Uuid,
        user_id: Option<Uuid>,
        auth_code_id: Option<Uuid>,
        scopes: &[String],
        expires_in_seconds: i64,
        previous_token_id: Option<Uuid>,
    ) -> Result<RefreshToken, OAuthError> {
        self.refresh_tokens
            .create(
                token_hash,
                jti,
                client_id,
                user_id,
                auth_code_id,
                scopes,
                expires_in_seconds,
                previous_token_id,
            )
            .await
    }

    async fn find_refresh_token_by_jti(&self, jti: Uuid) -> Result<Option<RefreshToken>, OAuthError> {
        self.refresh_tokens.find_by_jti(jti).await
    }

    async fn rotate_refresh_token(&self, old_id: Uuid, new_id: Uuid) -> Result<bool, OAuthError> {
        self.refresh_tokens.rotate(old_id, new_id).await
    }

    async fn revoke_refresh_token_chain(&self, id: Uuid) -> Result<u64, OAuthError> {
        self.refresh_tokens.revoke_chain(id).await
    }

    async fn revoke_all_refresh_tokens_for_user_client(&self, user_id: Uuid, client_id: Uuid) -> Result<u64, OAuthError> {
        self.refresh_tokens.revoke_all_for_user_client(user_id, client_id).await
    }

    async fn blacklist_jti(&self, jti: &str, expires_at: DateTime<Utc>) -> Result<(), OAuthError> {
        self.jti_blacklist.blacklist(jti, expires_at).await
    }

    async fn is_jti_blacklisted(&self, jti: &str) -> Result<bool, OAuthError> {
        self.jti_blacklist.is_blacklisted(jti).await
    }

    async fn find_user_by_id(&self, id: Uuid) -> Result<Option<User>, OAuthError> {
        self.users.find_by_id(id).await
    }

    async fn user_effective_permissions(&self, user_id: Uuid) -> Result<Vec<String>, OAuthError> {
        self.users.effective_permissions(user_id).await
    }

    async fn find_consent(&self, user_id: Uuid, client_id: Uuid) -> Result<Option<UserConsent>, OAuthError> {
        self.consents.find_by_user_and_client(user_id, client_id).await
    }

    async fn upsert_consent(&self, user_id: Uuid, client_id: Uuid, scopes: &[String]) -> Result<UserConsent, OAuthError> {
        self.consents.upsert(user_id, client_id, scopes).await
    }

    async fn revoke_consent(&self, user_id: Uuid, client_id: Uuid) -> Result<(), OAuthError> {
        self.consents.delete(user_id, client_id).await?;
        self.access_tokens.revoke_all_for_user_client(user_id, client_id).await?;
        self.refresh_tokens.revoke_all_for_user_client(user_id, client_id).await?;
        Ok(())
    }

    async fn append_audit_log(
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
        self.audit_log
            .append(action, actor_type, actor_id, status, ip, user_agent, resource, details)
            .await
    }
}
