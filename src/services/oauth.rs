//! Authorization code storage, refresh-token rotation, the token endpoint's grant dispatch,
//! and the authorize endpoint's validate/complete split, all built on top of
//! `OAuthRepository`, `JwtEngine` and the scope resolver.
//!
//! Rendering HTML consent UI is a collaborator's job; this service exposes a
//! `validate_authorize_request` / `complete_authorization` pair so that collaborator only
//! ever has to supply a `(user_id, approved)` decision, never touch persistence itself.

use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::OAuthError;
use crate::models::{ActorType, AuditStatus, OAuthAction, OAuthClient};
use crate::repositories::OAuthRepository;
use crate::services::scope;
use crate::utils::jwt::JwtEngine;
use crate::utils::pkce;
use crate::utils::secret::{generate_auth_code, hash_token};

pub const AUTHORIZATION_CODE_TTL_SECS: i64 = 600;

const GRANT_AUTHORIZATION_CODE: &str = "authorization_code";
const GRANT_REFRESH_TOKEN: &str = "refresh_token";
const GRANT_CLIENT_CREDENTIALS: &str = "client_credentials";

/// Everything the token endpoint needs to hand back, independent of which grant produced it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OAuthTokenResponse {
    pub access_token: String,
    pub token_type: String,
    pub expires_in: i64,
    pub scope: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id_token: Option<String>,
}

/// Result of a validated `/oauth/authorize` request: everything needed to either redirect
/// straight to a consent screen or, once the resource owner decides, issue a code.
#[derive(Debug, Clone)]
pub struct AuthorizeContext {
    pub client: OAuthClient,
    pub redirect_uri: String,
    pub scopes: Vec<String>,
    pub code_challenge: String,
    pub code_challenge_method: String,
    pub state: Option<String>,
}

pub struct IssuedAuthorizationCode {
    pub code: String,
    pub state: Option<String>,
    pub redirect_uri: String,
}

pub struct OAuthService {
    repo: Arc<dyn OAuthRepository>,
    jwt_engine: JwtEngine,
}

impl OAuthService {
    pub fn new(repo: Arc<dyn OAuthRepository>, jwt_engine: JwtEngine) -> Self {
        Self { repo, jwt_engine }
    }

    async fn audit(
        &self,
        action: OAuthAction,
        actor_type: ActorType,
        actor_id: Option<&str>,
        status: AuditStatus,
        details: Option<serde_json::Value>,
    ) {
        if let Err(e) = self
            .repo
            .append_audit_log(action, actor_type, actor_id, status, None, None, None, details)
            .await
        {
            tracing::error!(error = %e, "failed to append audit log entry");
        }
    }

    // ---- authorize endpoint: validate request, complete authorization ---------------------

    #[allow(clippy::too_many_arguments)]
    pub async fn validate_authorize_request(
        &self,
        response_type: &str,
        client_id: &str,
        redirect_uri: &str,
        raw_scope: &str,
        code_challenge: &str,
        code_challenge_method: &str,
        state: Option<String>,
    ) -> Result<AuthorizeContext, OAuthError> {
        if response_type != "code" {
            return Err(OAuthError::InvalidRequest("response_type must be 'code'".to_string()));
        }

        let client = self
            .repo
            .find_active_client(client_id)
            .await?
            .ok_or_else(|| OAuthError::InvalidRequest("unknown client_id".to_string()))?;

        if !client.supports_grant(GRANT_AUTHORIZATION_CODE) {
            return Err(OAuthError::UnauthorizedClient);
        }

        if !client.has_redirect_uri(redirect_uri) {
            return Err(OAuthError::InvalidRequest("redirect_uri is not registered for this client".to_string()));
        }

        if client.pkce_required() && code_challenge_method != pkce::PKCE_METHOD_S256 {
            return Err(OAuthError::InvalidRequest("code_challenge_method must be S256".to_string()));
        }
        if !pkce::validate_code_challenge(code_challenge) {
            return Err(OAuthError::InvalidRequest("malformed code_challenge".to_string()));
        }

        let requested_scopes = scope::parse_scopes(raw_scope);
        let catalogue = self.repo.find_scopes_by_names(&requested_scopes).await?;
        let granted_scopes = scope::validate_scopes_against_client(&requested_scopes, &client, &catalogue)?;

        Ok(AuthorizeContext {
            client,
            redirect_uri: redirect_uri.to_string(),
            scopes: granted_scopes,
            code_challenge: code_challenge.to_string(),
            code_challenge_method: code_challenge_method.to_string(),
            state,
        })
    }

    pub async fn complete_authorization(
        &self,
        ctx: &AuthorizeContext,
        user_id: Uuid,
        approved: bool,
    ) -> Result<IssuedAuthorizationCode, OAuthError> {
        if !approved {
            self.audit(
                OAuthAction::ConsentDenied,
                ActorType::User,
                Some(&user_id.to_string()),
                AuditStatus::Failure,
                Some(serde_json::json!({ "client_id": ctx.client.client_id })),
            )
            .await;
            return Err(OAuthError::AccessDenied);
        }

        self.repo.upsert_consent(user_id, ctx.client.id, &ctx.scopes).await?;
        self.audit(
            OAuthAction::ConsentGranted,
            ActorType::User,
            Some(&user_id.to_string()),
            AuditStatus::Success,
            Some(serde_json::json!({ "client_id": ctx.client.client_id, "scopes": ctx.scopes })),
        )
        .await;

        let code = generate_auth_code();
        let code_hash = hash_token(&code);
        self.repo
            .create_authorization_code(
                &code_hash,
                ctx.client.id,
                user_id,
                &ctx.redirect_uri,
                &ctx.scopes,
                &ctx.code_challenge,
                &ctx.code_challenge_method,
                AUTHORIZATION_CODE_TTL_SECS,
            )
            .await?;

        self.audit(
            OAuthAction::AuthorizationCodeIssued,
            ActorType::User,
            Some(&user_id.to_string()),
            AuditStatus::Success,
            Some(serde_json::json!({ "client_id": ctx.client.client_id })),
        )
        .await;

        Ok(IssuedAuthorizationCode {
            code,
            state: ctx.state.clone(),
            redirect_uri: ctx.redirect_uri.clone(),
        })
    }

    // ---- token endpoint: dispatch to the requested grant type ------------------------------

    #[allow(clippy::too_many_arguments)]
    pub async fn issue_token(
        &self,
        client: &OAuthClient,
        grant_type: &str,
        code: Option<&str>,
        redirect_uri: Option<&str>,
        code_verifier: Option<&str>,
        refresh_token: Option<&str>,
        scope_raw: Option<&str>,
    ) -> Result<OAuthTokenResponse, OAuthError> {
        if !client.supports_grant(grant_type) {
            return Err(OAuthError::UnauthorizedClient);
        }

        let result = match grant_type {
            GRANT_AUTHORIZATION_CODE => {
                let code = code.ok_or_else(|| OAuthError::InvalidRequest("code is required".to_string()))?;
                let redirect_uri = redirect_uri
                    .ok_or_else(|| OAuthError::InvalidRequest("redirect_uri is required".to_string()))?;
                let code_verifier = code_verifier
                    .ok_or_else(|| OAuthError::InvalidRequest("code_verifier is required".to_string()))?;
                self.grant_authorization_code(client, code, redirect_uri, code_verifier).await
            }
            GRANT_REFRESH_TOKEN => {
                let refresh_token = refresh_token
                    .ok_or_else(|| OAuthError::InvalidRequest("refresh_token is required".to_string()))?;
                self.grant_refresh_token(client, refresh_token, scope_raw).await
            }
            GRANT_CLIENT_CREDENTIALS => self.grant_client_credentials(client, scope_raw).await,
            _ => Err(OAuthError::UnsupportedGrantType),
        };

        let status = if result.is_ok() { AuditStatus::Success } else { AuditStatus::Failure };
        self.audit(
            OAuthAction::TokenIssued,
            ActorType::Client,
            Some(&client.client_id),
            status,
            Some(serde_json::json!({ "grant_type": grant_type })),
        )
        .await;

        result
    }

    // ---- redeem an authorization code -------------------------------------------------------

    async fn grant_authorization_code(
        &self,
        client: &OAuthClient,
        code: &str,
        redirect_uri: &str,
        code_verifier: &str,
    ) -> Result<OAuthTokenResponse, OAuthError> {
        let code_hash = hash_token(code);
        let auth_code = self
            .repo
            .find_authorization_code_by_hash(&code_hash)
            .await?
            .ok_or_else(|| OAuthError::InvalidGrant("unknown authorization code".to_string()))?;

        if auth_code.client_id != client.id {
            return Err(OAuthError::InvalidGrant("authorization code was not issued to this client".to_string()));
        }
        if auth_code.redirect_uri != redirect_uri {
            return Err(OAuthError::InvalidGrant("redirect_uri does not match the authorization request".to_string()));
        }

        if auth_code.is_consumed() {
            self.repo.revoke_tokens_issued_from_code(auth_code.id).await?;
            self.audit(
                OAuthAction::AuthorizationCodeReused,
                ActorType::Client,
                Some(&client.client_id),
                AuditStatus::Failure,
                None,
            )
            .await;
            return Err(OAuthError::InvalidGrant("authorization code has already been used".to_string()));
        }
        if auth_code.is_expired() {
            return Err(OAuthError::InvalidGrant("authorization code has expired".to_string()));
        }
        if !pkce::verify_pkce(code_verifier, &auth_code.code_challenge, &auth_code.code_challenge_method) {
            return Err(OAuthError::InvalidGrant("code_verifier does not match code_challenge".to_string()));
        }

        let consumed = self.repo.try_consume_authorization_code(auth_code.id).await?;
        if !consumed {
            self.repo.revoke_tokens_issued_from_code(auth_code.id).await?;
            self.audit(
                OAuthAction::AuthorizationCodeReused,
                ActorType::Client,
                Some(&client.client_id),
                AuditStatus::Failure,
                None,
            )
            .await;
            return Err(OAuthError::InvalidGrant("authorization code has already been used".to_string()));
        }

        let user = self
            .repo
            .find_user_by_id(auth_code.user_id)
            .await?
            .ok_or_else(|| OAuthError::InvalidGrant("user no longer exists".to_string()))?;
        if !user.is_active {
            return Err(OAuthError::InvalidGrant("user is inactive".to_string()));
        }
        let permissions = self.repo.user_effective_permissions(user.id).await?;

        let scope_str = scope::format_scopes(&auth_code.scopes);
        let access_ttl = client.access_token_ttl_secs.unwrap_or_else(|| self.jwt_engine.default_access_ttl_secs());
        let refresh_ttl = client.refresh_token_ttl_secs.unwrap_or_else(|| self.jwt_engine.default_refresh_ttl_secs());

        let minted_access = self
            .jwt_engine
            .mint_access_token(&user.id.to_string(), &client.client_id, &scope_str, &permissions, Some(access_ttl))
            .await?;
        self.repo
            .create_access_token(
                &hash_token(&minted_access.jwt),
                minted_access.jti,
                client.id,
                Some(user.id),
                Some(auth_code.id),
                &auth_code.scopes,
                access_ttl,
            )
            .await?;

        let mut refresh_token = None;
        if client.supports_grant(GRANT_REFRESH_TOKEN) {
            let minted_refresh = self
                .jwt_engine
                .mint_refresh_token(&user.id.to_string(), &client.client_id, &scope_str, Some(refresh_ttl))
                .await?;
            self.repo
                .create_refresh_token(
                    &hash_token(&minted_refresh.jwt),
                    minted_refresh.jti,
                    client.id,
                    Some(user.id),
                    Some(auth_code.id),
                    &auth_code.scopes,
                    refresh_ttl,
                    None,
                )
                .await?;
            refresh_token = Some(minted_refresh.jwt);
        }

        let id_token = if scope::is_openid_request(&auth_code.scopes) {
            Some(self.jwt_engine.mint_id_token(&user, &client.client_id, None).await?)
        } else {
            None
        };

        Ok(OAuthTokenResponse {
            access_token: minted_access.jwt,
            token_type: "Bearer".to_string(),
            expires_in: access_ttl,
            scope: scope_str,
            refresh_token,
            id_token,
        })
    }

    // ---- rotate a refresh token --------------------------------------------------------------

    async fn grant_refresh_token(
        &self,
        client: &OAuthClient,
        refresh_token: &str,
        requested_scope_raw: Option<&str>,
    ) -> Result<OAuthTokenResponse, OAuthError> {
        let claims = self.jwt_engine.verify_refresh_token(refresh_token, self.repo.as_ref()).await?;
        let jti = Uuid::parse_str(&claims.jti)
            .map_err(|_| OAuthError::InvalidGrant("malformed token identifier".to_string()))?;

        let row = self
            .repo
            .find_refresh_token_by_jti(jti)
            .await?
            .ok_or_else(|| OAuthError::InvalidGrant("unknown refresh token".to_string()))?;

        if row.client_id != client.id {
            return Err(OAuthError::InvalidGrant("refresh token was not issued to this client".to_string()));
        }

        if row.revoked {
            let revoked_count = self.repo.revoke_refresh_token_chain(row.id).await?;
            self.audit(
                OAuthAction::RefreshTokenReused,
                ActorType::Client,
                Some(&client.client_id),
                AuditStatus::Failure,
                Some(serde_json::json!({ "revoked_count": revoked_count })),
            )
            .await;
            return Err(OAuthError::InvalidGrant("refresh token has already been used".to_string()));
        }
        if row.is_expired() {
            return Err(OAuthError::InvalidGrant("refresh token has expired".to_string()));
        }

        let requested_scopes = requested_scope_raw.map(scope::parse_scopes).unwrap_or_default();
        let granted_scopes = scope::validate_scopes_within_grant(&requested_scopes, &row.scopes)?;
        let scope_str = scope::format_scopes(&granted_scopes);

        let (user, permissions) = match row.user_id {
            Some(uid) => {
                let user = self
                    .repo
                    .find_user_by_id(uid)
                    .await?
                    .ok_or_else(|| OAuthError::InvalidGrant("user no longer exists".to_string()))?;
                if !user.is_active {
                    return Err(OAuthError::InvalidGrant("user is inactive".to_string()));
                }
                let permissions = self.repo.user_effective_permissions(uid).await?;
                (Some(user), permissions)
            }
            None => (None, Vec::new()),
        };

        let subject = match &user {
            Some(u) => u.id.to_string(),
            None => client.client_id.clone(),
        };

        let access_ttl = client.access_token_ttl_secs.unwrap_or_else(|| self.jwt_engine.default_access_ttl_secs());
        let refresh_ttl = client.refresh_token_ttl_secs.unwrap_or_else(|| self.jwt_engine.default_refresh_ttl_secs());

        let minted_access = self
            .jwt_engine
            .mint_access_token(&subject, &client.client_id, &scope_str, &permissions, Some(access_ttl))
            .await?;
        let minted_refresh = self
            .jwt_engine
            .mint_refresh_token(&subject, &client.client_id, &scope_str, Some(refresh_ttl))
            .await?;

        self.repo
            .create_access_token(
                &hash_token(&minted_access.jwt),
                minted_access.jti,
                client.id,
                row.user_id,
                row.auth_code_id,
                &granted_scopes,
                access_ttl,
            )
            .await?;
        let new_refresh_row = self
            .repo
            .create_refresh_token(
                &hash_token(&minted_refresh.jwt),
                minted_refresh.jti,
                client.id,
                row.user_id,
                row.auth_code_id,
                &granted_scopes,
                refresh_ttl,
                Some(row.id),
            )
            .await?;

        let rotated = self.repo.rotate_refresh_token(row.id, new_refresh_row.id).await?;
        if !rotated {
            self.repo.revoke_refresh_token_chain(row.id).await?;
            self.repo.revoke_refresh_token_chain(new_refresh_row.id).await?;
            self.audit(
                OAuthAction::RefreshTokenReused,
                ActorType::Client,
                Some(&client.client_id),
                AuditStatus::Failure,
                None,
            )
            .await;
            return Err(OAuthError::InvalidGrant("refresh token has already been used".to_string()));
        }

        let id_token = match (&user, scope::is_openid_request(&granted_scopes)) {
            (Some(u), true) => Some(self.jwt_engine.mint_id_token(u, &client.client_id, None).await?),
            _ => None,
        };

        self.audit(
            OAuthAction::TokenRefreshed,
            ActorType::Client,
            Some(&client.client_id),
            AuditStatus::Success,
            None,
        )
        .await;

        Ok(OAuthTokenResponse {
            access_token: minted_access.jwt,
            token_type: "Bearer".to_string(),
            expires_in: access_ttl,
            scope: scope_str,
            refresh_token: Some(minted_refresh.jwt),
            id_token,
        })
    }

    // ---- client_credentials grant -----------------------------------------------------------

    async fn grant_client_credentials(
        &self,
        client: &OAuthClient,
        scope_raw: Option<&str>,
    ) -> Result<OAuthTokenResponse, OAuthError> {
        let requested_scopes = match scope_raw.map(scope::parse_scopes) {
            Some(scopes) if !scopes.is_empty() => scopes,
            _ => client.allowed_scopes.clone(),
        };
        let catalogue = self.repo.find_scopes_by_names(&requested_scopes).await?;
        let granted_scopes = scope::validate_scopes_against_client(&requested_scopes, client, &catalogue)?;
        let scope_str = scope::format_scopes(&granted_scopes);

        let access_ttl = client.access_token_ttl_secs.unwrap_or_else(|| self.jwt_engine.default_access_ttl_secs());
        let minted_access = self
            .jwt_engine
            .mint_access_token(&client.client_id, &client.client_id, &scope_str, &[], Some(access_ttl))
            .await?;
        self.repo
            .create_access_token(
                &hash_token(&minted_access.jwt),
                minted_access.jti,
                client.id,
                None,
                None,
                &granted_scopes,
                access_ttl,
            )
            .await?;

        Ok(OAuthTokenResponse {
            access_token: minted_access.jwt,
            token_type: "Bearer".to_string(),
            expires_in: access_ttl,
            scope: scope_str,
            refresh_token: None,
            id_token: None,
        })
    }

    // ---- RFC 7009 revocation -----------------------------------------------------------------

    pub async fn revoke(&self, client: &OAuthClient, token: &str, token_type_hint: Option<&str>) -> Result<(), OAuthError> {
        let try_access_first = token_type_hint != Some("refresh_token");

        if try_access_first {
            if let Ok(claims) = self.jwt_engine.verify_access_token(token, self.repo.as_ref()).await {
                if claims.client_id == client.client_id {
                    if let Ok(jti) = Uuid::parse_str(&claims.jti) {
                        self.repo.revoke_access_token_by_jti(jti).await?;
                        self.audit(
                            OAuthAction::TokenRevoked,
                            ActorType::Client,
                            Some(&client.client_id),
                            AuditStatus::Success,
                            Some(serde_json::json!({ "token_type": "access_token" })),
                        )
                        .await;
                    }
                }
                return Ok(());
            }
        }

        if let Ok(claims) = self.jwt_engine.verify_refresh_token(token, self.repo.as_ref()).await {
            if claims.client_id == client.client_id {
                if let Ok(jti) = Uuid::parse_str(&claims.jti) {
                    if let Some(row) = self.repo.find_refresh_token_by_jti(jti).await? {
                        self.repo.revoke_refresh_token_chain(row.id).await?;
                    } else {
                        let expires_at = Utc::now() + chrono::Duration::days(1);
                        self.repo.blacklist_jti(&claims.jti, expires_at).await?;
                    }
                    self.audit(
                        OAuthAction::TokenRevoked,
                        ActorType::Client,
                        Some(&client.client_id),
                        AuditStatus::Success,
                        Some(serde_json::json!({ "token_type": "refresh_token" })),
                    )
                    .await;
                }
            }
            return Ok(());
        }

        // RFC 7009 §2.2: an unrecognized token is not an error condition.
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Mutex;

    use super::*;
    use crate::config::Config;
    use crate::models::{
        AccessToken, AuditLogEntry, AuthorizationCode, ClientType, OAuthClient, OAuthScope,
        RefreshToken, User, UserConsent,
    };
    use crate::utils::jwt::KeyService;
    use crate::utils::pkce;

    fn test_config() -> Config {
        Config {
            is_production: false,
            database_url: "mysql://localhost/test".to_string(),
            jwt_issuer: "https://issuer.test".to_string(),
            jwt_audience: "https://issuer.test/api".to_string(),
            jwt_key_id: None,
            jwt_private_key: None,
            jwt_public_key: None,
            jwt_old_private_key: None,
            jwt_old_public_key: None,
            access_token_ttl_secs: 3600,
            refresh_token_ttl_secs: 2_592_000,
            id_token_ttl_secs: 3600,
            disable_rate_limiting: true,
            server_host: "127.0.0.1".to_string(),
            server_port: 3000,
        }
    }

    fn test_client(client_type: ClientType, require_pkce: bool) -> OAuthClient {
        OAuthClient {
            id: Uuid::new_v4(),
            client_id: "demo".to_string(),
            secret_hash: None,
            secret_expires_at: None,
            name: "Demo".to_string(),
            client_type,
            redirect_uris: vec!["https://app/cb".to_string()],
            allowed_scopes: vec!["openid".to_string(), "profile".to_string(), "read".to_string(), "write".to_string()],
            grant_types: vec![
                GRANT_AUTHORIZATION_CODE.to_string(),
                GRANT_REFRESH_TOKEN.to_string(),
                GRANT_CLIENT_CREDENTIALS.to_string(),
            ],
            jwks_uri: None,
            require_pkce,
            is_active: true,
            access_token_ttl_secs: None,
            refresh_token_ttl_secs: None,
            created_at: Utc::now(),
        }
    }

    fn test_user() -> User {
        User {
            id: Uuid::new_v4(),
            email: "u1@example.test".to_string(),
            email_verified: true,
            username: Some("u1".to_string()),
            given_name: Some("U".to_string()),
            family_name: Some("One".to_string()),
            is_active: true,
            created_at: Utc::now(),
        }
    }

    /// In-memory stand-in for the MySQL-backed repository, just enough of it to drive
    /// `OAuthService` end to end without a database.
    #[derive(Default)]
    struct MockRepo {
        clients: Mutex<HashMap<String, OAuthClient>>,
        scopes: Mutex<HashMap<String, OAuthScope>>,
        users: Mutex<HashMap<Uuid, User>>,
        codes: Mutex<HashMap<Uuid, AuthorizationCode>>,
        access_tokens: Mutex<HashMap<Uuid, AccessToken>>,
        refresh_tokens: Mutex<HashMap<Uuid, RefreshToken>>,
        blacklist: Mutex<Vec<String>>,
    }

    impl MockRepo {
        fn with_client(client: OAuthClient) -> Self {
            let repo = Self::default();
            repo.clients.lock().unwrap().insert(client.client_id.clone(), client);
            for name in ["openid", "profile", "read", "write"] {
                repo.scopes.lock().unwrap().insert(
                    name.to_string(),
                    OAuthScope {
                        id: Uuid::new_v4(),
                        name: name.to_string(),
                        description: String::new(),
                        is_public: true,
                        is_active: true,
                        created_at: Utc::now(),
                    },
                );
            }
            repo
        }

        fn add_user(&self, user: User) {
            self.users.lock().unwrap().insert(user.id, user);
        }
    }

    #[async_trait::async_trait]
    impl OAuthRepository for MockRepo {
        async fn find_client_by_id(&self, id: Uuid) -> Result<Option<OAuthClient>, OAuthError> {
            Ok(self.clients.lock().unwrap().values().find(|c| c.id == id).cloned())
        }

        async fn find_active_client(&self, client_id: &str) -> Result<Option<OAuthClient>, OAuthError> {
            Ok(self.clients.lock().unwrap().get(client_id).filter(|c| c.is_active).cloned())
        }

        async fn find_scopes_by_names(&self, names: &[String]) -> Result<Vec<OAuthScope>, OAuthError> {
            let scopes = self.scopes.lock().unwrap();
            Ok(names.iter().filter_map(|n| scopes.get(n).cloned()).collect())
        }

        async fn list_public_scopes(&self) -> Result<Vec<OAuthScope>, OAuthError> {
            Ok(self.scopes.lock().unwrap().values().filter(|s| s.is_public).cloned().collect())
        }

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
        ) -> Result<AuthorizationCode, OAuthError> {
            let record = AuthorizationCode {
                id: Uuid::new_v4(),
                code_hash: code_hash.to_string(),
                client_id,
                user_id,
                redirect_uri: redirect_uri.to_string(),
                scopes: scopes.to_vec(),
                code_challenge: code_challenge.to_string(),
                code_challenge_method: code_challenge_method.to_string(),
                expires_at: Utc::now() + chrono::Duration::seconds(expires_in_seconds),
                consumed_at: None,
                created_at: Utc::now(),
            };
            self.codes.lock().unwrap().insert(record.id, record.clone());
            Ok(record)
        }

        async fn find_authorization_code_by_hash(&self, code_hash: &str) -> Result<Option<AuthorizationCode>, OAuthError> {
            Ok(self.codes.lock().unwrap().values().find(|c| c.code_hash == code_hash).cloned())
        }

        async fn try_consume_authorization_code(&self, id: Uuid) -> Result<bool, OAuthError> {
            let mut codes = self.codes.lock().unwrap();
            match codes.get_mut(&id) {
                Some(code) if code.consumed_at.is_none() => {
                    code.consumed_at = Some(Utc::now());
                    Ok(true)
                }
                _ => Ok(false),
            }
        }

        async fn revoke_tokens_issued_from_code(&self, code_id: Uuid) -> Result<(), OAuthError> {
            for token in self.access_tokens.lock().unwrap().values_mut() {
                if token.auth_code_id == Some(code_id) {
                    token.revoked = true;
                }
            }
            for token in self.refresh_tokens.lock().unwrap().values_mut() {
                if token.auth_code_id == Some(code_id) {
                    token.revoked = true;
                }
            }
            Ok(())
        }

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
        ) -> Result<AccessToken, OAuthError> {
            let record = AccessToken {
                id: Uuid::new_v4(),
                token_hash: token_hash.to_string(),
                jti,
                client_id,
                user_id,
                auth_code_id,
                scopes: scopes.to_vec(),
                expires_at: Utc::now() + chrono::Duration::seconds(expires_in_seconds),
                revoked: false,
                created_at: Utc::now(),
            };
            self.access_tokens.lock().unwrap().insert(record.id, record.clone());
            Ok(record)
        }

        async fn revoke_access_token_by_jti(&self, jti: Uuid) -> Result<(), OAuthError> {
            for token in self.access_tokens.lock().unwrap().values_mut() {
                if token.jti == jti {
                    token.revoked = true;
                }
            }
            Ok(())
        }

        async fn revoke_all_access_tokens_for_user_client(&self, _user_id: Uuid, _client_id: Uuid) -> Result<u64, OAuthError> {
            Ok(0)
        }

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
        ) -> Result<RefreshToken, OAuthError> {
            let record = RefreshToken {
                id: Uuid::new_v4(),
                token_hash: token_hash.to_string(),
                jti,
                client_id,
                user_id,
                auth_code_id,
                scopes: scopes.to_vec(),
                expires_at: Utc::now() + chrono::Duration::seconds(expires_in_seconds),
                revoked: false,
                revoked_at: None,
                previous_token_id,
                replaced_by_token_id: None,
                created_at: Utc::now(),
            };
            self.refresh_tokens.lock().unwrap().insert(record.id, record.clone());
            Ok(record)
        }

        async fn find_refresh_token_by_jti(&self, jti: Uuid) -> Result<Option<RefreshToken>, OAuthError> {
            Ok(self.refresh_tokens.lock().unwrap().values().find(|t| t.jti == jti).cloned())
        }

        async fn rotate_refresh_token(&self, old_id: Uuid, new_id: Uuid) -> Result<bool, OAuthError> {
            let mut tokens = self.refresh_tokens.lock().unwrap();
            match tokens.get_mut(&old_id) {
                Some(old) if !old.revoked => {
                    old.revoked = true;
                    old.revoked_at = Some(Utc::now());
                    old.replaced_by_token_id = Some(new_id);
                    Ok(true)
                }
                _ => Ok(false),
            }
        }

        async fn revoke_refresh_token_chain(&self, id: Uuid) -> Result<u64, OAuthError> {
            let mut tokens = self.refresh_tokens.lock().unwrap();
            let mut visited = std::collections::HashSet::new();
            let mut frontier = vec![id];
            let mut count = 0u64;
            while let Some(current) = frontier.pop() {
                if !visited.insert(current) {
                    continue;
                }
                let (prev, next) = match tokens.get_mut(&current) {
                    Some(t) => {
                        if !t.revoked {
                            t.revoked = true;
                            t.revoked_at = Some(Utc::now());
                            count += 1;
                        }
                        (t.previous_token_id, t.replaced_by_token_id)
                    }
                    None => continue,
                };
                if let Some(p) = prev {
                    frontier.push(p);
                }
                if let Some(n) = next {
                    frontier.push(n);
                }
            }
            Ok(count)
        }

        async fn revoke_all_refresh_tokens_for_user_client(&self, _user_id: Uuid, _client_id: Uuid) -> Result<u64, OAuthError> {
            Ok(0)
        }

        async fn blacklist_jti(&self, jti: &str, _expires_at: chrono::DateTime<Utc>) -> Result<(), OAuthError> {
            self.blacklist.lock().unwrap().push(jti.to_string());
            Ok(())
        }

        async fn is_jti_blacklisted(&self, jti: &str) -> Result<bool, OAuthError> {
            Ok(self.blacklist.lock().unwrap().iter().any(|j| j == jti))
        }

        async fn find_user_by_id(&self, id: Uuid) -> Result<Option<User>, OAuthError> {
            Ok(self.users.lock().unwrap().get(&id).cloned())
        }

        async fn user_effective_permissions(&self, _user_id: Uuid) -> Result<Vec<String>, OAuthError> {
            Ok(Vec::new())
        }

        async fn find_consent(&self, _user_id: Uuid, _client_id: Uuid) -> Result<Option<UserConsent>, OAuthError> {
            Ok(None)
        }

        async fn upsert_consent(&self, user_id: Uuid, client_id: Uuid, scopes: &[String]) -> Result<UserConsent, OAuthError> {
            Ok(UserConsent {
                id: Uuid::new_v4(),
                user_id,
                client_id,
                scopes: scopes.to_vec(),
                granted_at: Utc::now(),
            })
        }

        async fn revoke_consent(&self, _user_id: Uuid, _client_id: Uuid) -> Result<(), OAuthError> {
            Ok(())
        }

        #[allow(clippy::too_many_arguments)]
        async fn append_audit_log(
            &self,
            action: crate::models::OAuthAction,
            actor_type: ActorType,
            actor_id: Option<&str>,
            status: AuditStatus,
            _ip: Option<&str>,
            _user_agent: Option<&str>,
            _resource: Option<&str>,
            details: Option<serde_json::Value>,
        ) -> Result<AuditLogEntry, OAuthError> {
            Ok(AuditLogEntry {
                id: Uuid::new_v4(),
                action: action.as_str().to_string(),
                actor_type,
                actor_id: actor_id.map(str::to_string),
                status,
                ip: None,
                user_agent: None,
                resource: None,
                details,
                created_at: Utc::now(),
            })
        }
    }

    fn service(repo: Arc<MockRepo>) -> OAuthService {
        let cfg = test_config();
        let keys = KeyService::load(&cfg).unwrap();
        let jwt_engine = JwtEngine::new(keys, &cfg);
        OAuthService::new(repo, jwt_engine)
    }

    #[tokio::test]
    async fn authorization_code_round_trip_mints_access_refresh_and_id_token() {
        let client = test_client(ClientType::Confidential, true);
        let user = test_user();
        let repo = Arc::new(MockRepo::with_client(client.clone()));
        repo.add_user(user.clone());
        let svc = service(repo);

        let verifier = pkce::generate_code_verifier();
        let challenge = pkce::compute_s256_challenge(&verifier);

        let ctx = svc
            .validate_authorize_request("code", &client.client_id, "https://app/cb", "openid profile", &challenge, "S256", Some("xyz".to_string()))
            .await
            .unwrap();

        let issued = svc.complete_authorization(&ctx, user.id, true).await.unwrap();
        assert_eq!(issued.state.as_deref(), Some("xyz"));

        let response = svc
            .issue_token(&client, "authorization_code", Some(&issued.code), Some("https://app/cb"), Some(&verifier), None, None)
            .await
            .unwrap();

        assert_eq!(response.token_type, "Bearer");
        assert!(response.refresh_token.is_some());
        assert!(response.id_token.is_some());
        assert_eq!(response.scope, "openid profile");
    }

    #[tokio::test]
    async fn authorization_code_rejects_wrong_verifier() {
        let client = test_client(ClientType::Confidential, true);
        let user = test_user();
        let repo = Arc::new(MockRepo::with_client(client.clone()));
        repo.add_user(user.clone());
        let svc = service(repo);

        let verifier = pkce::generate_code_verifier();
        let challenge = pkce::compute_s256_challenge(&verifier);
        let ctx = svc
            .validate_authorize_request("code", &client.client_id, "https://app/cb", "openid", &challenge, "S256", None)
            .await
            .unwrap();
        let issued = svc.complete_authorization(&ctx, user.id, true).await.unwrap();

        let err = svc
            .issue_token(&client, "authorization_code", Some(&issued.code), Some("https://app/cb"), Some("wrong-verifier-wrong-verifier-wrong-0"), None, None)
            .await
            .unwrap_err();
        assert!(matches!(err, OAuthError::InvalidGrant(_)));
    }

    #[tokio::test]
    async fn authorization_code_reuse_revokes_derived_tokens() {
        let client = test_client(ClientType::Confidential, true);
        let user = test_user();
        let repo = Arc::new(MockRepo::with_client(client.clone()));
        repo.add_user(user.clone());
        let svc = service(repo.clone());

        let verifier = pkce::generate_code_verifier();
        let challenge = pkce::compute_s256_challenge(&verifier);
        let ctx = svc
            .validate_authorize_request("code", &client.client_id, "https://app/cb", "openid", &challenge, "S256", None)
            .await
            .unwrap();
        let issued = svc.complete_authorization(&ctx, user.id, true).await.unwrap();

        svc.issue_token(&client, "authorization_code", Some(&issued.code), Some("https://app/cb"), Some(&verifier), None, None)
            .await
            .unwrap();

        let err = svc
            .issue_token(&client, "authorization_code", Some(&issued.code), Some("https://app/cb"), Some(&verifier), None, None)
            .await
            .unwrap_err();
        assert!(matches!(err, OAuthError::InvalidGrant(_)));

        assert!(repo.access_tokens.lock().unwrap().values().all(|t| t.revoked));
        assert!(repo.refresh_tokens.lock().unwrap().values().all(|t| t.revoked));
    }

    #[tokio::test]
    async fn refresh_token_rotation_revokes_old_and_reuse_revokes_chain() {
        let client = test_client(ClientType::Confidential, true);
        let user = test_user();
        let repo = Arc::new(MockRepo::with_client(client.clone()));
        repo.add_user(user.clone());
        let svc = service(repo.clone());

        let verifier = pkce::generate_code_verifier();
        let challenge = pkce::compute_s256_challenge(&verifier);
        let ctx = svc
            .validate_authorize_request("code", &client.client_id, "https://app/cb", "openid", &challenge, "S256", None)
            .await
            .unwrap();
        let issued = svc.complete_authorization(&ctx, user.id, true).await.unwrap();
        let first = svc
            .issue_token(&client, "authorization_code", Some(&issued.code), Some("https://app/cb"), Some(&verifier), None, None)
            .await
            .unwrap();
        let old_refresh = first.refresh_token.unwrap();

        let rotated = svc
            .issue_token(&client, "refresh_token", None, None, None, Some(&old_refresh), None)
            .await
            .unwrap();
        assert_ne!(rotated.refresh_token.as_deref(), Some(old_refresh.as_str()));

        let err = svc
            .issue_token(&client, "refresh_token", None, None, None, Some(&old_refresh), None)
            .await
            .unwrap_err();
        assert!(matches!(err, OAuthError::InvalidGrant(_)));
        assert!(repo.refresh_tokens.lock().unwrap().values().all(|t| t.revoked));
    }

    #[tokio::test]
    async fn client_credentials_grant_narrows_scope_and_skips_refresh() {
        let client = test_client(ClientType::Confidential, false);
        let repo = Arc::new(MockRepo::with_client(client.clone()));
        let svc = service(repo);

        let response = svc
            .issue_token(&client, "client_credentials", None, None, None, None, Some("read"))
            .await
            .unwrap();

        assert_eq!(response.scope, "read");
        assert!(response.refresh_token.is_none());
        assert!(response.id_token.is_none());
    }

    #[tokio::test]
    async fn client_credentials_grant_defaults_scope_to_allowed_set_when_omitted() {
        let client = test_client(ClientType::Confidential, false);
        let repo = Arc::new(MockRepo::with_client(client.clone()));
        let svc = service(repo);

        let response = svc
            .issue_token(&client, "client_credentials", None, None, None, None, None)
            .await
            .unwrap();

        let mut granted: Vec<&str> = response.scope.split(' ').collect();
        let mut allowed: Vec<&str> = client.allowed_scopes.iter().map(String::as_str).collect();
        granted.sort_unstable();
        allowed.sort_unstable();
        assert_eq!(granted, allowed);
    }

    #[tokio::test]
    async fn grant_not_permitted_for_client_is_unauthorized() {
        let mut client = test_client(ClientType::Confidential, false);
        client.grant_types = vec![GRANT_AUTHORIZATION_CODE.to_string()];
        let repo = Arc::new(MockRepo::with_client(client.clone()));
        let svc = service(repo);

        let err = svc
            .issue_token(&client, "client_credentials", None, None, None, None, None)
            .await
            .unwrap_err();
        assert!(matches!(err, OAuthError::UnauthorizedClient));
    }
}
