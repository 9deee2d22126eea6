//! Request/response bodies for the OAuth 2.1 / OpenID Connect HTTP surface.
//!
//! These are thin wire-format adapters: parsing belongs here, protocol semantics belong to
//! `crate::services`. Every success DTO has a `From` conversion off the matching service type
//! so handlers never construct wire shapes by hand.

use axum::{
    http::{header, HeaderValue},
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};

// ============================================================================
// Authorization Request / Response
// ============================================================================

/// Query parameters for `GET /oauth/authorize`.
#[derive(Debug, Clone, Deserialize)]
pub struct AuthorizationRequest {
    /// Must be "code"; this server only implements the authorization code grant front door.
    pub response_type: String,
    pub client_id: String,
    pub redirect_uri: String,
    #[serde(default)]
    pub scope: Option<String>,
    #[serde(default)]
    pub code_challenge: Option<String>,
    #[serde(default = "default_code_challenge_method")]
    pub code_challenge_method: Option<String>,
    pub state: Option<String>,
    /// OpenID Connect nonce, carried through to the ID token when minted.
    pub nonce: Option<String>,
}

fn default_code_challenge_method() -> Option<String> {
    Some("S256".to_string())
}

impl AuthorizationRequest {
    pub fn scopes(&self) -> Vec<String> {
        self.scope
            .as_ref()
            .map(|s| s.split_whitespace().map(String::from).collect())
            .unwrap_or_default()
    }
}

/// Carried as query parameters on the redirect back to `redirect_uri` once a code is issued.
#[derive(Debug, Clone, Serialize)]
pub struct AuthorizationResponse {
    pub code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
}

impl From<crate::services::IssuedAuthorizationCode> for AuthorizationResponse {
    fn from(issued: crate::services::IssuedAuthorizationCode) -> Self {
        Self { code: issued.code, state: issued.state }
    }
}

// ============================================================================
// Token Request / Response
// ============================================================================

/// Form body for `POST /oauth/token`. Field population depends on `grant_type`:
/// authorization_code needs `code`/`redirect_uri`/`code_verifier`; refresh_token needs
/// `refresh_token`; client_credentials needs neither and defaults scope to the client's
/// allowed set.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenRequest {
    pub grant_type: String,
    pub code: Option<String>,
    pub redirect_uri: Option<String>,
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub code_verifier: Option<String>,
    pub refresh_token: Option<String>,
    pub scope: Option<String>,
    /// RFC 7523 `client_assertion_type`, required alongside `client_assertion`.
    pub client_assertion_type: Option<String>,
    /// RFC 7523 signed JWT proving possession of the client's private key.
    pub client_assertion: Option<String>,
}

impl TokenRequest {
    pub fn scopes(&self) -> Vec<String> {
        self.scope
            .as_ref()
            .map(|s| s.split_whitespace().map(String::from).collect())
            .unwrap_or_default()
    }

    /// Assembles the credentials the client authenticator needs, folding in whatever was
    /// extracted from an `Authorization: Basic` header.
    pub fn client_credentials(
        &self,
        basic_auth: Option<(String, String)>,
    ) -> crate::services::ClientCredentials {
        crate::services::ClientCredentials {
            client_id: self.client_id.clone(),
            client_secret: self.client_secret.clone(),
            client_assertion_type: self.client_assertion_type.clone(),
            client_assertion: self.client_assertion.clone(),
            basic_auth,
        }
    }
}

/// `POST /oauth/token` success body. Mirrors `crate::services::OAuthTokenResponse`; kept as a
/// separate type so the wire shape (field order, serde attributes) isn't coupled to the
/// service layer's internal representation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OAuthTokenResponseDto {
    pub access_token: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    pub token_type: String,
    pub expires_in: i64,
    pub scope: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id_token: Option<String>,
}

impl From<crate::services::OAuthTokenResponse> for OAuthTokenResponseDto {
    fn from(response: crate::services::OAuthTokenResponse) -> Self {
        Self {
            access_token: response.access_token,
            refresh_token: response.refresh_token,
            token_type: response.token_type,
            expires_in: response.expires_in,
            scope: response.scope,
            id_token: response.id_token,
        }
    }
}

/// RFC 6749 §5.1: token responses "MUST include the HTTP Cache-Control response header field
/// with a value of no-store" plus a matching `Pragma: no-cache` for HTTP/1.0 caches.
impl IntoResponse for OAuthTokenResponseDto {
    fn into_response(self) -> Response {
        let mut response = Json(self).into_response();
        response
            .headers_mut()
            .insert(header::CACHE_CONTROL, HeaderValue::from_static("no-store"));
        response
            .headers_mut()
            .insert(header::PRAGMA, HeaderValue::from_static("no-cache"));
        response
    }
}

// ============================================================================
// Revocation
// ============================================================================

/// Form body for `POST /oauth/revoke` (RFC 7009).
#[derive(Debug, Clone, Deserialize)]
pub struct RevokeRequest {
    pub token: String,
    #[serde(default)]
    pub token_type_hint: Option<String>,
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
}

// ============================================================================
// Consent bookkeeping
//
// A collaborator that has already authenticated the resource owner (session, SSO, ...) may
// ask the core whether standing consent already covers a requested scope set, to skip
// re-prompting, and may ask the core to tear one down.
// ============================================================================

/// Query parameters for `GET /oauth/consent/check`.
#[derive(Debug, Clone, Deserialize)]
pub struct ConsentCheckQuery {
    pub user_id: String,
    pub client_id: String,
    #[serde(default)]
    pub scope: Option<String>,
}

impl ConsentCheckQuery {
    pub fn scopes(&self) -> Vec<String> {
        self.scope
            .as_ref()
            .map(|s| s.split_whitespace().map(String::from).collect())
            .unwrap_or_default()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ConsentCheckResponse {
    pub sufficient: bool,
}

/// Body for `POST /oauth/consent/revoke`.
#[derive(Debug, Clone, Deserialize)]
pub struct ConsentRevokeRequest {
    pub user_id: String,
    pub client_id: String,
}

// ============================================================================
// UserInfo
// ============================================================================

/// `GET /oauth/userinfo` response. Field population follows the OIDC standard claims table,
/// gated by which scopes the presented access token actually carries.
#[derive(Debug, Clone, Serialize)]
pub struct UserInfoResponse {
    pub sub: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email_verified: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub given_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub family_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub preferred_username: Option<String>,
}

// ============================================================================
// OpenID Connect discovery
// ============================================================================

/// `GET /.well-known/openid-configuration` body (RFC 8414 / OIDC Discovery).
#[derive(Debug, Clone, Serialize)]
pub struct OpenIdConfiguration {
    pub issuer: String,
    pub authorization_endpoint: String,
    pub token_endpoint: String,
    pub userinfo_endpoint: String,
    pub revocation_endpoint: String,
    pub jwks_uri: String,
    pub response_types_supported: Vec<String>,
    pub grant_types_supported: Vec<String>,
    pub scopes_supported: Vec<String>,
    pub token_endpoint_auth_methods_supported: Vec<String>,
    pub code_challenge_methods_supported: Vec<String>,
    pub subject_types_supported: Vec<String>,
    pub id_token_signing_alg_values_supported: Vec<String>,
}

impl OpenIdConfiguration {
    pub fn new(base_url: &str, scopes: Vec<String>) -> Self {
        let base_url = base_url.trim_end_matches('/');
        Self {
            issuer: base_url.to_string(),
            authorization_endpoint: format!("{base_url}/oauth/authorize"),
            token_endpoint: format!("{base_url}/oauth/token"),
            userinfo_endpoint: format!("{base_url}/oauth/userinfo"),
            revocation_endpoint: format!("{base_url}/oauth/revoke"),
            jwks_uri: format!("{base_url}/.well-known/jwks.json"),
            response_types_supported: vec!["code".to_string()],
            grant_types_supported: vec![
                "authorization_code".to_string(),
                "client_credentials".to_string(),
                "refresh_token".to_string(),
            ],
            scopes_supported: scopes,
            token_endpoint_auth_methods_supported: vec![
                "client_secret_post".to_string(),
                "client_secret_basic".to_string(),
                "private_key_jwt".to_string(),
            ],
            code_challenge_methods_supported: vec!["S256".to_string()],
            subject_types_supported: vec!["public".to_string()],
            id_token_signing_alg_values_supported: vec!["RS256".to_string()],
        }
    }
}

// ============================================================================
// Consent hand-off
//
// HTML rendering belongs to a collaborator; these two DTOs are the hand-off contract between
// this core and whatever renders the consent screen. `GET /oauth/authorize` returns a
// `ConsentScreenInfo` describing what's being requested; the collaborator authenticates the
// resource owner, shows them the screen, and posts a `ConsentDecision` back to
// `POST /oauth/authorize/callback`.
// ============================================================================

#[derive(Debug, Clone, Serialize)]
pub struct ConsentScreenInfo {
    pub client_id: String,
    pub client_name: String,
    pub scopes: Vec<ScopeInfo>,
    pub redirect_uri: String,
    pub state: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ScopeInfo {
    pub code: String,
    pub description: String,
}

/// The resource owner's decision on a pending authorization request.
#[derive(Debug, Clone, Deserialize)]
pub struct ConsentDecision {
    /// Authenticating the resource owner is a collaborator's job (session/login); this core
    /// only ever needs the id it resolved to.
    pub user_id: String,
    pub approved: bool,
    pub client_id: String,
    pub redirect_uri: String,
    #[serde(default)]
    pub scope: Option<String>,
    pub state: Option<String>,
    pub code_challenge: Option<String>,
    #[serde(default = "default_code_challenge_method")]
    pub code_challenge_method: Option<String>,
}

impl ConsentDecision {
    pub fn scopes(&self) -> Vec<String> {
        self.scope
            .as_ref()
            .map(|s| s.split_whitespace().map(String::from).collect())
            .unwrap_or_default()
    }
}
