//! OAuth 2.1 / OpenID Connect HTTP surface: authorization, token, revocation, discovery and
//! the bearer-protected userinfo endpoint.
//!
//! Rendering a consent screen is a collaborator's job (session/login, templating); this module
//! only validates the request and hands the collaborator a `ConsentScreenInfo` to show, then
//! accepts its `ConsentDecision` back on the callback route.

use std::net::SocketAddr;

use axum::{
    extract::{ConnectInfo, Query, State},
    http::{header::AUTHORIZATION, HeaderMap, StatusCode},
    response::{IntoResponse, Redirect, Response},
    Form, Json,
};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use uuid::Uuid;

use crate::config::AppState;
use crate::dto::oauth::{
    AuthorizationRequest, AuthorizationResponse, ConsentCheckQuery, ConsentCheckResponse,
    ConsentDecision, ConsentRevokeRequest, ConsentScreenInfo, OAuthTokenResponseDto,
    OpenIdConfiguration, RevokeRequest, ScopeInfo, TokenRequest, UserInfoResponse,
};
use crate::error::OAuthError;
use crate::middleware::oauth_auth::BearerAuth;
use crate::middleware::rate_limit::{client_identifier, DEFAULT_MAX_REQUESTS, DEFAULT_WINDOW_SECONDS};
use crate::services::{AuditService, ClientCredentials, ConsentService, OAuthService};
use crate::utils::jwt::JwksDocument;
use crate::utils::pkce;

fn peer_identifier(headers: &HeaderMap, addr: SocketAddr) -> String {
    let forwarded_for = headers.get("x-forwarded-for").and_then(|v| v.to_str().ok());
    client_identifier(forwarded_for, &addr.to_string())
}

fn basic_auth_from_headers(headers: &HeaderMap) -> Option<(String, String)> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let encoded = value.strip_prefix("Basic ")?;
    let decoded = STANDARD.decode(encoded).ok()?;
    let decoded = String::from_utf8(decoded).ok()?;
    let (client_id, secret) = decoded.split_once(':')?;
    Some((client_id.to_string(), secret.to_string()))
}

/// Builds `redirect_uri?error=...&error_description=...[&state=...]`, per RFC 6749 §4.1.2.1.
/// Only reachable once `redirect_uri` itself has already been validated against the client.
fn error_redirect(redirect_uri: &str, error: &str, description: &str, state: Option<&str>) -> Response {
    let mut url = redirect_uri.to_string();
    url.push_str(if url.contains('?') { "&" } else { "?" });
    url.push_str(&format!(
        "error={}&error_description={}",
        urlencoding::encode(error),
        urlencoding::encode(description),
    ));
    if let Some(s) = state {
        url.push_str(&format!("&state={}", urlencoding::encode(s)));
    }
    Redirect::temporary(&url).into_response()
}

fn success_redirect(redirect_uri: &str, response: AuthorizationResponse) -> Response {
    let mut url = redirect_uri.to_string();
    url.push_str(if url.contains('?') { "&" } else { "?" });
    url.push_str(&format!("code={}", urlencoding::encode(&response.code)));
    if let Some(s) = &response.state {
        url.push_str(&format!("&state={}", urlencoding::encode(s)));
    }
    Redirect::temporary(&url).into_response()
}

// ============================================================================
// GET /oauth/authorize
// ============================================================================

/// Validates the request and, on success, returns the `ConsentScreenInfo` a collaborator UI
/// renders for the resource owner. `client_id`/`redirect_uri` are checked before anything
/// else so later failures (bad scope, bad PKCE) can safely redirect rather than render a bare
/// local error: redirecting an unvalidated `redirect_uri` would be an open redirect.
pub async fn authorize_handler(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    Query(req): Query<AuthorizationRequest>,
) -> Response {
    if let Err(e) = state
        .rate_limiter
        .check(&peer_identifier(&headers, addr), "authorize", DEFAULT_MAX_REQUESTS, DEFAULT_WINDOW_SECONDS)
        .await
    {
        return e.into_response();
    }

    let client = match state.repo.find_active_client(&req.client_id).await {
        Ok(Some(client)) => client,
        Ok(None) => return OAuthError::InvalidRequest("unknown client_id".to_string()).into_response(),
        Err(e) => return e.into_response(),
    };
    if !client.has_redirect_uri(&req.redirect_uri) {
        return OAuthError::InvalidRequest("redirect_uri is not registered for this client".to_string())
            .into_response();
    }

    AuditService::new(state.repo.clone())
        .log_authorization_requested(&req.client_id, None, None)
        .await;

    let oauth_service = OAuthService::new(state.repo.clone(), state.jwt_engine.clone());
    let ctx = match oauth_service
        .validate_authorize_request(
            &req.response_type,
            &req.client_id,
            &req.redirect_uri,
            req.scope.as_deref().unwrap_or(""),
            req.code_challenge.as_deref().unwrap_or(""),
            req.code_challenge_method.as_deref().unwrap_or(pkce::PKCE_METHOD_S256),
            req.state.clone(),
        )
        .await
    {
        Ok(ctx) => ctx,
        Err(e) => {
            return error_redirect(
                &req.redirect_uri,
                e.code(),
                &e.description().unwrap_or_default(),
                req.state.as_deref(),
            )
        }
    };

    let catalogue = match state.repo.find_scopes_by_names(&ctx.scopes).await {
        Ok(catalogue) => catalogue,
        Err(e) => return e.into_response(),
    };
    let scopes = ctx
        .scopes
        .iter()
        .map(|name| {
            let description = catalogue
                .iter()
                .find(|s| &s.name == name)
                .map(|s| s.description.clone())
                .unwrap_or_default();
            ScopeInfo { code: name.clone(), description }
        })
        .collect();

    Json(ConsentScreenInfo {
        client_id: ctx.client.client_id,
        client_name: ctx.client.name,
        scopes,
        redirect_uri: ctx.redirect_uri,
        state: ctx.state,
    })
    .into_response()
}

// ============================================================================
// POST /oauth/authorize/callback
// ============================================================================

/// Accepts the resource owner's decision from a collaborator UI, re-validates the request
/// (the collaborator is untrusted input same as any other client), and either redirects with
/// a fresh authorization code or with an error.
pub async fn authorize_callback_handler(
    State(state): State<AppState>,
    Json(decision): Json<ConsentDecision>,
) -> Response {
    let oauth_service = OAuthService::new(state.repo.clone(), state.jwt_engine.clone());

    let ctx = match oauth_service
        .validate_authorize_request(
            "code",
            &decision.client_id,
            &decision.redirect_uri,
            decision.scope.as_deref().unwrap_or(""),
            decision.code_challenge.as_deref().unwrap_or(""),
            decision.code_challenge_method.as_deref().unwrap_or(pkce::PKCE_METHOD_S256),
            decision.state.clone(),
        )
        .await
    {
        Ok(ctx) => ctx,
        Err(e) => {
            return error_redirect(
                &decision.redirect_uri,
                e.code(),
                &e.description().unwrap_or_default(),
                decision.state.as_deref(),
            )
        }
    };

    let user_id = match Uuid::parse_str(&decision.user_id) {
        Ok(id) => id,
        Err(_) => {
            return error_redirect(&ctx.redirect_uri, "invalid_request", "user_id is malformed", ctx.state.as_deref())
        }
    };

    match oauth_service.complete_authorization(&ctx, user_id, decision.approved).await {
        Ok(issued) => {
            let redirect_uri = issued.redirect_uri.clone();
            success_redirect(&redirect_uri, issued.into())
        }
        Err(e) => error_redirect(&ctx.redirect_uri, e.code(), &e.description().unwrap_or_default(), ctx.state.as_deref()),
    }
}

// ============================================================================
// POST /oauth/token
// ============================================================================

pub async fn token_handler(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    Form(req): Form<TokenRequest>,
) -> Result<OAuthTokenResponseDto, OAuthError> {
    state
        .rate_limiter
        .check(&peer_identifier(&headers, addr), "token", DEFAULT_MAX_REQUESTS, DEFAULT_WINDOW_SECONDS)
        .await?;

    let creds = req.client_credentials(basic_auth_from_headers(&headers));
    let token_endpoint_url = format!("{}/oauth/token", state.config.jwt_issuer.trim_end_matches('/'));

    let client = match state
        .client_authenticator
        .authenticate(&creds, &token_endpoint_url, state.repo.as_ref())
        .await
    {
        Ok(client) => client,
        Err(e) => {
            AuditService::new(state.repo.clone())
                .log_client_auth_failed(creds.client_id.as_deref(), None, None)
                .await;
            return Err(e);
        }
    };

    let oauth_service = OAuthService::new(state.repo.clone(), state.jwt_engine.clone());
    let response = oauth_service
        .issue_token(
            &client,
            &req.grant_type,
            req.code.as_deref(),
            req.redirect_uri.as_deref(),
            req.code_verifier.as_deref(),
            req.refresh_token.as_deref(),
            req.scope.as_deref(),
        )
        .await?;

    Ok(response.into())
}

// ============================================================================
// POST /oauth/revoke
// ============================================================================

/// RFC 7009: the client must authenticate, but an unrecognized or already-revoked token is
/// never an error — the endpoint always answers 200 once the client itself checks out.
pub async fn revoke_handler(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    Form(req): Form<RevokeRequest>,
) -> Result<StatusCode, OAuthError> {
    state
        .rate_limiter
        .check(&peer_identifier(&headers, addr), "revoke", DEFAULT_MAX_REQUESTS, DEFAULT_WINDOW_SECONDS)
        .await?;

    let creds = ClientCredentials {
        client_id: req.client_id.clone(),
        client_secret: req.client_secret.clone(),
        client_assertion_type: None,
        client_assertion: None,
        basic_auth: basic_auth_from_headers(&headers),
    };

    let token_endpoint_url = format!("{}/oauth/revoke", state.config.jwt_issuer.trim_end_matches('/'));
    let client = state
        .client_authenticator
        .authenticate(&creds, &token_endpoint_url, state.repo.as_ref())
        .await?;

    let oauth_service = OAuthService::new(state.repo.clone(), state.jwt_engine.clone());
    oauth_service.revoke(&client, &req.token, req.token_type_hint.as_deref()).await?;

    Ok(StatusCode::OK)
}

// ============================================================================
// GET /oauth/consent/check, POST /oauth/consent/revoke
// ============================================================================

/// Lets a collaborator that has already identified the resource owner (its own session, SSO,
/// ...) ask whether standing consent already covers a scope set, so it can skip straight to
/// code issuance instead of re-prompting.
pub async fn consent_check_handler(
    State(state): State<AppState>,
    Query(query): Query<ConsentCheckQuery>,
) -> Result<Json<ConsentCheckResponse>, OAuthError> {
    let user_id = Uuid::parse_str(&query.user_id)
        .map_err(|_| OAuthError::InvalidRequest("user_id is malformed".to_string()))?;
    let client = state
        .repo
        .find_active_client(&query.client_id)
        .await?
        .ok_or_else(|| OAuthError::InvalidRequest("unknown client_id".to_string()))?;

    let sufficient = ConsentService::new(state.repo.clone())
        .has_sufficient_consent(user_id, client.id, &query.scopes())
        .await?;

    Ok(Json(ConsentCheckResponse { sufficient }))
}

/// Tears down a standing consent record. Per the repository's cascade, this also revokes
/// every access/refresh token that consent had backed.
pub async fn consent_revoke_handler(
    State(state): State<AppState>,
    Json(req): Json<ConsentRevokeRequest>,
) -> Result<StatusCode, OAuthError> {
    let user_id = Uuid::parse_str(&req.user_id)
        .map_err(|_| OAuthError::InvalidRequest("user_id is malformed".to_string()))?;
    let client = state
        .repo
        .find_active_client(&req.client_id)
        .await?
        .ok_or_else(|| OAuthError::InvalidRequest("unknown client_id".to_string()))?;

    ConsentService::new(state.repo.clone()).revoke(user_id, client.id).await?;

    Ok(StatusCode::OK)
}

// ============================================================================
// GET /.well-known/jwks.json
// ============================================================================

pub async fn jwks_handler(State(state): State<AppState>) -> Result<Json<JwksDocument>, OAuthError> {
    Ok(Json(state.jwt_engine.jwks().await?))
}

// ============================================================================
// GET /.well-known/openid-configuration
// ============================================================================

pub async fn openid_configuration_handler(
    State(state): State<AppState>,
) -> Result<Json<OpenIdConfiguration>, OAuthError> {
    let scopes = state
        .repo
        .list_public_scopes()
        .await?
        .into_iter()
        .map(|s| s.name)
        .collect();
    Ok(Json(OpenIdConfiguration::new(&state.config.jwt_issuer, scopes)))
}

// ============================================================================
// GET /oauth/userinfo (bearer-protected)
// ============================================================================

pub async fn userinfo_handler(
    State(state): State<AppState>,
    auth: BearerAuth,
) -> Result<Json<UserInfoResponse>, OAuthError> {
    let mut response = UserInfoResponse {
        sub: auth.subject.clone(),
        email: None,
        email_verified: None,
        name: None,
        given_name: None,
        family_name: None,
        preferred_username: None,
    };

    // The client_credentials grant mints a token whose subject is the client_id, not a user;
    // there's nothing further to look up in that case.
    let Ok(user_id) = Uuid::parse_str(&auth.subject) else {
        return Ok(Json(response));
    };

    if auth.has_scope("email") || auth.has_scope("profile") {
        if let Some(user) = state.repo.find_user_by_id(user_id).await? {
            if auth.has_scope("email") {
                response.email = Some(user.email.clone());
                response.email_verified = Some(user.email_verified);
            }
            if auth.has_scope("profile") {
                response.name = user.display_name();
                response.given_name = user.given_name.clone();
                response.family_name = user.family_name.clone();
                response.preferred_username = user.preferred_username().map(str::to_string);
            }
        }
    }

    Ok(Json(response))
}
