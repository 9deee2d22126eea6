//! Bearer-token authentication for protected resources.
//!
//! Verifies `Authorization: Bearer <jwt>` against the access-token signing key and the JTI
//! blacklist (`JwtEngine::verify_access_token` already does the revocation check), then
//! exposes the resulting grant as a request extension via the `BearerAuth` extractor.

use axum::{
    body::Body,
    extract::{FromRequestParts, State},
    http::{header::AUTHORIZATION, request::Parts, Request},
    middleware::Next,
    response::Response,
};

use crate::config::AppState;
use crate::error::BearerError;

/// The verified grant behind a bearer token, injected into request extensions by
/// `bearer_auth_middleware` and pulled back out by handlers via the `FromRequestParts` impl.
#[derive(Debug, Clone)]
pub struct BearerAuth {
    pub subject: String,
    pub client_id: String,
    pub scopes: Vec<String>,
    pub permissions: Vec<String>,
}

impl BearerAuth {
    pub fn has_scope(&self, scope: &str) -> bool {
        self.scopes.iter().any(|s| s == scope)
    }

    pub fn has_all_scopes(&self, required: &[String]) -> bool {
        required.iter().all(|s| self.has_scope(s))
    }

    /// Used by handlers behind `bearer_auth_middleware` that additionally require a specific
    /// scope, surfacing 403 with `WWW-Authenticate: Bearer realm="API", scope="<scope>"`.
    pub fn require_scope(&self, scope: &str) -> Result<(), BearerError> {
        if self.has_scope(scope) {
            Ok(())
        } else {
            Err(BearerError::InsufficientScope(scope.to_string()))
        }
    }
}

pub async fn bearer_auth_middleware(
    State(state): State<AppState>,
    mut request: Request<Body>,
    next: Next,
) -> Result<Response, BearerError> {
    let header = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .ok_or(BearerError::MissingToken)?;

    let token = header.strip_prefix("Bearer ").ok_or(BearerError::MissingToken)?.trim();
    if token.is_empty() {
        return Err(BearerError::MissingToken);
    }

    let claims = state
        .jwt_engine
        .verify_access_token(token, state.repo.as_ref())
        .await
        .map_err(|_| BearerError::InvalidToken)?;

    let scopes = crate::services::scope::parse_scopes(&claims.scope);
    request.extensions_mut().insert(BearerAuth {
        subject: claims.sub,
        client_id: claims.client_id,
        scopes,
        permissions: claims.permissions,
    });

    Ok(next.run(request).await)
}

impl<S> FromRequestParts<S> for BearerAuth
where
    S: Send + Sync,
{
    type Rejection = BearerError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<BearerAuth>()
            .cloned()
            .ok_or(BearerError::MissingToken)
    }
}
