use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

/// RFC 6749 §5.2 error body: `{error, error_description}`.
#[derive(Debug, Serialize)]
pub struct OAuthErrorBody {
    pub error: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_description: Option<String>,
}

/// Every error the protocol engine can surface, each tagged with the OAuth 2.0 error code and
/// HTTP status RFC 6749 §5.2 mandates.
#[derive(Debug, thiserror::Error)]
pub enum OAuthError {
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("invalid client")]
    InvalidClient(String),

    #[error("invalid grant: {0}")]
    InvalidGrant(String),

    #[error("client not authorized for this grant type")]
    UnauthorizedClient,

    #[error("unsupported grant type")]
    UnsupportedGrantType,

    #[error("invalid scope: {0}")]
    InvalidScope(String),

    #[error("access denied")]
    AccessDenied,

    #[error("rate limit exceeded")]
    TemporarilyUnavailable,

    #[error("internal error: {0}")]
    ServerError(String),
}

impl OAuthError {
    pub fn code(&self) -> &'static str {
        match self {
            OAuthError::InvalidRequest(_) => "invalid_request",
            OAuthError::InvalidClient(_) => "invalid_client",
            OAuthError::InvalidGrant(_) => "invalid_grant",
            OAuthError::UnauthorizedClient => "unauthorized_client",
            OAuthError::UnsupportedGrantType => "unsupported_grant_type",
            OAuthError::InvalidScope(_) => "invalid_scope",
            OAuthError::AccessDenied => "access_denied",
            OAuthError::TemporarilyUnavailable => "temporarily_unavailable",
            OAuthError::ServerError(_) => "server_error",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            OAuthError::InvalidClient(_) => StatusCode::UNAUTHORIZED,
            OAuthError::TemporarilyUnavailable => StatusCode::TOO_MANY_REQUESTS,
            OAuthError::ServerError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            OAuthError::AccessDenied => StatusCode::BAD_REQUEST,
            _ => StatusCode::BAD_REQUEST,
        }
    }

    /// Narrow, non-revealing description surfaced to the client. Internal detail (SQL errors,
    /// stack traces) never reaches `error_description`.
    pub fn description(&self) -> Option<String> {
        match self {
            OAuthError::InvalidRequest(d) => Some(d.clone()),
            OAuthError::InvalidClient(d) if !d.is_empty() => Some(d.clone()),
            OAuthError::InvalidGrant(d) => Some(d.clone()),
            OAuthError::InvalidScope(d) => Some(d.clone()),
            _ => None,
        }
    }
}

impl From<sqlx::Error> for OAuthError {
    fn from(e: sqlx::Error) -> Self {
        OAuthError::ServerError(e.to_string())
    }
}

impl IntoResponse for OAuthError {
    fn into_response(self) -> Response {
        if let OAuthError::ServerError(ref msg) = self {
            tracing::error!(error = %msg, "oauth server_error");
        }

        let status = self.status();
        let body = Json(OAuthErrorBody {
            error: self.code(),
            error_description: self.description(),
        });

        let mut response = (status, body).into_response();
        response
            .headers_mut()
            .insert(header::CACHE_CONTROL, HeaderValue::from_static("no-store"));
        response
            .headers_mut()
            .insert(header::PRAGMA, HeaderValue::from_static("no-cache"));
        if matches!(self, OAuthError::InvalidClient(_)) {
            response.headers_mut().insert(
                header::WWW_AUTHENTICATE,
                HeaderValue::from_static("Basic realm=\"oauth\""),
            );
        }
        response
    }
}

/// Errors from verifying a bearer token against a protected resource. Distinct from
/// `OAuthError` because the wire shape differs (`WWW-Authenticate`, not always JSON-shaped
/// the same way) and because these never occur at the token endpoint itself.
#[derive(Debug, thiserror::Error)]
pub enum BearerError {
    #[error("missing or malformed bearer token")]
    MissingToken,

    #[error("invalid or expired token")]
    InvalidToken,

    #[error("insufficient scope: {0}")]
    InsufficientScope(String),
}

impl IntoResponse for BearerError {
    fn into_response(self) -> Response {
        let (status, code, www_auth) = match &self {
            BearerError::MissingToken => (
                StatusCode::UNAUTHORIZED,
                "invalid_token",
                "Bearer realm=\"API\"".to_string(),
            ),
            BearerError::InvalidToken => (
                StatusCode::UNAUTHORIZED,
                "invalid_token",
                "Bearer realm=\"API\"".to_string(),
            ),
            BearerError::InsufficientScope(scope) => (
                StatusCode::FORBIDDEN,
                "insufficient_scope",
                format!("Bearer realm=\"API\", scope=\"{scope}\""),
            ),
        };

        let body = Json(OAuthErrorBody {
            error: code,
            error_description: Some(self.to_string()),
        });

        let mut response = (status, body).into_response();
        if let Ok(value) = HeaderValue::from_str(&www_auth) {
            response.headers_mut().insert(header::WWW_AUTHENTICATE, value);
        }
        response
    }
}
