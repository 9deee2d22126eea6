pub mod audit;
pub mod client_auth;
pub mod consent;
pub mod oauth;
pub mod scope;

pub use audit::AuditService;
pub use client_auth::{ClientAuthenticator, ClientCredentials};
pub use consent::ConsentService;
pub use oauth::{AuthorizeContext, IssuedAuthorizationCode, OAuthService, OAuthTokenResponse};
