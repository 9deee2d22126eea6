pub mod access_token;
pub mod audit_log;
pub mod authorization_code;
pub mod jti_blacklist;
pub mod oauth_client;
pub mod oauth_repository;
pub mod oauth_scope;
pub mod rate_limit;
pub mod refresh_token;
pub mod user;
pub mod user_consent;

pub use access_token::AccessTokenRepository;
pub use audit_log::AuditLogRepository;
pub use authorization_code::AuthorizationCodeRepository;
pub use jti_blacklist::JtiBlacklistRepository;
pub use oauth_client::OAuthClientRepository;
pub use oauth_repository::{MySqlOAuthRepository, OAuthRepository};
pub use oauth_scope::OAuthScopeRepository;
pub use rate_limit::RateLimitRepository;
pub use refresh_token::RefreshTokenRepository;
pub use user::UserRepository;
pub use user_consent::UserConsentRepository;
