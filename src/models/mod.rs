pub mod access_token;
pub mod audit_log;
pub mod authorization_code;
pub mod jti_blacklist;
pub mod key_version;
pub mod oauth_client;
pub mod oauth_scope;
pub mod refresh_token;
pub mod user;
pub mod user_consent;

pub use access_token::*;
pub use audit_log::*;
pub use authorization_code::*;
pub use jti_blacklist::*;
pub use key_version::*;
pub use oauth_client::*;
pub use oauth_scope::*;
pub use refresh_token::*;
pub use user::*;
pub use user_consent::*;
