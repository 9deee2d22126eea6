pub mod oauth_auth;
pub mod rate_limit;

pub use oauth_auth::{bearer_auth_middleware, BearerAuth};
pub use rate_limit::{InMemoryRateLimiter, RateLimiterStore, RepositoryRateLimiter};
