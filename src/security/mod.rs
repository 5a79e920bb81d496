pub mod api_key;
pub mod hmac;
pub mod permissions;
pub mod rate_limit;

pub use api_key::ApiKeyValidator;
pub use permissions::{Permission, Role};
pub use rate_limit::RateLimiter;
