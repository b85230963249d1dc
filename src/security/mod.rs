pub mod api_key;
pub mod rate_limit_middleware;
pub mod rate_limiter;

pub use api_key::ApiKeyGuard;
pub use rate_limit_middleware::{RateLimitMiddleware, RateLimitOptions, RouteRule};
pub use rate_limiter::{RateLimiter, RateLimiterConfig};
