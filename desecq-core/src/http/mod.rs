mod client;
mod rate_limit;

pub use client::{ApiClient, DEFAULT_BASE_URL};
pub use rate_limit::RateLimiter;
