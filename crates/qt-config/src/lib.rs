pub mod cache;
pub mod config;
pub mod paths;
pub mod rate_limit;

pub use cache::CacheConfig;
pub use config::{ConfigOverrides, OutputFormat, QuotaConfig};
pub use paths::{expand_path, QuotaPaths};
pub use rate_limit::RateLimitConfig;
