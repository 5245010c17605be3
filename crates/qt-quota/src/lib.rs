pub mod cache;
pub mod credentials;
pub mod discovery;
pub mod error;
pub mod http;
pub mod model;
pub mod orchestrator;
pub mod providers;
pub mod proxy;
pub mod redact;

pub use cache::{CachedQuota, CachedUsage, QuotaCache, PROXY_USAGE_TTL_SECONDS};
pub use discovery::{discover_all_accounts, discover_all_accounts_with, KnownLocations};
pub use error::{CacheError, DiscoveryError, HttpError};
pub use model::{
    Credentials, DiscoveredAccount, FetchResult, FetchStatus, ModelQuota, ProviderQuotaData,
    QuotaCounters,
};
pub use orchestrator::{AccountOutcome, CliError, ErrorKind, Orchestrator, OutcomeError};
pub use providers::{Provider, ProviderEndpoints, ProviderFetcher, QuotaFetcher};
pub use proxy::{ProxyClient, ProxyHealth, UsageData, UsageStats};
