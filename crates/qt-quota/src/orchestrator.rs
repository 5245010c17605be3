//! Runs one fetch per discovered account with bounded concurrency and falls
//! back to cached data when a fetch fails.

use futures::future::join_all;
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::panic::AssertUnwindSafe;
use tokio::sync::Semaphore;

use qt_config::{QuotaConfig, QuotaPaths};

use crate::cache::QuotaCache;
use crate::model::{DiscoveredAccount, FetchResult, FetchStatus, ProviderQuotaData};
use crate::providers::{Provider, ProviderFetcher, QuotaFetcher};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorKind {
    Unsupported,
    Auth,
    Forbidden,
    Fetch,
    Exception,
    Timeout,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Unsupported => "unsupported",
            ErrorKind::Auth => "auth",
            ErrorKind::Forbidden => "forbidden",
            ErrorKind::Fetch => "fetch",
            ErrorKind::Exception => "exception",
            ErrorKind::Timeout => "timeout",
        }
    }

    /// Kind for a non-success fetch status.
    pub fn from_status(status: FetchStatus) -> Option<Self> {
        match status {
            FetchStatus::Success => None,
            FetchStatus::NeedsReauth => Some(ErrorKind::Auth),
            FetchStatus::Forbidden => Some(ErrorKind::Forbidden),
            FetchStatus::Timeout => Some(ErrorKind::Timeout),
            FetchStatus::Failed => Some(ErrorKind::Fetch),
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutcomeError {
    pub kind: ErrorKind,
    pub message: String,
}

/// The result for one account after fallback has been applied.
#[derive(Debug, Clone, PartialEq)]
pub struct AccountOutcome {
    pub provider: String,
    pub account: String,
    /// Fresh data, cached data (when `fallback_used`), the failed fetch's
    /// own data, or nothing.
    pub data: Option<ProviderQuotaData>,
    pub error: Option<OutcomeError>,
    pub fallback_used: bool,
}

impl AccountOutcome {
    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }

    pub fn cli_error(&self) -> Option<CliError> {
        self.error.as_ref().map(|e| CliError {
            provider: self.provider.clone(),
            account: self.account.clone(),
            error: e.kind,
            message: e.message.clone(),
            fallback_used: self.fallback_used,
        })
    }
}

/// Error record as it appears in command output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CliError {
    pub provider: String,
    pub account: String,
    pub error: ErrorKind,
    pub message: String,
    pub fallback_used: bool,
}

pub struct Orchestrator<F> {
    fetcher: F,
    cache: Option<QuotaCache>,
}

impl Orchestrator<ProviderFetcher> {
    /// Production fetcher with the cache at its platform location.
    pub fn with_defaults() -> Self {
        let cache = match QuotaPaths::new() {
            Ok(paths) => Some(QuotaCache::from_paths(&paths)),
            Err(e) => {
                tracing::warn!("Cache disabled: {}", e);
                None
            }
        };
        Self::new(ProviderFetcher::new(), cache)
    }
}

impl<F: QuotaFetcher> Orchestrator<F> {
    pub fn new(fetcher: F, cache: Option<QuotaCache>) -> Self {
        Self { fetcher, cache }
    }

    pub fn fetcher(&self) -> &F {
        &self.fetcher
    }

    /// Fetch every account. All fetches settle; one failure never cancels
    /// another. Output order follows `accounts`.
    pub async fn fetch_all(
        &self,
        accounts: &[DiscoveredAccount],
        config: &QuotaConfig,
    ) -> Vec<AccountOutcome> {
        let global = Semaphore::new(config.rate_limit.max_concurrency.max(1));
        let mut per_provider: HashMap<&str, Semaphore> = HashMap::new();
        for account in accounts {
            per_provider
                .entry(account.provider.as_str())
                .or_insert_with(|| Semaphore::new(config.rate_limit.per_provider.max(1)));
        }
        let cache = self.cache.as_ref().filter(|_| config.cache.enabled);

        let tasks = accounts.iter().map(|account| {
            let global = &global;
            let local = per_provider.get(account.provider.as_str());
            async move {
                let Some(provider) = Provider::from_tag(&account.provider) else {
                    tracing::debug!("No fetcher for provider: {}", account.provider);
                    return AccountOutcome {
                        provider: account.provider.clone(),
                        account: account.account.clone(),
                        data: None,
                        error: Some(OutcomeError {
                            kind: ErrorKind::Unsupported,
                            message: "Unsupported provider".to_string(),
                        }),
                        fallback_used: false,
                    };
                };

                // Provider slot first, so queued accounts never sit on a
                // global slot.
                let _provider_permit = match local {
                    Some(sem) => sem.acquire().await.ok(),
                    None => None,
                };
                let _global_permit = global.acquire().await.ok();

                let fetched = AssertUnwindSafe(self.fetcher.fetch(provider, account, config))
                    .catch_unwind()
                    .await;
                settle(account, fetched, cache, config)
            }
        });

        join_all(tasks).await
    }
}

fn settle(
    account: &DiscoveredAccount,
    fetched: Result<FetchResult, Box<dyn Any + Send>>,
    cache: Option<&QuotaCache>,
    config: &QuotaConfig,
) -> AccountOutcome {
    let (kind, message, data) = match fetched {
        Ok(result) => match ErrorKind::from_status(result.status) {
            None => {
                if let Some(cache) = cache {
                    cache.set_provider_quota(
                        &account.provider,
                        &account.account,
                        &result.data,
                        config.cache.ttl_seconds,
                    );
                }
                return AccountOutcome {
                    provider: account.provider.clone(),
                    account: account.account.clone(),
                    data: Some(result.data),
                    error: None,
                    fallback_used: false,
                };
            }
            Some(kind) => {
                let message = result.error().unwrap_or("Unknown error").to_string();
                (kind, message, Some(result.data))
            }
        },
        Err(panic) => {
            let message = panic_message(panic.as_ref());
            tracing::debug!(
                "Fetcher for {}/{} panicked: {}",
                account.provider,
                account.account,
                message
            );
            (ErrorKind::Exception, message, None)
        }
    };

    let cached = cache.and_then(|c| c.get_provider_quota(&account.provider, &account.account));
    let fallback_used = cached.is_some();
    if fallback_used {
        tracing::debug!(
            "Using cached quota for {}/{} after {} error",
            account.provider,
            account.account,
            kind
        );
    }
    AccountOutcome {
        provider: account.provider.clone(),
        account: account.account.clone(),
        data: cached.map(|c| c.data).or(data),
        error: Some(OutcomeError { kind, message }),
        fallback_used,
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "Unknown error".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_serialize_lowercase() {
        assert_eq!(serde_json::to_value(ErrorKind::Unsupported).unwrap(), "unsupported");
        assert_eq!(ErrorKind::Timeout.to_string(), "timeout");
        assert_eq!(ErrorKind::from_status(FetchStatus::NeedsReauth), Some(ErrorKind::Auth));
        assert_eq!(ErrorKind::from_status(FetchStatus::Failed), Some(ErrorKind::Fetch));
        assert_eq!(ErrorKind::from_status(FetchStatus::Success), None);
    }

    #[test]
    fn cli_error_shape() {
        let outcome = AccountOutcome {
            provider: "claude".into(),
            account: "a@x.com".into(),
            data: None,
            error: Some(OutcomeError {
                kind: ErrorKind::Auth,
                message: "Unauthorized".into(),
            }),
            fallback_used: false,
        };
        let json = serde_json::to_value(outcome.cli_error().unwrap()).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "provider": "claude",
                "account": "a@x.com",
                "error": "auth",
                "message": "Unauthorized",
                "fallbackUsed": false,
            })
        );
    }

    #[test]
    fn panic_payloads_render() {
        let boxed: Box<dyn Any + Send> = Box::new("boom");
        assert_eq!(panic_message(boxed.as_ref()), "boom");
        let boxed: Box<dyn Any + Send> = Box::new(String::from("bang"));
        assert_eq!(panic_message(boxed.as_ref()), "bang");
        let boxed: Box<dyn Any + Send> = Box::new(7u8);
        assert_eq!(panic_message(boxed.as_ref()), "Unknown error");
    }
}
