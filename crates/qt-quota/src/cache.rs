//! Disk cache of the last good quota per account and the last proxy usage
//! snapshot.
//!
//! Everything lives in one JSON document. Writers take an exclusive lock on
//! a sidecar `.lock` file, rewrite the whole document into a temp file and
//! rename it over the original, so readers never see a partial file and
//! concurrent processes never drop each other's keys.

use chrono::{DateTime, TimeZone, Utc};
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use qt_config::QuotaPaths;

use crate::error::CacheError;
use crate::model::ProviderQuotaData;
use crate::proxy::UsageData;

const CACHE_FILE: &str = "cache.json";
pub const PROXY_USAGE_TTL_SECONDS: u64 = 15;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheEntry<T> {
    pub data: T,
    /// Milliseconds since the Unix epoch.
    pub timestamp: i64,
    pub ttl_seconds: u64,
}

impl<T> CacheEntry<T> {
    fn age_millis(&self, now: DateTime<Utc>) -> i64 {
        (now.timestamp_millis() - self.timestamp).max(0)
    }

    pub fn age_seconds(&self, now: DateTime<Utc>) -> u64 {
        (self.age_millis(now) / 1000) as u64
    }

    pub fn is_stale(&self, now: DateTime<Utc>) -> bool {
        self.age_millis(now) >= (self.ttl_seconds as i64).saturating_mul(1000)
    }

    pub fn cached_at(&self) -> Option<DateTime<Utc>> {
        Utc.timestamp_millis_opt(self.timestamp).single()
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CacheDocument {
    #[serde(default)]
    providers: BTreeMap<String, BTreeMap<String, CacheEntry<ProviderQuotaData>>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    proxy_usage: Option<CacheEntry<UsageData>>,
}

/// A cached quota, annotated with how old it is.
#[derive(Debug, Clone, PartialEq)]
pub struct CachedQuota {
    /// The stored payload with `isStale`, `cachedAt` and `ageSeconds` set.
    pub data: ProviderQuotaData,
    pub age_seconds: u64,
    pub is_stale: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CachedUsage {
    pub data: UsageData,
    pub age_seconds: u64,
    pub is_stale: bool,
}

#[derive(Debug, Clone)]
pub struct QuotaCache {
    dir: PathBuf,
}

impl QuotaCache {
    /// Cache stored in `dir/cache.json`. The directory is created lazily on
    /// first write.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn from_paths(paths: &QuotaPaths) -> Self {
        Self::new(paths.cache_dir())
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path(&self) -> PathBuf {
        self.dir.join(CACHE_FILE)
    }

    fn lock_path(&self) -> PathBuf {
        self.dir.join(format!("{CACHE_FILE}.lock"))
    }

    fn temp_path(&self) -> PathBuf {
        self.dir.join(format!("{CACHE_FILE}.tmp"))
    }

    /// Cached quota for one account, stale or not.
    pub fn get_provider_quota(&self, provider: &str, account: &str) -> Option<CachedQuota> {
        self.get_provider_quota_at(provider, account, Utc::now())
    }

    pub fn get_provider_quota_at(
        &self,
        provider: &str,
        account: &str,
        now: DateTime<Utc>,
    ) -> Option<CachedQuota> {
        let doc = self.read_logged()?;
        let entry = doc.providers.get(provider)?.get(account)?;
        let age_seconds = entry.age_seconds(now);
        let is_stale = entry.is_stale(now);
        let mut data = entry.data.clone();
        data.is_stale = is_stale;
        data.cached_at = entry.cached_at();
        data.age_seconds = Some(age_seconds);
        Some(CachedQuota {
            data,
            age_seconds,
            is_stale,
        })
    }

    /// Store `data` for one account, replacing any previous entry. Failures
    /// are logged and swallowed.
    pub fn set_provider_quota(
        &self,
        provider: &str,
        account: &str,
        data: &ProviderQuotaData,
        ttl_seconds: u64,
    ) {
        self.set_provider_quota_at(provider, account, data, ttl_seconds, Utc::now())
    }

    pub fn set_provider_quota_at(
        &self,
        provider: &str,
        account: &str,
        data: &ProviderQuotaData,
        ttl_seconds: u64,
        now: DateTime<Utc>,
    ) {
        let entry = CacheEntry {
            data: data.clone(),
            timestamp: now.timestamp_millis(),
            ttl_seconds,
        };
        let result = self.update(|doc| {
            doc.providers
                .entry(provider.to_string())
                .or_default()
                .insert(account.to_string(), entry);
        });
        if let Err(e) = result {
            tracing::warn!(
                "Failed to cache quota for {}/{} [{}]: {}",
                provider,
                account,
                e.error_code(),
                e
            );
        }
    }

    pub fn get_proxy_usage(&self) -> Option<CachedUsage> {
        self.get_proxy_usage_at(Utc::now())
    }

    pub fn get_proxy_usage_at(&self, now: DateTime<Utc>) -> Option<CachedUsage> {
        let entry = self.read_logged()?.proxy_usage?;
        Some(CachedUsage {
            age_seconds: entry.age_seconds(now),
            is_stale: entry.is_stale(now),
            data: entry.data,
        })
    }

    pub fn set_proxy_usage(&self, data: &UsageData, ttl_seconds: u64) {
        self.set_proxy_usage_at(data, ttl_seconds, Utc::now())
    }

    pub fn set_proxy_usage_at(&self, data: &UsageData, ttl_seconds: u64, now: DateTime<Utc>) {
        let entry = CacheEntry {
            data: data.clone(),
            timestamp: now.timestamp_millis(),
            ttl_seconds,
        };
        if let Err(e) = self.update(|doc| doc.proxy_usage = Some(entry)) {
            tracing::warn!("Failed to cache proxy usage [{}]: {}", e.error_code(), e);
        }
    }

    /// Delete the cache file.
    pub fn clear(&self) -> Result<(), CacheError> {
        let _lock = self.lock()?;
        match std::fs::remove_file(self.path()) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn read_logged(&self) -> Option<CacheDocument> {
        match self.read() {
            Ok(doc) => Some(doc),
            Err(e) => {
                tracing::debug!(
                    "Ignoring cache at {} [{}]: {}",
                    self.path().display(),
                    e.error_code(),
                    e
                );
                None
            }
        }
    }

    fn read(&self) -> Result<CacheDocument, CacheError> {
        let content = match std::fs::read_to_string(self.path()) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(CacheDocument::default())
            }
            Err(e) => return Err(e.into()),
        };
        Ok(serde_json::from_str(&content)?)
    }

    /// Read-modify-write under the exclusive lock.
    fn update<F>(&self, apply: F) -> Result<(), CacheError>
    where
        F: FnOnce(&mut CacheDocument),
    {
        self.ensure_dir()?;
        let _lock = self.lock()?;
        let mut doc = self.read().unwrap_or_else(|e| {
            tracing::debug!("Replacing unreadable cache: {}", e);
            CacheDocument::default()
        });
        apply(&mut doc);
        self.write_atomic(&doc)
    }

    fn ensure_dir(&self) -> Result<(), CacheError> {
        let mut builder = std::fs::DirBuilder::new();
        builder.recursive(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::DirBuilderExt;
            builder.mode(0o700);
        }
        builder.create(&self.dir)?;
        Ok(())
    }

    fn lock(&self) -> Result<File, CacheError> {
        let path = self.lock_path();
        let lock_err = |source| CacheError::Lock {
            path: path.clone(),
            source,
        };
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&path)
            .map_err(lock_err)?;
        file.lock_exclusive().map_err(lock_err)?;
        Ok(file)
    }

    fn write_atomic(&self, doc: &CacheDocument) -> Result<(), CacheError> {
        let tmp_path = self.temp_path();
        let content = serde_json::to_vec_pretty(doc)?;

        let mut options = OpenOptions::new();
        options.create(true).write(true).truncate(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(0o600);
        }
        let mut file = options.open(&tmp_path)?;
        file.write_all(&content)?;
        file.sync_all()?;
        drop(file);

        std::fs::rename(&tmp_path, self.path())?;
        Ok(())
    }
}
