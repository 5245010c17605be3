use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;

use qt_quota::{CachedUsage, CliError, ProviderQuotaData, UsageData, UsageStats};

use super::Report;

pub const SCHEMA_VERSION: u32 = 1;

/// Machine-readable snapshot shared by `status --format json` and `export`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot<'a> {
    pub schema_version: u32,
    pub generated_at: DateTime<Utc>,
    pub providers: BTreeMap<&'a str, AccountGroup<'a>>,
    pub proxy_usage: Option<UsageData>,
    pub errors: &'a [CliError],
}

#[derive(Debug, Default, Serialize)]
pub struct AccountGroup<'a> {
    pub accounts: BTreeMap<&'a str, &'a ProviderQuotaData>,
}

impl<'a> Snapshot<'a> {
    pub fn new(report: &'a Report, proxy_usage: Option<UsageData>) -> Self {
        let mut providers: BTreeMap<&str, AccountGroup> = BTreeMap::new();
        for data in &report.providers {
            providers
                .entry(data.provider.as_str())
                .or_default()
                .accounts
                .insert(data.account.as_str(), data);
        }
        Self {
            schema_version: SCHEMA_VERSION,
            generated_at: Utc::now(),
            providers,
            proxy_usage,
            errors: &report.errors,
        }
    }
}

pub fn quota_json(report: &Report) -> anyhow::Result<String> {
    snapshot_json(report, None)
}

pub fn snapshot_json(report: &Report, proxy_usage: Option<UsageData>) -> anyhow::Result<String> {
    Ok(serde_json::to_string_pretty(&Snapshot::new(report, proxy_usage))?)
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct UsageOutput<'a> {
    schema_version: u32,
    generated_at: DateTime<Utc>,
    proxy_usage: Option<UsageData>,
    is_reachable: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    cached_age_seconds: Option<u64>,
}

/// Proxy usage as JSON. When the proxy is unreachable the cached snapshot, if
/// any, fills `proxyUsage` and its age is reported.
pub fn usage_json(stats: &UsageStats, cached: Option<&CachedUsage>) -> anyhow::Result<String> {
    let (proxy_usage, cached_age_seconds) = if stats.is_reachable {
        (Some(stats.data), None)
    } else {
        (cached.map(|c| c.data), cached.map(|c| c.age_seconds))
    };
    let output = UsageOutput {
        schema_version: SCHEMA_VERSION,
        generated_at: Utc::now(),
        proxy_usage,
        is_reachable: stats.is_reachable,
        error: stats.error.as_deref(),
        cached_age_seconds,
    };
    Ok(serde_json::to_string_pretty(&output)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use qt_quota::{Credentials, DiscoveredAccount, ErrorKind};
    use serde_json::{json, Value};

    fn data(provider: &str, account: &str) -> ProviderQuotaData {
        let acct = DiscoveredAccount::new(provider, account, "/tmp/x.json", Credentials::new());
        ProviderQuotaData::new(&acct)
    }

    #[test]
    fn snapshot_groups_accounts_by_provider() {
        let report = Report {
            providers: vec![data("claude", "a"), data("claude", "b"), data("codex", "c")],
            errors: vec![CliError {
                provider: "copilot".into(),
                account: "d".into(),
                error: ErrorKind::Forbidden,
                message: "nope".into(),
                fallback_used: false,
            }],
        };
        let out: Value = serde_json::from_str(&quota_json(&report).unwrap()).unwrap();

        assert_eq!(out["schemaVersion"], 1);
        assert!(out["generatedAt"].is_string());
        assert_eq!(out["proxyUsage"], Value::Null);
        let claude = out["providers"]["claude"]["accounts"].as_object().unwrap();
        assert_eq!(claude.len(), 2);
        assert_eq!(claude["a"]["account"], "a");
        assert_eq!(out["providers"]["codex"]["accounts"]["c"]["provider"], "codex");
        assert_eq!(out["errors"][0]["error"], "forbidden");
        assert_eq!(out["errors"][0]["fallbackUsed"], false);
    }

    #[test]
    fn snapshot_carries_proxy_usage() {
        let usage = UsageData {
            total_requests: 3,
            ..UsageData::default()
        };
        let out: Value =
            serde_json::from_str(&snapshot_json(&Report::default(), Some(usage)).unwrap()).unwrap();
        assert_eq!(out["proxyUsage"]["totalRequests"], 3);
        assert_eq!(out["providers"], json!({}));
        assert_eq!(out["errors"], json!([]));
    }

    #[test]
    fn unreachable_usage_falls_back_to_cached_snapshot() {
        let stats = UsageStats {
            data: UsageData::default(),
            last_updated: Utc::now(),
            is_reachable: false,
            error: Some("Request timeout".into()),
        };
        let cached = CachedUsage {
            data: UsageData {
                total_tokens: 42,
                ..UsageData::default()
            },
            age_seconds: 90,
            is_stale: true,
        };

        let out: Value = serde_json::from_str(&usage_json(&stats, Some(&cached)).unwrap()).unwrap();
        assert_eq!(out["isReachable"], false);
        assert_eq!(out["error"], "Request timeout");
        assert_eq!(out["proxyUsage"]["totalTokens"], 42);
        assert_eq!(out["cachedAgeSeconds"], 90);

        let out: Value = serde_json::from_str(&usage_json(&stats, None).unwrap()).unwrap();
        assert_eq!(out["proxyUsage"], Value::Null);
        assert!(out.get("cachedAgeSeconds").is_none());
    }
}
