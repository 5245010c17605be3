//! Client for the local proxy's management API.

use chrono::{DateTime, Utc};
use reqwest::header::CONTENT_TYPE;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::{Duration, Instant};

use qt_config::QuotaConfig;

use crate::error::HttpError;
use crate::http::{as_i64, send_json};

pub const MANAGEMENT_KEY_HEADER: &str = "X-Management-Key";
const HEALTH_TIMEOUT: Duration = Duration::from_secs(5);

/// Aggregate request and token counters reported by the proxy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageData {
    pub total_requests: u64,
    pub success_count: u64,
    pub failure_count: u64,
    pub total_tokens: u64,
    pub input_tokens: u64,
    pub output_tokens: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageStats {
    pub data: UsageData,
    pub last_updated: DateTime<Utc>,
    pub is_reachable: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl UsageStats {
    fn reachable(data: UsageData, error: Option<String>) -> Self {
        Self {
            data,
            last_updated: Utc::now(),
            is_reachable: true,
            error,
        }
    }

    fn unreachable(error: String) -> Self {
        Self {
            data: UsageData::default(),
            last_updated: Utc::now(),
            is_reachable: false,
            error: Some(error),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProxyHealth {
    pub reachable: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latency_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ProxyClient {
    client: reqwest::Client,
    base_url: String,
    management_key: Option<String>,
    timeout: Duration,
}

impl ProxyClient {
    pub fn new(config: &QuotaConfig) -> Self {
        Self::with_client(reqwest::Client::new(), config)
    }

    pub fn with_client(client: reqwest::Client, config: &QuotaConfig) -> Self {
        Self {
            client,
            base_url: config.proxy_base().to_string(),
            management_key: config.management_key.clone().filter(|k| !k.is_empty()),
            timeout: config.timeout_duration(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// `GET {base}/usage`. Never fails; problems are reported in the stats.
    pub async fn fetch_usage(&self) -> UsageStats {
        let mut request = self
            .client
            .get(format!("{}/usage", self.base_url))
            .header(CONTENT_TYPE, "application/json");
        if let Some(key) = &self.management_key {
            request = request.header(MANAGEMENT_KEY_HEADER, key);
        }

        match send_json(request, self.timeout).await {
            Ok(response) if response.is_success() => {
                let body = response.body.unwrap_or(Value::Null);
                UsageStats::reachable(parse_usage(&body), None)
            }
            Ok(response) => {
                tracing::debug!("Proxy usage API returned {}", response.status);
                UsageStats::reachable(UsageData::default(), Some(response.status_line()))
            }
            Err(HttpError::Timeout) => UsageStats::unreachable("Request timeout".to_string()),
            Err(e) => {
                tracing::debug!("Proxy usage fetch error [{}]: {}", e.error_code(), e);
                UsageStats::unreachable(e.to_string())
            }
        }
    }

    /// `GET {base}/health` with a fixed 5 second budget.
    pub async fn check_health(&self) -> ProxyHealth {
        let url = format!("{}/health", self.base_url);
        let started = Instant::now();
        match tokio::time::timeout(HEALTH_TIMEOUT, self.client.get(url).send()).await {
            Ok(Ok(response)) => ProxyHealth {
                reachable: response.status().is_success(),
                latency_ms: Some(u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)),
                error: None,
            },
            Ok(Err(e)) => ProxyHealth {
                reachable: false,
                latency_ms: None,
                error: Some(e.to_string()),
            },
            Err(_) => ProxyHealth {
                reachable: false,
                latency_ms: None,
                error: Some("Request timeout".to_string()),
            },
        }
    }
}

/// Lenient decoding of a usage body: an optional `usage` or `data` wrapper,
/// snake_case before camelCase, numbers or numeric strings, 0 otherwise.
pub fn parse_usage(body: &Value) -> UsageData {
    let usage = ["usage", "data"]
        .iter()
        .find_map(|k| body.get(*k).filter(|v| v.is_object()))
        .unwrap_or(body);
    let count = |snake: &str, camel: &str| -> u64 {
        [snake, camel]
            .iter()
            .filter_map(|k| usage.get(*k).and_then(as_i64))
            .find(|n| *n != 0)
            .unwrap_or(0)
            .max(0) as u64
    };
    UsageData {
        total_requests: count("total_requests", "totalRequests"),
        success_count: count("success_count", "successCount"),
        failure_count: count("failure_count", "failureCount"),
        total_tokens: count("total_tokens", "totalTokens"),
        input_tokens: count("input_tokens", "inputTokens"),
        output_tokens: count("output_tokens", "outputTokens"),
    }
}
