use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Raw credential payload as read from disk. Field names vary by provider.
pub type Credentials = serde_json::Map<String, serde_json::Value>;

/// Wire value for a percentage nobody could determine.
pub const UNKNOWN_PERCENTAGE: i64 = -1;

/// One account found during discovery.
#[derive(Clone, PartialEq)]
pub struct DiscoveredAccount {
    /// Provider tag, e.g. `claude` or `gemini-cli`.
    pub provider: String,
    /// Email, username, or `unknown`.
    pub account: String,
    /// Credential file (or database) the account came from.
    pub file_path: PathBuf,
    pub auth_data: Credentials,
}

impl DiscoveredAccount {
    pub fn new(
        provider: impl Into<String>,
        account: impl Into<String>,
        file_path: impl Into<PathBuf>,
        auth_data: Credentials,
    ) -> Self {
        Self {
            provider: provider.into(),
            account: account.into(),
            file_path: file_path.into(),
            auth_data,
        }
    }
}

// Credential payloads never go through Debug.
impl fmt::Debug for DiscoveredAccount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DiscoveredAccount")
            .field("provider", &self.provider)
            .field("account", &self.account)
            .field("file_path", &self.file_path)
            .field("auth_data", &format_args!("<{} fields>", self.auth_data.len()))
            .finish()
    }
}

/// A single quota dimension, e.g. the weekly request budget of one account.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelQuota {
    pub name: String,
    /// Percentage remaining (0-100); `None` when unknown, `-1` on the wire.
    #[serde(with = "percentage_sentinel")]
    pub percentage: Option<f64>,
    /// When the quota resets, as reported by the provider.
    pub reset_time: Option<String>,
    /// Seconds until `reset_time`, computed when the value was built.
    pub reset_in_seconds: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub used: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remaining: Option<i64>,
}

/// Raw counters some providers expose next to the percentage.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QuotaCounters {
    pub used: Option<i64>,
    pub limit: Option<i64>,
    pub remaining: Option<i64>,
}

impl QuotaCounters {
    pub fn used(used: i64) -> Self {
        Self {
            used: Some(used),
            ..Default::default()
        }
    }
}

impl ModelQuota {
    pub fn new(
        name: impl Into<String>,
        percentage: Option<f64>,
        reset_time: Option<String>,
        counters: QuotaCounters,
    ) -> Self {
        let reset_in_seconds = reset_time
            .as_deref()
            .and_then(|r| seconds_until(r, Utc::now()));
        Self {
            name: name.into(),
            percentage: percentage.filter(|p| p.is_finite()),
            reset_time,
            reset_in_seconds,
            used: counters.used,
            limit: counters.limit,
            remaining: counters.remaining,
        }
    }

    /// Quota whose percentage is derived from `remaining / limit`.
    pub fn from_counters(
        name: impl Into<String>,
        reset_time: Option<String>,
        counters: QuotaCounters,
    ) -> Self {
        let percentage = percent_remaining(
            counters.remaining.map(|r| r as f64),
            counters.limit.map(|l| l as f64),
        );
        Self::new(name, percentage, reset_time, counters)
    }

    /// Quota entry with nothing known besides its name.
    pub fn unknown(name: impl Into<String>) -> Self {
        Self::new(name, None, None, QuotaCounters::default())
    }

    pub fn is_known(&self) -> bool {
        self.percentage.is_some()
    }
}

/// `remaining / limit * 100` when both are present and `limit > 0`.
pub fn percent_remaining(remaining: Option<f64>, limit: Option<f64>) -> Option<f64> {
    match (remaining, limit) {
        (Some(remaining), Some(limit)) if limit > 0.0 => Some(remaining / limit * 100.0),
        _ => None,
    }
}

/// Parse an ISO 8601 timestamp. RFC 3339 with an offset is preferred;
/// values without an offset (`2025-01-01T00:00:00`, `2025-01-01`) are read
/// as UTC.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(at) = DateTime::parse_from_rfc3339(raw) {
        return Some(at.with_timezone(&Utc));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f") {
        return Some(naive.and_utc());
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

/// Whole seconds from `now` until an ISO 8601 timestamp; `None` if it is not
/// in the future or does not parse.
pub fn seconds_until(timestamp: &str, now: DateTime<Utc>) -> Option<i64> {
    let at = parse_timestamp(timestamp)?;
    let diff = at.signed_duration_since(now).num_seconds();
    (diff > 0).then_some(diff)
}

/// Normalized per-account result shared by every provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderQuotaData {
    pub provider: String,
    pub account: String,
    pub plan_type: Option<String>,
    pub is_forbidden: bool,
    /// Only the cache read path sets this.
    pub is_stale: bool,
    pub needs_reauth: bool,
    pub last_updated: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cached_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub age_seconds: Option<u64>,
    pub models: Vec<ModelQuota>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ProviderQuotaData {
    pub fn new(account: &DiscoveredAccount) -> Self {
        Self {
            provider: account.provider.clone(),
            account: account.account.clone(),
            plan_type: None,
            is_forbidden: false,
            is_stale: false,
            needs_reauth: false,
            last_updated: Utc::now(),
            cached_at: None,
            age_seconds: None,
            models: Vec::new(),
            error: None,
        }
    }

    /// The model with the lowest known percentage, or the first model when
    /// none are known.
    pub fn lowest_model(&self) -> Option<&ModelQuota> {
        self.models
            .iter()
            .filter_map(|m| m.percentage.map(|p| (p, m)))
            .min_by(|(a, _), (b, _)| a.total_cmp(b))
            .map(|(_, m)| m)
            .or_else(|| self.models.first())
    }
}

/// Terminal state of one fetch attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchStatus {
    Success,
    Forbidden,
    NeedsReauth,
    Timeout,
    Failed,
}

/// What a provider fetcher hands back. Failure results still carry a
/// `ProviderQuotaData` with the message in `error` so they can be displayed.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchResult {
    pub status: FetchStatus,
    pub data: ProviderQuotaData,
}

impl FetchResult {
    pub fn is_success(&self) -> bool {
        self.status == FetchStatus::Success
    }

    pub fn needs_reauth(&self) -> bool {
        self.status == FetchStatus::NeedsReauth
    }

    pub fn error(&self) -> Option<&str> {
        match self.status {
            FetchStatus::Success => None,
            _ => Some(self.data.error.as_deref().unwrap_or("Unknown error")),
        }
    }
}

mod percentage_sentinel {
    use super::UNKNOWN_PERCENTAGE;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Option<f64>, s: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(p) => s.serialize_f64(*p),
            None => s.serialize_i64(UNKNOWN_PERCENTAGE),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<f64>, D::Error> {
        let raw = Option::<f64>::deserialize(d)?;
        Ok(raw.filter(|p| p.is_finite() && *p >= 0.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use proptest::prelude::*;

    fn account() -> DiscoveredAccount {
        DiscoveredAccount::new("claude", "a@x.com", "/tmp/claude-a.json", Credentials::new())
    }

    #[test]
    fn unknown_percentage_serializes_as_minus_one() {
        let q = ModelQuota::unknown("claude-quota");
        let json = serde_json::to_value(&q).unwrap();
        assert_eq!(json["percentage"], -1);
        assert_eq!(json["resetTime"], serde_json::Value::Null);
        assert!(json.get("used").is_none());
    }

    #[test]
    fn negative_percentage_deserializes_as_unknown() {
        let q: ModelQuota = serde_json::from_value(serde_json::json!({
            "name": "x", "percentage": -1, "resetTime": null, "resetInSeconds": null
        }))
        .unwrap();
        assert_eq!(q.percentage, None);

        let q: ModelQuota = serde_json::from_value(serde_json::json!({
            "name": "x", "percentage": 42.5, "resetTime": null, "resetInSeconds": null
        }))
        .unwrap();
        assert_eq!(q.percentage, Some(42.5));
    }

    #[test]
    fn from_counters_zero_limit_is_unknown() {
        let q = ModelQuota::from_counters(
            "plan",
            None,
            QuotaCounters {
                used: Some(10),
                limit: Some(0),
                remaining: Some(5),
            },
        );
        assert_eq!(q.percentage, None);
        assert_eq!(q.used, Some(10));
    }

    #[test]
    fn reset_in_seconds_only_for_future_resets() {
        let future = (Utc::now() + Duration::hours(1)).to_rfc3339();
        let q = ModelQuota::new("m", Some(50.0), Some(future), QuotaCounters::default());
        let secs = q.reset_in_seconds.unwrap();
        assert!(secs > 3500 && secs <= 3600, "got {secs}");

        let past = (Utc::now() - Duration::minutes(10)).to_rfc3339();
        let q = ModelQuota::new("m", Some(50.0), Some(past), QuotaCounters::default());
        assert_eq!(q.reset_in_seconds, None);

        let q = ModelQuota::new("m", None, Some("next tuesday".into()), QuotaCounters::default());
        assert_eq!(q.reset_in_seconds, None);
    }

    #[test]
    fn timestamps_without_offset_are_utc() {
        let expected = Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).single().unwrap();
        assert_eq!(parse_timestamp("2020-01-01T00:00:00"), Some(expected));
        assert_eq!(parse_timestamp("2020-01-01T00:00:00.000"), Some(expected));
        assert_eq!(parse_timestamp("2020-01-01"), Some(expected));
        assert_eq!(parse_timestamp("2020-01-01T02:00:00+02:00"), Some(expected));
        assert_eq!(parse_timestamp("2020-01-01T00:00:00Z"), Some(expected));
        assert_eq!(parse_timestamp("soon"), None);
    }

    #[test]
    fn seconds_until_accepts_offsetless_timestamps() {
        let now = Utc.with_ymd_and_hms(2098, 12, 31, 23, 0, 0).single().unwrap();
        assert_eq!(seconds_until("2099-01-01T00:00:00", now), Some(3600));
        assert_eq!(seconds_until("2020-01-01T00:00:00", now), None);
    }

    #[test]
    fn lowest_model_ignores_unknown() {
        let mut data = ProviderQuotaData::new(&account());
        data.models = vec![
            ModelQuota::unknown("a"),
            ModelQuota::new("b", Some(70.0), None, QuotaCounters::default()),
            ModelQuota::new("c", Some(20.0), None, QuotaCounters::default()),
        ];
        assert_eq!(data.lowest_model().unwrap().name, "c");

        data.models = vec![ModelQuota::unknown("a"), ModelQuota::unknown("b")];
        assert_eq!(data.lowest_model().unwrap().name, "a");

        data.models.clear();
        assert!(data.lowest_model().is_none());
    }

    #[test]
    fn provider_quota_data_uses_camel_case() {
        let data = ProviderQuotaData::new(&account());
        let json = serde_json::to_value(&data).unwrap();
        assert_eq!(json["provider"], "claude");
        assert_eq!(json["isForbidden"], false);
        assert_eq!(json["needsReauth"], false);
        assert_eq!(json["planType"], serde_json::Value::Null);
        assert!(json.get("cachedAt").is_none());
        assert!(json.get("error").is_none());
    }

    #[test]
    fn debug_does_not_print_credentials() {
        let mut creds = Credentials::new();
        creds.insert("access_token".into(), "sk-secret".into());
        let acct = DiscoveredAccount::new("codex", "me", "/x", creds);
        let printed = format!("{:?}", acct);
        assert!(!printed.contains("sk-secret"));
        assert!(printed.contains("<1 fields>"));
    }

    proptest! {
        #[test]
        fn percentage_matches_remaining_over_limit(remaining in 0i64..1_000_000, limit in 1i64..1_000_000) {
            let q = ModelQuota::from_counters(
                "m",
                None,
                QuotaCounters { used: None, limit: Some(limit), remaining: Some(remaining) },
            );
            let expected = remaining as f64 / limit as f64 * 100.0;
            let got = q.percentage.unwrap();
            prop_assert!((got - expected).abs() < 1e-9);
        }

        #[test]
        fn percentage_unknown_without_positive_limit(remaining in proptest::option::of(0i64..1000), limit in proptest::option::of(-1000i64..=0)) {
            let q = ModelQuota::from_counters(
                "m",
                None,
                QuotaCounters { used: None, limit, remaining },
            );
            prop_assert_eq!(q.percentage, None);
            let json = serde_json::to_value(&q).unwrap();
            prop_assert_eq!(json["percentage"].as_i64(), Some(-1));
        }
    }
}
