//! Result builders and the request skeleton shared by the HTTP fetchers.

use serde_json::Value;

use qt_config::QuotaConfig;

use crate::credentials::{get_access_token, is_token_expired};
use crate::error::HttpError;
use crate::http::{f64_field, i64_field, JsonResponse};
use crate::model::{
    DiscoveredAccount, FetchResult, FetchStatus, ModelQuota, ProviderQuotaData, QuotaCounters,
};

pub const UNAUTHORIZED: &str = "Unauthorized - token expired or invalid";
pub const FORBIDDEN: &str = "Access forbidden - quota exceeded or account issue";

pub fn success(
    account: &DiscoveredAccount,
    models: Vec<ModelQuota>,
    plan_type: Option<String>,
) -> FetchResult {
    let mut data = ProviderQuotaData::new(account);
    data.models = models;
    data.plan_type = plan_type;
    FetchResult {
        status: FetchStatus::Success,
        data,
    }
}

fn failed_with(account: &DiscoveredAccount, status: FetchStatus, message: &str) -> FetchResult {
    let mut data = ProviderQuotaData::new(account);
    data.error = Some(message.to_string());
    data.is_forbidden = status == FetchStatus::Forbidden;
    data.needs_reauth = status == FetchStatus::NeedsReauth;
    FetchResult { status, data }
}

pub fn forbidden(account: &DiscoveredAccount, message: &str) -> FetchResult {
    failed_with(account, FetchStatus::Forbidden, message)
}

pub fn needs_reauth(account: &DiscoveredAccount, message: &str) -> FetchResult {
    failed_with(account, FetchStatus::NeedsReauth, message)
}

pub fn failure(account: &DiscoveredAccount, message: &str) -> FetchResult {
    failed_with(account, FetchStatus::Failed, message)
}

pub fn timed_out(account: &DiscoveredAccount) -> FetchResult {
    failed_with(account, FetchStatus::Timeout, "Request timeout")
}

pub fn model_quota(
    name: &str,
    percentage: Option<f64>,
    reset_time: Option<String>,
    counters: QuotaCounters,
) -> ModelQuota {
    ModelQuota::new(name, percentage, reset_time, counters)
}

/// Model names a fetcher reports: `primary` when the provider answered,
/// `placeholder` when it could not be asked.
#[derive(Debug, Clone, Copy)]
pub struct ModelNames {
    pub primary: &'static str,
    pub placeholder: &'static str,
}

/// Token presence and expiry checks.
pub fn require_token(account: &DiscoveredAccount) -> Result<&str, FetchResult> {
    let token = get_access_token(&account.auth_data)
        .ok_or_else(|| needs_reauth(account, "No access token found"))?;
    if is_token_expired(&account.auth_data) {
        return Err(needs_reauth(account, "Access token expired"));
    }
    Ok(token)
}

/// Token checks plus the offline shortcut. `Err` carries the finished
/// result.
pub fn preflight<'a>(
    account: &'a DiscoveredAccount,
    config: &QuotaConfig,
    names: ModelNames,
) -> Result<&'a str, FetchResult> {
    let token = require_token(account)?;
    if config.no_network {
        return Err(success(
            account,
            vec![ModelQuota::unknown(names.placeholder)],
            None,
        ));
    }
    Ok(token)
}

/// Map an HTTP outcome onto the shared rules. `Ok` carries a 2xx body for
/// the provider to parse; `Err` carries the finished result.
pub fn handle_response(
    account: &DiscoveredAccount,
    result: Result<JsonResponse, HttpError>,
    names: ModelNames,
    plan: Option<String>,
    forbidden_message: &str,
) -> Result<Value, FetchResult> {
    let response = match result {
        Ok(response) => response,
        Err(e) if e.is_timeout() => return Err(timed_out(account)),
        Err(e) => {
            tracing::debug!(
                "{} fetch for {} failed [{}]: {}",
                account.provider,
                account.account,
                e.error_code(),
                e
            );
            return Err(success(
                account,
                vec![ModelQuota::unknown(names.placeholder)],
                plan,
            ));
        }
    };

    match response.status.as_u16() {
        401 => Err(needs_reauth(account, UNAUTHORIZED)),
        403 => Err(forbidden(account, forbidden_message)),
        _ if !response.is_success() => {
            tracing::debug!(
                "{} usage endpoint returned {}, using placeholder",
                account.provider,
                response.status
            );
            Err(success(
                account,
                vec![ModelQuota::unknown(names.primary)],
                plan,
            ))
        }
        _ => Ok(response.body.unwrap_or(Value::Null)),
    }
}

/// `used`, `limit` and `remaining` from a usage object, snake or camel case.
pub fn counters_from(body: &Value) -> QuotaCounters {
    QuotaCounters {
        used: i64_field(body, &["used"]),
        limit: i64_field(body, &["limit"]),
        remaining: i64_field(body, &["remaining"]),
    }
}

/// Explicit percentage fields win; otherwise remaining / limit.
pub fn percentage_from(body: &Value, percentage_keys: &[&str], counters: QuotaCounters) -> Option<f64> {
    f64_field(body, percentage_keys).or_else(|| {
        crate::model::percent_remaining(
            counters.remaining.map(|r| r as f64),
            counters.limit.map(|l| l as f64),
        )
    })
}
