//! Cursor IDE quota, read from the IDE's local state database and, when
//! allowed, the usage summary endpoint.

use reqwest::header::ACCEPT;
use serde_json::Value;
use std::path::PathBuf;

use qt_config::QuotaConfig;

use super::common;
use crate::credentials::get_access_token;
use crate::discovery::read_cursor_items;
use crate::error::DiscoveryError;
use crate::http::{as_i64, i64_field, is_truthy, send_json, text_field};
use crate::model::{percent_remaining, DiscoveredAccount, FetchResult, ModelQuota, QuotaCounters};

const SUBSCRIPTION_STATUS_KEY: &str = "cursorAuth/stripeSubscriptionStatus";
const MEMBERSHIP_TYPE_KEY: &str = "cursorAuth/stripeMembershipType";
const PROMPT_COUNT_KEY: &str = "freeBestOfN.promptCount";

/// Subscription details stored by the IDE.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LocalState {
    pub plan: Option<String>,
    pub prompt_count: Option<i64>,
}

pub async fn fetch(
    client: &reqwest::Client,
    url: &str,
    account: &DiscoveredAccount,
    config: &QuotaConfig,
) -> FetchResult {
    let Some(token) = get_access_token(&account.auth_data) else {
        return common::needs_reauth(account, "No access token found in Cursor DB");
    };

    let state = match read_local_state(&db_path(account)) {
        Ok(state) => state,
        Err(e) => {
            tracing::debug!("Error reading Cursor DB [{}]: {}", e.error_code(), e);
            return common::failure(account, &e.to_string());
        }
    };

    let mut models = Vec::new();
    if !config.no_network {
        models.extend(fetch_usage_summary(client, url, token, config).await);
    }
    models.push(common::model_quota(
        "cursor-local-prompts",
        None,
        None,
        QuotaCounters {
            used: state.prompt_count,
            ..Default::default()
        },
    ));

    common::success(account, models, state.plan)
}

fn db_path(account: &DiscoveredAccount) -> PathBuf {
    account
        .auth_data
        .get("dbPath")
        .and_then(Value::as_str)
        .map(PathBuf::from)
        .unwrap_or_else(|| account.file_path.clone())
}

pub fn read_local_state(db: &std::path::Path) -> Result<LocalState, DiscoveryError> {
    let items = read_cursor_items(
        db,
        &[SUBSCRIPTION_STATUS_KEY, MEMBERSHIP_TYPE_KEY, PROMPT_COUNT_KEY],
    )?;
    let plan = items
        .get(MEMBERSHIP_TYPE_KEY)
        .or_else(|| items.get(SUBSCRIPTION_STATUS_KEY))
        .map(|raw| plan_name(raw));
    let prompt_count = items
        .get(PROMPT_COUNT_KEY)
        .and_then(|raw| as_i64(&Value::String(raw.clone())));
    Ok(LocalState { plan, prompt_count })
}

fn plan_name(raw: &str) -> String {
    match raw {
        "active" => "Pro".to_string(),
        "trialing" => "Pro Trial".to_string(),
        other => other.to_string(),
    }
}

/// Models from the usage summary API. Any failure yields no models.
async fn fetch_usage_summary(
    client: &reqwest::Client,
    url: &str,
    token: &str,
    config: &QuotaConfig,
) -> Vec<ModelQuota> {
    let request = client
        .get(url)
        .bearer_auth(token)
        .header(ACCEPT, "application/json");
    match send_json(request, config.timeout_duration()).await {
        Ok(response) if response.is_success() => {
            parse_usage_summary(response.body.as_ref().unwrap_or(&Value::Null))
        }
        Ok(response) => {
            tracing::debug!("Cursor usage summary returned {}", response.status);
            Vec::new()
        }
        Err(e) => {
            tracing::debug!("Cursor API failed [{}]: {}", e.error_code(), e);
            Vec::new()
        }
    }
}

pub fn parse_usage_summary(body: &Value) -> Vec<ModelQuota> {
    let reset = text_field(body, &["billingCycleEnd"]);
    let usage = body.get("individualUsage");
    let mut models = Vec::new();

    if let Some(plan) = usage.and_then(|u| u.get("plan")).filter(|p| p.is_object()) {
        let counters = usage_counters(plan);
        let percentage = percent_remaining(
            counters.remaining.map(|r| r as f64),
            counters.limit.map(|l| l as f64),
        );
        models.push(common::model_quota("cursor-plan", percentage, reset.clone(), counters));
    }

    if let Some(on_demand) = usage
        .and_then(|u| u.get("onDemand"))
        .filter(|od| is_truthy(od.get("enabled")))
    {
        let counters = usage_counters(on_demand);
        // A null limit means on-demand spend is uncapped.
        let percentage = match on_demand.get("limit") {
            Some(Value::Null) => Some(100.0),
            _ => percent_remaining(
                counters.remaining.map(|r| r as f64),
                counters.limit.map(|l| l as f64),
            ),
        };
        models.push(common::model_quota(
            "cursor-on-demand",
            percentage,
            reset.clone(),
            counters,
        ));
    }
    models
}

fn usage_counters(value: &Value) -> QuotaCounters {
    QuotaCounters {
        used: i64_field(value, &["used"]),
        limit: i64_field(value, &["limit"]),
        remaining: i64_field(value, &["remaining"]),
    }
}
