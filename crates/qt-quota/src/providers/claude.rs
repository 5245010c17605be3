use reqwest::header::CONTENT_TYPE;
use serde_json::Value;

use qt_config::QuotaConfig;

use super::common::{self, ModelNames, FORBIDDEN};
use crate::http::{f64_field, send_json, text_field, text_in};
use crate::model::{percent_remaining, Credentials, DiscoveredAccount, FetchResult, ModelQuota};

const NAMES: ModelNames = ModelNames {
    primary: "claude-pro",
    placeholder: "claude-quota",
};

pub async fn fetch(
    client: &reqwest::Client,
    url: &str,
    account: &DiscoveredAccount,
    config: &QuotaConfig,
) -> FetchResult {
    let token = match common::preflight(account, config, NAMES) {
        Ok(token) => token,
        Err(done) => return done,
    };

    let request = client
        .get(url)
        .bearer_auth(token)
        .header(CONTENT_TYPE, "application/json");
    let result = send_json(request, config.timeout_duration()).await;
    let plan = detect_plan(&account.auth_data);

    match common::handle_response(account, result, NAMES, plan.clone(), FORBIDDEN) {
        Ok(body) => parse_usage(account, &body, plan),
        Err(done) => done,
    }
}

/// Anthropic reports either a remaining percentage or `used` of `limit`.
pub fn parse_usage(account: &DiscoveredAccount, body: &Value, plan: Option<String>) -> FetchResult {
    if !body.is_object() {
        return common::success(account, vec![ModelQuota::unknown(NAMES.placeholder)], plan);
    }
    let counters = common::counters_from(body);
    let percentage = f64_field(body, &["remaining_percentage", "remainingPercentage"])
        .or_else(|| match (counters.used, counters.limit) {
            (Some(used), Some(limit)) if limit > 0 => {
                Some((limit - used) as f64 / limit as f64 * 100.0)
            }
            _ => None,
        })
        .or_else(|| {
            percent_remaining(
                counters.remaining.map(|r| r as f64),
                counters.limit.map(|l| l as f64),
            )
        });
    let reset = text_field(body, &["resets_at", "resetsAt", "reset_time", "resetTime"]);
    let plan = text_field(
        body,
        &["plan_type", "planType", "subscription_type", "subscriptionType"],
    )
    .or(plan);
    common::success(
        account,
        vec![common::model_quota(NAMES.primary, percentage, reset, counters)],
        plan,
    )
}

fn detect_plan(auth: &Credentials) -> Option<String> {
    text_in(auth, &["plan", "subscription", "tier"])
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn account(auth: Value) -> DiscoveredAccount {
        let Value::Object(map) = auth else {
            panic!("object expected")
        };
        DiscoveredAccount::new("claude", "a@x.com", "/tmp/claude-a.json", map)
    }

    #[test]
    fn remaining_percentage_wins() {
        let acct = account(json!({"access_token": "t"}));
        let r = parse_usage(
            &acct,
            &json!({"remaining_percentage": 33, "used": 10, "limit": 100, "plan_type": "max"}),
            None,
        );
        assert_eq!(r.data.models[0].percentage, Some(33.0));
        assert_eq!(r.data.plan_type.as_deref(), Some("max"));
    }

    #[test]
    fn used_of_limit() {
        let acct = account(json!({"access_token": "t", "tier": "pro"}));
        let r = parse_usage(
            &acct,
            &json!({"used": 30, "limit": 120, "reset_time": "2099-03-01T00:00:00Z"}),
            detect_plan(&acct.auth_data),
        );
        let m = &r.data.models[0];
        assert_eq!(m.name, "claude-pro");
        assert_eq!(m.percentage, Some(75.0));
        assert_eq!(m.reset_time.as_deref(), Some("2099-03-01T00:00:00Z"));
        assert_eq!(r.data.plan_type.as_deref(), Some("pro"));
    }

    #[test]
    fn zero_limit_is_unknown() {
        let acct = account(json!({"access_token": "t"}));
        let r = parse_usage(&acct, &json!({"used": 30, "limit": 0}), None);
        assert_eq!(r.data.models[0].percentage, None);
    }

    #[test]
    fn plan_from_credentials() {
        let acct = account(json!({"subscription": "team"}));
        assert_eq!(detect_plan(&acct.auth_data).as_deref(), Some("team"));
    }
}
