use reqwest::header::{ACCEPT, USER_AGENT};
use serde_json::Value;

use qt_config::QuotaConfig;

use super::common::{self, ModelNames};
use crate::http::{is_truthy, send_json, text_field, text_in};
use crate::model::{Credentials, DiscoveredAccount, FetchResult, ModelQuota};

const NAMES: ModelNames = ModelNames {
    primary: "copilot-monthly",
    placeholder: "copilot-quota",
};

const FORBIDDEN: &str = "Access forbidden - check Copilot subscription";
const CLIENT_USER_AGENT: &str = concat!("quota/", env!("CARGO_PKG_VERSION"));

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

    // GitHub rejects API calls without a User-Agent.
    let request = client
        .get(url)
        .bearer_auth(token)
        .header(ACCEPT, "application/json")
        .header(USER_AGENT, CLIENT_USER_AGENT);
    let result = send_json(request, config.timeout_duration()).await;
    let plan = detect_plan(&account.auth_data);

    match common::handle_response(account, result, NAMES, plan.clone(), FORBIDDEN) {
        Ok(body) => parse_entitlement(account, &body, plan),
        Err(done) => done,
    }
}

pub fn parse_entitlement(
    account: &DiscoveredAccount,
    body: &Value,
    plan: Option<String>,
) -> FetchResult {
    if !body.is_object() {
        return common::success(account, vec![ModelQuota::unknown(NAMES.placeholder)], plan);
    }
    let counters = common::counters_from(body);
    let percentage = common::percentage_from(
        body,
        &["remaining_percentage", "remainingPercentage"],
        counters,
    );
    let reset = text_field(body, &["resets_at", "resetsAt"]);
    let plan = text_field(body, &["sku_name", "skuName", "plan"]).or(plan);
    common::success(
        account,
        vec![common::model_quota(NAMES.primary, percentage, reset, counters)],
        plan,
    )
}

fn detect_plan(auth: &Credentials) -> Option<String> {
    text_in(auth, &["sku", "plan"]).or_else(|| {
        is_truthy(auth.get("organization")).then(|| "business".to_string())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn account(auth: Value) -> DiscoveredAccount {
        let Value::Object(map) = auth else {
            panic!("object expected")
        };
        DiscoveredAccount::new("copilot", "octo", "/tmp/github-copilot-octo.json", map)
    }

    #[test]
    fn parses_entitlement() {
        let acct = account(json!({"access_token": "t"}));
        let r = parse_entitlement(
            &acct,
            &json!({"sku_name": "copilot_pro", "remaining_percentage": 80.5, "resets_at": "2099-02-01T00:00:00Z"}),
            None,
        );
        assert_eq!(r.data.plan_type.as_deref(), Some("copilot_pro"));
        let m = &r.data.models[0];
        assert_eq!(m.name, "copilot-monthly");
        assert_eq!(m.percentage, Some(80.5));
        assert_eq!(m.reset_time.as_deref(), Some("2099-02-01T00:00:00Z"));
    }

    #[test]
    fn camel_case_and_counters() {
        let acct = account(json!({"access_token": "t"}));
        let r = parse_entitlement(&acct, &json!({"skuName": "free", "remaining": 10, "limit": 50}), None);
        assert_eq!(r.data.plan_type.as_deref(), Some("free"));
        assert_eq!(r.data.models[0].percentage, Some(20.0));
    }

    #[test]
    fn plan_detection_from_credentials() {
        let acct = account(json!({"organization": "acme"}));
        assert_eq!(detect_plan(&acct.auth_data).as_deref(), Some("business"));

        let acct = account(json!({"sku": "individual", "organization": "acme"}));
        assert_eq!(detect_plan(&acct.auth_data).as_deref(), Some("individual"));

        let acct = account(json!({}));
        assert_eq!(detect_plan(&acct.auth_data), None);
    }
}
