use reqwest::header::CONTENT_TYPE;
use serde_json::Value;

use qt_config::QuotaConfig;

use super::common::{self, ModelNames, FORBIDDEN};
use crate::http::{send_json, text_field, text_in};
use crate::model::{Credentials, DiscoveredAccount, FetchResult, ModelQuota};

const NAMES: ModelNames = ModelNames {
    primary: "codex-weekly",
    placeholder: "codex-quota",
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

pub fn parse_usage(account: &DiscoveredAccount, body: &Value, plan: Option<String>) -> FetchResult {
    if !body.is_object() {
        return common::success(account, vec![ModelQuota::unknown(NAMES.placeholder)], plan);
    }
    let counters = common::counters_from(body);
    let percentage = common::percentage_from(body, &["percentage"], counters);
    let reset = text_field(body, &["reset_at", "resetAt"]);
    let plan = text_field(body, &["plan_type", "planType"]).or(plan);
    common::success(
        account,
        vec![common::model_quota(NAMES.primary, percentage, reset, counters)],
        plan,
    )
}

fn detect_plan(auth: &Credentials) -> Option<String> {
    text_in(auth, &["plan_type", "planType", "subscription"])
}
