//! Antigravity (Google Cloud Code) quota.
//!
//! Remaining quota comes from the Cloud Code `fetchAvailableModels` API.
//! Usage is not reported remotely, so it is counted from the prompt logs
//! the Gemini tooling leaves under `~/.gemini/tmp/*/logs.json`.

use reqwest::header::USER_AGENT;
use serde_json::{json, Value};
use std::path::Path;

use qt_config::QuotaConfig;

use super::common::{self, UNAUTHORIZED};
use super::ProviderEndpoints;
use crate::http::{f64_field, send_json, text_field};
use crate::model::{DiscoveredAccount, FetchResult, ModelQuota, QuotaCounters};

const CLOUD_CODE_USER_AGENT: &str = "antigravity/1.11.3 Darwin/arm64";
const FALLBACK_MODEL: &str = "gemini-2.0-flash-exp";
const FORBIDDEN: &str = "Access forbidden - check Antigravity entitlement";

pub async fn fetch(
    client: &reqwest::Client,
    endpoints: &ProviderEndpoints,
    gemini_dir: Option<&Path>,
    account: &DiscoveredAccount,
    config: &QuotaConfig,
) -> FetchResult {
    let token = match common::require_token(account) {
        Ok(token) => token,
        Err(done) => return done,
    };

    let used = gemini_dir.map(count_user_prompts).unwrap_or(0);
    let counters = QuotaCounters::used(used);
    let fallback = || {
        common::success(
            account,
            vec![common::model_quota(FALLBACK_MODEL, None, None, counters)],
            None,
        )
    };

    if config.no_network {
        return fallback();
    }

    let project = load_project_id(client, &endpoints.antigravity_load_code_assist, token, config).await;
    let body = match project {
        Some(project) => json!({ "project": project }),
        None => json!({}),
    };
    let request = client
        .post(&endpoints.antigravity_models)
        .bearer_auth(token)
        .header(USER_AGENT, CLOUD_CODE_USER_AGENT)
        .json(&body);

    let response = match send_json(request, config.timeout_duration()).await {
        Ok(response) => response,
        Err(e) if e.is_timeout() => return common::timed_out(account),
        Err(e) => {
            tracing::debug!("Antigravity models request failed [{}]: {}", e.error_code(), e);
            return fallback();
        }
    };

    match response.status.as_u16() {
        401 => return common::needs_reauth(account, UNAUTHORIZED),
        403 => return common::forbidden(account, FORBIDDEN),
        _ if !response.is_success() => {
            tracing::debug!("Antigravity quota API returned {}", response.status);
            return fallback();
        }
        _ => {}
    }

    let models = parse_models(response.body.as_ref().unwrap_or(&Value::Null), counters);
    if models.is_empty() {
        return fallback();
    }
    common::success(account, models, None)
}

/// Project id for the account, if `loadCodeAssist` provides one. Failures
/// only mean the models request goes out without a project.
async fn load_project_id(
    client: &reqwest::Client,
    url: &str,
    token: &str,
    config: &QuotaConfig,
) -> Option<String> {
    let request = client
        .post(url)
        .bearer_auth(token)
        .header(USER_AGENT, CLOUD_CODE_USER_AGENT)
        .json(&json!({ "metadata": { "ideType": "ANTIGRAVITY" } }));
    match send_json(request, config.timeout_duration()).await {
        Ok(response) if response.is_success() => {
            let project = response
                .body
                .as_ref()
                .and_then(|b| text_field(b, &["cloudaicompanionProject"]));
            tracing::debug!("Antigravity project id: {:?}", project);
            project
        }
        Ok(response) => {
            tracing::debug!("loadCodeAssist returned {}", response.status);
            None
        }
        Err(e) => {
            tracing::debug!("loadCodeAssist failed: {}", e);
            None
        }
    }
}

/// One quota per Gemini or Claude model that carries `quotaInfo`.
pub fn parse_models(body: &Value, counters: QuotaCounters) -> Vec<ModelQuota> {
    let Some(models) = body.get("models").and_then(Value::as_object) else {
        return Vec::new();
    };
    models
        .iter()
        .filter(|(id, _)| id.contains("gemini") || id.contains("claude"))
        .filter_map(|(id, info)| {
            let quota = info.get("quotaInfo").filter(|q| q.is_object())?;
            let percentage = f64_field(quota, &["remainingFraction"])
                .filter(|f| *f >= 0.0)
                .map(|f| f * 100.0);
            let reset = text_field(quota, &["resetTime"]);
            Some(common::model_quota(id, percentage, reset, counters))
        })
        .collect()
}

/// Number of `type == "user"` entries across every session log.
pub fn count_user_prompts(gemini_dir: &Path) -> i64 {
    let Ok(sessions) = std::fs::read_dir(gemini_dir.join("tmp")) else {
        return 0;
    };
    sessions
        .flatten()
        .filter(|entry| entry.file_type().map(|t| t.is_dir()).unwrap_or(false))
        .map(|entry| count_in_log(&entry.path().join("logs.json")))
        .sum()
}

fn count_in_log(path: &Path) -> i64 {
    let Ok(content) = std::fs::read_to_string(path) else {
        return 0;
    };
    match serde_json::from_str::<Value>(&content) {
        Ok(Value::Array(entries)) => entries
            .iter()
            .filter(|e| e.get("type").and_then(Value::as_str) == Some("user"))
            .count() as i64,
        Ok(_) => 0,
        Err(e) => {
            tracing::debug!("Skipping unreadable log {}: {}", path.display(), e);
            0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_user_prompts_across_sessions() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("tmp").join("session-a");
        let b = dir.path().join("tmp").join("session-b");
        std::fs::create_dir_all(&a).unwrap();
        std::fs::create_dir_all(&b).unwrap();
        std::fs::write(
            a.join("logs.json"),
            json!([{"type": "user"}, {"type": "model"}, {"type": "user"}]).to_string(),
        )
        .unwrap();
        std::fs::write(b.join("logs.json"), json!([{"type": "user"}]).to_string()).unwrap();
        std::fs::write(dir.path().join("tmp").join("stray.json"), "[]").unwrap();

        assert_eq!(count_user_prompts(dir.path()), 3);
    }

    #[test]
    fn missing_or_broken_logs_count_zero() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(count_user_prompts(dir.path()), 0);

        let s = dir.path().join("tmp").join("s");
        std::fs::create_dir_all(&s).unwrap();
        std::fs::write(s.join("logs.json"), "{{{").unwrap();
        assert_eq!(count_user_prompts(dir.path()), 0);
    }

    #[test]
    fn parses_known_model_families() {
        let body = json!({
            "models": {
                "gemini-2.5-pro": {"quotaInfo": {"remainingFraction": 0.25, "resetTime": "2099-01-01T00:00:00Z"}},
                "claude-sonnet-4": {"quotaInfo": {"remainingFraction": 1}},
                "gemini-no-quota": {},
                "chat-bison": {"quotaInfo": {"remainingFraction": 0.5}},
            }
        });
        let models = parse_models(&body, QuotaCounters::used(7));
        let names: Vec<&str> = models.iter().map(|m| m.name.as_str()).collect();
        assert_eq!(names, vec!["claude-sonnet-4", "gemini-2.5-pro"]);
        assert_eq!(models[0].percentage, Some(100.0));
        assert_eq!(models[1].percentage, Some(25.0));
        assert_eq!(models[1].reset_time.as_deref(), Some("2099-01-01T00:00:00Z"));
        assert!(models.iter().all(|m| m.used == Some(7)));
    }

    #[test]
    fn missing_fraction_is_unknown() {
        let body = json!({"models": {"gemini-x": {"quotaInfo": {}}}});
        let models = parse_models(&body, QuotaCounters::default());
        assert_eq!(models[0].percentage, None);
        assert!(parse_models(&json!({}), QuotaCounters::default()).is_empty());
    }
}
