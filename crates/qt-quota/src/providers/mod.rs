//! One fetcher per supported provider, dispatched through [`Provider`].

pub mod antigravity;
pub mod claude;
pub mod codex;
pub mod common;
pub mod copilot;
pub mod cursor;
pub mod gemini_cli;

use std::fmt;
use std::future::Future;
use std::path::PathBuf;
use std::str::FromStr;

use qt_config::QuotaConfig;

use crate::model::{DiscoveredAccount, FetchResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Provider {
    Codex,
    Copilot,
    Claude,
    Antigravity,
    GeminiCli,
    Cursor,
}

impl Provider {
    pub const ALL: [Provider; 6] = [
        Provider::Codex,
        Provider::Copilot,
        Provider::Claude,
        Provider::Antigravity,
        Provider::GeminiCli,
        Provider::Cursor,
    ];

    /// Tag used in filenames, cache keys and JSON output.
    pub fn tag(&self) -> &'static str {
        match self {
            Provider::Codex => "codex",
            Provider::Copilot => "copilot",
            Provider::Claude => "claude",
            Provider::Antigravity => "antigravity",
            Provider::GeminiCli => "gemini-cli",
            Provider::Cursor => "cursor",
        }
    }

    pub fn from_tag(tag: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|p| p.tag() == tag)
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

impl FromStr for Provider {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_tag(&s.trim().to_ascii_lowercase())
            .ok_or_else(|| format!("Unknown provider: {}", s))
    }
}

/// Remote endpoints used by the fetchers. Tests point these at a local
/// server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderEndpoints {
    pub codex_usage: String,
    pub copilot_entitlements: String,
    pub claude_usage: String,
    pub antigravity_load_code_assist: String,
    pub antigravity_models: String,
    pub cursor_usage_summary: String,
}

impl Default for ProviderEndpoints {
    fn default() -> Self {
        Self {
            codex_usage: "https://api.openai.com/v1/usage".into(),
            copilot_entitlements: "https://api.github.com/copilot_internal/v2/entitlements".into(),
            claude_usage: "https://api.anthropic.com/api/oauth/usage".into(),
            antigravity_load_code_assist:
                "https://cloudcode-pa.googleapis.com/v1internal:loadCodeAssist".into(),
            antigravity_models:
                "https://cloudcode-pa.googleapis.com/v1internal:fetchAvailableModels".into(),
            cursor_usage_summary: "https://api2.cursor.sh/auth/usage-summary".into(),
        }
    }
}

impl ProviderEndpoints {
    /// Every endpoint rooted at `base`, keeping the real paths.
    pub fn with_base(base: &str) -> Self {
        let base = base.trim_end_matches('/');
        Self {
            codex_usage: format!("{base}/v1/usage"),
            copilot_entitlements: format!("{base}/copilot_internal/v2/entitlements"),
            claude_usage: format!("{base}/api/oauth/usage"),
            antigravity_load_code_assist: format!("{base}/v1internal:loadCodeAssist"),
            antigravity_models: format!("{base}/v1internal:fetchAvailableModels"),
            cursor_usage_summary: format!("{base}/auth/usage-summary"),
        }
    }
}

/// Produces a [`FetchResult`] for one account. Implementations never fail:
/// every problem is folded into the result's status.
pub trait QuotaFetcher: Send + Sync {
    fn fetch(
        &self,
        provider: Provider,
        account: &DiscoveredAccount,
        config: &QuotaConfig,
    ) -> impl Future<Output = FetchResult> + Send;
}

/// The production fetcher: real endpoints over a shared HTTP client.
#[derive(Debug, Clone)]
pub struct ProviderFetcher {
    client: reqwest::Client,
    endpoints: ProviderEndpoints,
    gemini_dir: Option<PathBuf>,
}

impl ProviderFetcher {
    pub fn new() -> Self {
        Self::with_endpoints(ProviderEndpoints::default())
    }

    pub fn with_endpoints(endpoints: ProviderEndpoints) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoints,
            gemini_dir: dirs::home_dir().map(|h| h.join(".gemini")),
        }
    }

    /// Override where Antigravity's local prompt logs are read from.
    pub fn with_gemini_dir(mut self, dir: Option<PathBuf>) -> Self {
        self.gemini_dir = dir;
        self
    }

    pub fn endpoints(&self) -> &ProviderEndpoints {
        &self.endpoints
    }
}

impl Default for ProviderFetcher {
    fn default() -> Self {
        Self::new()
    }
}

impl QuotaFetcher for ProviderFetcher {
    async fn fetch(
        &self,
        provider: Provider,
        account: &DiscoveredAccount,
        config: &QuotaConfig,
    ) -> FetchResult {
        let client = &self.client;
        let endpoints = &self.endpoints;
        match provider {
            Provider::Codex => codex::fetch(client, &endpoints.codex_usage, account, config).await,
            Provider::Copilot => {
                copilot::fetch(client, &endpoints.copilot_entitlements, account, config).await
            }
            Provider::Claude => {
                claude::fetch(client, &endpoints.claude_usage, account, config).await
            }
            Provider::Antigravity => {
                antigravity::fetch(
                    client,
                    endpoints,
                    self.gemini_dir.as_deref(),
                    account,
                    config,
                )
                .await
            }
            Provider::GeminiCli => gemini_cli::fetch(account),
            Provider::Cursor => {
                cursor::fetch(client, &endpoints.cursor_usage_summary, account, config).await
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tags_round_trip() {
        for p in Provider::ALL {
            assert_eq!(Provider::from_tag(p.tag()), Some(p));
            assert_eq!(p.to_string().parse::<Provider>().unwrap(), p);
        }
        assert_eq!(Provider::from_tag("gemini"), None);
        assert_eq!("CLAUDE".parse::<Provider>().unwrap(), Provider::Claude);
        assert!("openrouter".parse::<Provider>().is_err());
    }

    #[test]
    fn endpoints_with_base_keep_paths() {
        let e = ProviderEndpoints::with_base("http://127.0.0.1:9000/");
        assert_eq!(e.claude_usage, "http://127.0.0.1:9000/api/oauth/usage");
        assert_eq!(
            e.antigravity_models,
            "http://127.0.0.1:9000/v1internal:fetchAvailableModels"
        );
        assert!(ProviderEndpoints::default()
            .copilot_entitlements
            .starts_with("https://api.github.com/"));
    }
}
