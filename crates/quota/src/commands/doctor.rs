//! `quota doctor`: report which data sources are available and what is wrong
//! with them.

use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use qt_config::{QuotaConfig, QuotaPaths};
use qt_quota::credentials::{expiry_time, get_refresh_token, is_token_expired_at};
use qt_quota::discovery::{
    discover_auth_files, discover_cursor, discover_gemini_cli, permission_warning,
};
use qt_quota::{KnownLocations, ProxyClient, ProxyHealth, QuotaCache};

use crate::format::format_duration;
use crate::output::table;
use crate::Exit;

#[derive(Debug, Clone, PartialEq)]
pub struct AuthFileStatus {
    pub provider: String,
    pub file_name: String,
    /// The token has not expired.
    pub valid: bool,
    /// `expired` or `expires in 2h 15m`, when an expiry is known.
    pub expiry: Option<String>,
    pub has_refresh_token: bool,
}

#[derive(Debug, Clone)]
pub struct Diagnostics {
    pub auth_dir: PathBuf,
    pub base_url: String,
    pub timeout: u64,
    pub config_file: Option<PathBuf>,
    pub cache_dir: PathBuf,
    pub auth_files: Vec<AuthFileStatus>,
    /// Account name when Gemini CLI credentials exist.
    pub gemini_cli: Option<String>,
    /// Account name when Cursor is signed in.
    pub cursor: Option<String>,
    pub proxy: ProxyHealth,
    pub warnings: Vec<String>,
}

/// Inspect every credential file in `auth_dir`. Expired tokens and
/// credential files readable by others produce warnings.
pub fn inspect_auth_files(auth_dir: &Path, now: DateTime<Utc>) -> (Vec<AuthFileStatus>, Vec<String>) {
    let mut files = Vec::new();
    let mut warnings = Vec::new();

    for account in discover_auth_files(auth_dir) {
        let file_name = account
            .file_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let expired = is_token_expired_at(&account.auth_data, now);
        if expired {
            warnings.push(format!("{} token is expired", account.provider));
        }

        let expiry = match expiry_time(&account.auth_data) {
            Some(_) if expired => Some("expired".to_string()),
            Some(at) => {
                let secs = at.signed_duration_since(now).num_seconds().max(0) as u64;
                Some(format!("expires in {}", format_duration(secs)))
            }
            None if expired => Some("expired".to_string()),
            None => None,
        };

        if let Some(warning) = permission_warning(&account.file_path) {
            warnings.push(warning);
        }

        files.push(AuthFileStatus {
            provider: account.provider,
            file_name,
            valid: !expired,
            expiry,
            has_refresh_token: get_refresh_token(&account.auth_data).is_some(),
        });
    }
    files.sort_by(|a, b| a.file_name.cmp(&b.file_name));
    (files, warnings)
}

pub async fn diagnose(
    config: &QuotaConfig,
    paths: &QuotaPaths,
    locations: &KnownLocations,
) -> Diagnostics {
    let (auth_files, mut warnings) = inspect_auth_files(&config.auth_dir, Utc::now());

    let cache_dir = match paths.ensure_cache_dir() {
        Ok(dir) => dir,
        Err(e) => {
            warnings.push(format!("Cache directory unavailable: {}", e));
            paths.cache_dir().to_path_buf()
        }
    };

    let gemini_cli = locations
        .gemini_dir
        .as_deref()
        .and_then(discover_gemini_cli)
        .map(|a| a.account);
    let cursor = locations
        .cursor_db
        .as_deref()
        .and_then(discover_cursor)
        .map(|a| a.account);

    let proxy = ProxyClient::new(config).check_health().await;

    Diagnostics {
        auth_dir: config.auth_dir.clone(),
        base_url: config.base_url.clone(),
        timeout: config.timeout,
        config_file: paths
            .config_candidates()
            .iter()
            .find(|p| p.is_file())
            .cloned(),
        cache_dir,
        auth_files,
        gemini_cli,
        cursor,
        proxy,
        warnings,
    }
}

/// Delete the quota cache file, reporting where it was.
pub fn clear_cache<W: Write>(cache: &QuotaCache, out: &mut W) -> anyhow::Result<Exit> {
    match cache.clear() {
        Ok(()) => {
            writeln!(out, "Cleared quota cache at {}\n", cache.path().display())?;
            Ok(Exit::Success)
        }
        Err(e) => {
            tracing::error!("Failed to clear cache [{}]: {}", e.error_code(), e);
            Ok(Exit::GeneralError)
        }
    }
}

pub async fn run(config: &QuotaConfig, paths: &QuotaPaths, clear: bool) -> anyhow::Result<Exit> {
    let mut stdout = std::io::stdout();
    if clear {
        let exit = clear_cache(&QuotaCache::from_paths(paths), &mut stdout)?;
        if exit != Exit::Success {
            return Ok(exit);
        }
    }

    let diagnostics = diagnose(config, paths, &KnownLocations::detect()).await;
    writeln!(stdout, "{}", table::doctor_report(&diagnostics))?;
    Ok(Exit::Success)
}
