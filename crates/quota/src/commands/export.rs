//! `quota export`: write a JSON snapshot of every account to a file.

use std::io::Write;
use std::path::Path;

use qt_config::{expand_path, QuotaConfig};
use qt_quota::{
    discover_all_accounts_with, KnownLocations, Orchestrator, ProxyClient, QuotaFetcher,
    UsageData,
};

use crate::output::{json, Report};
use crate::Exit;

pub async fn run(config: &QuotaConfig, out_path: &Path) -> anyhow::Result<Exit> {
    let orchestrator = Orchestrator::with_defaults();
    let mut stdout = std::io::stdout();
    run_with(
        &orchestrator,
        &KnownLocations::detect(),
        config,
        out_path,
        &mut stdout,
    )
    .await
}

/// Proxy usage for the snapshot; `None` offline or when the proxy is down.
async fn proxy_usage(config: &QuotaConfig) -> Option<UsageData> {
    if config.no_network {
        return None;
    }
    let stats = ProxyClient::new(config).fetch_usage().await;
    stats.is_reachable.then_some(stats.data)
}

pub async fn run_with<F: QuotaFetcher, W: Write>(
    orchestrator: &Orchestrator<F>,
    locations: &KnownLocations,
    config: &QuotaConfig,
    out_path: &Path,
    out: &mut W,
) -> anyhow::Result<Exit> {
    let accounts = discover_all_accounts_with(&config.auth_dir, locations);
    let report = Report::from_outcomes(orchestrator.fetch_all(&accounts, config).await);
    let snapshot = json::snapshot_json(&report, proxy_usage(config).await)?;

    let path = expand_path(out_path);
    if let Err(e) = write_snapshot(&path, &snapshot) {
        tracing::error!("Failed to write to {}: {}", path.display(), e);
        return Ok(Exit::GeneralError);
    }

    writeln!(out, "Exported quota snapshot to {}", path.display())?;
    writeln!(
        out,
        "{} providers, {} accounts",
        report.providers.len(),
        accounts.len()
    )?;
    Ok(Exit::Success)
}

fn write_snapshot(path: &Path, snapshot: &str) -> std::io::Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, snapshot)
}
