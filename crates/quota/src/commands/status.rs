//! `quota status`: discover accounts, fetch their quota, print one row each.

use std::io::Write;

use qt_config::QuotaConfig;
use qt_quota::{
    discover_all_accounts_with, DiscoveredAccount, KnownLocations, Orchestrator, QuotaFetcher,
};

use crate::output::Report;
use crate::Exit;

/// Keep accounts whose provider equals `provider` (lowercased) and whose
/// account contains `account`.
pub fn filter_accounts(
    accounts: Vec<DiscoveredAccount>,
    provider: Option<&str>,
    account: Option<&str>,
) -> Vec<DiscoveredAccount> {
    let provider = provider.map(str::to_lowercase);
    accounts
        .into_iter()
        .filter(|a| provider.as_deref().map_or(true, |p| a.provider == p))
        .filter(|a| account.map_or(true, |needle| a.account.contains(needle)))
        .collect()
}

/// Exit status for a finished run.
pub fn exit_status(report: &Report, discovered: usize, strict: bool) -> Exit {
    if !strict {
        Exit::Success
    } else if discovered == 0 {
        Exit::NoAccounts
    } else if !report.errors.is_empty() {
        Exit::StrictFailure
    } else {
        Exit::Success
    }
}

pub async fn run(config: &QuotaConfig) -> anyhow::Result<Exit> {
    let orchestrator = Orchestrator::with_defaults();
    let mut stdout = std::io::stdout();
    run_with(&orchestrator, &KnownLocations::detect(), config, &mut stdout).await
}

pub async fn run_with<F: QuotaFetcher, W: Write>(
    orchestrator: &Orchestrator<F>,
    locations: &KnownLocations,
    config: &QuotaConfig,
    out: &mut W,
) -> anyhow::Result<Exit> {
    let accounts = filter_accounts(
        discover_all_accounts_with(&config.auth_dir, locations),
        config.provider.as_deref(),
        config.account.as_deref(),
    );
    let report = if accounts.is_empty() {
        Report::default()
    } else {
        Report::from_outcomes(orchestrator.fetch_all(&accounts, config).await)
    };

    writeln!(out, "{}", report.render(config.format)?)?;
    Ok(exit_status(&report, accounts.len(), config.strict))
}
