//! Plain-text tables and reports for terminal output.

use std::fmt::Write as _;

use qt_quota::{CachedUsage, CliError, ModelQuota, ProviderQuotaData, UsageData, UsageStats};

use crate::commands::doctor::Diagnostics;
use crate::format::{capitalize, format_age, format_number, format_rate, format_reset};

pub const NO_ACCOUNTS: &str =
    "No provider accounts found.\n\nRun `quota doctor` to see available data sources.";

const LOW_QUOTA_PERCENT: f64 = 50.0;
const RULE_WIDTH: usize = 40;

/// Minimal box-drawn table with left-aligned cells.
struct Table {
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl Table {
    fn new(headers: &[&str]) -> Self {
        Self {
            headers: headers.iter().map(|h| h.to_string()).collect(),
            rows: Vec::new(),
        }
    }

    fn push(&mut self, row: Vec<String>) {
        self.rows.push(row);
    }

    fn widths(&self) -> Vec<usize> {
        let mut widths: Vec<usize> = self.headers.iter().map(|h| h.chars().count()).collect();
        for row in &self.rows {
            for (i, cell) in row.iter().enumerate() {
                if let Some(w) = widths.get_mut(i) {
                    *w = (*w).max(cell.chars().count());
                }
            }
        }
        widths
    }

    fn render(&self) -> String {
        let widths = self.widths();
        let border = |left: &str, mid: &str, right: &str| {
            let segments: Vec<String> = widths.iter().map(|w| "─".repeat(w + 2)).collect();
            format!("{}{}{}", left, segments.join(mid), right)
        };
        let line = |cells: &[String]| {
            let padded: Vec<String> = widths
                .iter()
                .enumerate()
                .map(|(i, w)| {
                    let cell = cells.get(i).map(String::as_str).unwrap_or("");
                    let pad = w - cell.chars().count();
                    format!(" {}{} ", cell, " ".repeat(pad))
                })
                .collect();
            format!("│{}│", padded.join("│"))
        };

        let mut out = vec![
            border("┌", "┬", "┐"),
            line(self.headers.as_slice()),
            border("├", "┼", "┤"),
        ];
        out.extend(self.rows.iter().map(|row| line(row.as_slice())));
        out.push(border("└", "┴", "┘"));
        out.join("\n")
    }
}

fn format_percentage(model: Option<&ModelQuota>) -> String {
    match model.and_then(|m| m.percentage) {
        Some(p) => format!("{:.0}%", p),
        None => "unknown".to_string(),
    }
}

fn notes(data: &ProviderQuotaData, lowest: Option<&ModelQuota>) -> String {
    let mut notes = Vec::new();
    if data.is_forbidden {
        notes.push("forbidden".to_string());
    }
    if data.needs_reauth {
        notes.push("needs re-auth".to_string());
    }
    if data.is_stale {
        if let Some(age) = data.age_seconds {
            notes.push(format!("stale ({})", format_age(age)));
        }
    }
    if let Some(error) = &data.error {
        if !data.is_forbidden && !data.needs_reauth {
            notes.push(error.clone());
        }
    }
    if data.models.len() > 1 {
        if let Some(model) = lowest {
            notes.push(format!("(lowest: {})", model.name));
        }
    }
    notes.join(" ")
}

fn is_low(data: &ProviderQuotaData) -> bool {
    data.lowest_model()
        .and_then(|m| m.percentage)
        .is_some_and(|p| p < LOW_QUOTA_PERCENT)
}

/// Footer warnings: low quota, stale data, fetch errors.
pub fn warnings(providers: &[ProviderQuotaData], errors: &[CliError]) -> Vec<String> {
    let mut warnings = Vec::new();
    let low = providers.iter().filter(|p| is_low(p)).count();
    if low > 0 {
        warnings.push(format!(
            "{} provider(s) have low quota (< {:.0}%)",
            low, LOW_QUOTA_PERCENT
        ));
    }
    let stale = providers.iter().filter(|p| p.is_stale).count();
    if stale > 0 {
        warnings.push(format!(
            "{} provider(s) returned stale data (network error)",
            stale
        ));
    }
    if !errors.is_empty() {
        warnings.push(format!("{} error(s) occurred during fetch", errors.len()));
    }
    warnings
}

/// One row per account, using the account's lowest known model.
pub fn quota_table(providers: &[ProviderQuotaData], errors: &[CliError]) -> String {
    if providers.is_empty() {
        return NO_ACCOUNTS.to_string();
    }

    let mut table = Table::new(&["Provider", "Account", "Plan", "Remaining", "Reset", "Notes"]);
    for data in providers {
        let lowest = data.lowest_model();
        table.push(vec![
            capitalize(&data.provider),
            data.account.clone(),
            data.plan_type.clone().unwrap_or_else(|| "-".to_string()),
            format_percentage(lowest),
            format_reset(lowest.and_then(|m| m.reset_time.as_deref())),
            notes(data, lowest),
        ]);
    }

    let mut out = table.render();

    let warnings = warnings(providers, errors);
    if !warnings.is_empty() {
        out.push_str("\n\n");
        let lines: Vec<String> = warnings.iter().map(|w| format!("Warning: {}", w)).collect();
        out.push_str(&lines.join("\n"));
    }

    let reauth: Vec<&ProviderQuotaData> = providers.iter().filter(|p| p.needs_reauth).collect();
    if !reauth.is_empty() {
        let _ = write!(
            out,
            "\n\n{} account(s) need re-authentication:",
            reauth.len()
        );
        for p in reauth {
            let _ = write!(
                out,
                "\n  - {} ({}): {}\n    Re-authenticate using your IDE or auth tool to generate a new token",
                capitalize(&p.provider),
                p.account,
                p.error.as_deref().unwrap_or("token expired/invalid")
            );
        }
    }

    out
}

fn usage_counters(out: &mut String, data: &UsageData) {
    let _ = writeln!(out, "Total Requests:     {}", format_number(data.total_requests));
    let _ = writeln!(
        out,
        "  Success:          {} ({}%)",
        format_number(data.success_count),
        format_rate(data.success_count, data.total_requests)
    );
    let _ = writeln!(
        out,
        "  Failed:           {} ({}%)",
        format_number(data.failure_count),
        format_rate(data.failure_count, data.total_requests)
    );
    out.push_str("\nToken Usage:\n");
    let _ = writeln!(out, "  Input tokens:     {}", format_number(data.input_tokens));
    let _ = writeln!(out, "  Output tokens:    {}", format_number(data.output_tokens));
    let _ = writeln!(out, "  Total tokens:     {}", format_number(data.total_tokens));
}

/// Proxy usage report. An unreachable proxy shows the cached snapshot when
/// one exists.
pub fn usage_table(stats: &UsageStats, base_url: &str, cached: Option<&CachedUsage>) -> String {
    let mut out = String::new();
    if !stats.is_reachable {
        let _ = writeln!(out, "CLIProxyAPI not reachable at {}", base_url);
        let _ = writeln!(
            out,
            "Error: {}",
            stats.error.as_deref().unwrap_or("Connection failed")
        );
        if let Some(cached) = cached {
            let _ = writeln!(
                out,
                "\nLast known usage (cached {}):\n",
                format_age(cached.age_seconds)
            );
            usage_counters(&mut out, &cached.data);
        }
        return out;
    }

    let _ = writeln!(out, "CLIProxyAPI Usage Stats ({})", base_url);
    let _ = writeln!(
        out,
        "Last updated: {}\n",
        stats
            .last_updated
            .with_timezone(&chrono::Local)
            .format("%Y-%m-%d %H:%M:%S")
    );
    if let Some(error) = &stats.error {
        let _ = writeln!(out, "Error: {}\n", error);
    }
    usage_counters(&mut out, &stats.data);
    out
}

fn section(out: &mut String, title: &str) {
    let _ = writeln!(out, "{}\n{}", title, "─".repeat(RULE_WIDTH));
}

fn mark(ok: bool) -> &'static str {
    if ok {
        "✓"
    } else {
        "✗"
    }
}

pub fn doctor_report(d: &Diagnostics) -> String {
    let mut out = String::from("Quota Tracker Diagnostics\n\n");

    section(&mut out, "Configuration");
    let _ = writeln!(out, "Auth directory:     {}", d.auth_dir.display());
    let _ = writeln!(out, "Proxy base URL:     {}", d.base_url);
    let _ = writeln!(out, "Timeout:            {}s", d.timeout);
    let _ = writeln!(
        out,
        "Config file:        {}",
        d.config_file
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "(defaults)".to_string())
    );
    let _ = writeln!(out, "Cache directory:    {}\n", d.cache_dir.display());

    section(&mut out, "Auth Files Discovered");
    if d.auth_files.is_empty() {
        out.push_str("No auth files found\n");
    }
    for file in &d.auth_files {
        let label = format!("{} {}:", mark(file.valid), capitalize(&file.provider));
        let _ = write!(out, "{:<20}{}", label, file.file_name);
        let mut notes: Vec<&str> = file.expiry.iter().map(String::as_str).collect();
        if !file.has_refresh_token {
            notes.push("no refresh token");
        }
        if !notes.is_empty() {
            let _ = write!(out, " ({})", notes.join(", "));
        }
        out.push('\n');
    }

    out.push('\n');
    match &d.gemini_cli {
        Some(account) => {
            let _ = writeln!(out, "✓ Gemini CLI:       ~/.gemini/ ({})", account);
        }
        None => out.push_str("✗ Gemini CLI:       not found\n"),
    }
    match &d.cursor {
        Some(account) => {
            let _ = writeln!(out, "✓ Cursor:           state.vscdb ({})", account);
        }
        None => out.push_str("✗ Cursor:           not found\n"),
    }

    out.push('\n');
    section(&mut out, "Proxy Connectivity");
    if d.proxy.reachable {
        let _ = writeln!(
            out,
            "✓ Management API:   {} (reachable, {}ms)",
            d.base_url,
            d.proxy.latency_ms.unwrap_or_default()
        );
    } else {
        let _ = writeln!(
            out,
            "✗ Management API:   {} ({})",
            d.base_url,
            d.proxy.error.as_deref().unwrap_or("not reachable")
        );
    }

    if !d.warnings.is_empty() {
        out.push('\n');
        section(&mut out, "Warnings");
        for warning in &d.warnings {
            let _ = writeln!(out, "Warning: {}", warning);
        }
    }

    out.push('\n');
    section(&mut out, "Summary");
    let _ = writeln!(out, "{} provider auth files found", d.auth_files.len());
    let found = |v: &Option<String>| if v.is_some() { "configured" } else { "not found" };
    let _ = writeln!(out, "Gemini CLI: {}", found(&d.gemini_cli));
    let _ = writeln!(out, "Cursor: {}", found(&d.cursor));
    let _ = writeln!(
        out,
        "Proxy: {}",
        if d.proxy.reachable {
            "reachable"
        } else {
            "not reachable"
        }
    );
    out
}
