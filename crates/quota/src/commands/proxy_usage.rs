//! `quota proxy-usage`: request and token counters from the local proxy.

use std::io::Write;

use qt_config::{OutputFormat, QuotaConfig, QuotaPaths};
use qt_quota::{ProxyClient, QuotaCache, PROXY_USAGE_TTL_SECONDS};

use crate::output::{json, table};
use crate::Exit;

pub async fn run(config: &QuotaConfig, paths: &QuotaPaths) -> anyhow::Result<Exit> {
    let cache = config.cache.enabled.then(|| QuotaCache::from_paths(paths));
    let mut stdout = std::io::stdout();
    run_with(&ProxyClient::new(config), cache.as_ref(), config.format, &mut stdout).await
}

/// Reachable: cache the snapshot and print it. Unreachable: print the last
/// cached snapshot, if any, and exit 1.
pub async fn run_with<W: Write>(
    client: &ProxyClient,
    cache: Option<&QuotaCache>,
    format: OutputFormat,
    out: &mut W,
) -> anyhow::Result<Exit> {
    let stats = client.fetch_usage().await;

    let cached = if stats.is_reachable {
        if let Some(cache) = cache {
            cache.set_proxy_usage(&stats.data, PROXY_USAGE_TTL_SECONDS);
        }
        None
    } else {
        tracing::debug!(
            "Proxy at {} unreachable: {}",
            client.base_url(),
            stats.error.as_deref().unwrap_or("unknown error")
        );
        cache.and_then(QuotaCache::get_proxy_usage)
    };

    let rendered = match format {
        OutputFormat::Json => json::usage_json(&stats, cached.as_ref())?,
        OutputFormat::Table => table::usage_table(&stats, client.base_url(), cached.as_ref()),
    };
    writeln!(out, "{}", rendered)?;

    Ok(if stats.is_reachable {
        Exit::Success
    } else {
        Exit::GeneralError
    })
}
