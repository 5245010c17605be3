//! `quota watch`: rerun `status` on a fixed interval until Ctrl+C.

use std::io::Write;
use std::time::Duration;

use qt_config::{OutputFormat, QuotaConfig};
use qt_quota::{KnownLocations, Orchestrator, QuotaFetcher};

use crate::commands::status;
use crate::Exit;

pub const MIN_INTERVAL_SECS: u64 = 5;
pub const DEFAULT_INTERVAL_SECS: u64 = 30;

const CLEAR_SCREEN: &str = "\x1Bc";

pub fn validate_interval(secs: u64) -> anyhow::Result<Duration> {
    if secs < MIN_INTERVAL_SECS {
        anyhow::bail!("Interval must be at least {} seconds", MIN_INTERVAL_SECS);
    }
    Ok(Duration::from_secs(secs))
}

pub async fn run(config: &QuotaConfig, interval_secs: u64) -> anyhow::Result<Exit> {
    let interval = match validate_interval(interval_secs) {
        Ok(interval) => interval,
        Err(e) => {
            tracing::error!("{}", e);
            return Ok(Exit::InvalidUsage);
        }
    };

    let orchestrator = Orchestrator::with_defaults();
    let locations = KnownLocations::detect();
    let mut stdout = std::io::stdout();
    writeln!(
        stdout,
        "Watching quota every {}s (Ctrl+C to stop)\n",
        interval.as_secs()
    )?;

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);
    let mut ticker = tokio::time::interval(interval);
    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = &mut shutdown => break,
        }
        tokio::select! {
            result = refresh(&orchestrator, &locations, config, interval, &mut stdout) => result?,
            _ = &mut shutdown => break,
        }
    }

    writeln!(stdout, "\n\nStopped watching.")?;
    Ok(Exit::Success)
}

async fn refresh<F: QuotaFetcher, W: Write>(
    orchestrator: &Orchestrator<F>,
    locations: &KnownLocations,
    config: &QuotaConfig,
    interval: Duration,
    out: &mut W,
) -> anyhow::Result<()> {
    if config.format == OutputFormat::Table {
        write!(out, "{}", CLEAR_SCREEN)?;
    }
    writeln!(
        out,
        "[{}] Refreshing...\n",
        chrono::Local::now().format("%Y-%m-%d %H:%M:%S")
    )?;

    // A failed refresh is reported and the next tick tries again.
    if let Err(e) = status::run_with(orchestrator, locations, config, out).await {
        tracing::error!("Error during refresh: {:#}", e);
    }

    if config.format == OutputFormat::Table {
        writeln!(
            out,
            "\nNext refresh in {}s (Ctrl+C to stop)",
            interval.as_secs()
        )?;
    }
    out.flush()?;
    Ok(())
}
