//! Rendering of command results as tables or JSON.

pub mod json;
pub mod table;

use qt_config::OutputFormat;
use qt_quota::{AccountOutcome, CliError, ProviderQuotaData};

/// Quota rows and errors for one status run.
#[derive(Debug, Clone, Default)]
pub struct Report {
    pub providers: Vec<ProviderQuotaData>,
    pub errors: Vec<CliError>,
}

impl Report {
    /// Every outcome with data becomes a row; every outcome with an error
    /// becomes an error record. A cached fallback contributes both.
    pub fn from_outcomes(outcomes: Vec<AccountOutcome>) -> Self {
        let mut report = Self::default();
        for outcome in outcomes {
            if let Some(error) = outcome.cli_error() {
                report.errors.push(error);
            }
            if let Some(data) = outcome.data {
                report.providers.push(data);
            }
        }
        report
    }

    pub fn render(&self, format: OutputFormat) -> anyhow::Result<String> {
        match format {
            OutputFormat::Json => json::quota_json(self),
            OutputFormat::Table => Ok(table::quota_table(&self.providers, &self.errors)),
        }
    }
}
