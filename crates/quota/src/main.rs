use clap::{Args, Parser, Subcommand};
use qt_config::{ConfigOverrides, OutputFormat, QuotaConfig, QuotaPaths};
use quota::commands::{doctor, export, proxy_usage, status, watch};
use quota::Exit;
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Parser)]
#[command(
    name = "quota",
    version = quota::VERSION,
    about = "Track quota and usage across AI coding assistants"
)]
struct Cli {
    /// Enable debug output
    #[arg(long, global = true)]
    debug: bool,
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Show quota for every discovered account (default)
    Status(StatusArgs),
    /// Show request and token usage from the local proxy
    ProxyUsage {
        /// Output format (table|json)
        #[arg(long)]
        format: Option<OutputFormat>,
        /// Proxy base URL
        #[arg(long)]
        base_url: Option<String>,
        /// Management API key
        #[arg(long)]
        management_key: Option<String>,
        /// Request timeout in seconds
        #[arg(long)]
        timeout: Option<u64>,
    },
    /// Check which data sources are available
    Doctor {
        /// Auth directory path
        #[arg(long)]
        auth_dir: Option<PathBuf>,
        /// Proxy base URL
        #[arg(long)]
        base_url: Option<String>,
        /// Request timeout in seconds
        #[arg(long)]
        timeout: Option<u64>,
        /// Delete the quota cache before running checks
        #[arg(long)]
        clear_cache: bool,
    },
    /// Save a JSON quota snapshot to a file
    Export {
        /// Output file
        #[arg(long)]
        out: PathBuf,
        /// Auth directory path
        #[arg(long)]
        auth_dir: Option<PathBuf>,
        /// Proxy base URL
        #[arg(long)]
        base_url: Option<String>,
        /// Request timeout in seconds
        #[arg(long)]
        timeout: Option<u64>,
        /// Skip network calls, use local data only
        #[arg(long)]
        no_network: bool,
    },
    /// Refresh quota status periodically
    Watch {
        /// Refresh interval in seconds
        #[arg(long, default_value_t = watch::DEFAULT_INTERVAL_SECS)]
        interval: u64,
        #[command(flatten)]
        status: StatusArgs,
    },
}

#[derive(Args, Default)]
struct StatusArgs {
    /// Output format (table|json)
    #[arg(long)]
    format: Option<OutputFormat>,
    /// Auth directory path
    #[arg(long)]
    auth_dir: Option<PathBuf>,
    /// Filter by provider name
    #[arg(long)]
    provider: Option<String>,
    /// Filter by account
    #[arg(long)]
    account: Option<String>,
    /// Exit non-zero on any error
    #[arg(long)]
    strict: bool,
    /// Skip network calls, use local data only
    #[arg(long)]
    no_network: bool,
    /// Request timeout in seconds
    #[arg(long)]
    timeout: Option<u64>,
}

impl StatusArgs {
    fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            auth_dir: self.auth_dir.clone(),
            timeout: self.timeout,
            format: self.format,
            strict: self.strict.then_some(true),
            no_network: self.no_network.then_some(true),
            provider: self.provider.clone(),
            account: self.account.clone(),
            ..ConfigOverrides::default()
        }
    }
}

fn init_logging(debug: bool) {
    let default = if debug {
        "quota=debug,qt_quota=debug,qt_config=debug"
    } else {
        "quota=info,qt_quota=info,qt_config=info"
    };
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default.into()),
        )
        .init();
}

fn load_config(paths: &QuotaPaths, overrides: &ConfigOverrides) -> anyhow::Result<QuotaConfig> {
    QuotaConfig::load_with(paths, |key| std::env::var(key).ok(), overrides)
}

async fn dispatch(command: Commands, paths: &QuotaPaths) -> anyhow::Result<Exit> {
    let overrides = match &command {
        Commands::Status(args) => args.overrides(),
        Commands::ProxyUsage {
            format,
            base_url,
            management_key,
            timeout,
        } => ConfigOverrides {
            format: *format,
            base_url: base_url.clone(),
            management_key: management_key.clone(),
            timeout: *timeout,
            ..ConfigOverrides::default()
        },
        Commands::Doctor {
            auth_dir,
            base_url,
            timeout,
            ..
        } => ConfigOverrides {
            auth_dir: auth_dir.clone(),
            base_url: base_url.clone(),
            timeout: *timeout,
            ..ConfigOverrides::default()
        },
        Commands::Export {
            auth_dir,
            base_url,
            timeout,
            no_network,
            ..
        } => ConfigOverrides {
            auth_dir: auth_dir.clone(),
            base_url: base_url.clone(),
            timeout: *timeout,
            no_network: no_network.then_some(true),
            ..ConfigOverrides::default()
        },
        Commands::Watch { status, .. } => status.overrides(),
    };

    let config = match load_config(paths, &overrides) {
        Ok(config) => config,
        Err(e) => {
            tracing::error!("Invalid configuration: {:#}", e);
            return Ok(Exit::InvalidUsage);
        }
    };
    tracing::debug!(
        "Auth dir {}, proxy {}, timeout {}s",
        config.auth_dir.display(),
        config.base_url,
        config.timeout
    );

    match command {
        Commands::Status(_) => status::run(&config).await,
        Commands::ProxyUsage { .. } => proxy_usage::run(&config, paths).await,
        Commands::Doctor { clear_cache, .. } => doctor::run(&config, paths, clear_cache).await,
        Commands::Export { out, .. } => export::run(&config, &out).await,
        Commands::Watch { interval, .. } => watch::run(&config, interval).await,
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.debug);

    let paths = match QuotaPaths::new() {
        Ok(paths) => paths,
        Err(e) => {
            tracing::error!("{:#}", e);
            return Exit::GeneralError.into();
        }
    };

    let command = cli
        .command
        .unwrap_or_else(|| Commands::Status(StatusArgs::default()));
    match dispatch(command, &paths).await {
        Ok(exit) => exit.into(),
        Err(e) => {
            tracing::error!("{:#}", e);
            Exit::GeneralError.into()
        }
    }
}
