//! CLI for pyrocumulus reports
//!
//! Run `pyrocumulus --help` for usage information.

// CLI binaries legitimately need println! for user output
#![allow(clippy::disallowed_macros)]

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use pyro_cost::config::{DEFAULT_SITE, ENV_API_KEY, ENV_APP_KEY, ENV_SITE};
use pyro_cost::usage::SystemClock;
use pyro_cost::DatadogUsageClient;
use pyrocumulus::config::ENV_SLACK_WEBHOOK;
use pyrocumulus::{datadog_config, ReportConfig, ReportRunner};
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "pyrocumulus")]
#[command(about = "Cost and usage reports for cloud monitoring accounts")]
#[command(version)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Datadog usage and cost reports
    Datadog {
        #[command(subcommand)]
        command: Option<DatadogCommands>,
    },
}

#[derive(Subcommand)]
enum DatadogCommands {
    /// Print the monthly cost and usage report, mirrored to Slack if configured
    Report(ReportArgs),
}

#[derive(Args)]
struct ReportArgs {
    /// Comma separated tag keys checked by the untagged usage report
    #[arg(long, default_value = "")]
    tag_breakdown_keys: String,

    /// Tag key to rank monthly costs by (skipped when empty)
    #[arg(long, default_value = "")]
    cost_attribution_key: String,

    /// Datadog API key
    #[arg(long, env = ENV_API_KEY, hide_env_values = true)]
    api_key: Option<String>,

    /// Datadog application key
    #[arg(long, env = ENV_APP_KEY, hide_env_values = true)]
    app_key: Option<String>,

    /// Datadog site, e.g. datadoghq.eu
    #[arg(long, env = ENV_SITE, default_value = DEFAULT_SITE)]
    site: String,

    /// Slack incoming webhook the report is mirrored to
    #[arg(long, env = ENV_SLACK_WEBHOOK, hide_env_values = true)]
    slack_webhook: Option<String>,

    /// Rows per organization in ranked sections
    #[arg(long, default_value_t = 5)]
    top: usize,

    /// Timeout in seconds for each HTTP request
    #[arg(long, default_value_t = 30)]
    timeout_secs: u64,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize tracing
    let default_level = if cli.verbose { "debug" } else { "warn" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .with(filter)
        .init();

    match cli.command {
        Commands::Datadog { command: None } => {
            println!("datadog called, need a subcommand");
        }
        Commands::Datadog {
            command: Some(DatadogCommands::Report(args)),
        } => {
            run_report(args)?;
        }
    }

    Ok(())
}

fn run_report(args: ReportArgs) -> Result<()> {
    let timeout = Duration::from_secs(args.timeout_secs);

    let datadog = datadog_config(args.api_key, args.app_key, Some(&args.site), timeout)
        .context("Invalid Datadog configuration")?;

    let mut config = ReportConfig::new(args.tag_breakdown_keys)
        .with_cost_attribution_key(args.cost_attribution_key)
        .with_top(args.top)?
        .with_webhook_timeout(timeout);
    if let Some(webhook) = args.slack_webhook.as_deref().filter(|w| !w.trim().is_empty()) {
        config = config.with_slack_webhook(webhook)?;
    }

    let client = DatadogUsageClient::new(datadog).context("Failed to build Datadog client")?;
    let notifier = config
        .notifier()
        .context("Failed to build webhook client")?;

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("Failed to start async runtime")?;

    let runner = ReportRunner::new(Arc::new(client), Arc::new(SystemClock), notifier, config);
    let summary = runtime.block_on(async {
        let mut stdout = std::io::stdout().lock();
        let mut stderr = std::io::stderr().lock();
        runner.run(&mut stdout, &mut stderr).await
    });

    // Sub-report failures were already reported; the run itself succeeded.
    info!(
        completed = summary.completed.len(),
        failed = summary.failed.len(),
        messages = summary.messages_delivered,
        "Report finished"
    );

    Ok(())
}
