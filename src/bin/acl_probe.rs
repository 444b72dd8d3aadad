//! acl-probe CLI - Thin wrapper around the scenario runner
//!
//! Loads the scenario file, runs every scenario against the configured name servers, prints
//! the report on stdout and exits with 0 (all passed), 1 (some failed) or 2 (setup failure).

use acl_probe::{
    Aggregator, ProbeConfig, ProbeError, RemotingAdapter, Report, Result, ScenarioRunner,
};
use clap::{Parser, ValueEnum};
use std::path::PathBuf;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

const EXIT_FAILURES: i32 = 1;
const EXIT_SETUP: i32 = 2;

#[derive(Parser)]
#[command(name = "acl-probe")]
#[command(about = "Verify that a RocketMQ deployment enforces its ACL policy")]
#[command(version)]
struct Cli {
    /// Scenario configuration file
    #[arg(short, long, default_value = "config/acl-probe.toml")]
    config: PathBuf,

    /// Report format
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    format: OutputFormat,

    /// Maximum scenarios in flight
    #[arg(long, default_value_t = 1)]
    concurrency: usize,

    /// Only run the named scenario (repeatable)
    #[arg(long)]
    only: Vec<String>,

    /// List scenarios without contacting the broker
    #[arg(long)]
    list: bool,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let code = match run(cli).await {
        Ok(true) => 0,
        Ok(false) => EXIT_FAILURES,
        Err(e) if e.is_setup_failure() => {
            error!("Setup failed: {}", e);
            EXIT_SETUP
        }
        Err(e) => {
            error!("Run aborted: {}", e);
            EXIT_SETUP
        }
    };

    std::process::exit(code);
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Returns whether every scenario passed
async fn run(cli: Cli) -> Result<bool> {
    info!("Loading configuration from: {}", cli.config.display());
    let config = ProbeConfig::load(&cli.config)?;
    config.validate()?;

    let mut scenarios = config.scenarios()?;
    if !cli.only.is_empty() {
        let unknown: Vec<&str> = cli
            .only
            .iter()
            .filter(|name| !scenarios.iter().any(|scenario| &scenario.name == *name))
            .map(String::as_str)
            .collect();
        if !unknown.is_empty() {
            return Err(ProbeError::InvalidConfig(format!(
                "no scenario named {}",
                unknown.join(", ")
            )));
        }
        scenarios.retain(|scenario| cli.only.contains(&scenario.name));
    }

    if cli.list {
        for scenario in &scenarios {
            println!("{}", scenario);
        }
        return Ok(true);
    }

    let connection = config.connection()?;
    let registry = config.credential_registry();
    info!(
        name_servers = ?connection.name_servers,
        credentials = ?registry.labels(),
        "Configuration loaded"
    );

    let runner = ScenarioRunner::new(RemotingAdapter::new(config.denial.clone()))
        .with_concurrency(cli.concurrency);
    let aggregator = Aggregator::new();
    runner
        .run(&scenarios, &registry, &connection, &aggregator)
        .await;

    let report = Report::from_aggregator(&aggregator);
    match cli.format {
        OutputFormat::Text => print!("{}", report.render_text()),
        OutputFormat::Json => println!("{}", report.to_json()?),
    }

    Ok(report.summary.all_passed())
}
