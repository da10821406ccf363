//! The `surge` command line: load a YAML run configuration, run it, print the summary and
//! exit with the outcome.
use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::fs::File;
use std::io::BufWriter;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use surge::{HttpClient, LoadTest, ReqwestClient, RunError};
use surge_core::{ConfigError, RunConfig, RunResult};
#[allow(unused_imports)]
use tracing::{debug, error, info, instrument, warn};
use url::Url;

#[derive(Parser, Debug)]
#[command(name = "surge", version, about = "Staged-ramp HTTP load testing")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run a load test. Exits 0 when every threshold passed, 1 when one was crossed and
    /// 2 when the run was aborted.
    Run(RunArgs),
    /// Parse and validate a configuration without sending traffic.
    Validate { config: PathBuf },
}

#[derive(Args, Debug)]
pub struct RunArgs {
    /// YAML run configuration.
    pub config: PathBuf,

    /// Override `base_url` from the configuration.
    #[arg(long)]
    pub base_url: Option<Url>,

    /// Also write the summary as JSON to this file.
    #[arg(long, value_name = "PATH")]
    pub summary_json: Option<PathBuf>,

    /// Serve Prometheus metrics on this address while the run is going.
    #[arg(long, value_name = "ADDR")]
    pub prometheus: Option<SocketAddr>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Pass,
    ThresholdsCrossed,
    Aborted,
}

impl Outcome {
    pub fn of(result: &Result<RunResult, RunError>) -> Self {
        match result {
            Ok(result) if result.pass => Outcome::Pass,
            Ok(_) => Outcome::ThresholdsCrossed,
            Err(_) => Outcome::Aborted,
        }
    }

    pub fn code(self) -> u8 {
        match self {
            Outcome::Pass => 0,
            Outcome::ThresholdsCrossed => 1,
            Outcome::Aborted => 2,
        }
    }
}

impl From<Outcome> for ExitCode {
    fn from(outcome: Outcome) -> Self {
        ExitCode::from(outcome.code())
    }
}

/// Load `path`, then apply the command line `base_url` on top of the environment overrides.
pub fn load_config(path: &Path, base_url: Option<Url>) -> Result<RunConfig, ConfigError> {
    let mut config = RunConfig::from_file(path)?;
    if let Some(base_url) = base_url {
        config.base_url = base_url;
        config.validate()?;
    }
    Ok(config)
}

/// Run `config` to completion, print its summary and map it to an [`Outcome`].
pub async fn run<C>(client: Arc<C>, config: &RunConfig, summary_json: Option<&Path>) -> Outcome
where
    C: HttpClient + Sync + 'static,
{
    let result = match LoadTest::from_config(client, config) {
        Ok(load_test) => load_test.await,
        Err(err) => Err(err),
    };

    match &result {
        Ok(summary) => {
            println!("{summary}");
            if let Some(path) = summary_json {
                if let Err(err) = write_summary(summary, path) {
                    error!("{err:#}");
                }
            }
        }
        Err(err) => error!("Run aborted: {err}"),
    }

    Outcome::of(&result)
}

pub fn write_summary(result: &RunResult, path: &Path) -> anyhow::Result<()> {
    let file = File::create(path)
        .with_context(|| format!("Unable to create summary file {}", path.display()))?;
    serde_json::to_writer_pretty(BufWriter::new(file), result)
        .with_context(|| format!("Unable to write summary to {}", path.display()))?;
    debug!("Summary written to {}", path.display());
    Ok(())
}

/// Dispatch a parsed command line.
pub async fn execute(cli: Cli) -> anyhow::Result<Outcome> {
    match cli.command {
        Command::Validate { config } => {
            let loaded = RunConfig::from_file(&config)
                .with_context(|| format!("Invalid configuration {}", config.display()))?;
            let profile = loaded.profile()?;
            println!(
                "{}: {} stages, up to {} users, {} thresholds",
                config.display(),
                profile.stages().len(),
                profile.max_target(),
                loaded.parsed_thresholds()?.len()
            );
            Ok(Outcome::Pass)
        }
        Command::Run(args) => {
            if let Some(addr) = args.prometheus {
                PrometheusBuilder::new()
                    .with_http_listener(addr)
                    .install()
                    .context("Unable to install the Prometheus exporter")?;
                info!("Serving metrics on {addr}");
            }

            let config = load_config(&args.config, args.base_url)
                .with_context(|| format!("Invalid configuration {}", args.config.display()))?;
            let client = Arc::new(ReqwestClient::new()?);
            Ok(run(client, &config, args.summary_json.as_deref()).await)
        }
    }
}
