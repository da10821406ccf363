use clap::Parser;
use std::process::ExitCode;
use surge_cli::{Cli, Outcome};
use tracing::error;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("surge=info")),
        )
        .init();

    match surge_cli::execute(Cli::parse()).await {
        Ok(outcome) => outcome.into(),
        Err(err) => {
            error!("{err:#}");
            Outcome::Aborted.into()
        }
    }
}
