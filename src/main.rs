//! apptester - main entry point.

use clap::Parser;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use apptester::cli::{Cli, Command, run_doctor_command, run_ports_command, run_tests_command};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Load .env if present
    let _ = dotenvy::dotenv();

    init_tracing(cli.log_json);

    match &cli.command {
        Command::Run(args) => run_tests_command(cli.config.as_deref(), args).await,
        Command::Doctor => run_doctor_command(cli.config.as_deref()).await,
        Command::Ports { count } => run_ports_command(*count),
    }
}

fn init_tracing(json: bool) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("apptester=info"));

    if json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().with_target(false))
            .init();
    }
}
