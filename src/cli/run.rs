//! `apptester run`

use std::path::Path;

use clap::Args;

use crate::config::TesterConfig;
use crate::runtime::check_docker;
use crate::tester::{RunError, SessionReport};

#[derive(Args, Debug, Clone, Default)]
pub struct RunArgs {
    /// Run the application from its Docker image
    #[arg(long, conflicts_with = "local")]
    pub docker: bool,

    /// Run the application as a local process
    #[arg(long)]
    pub local: bool,

    /// Image to run (implies --docker)
    #[arg(long, conflicts_with = "local")]
    pub image: Option<String>,

    /// Show the application's output
    #[arg(long)]
    pub show_app_logs: bool,

    /// Seconds to wait for the application to become ready
    #[arg(long)]
    pub timeout_secs: Option<u64>,

    /// Print the session report as JSON
    #[arg(long)]
    pub json: bool,
}

impl RunArgs {
    /// Layer the flags over a loaded configuration.
    pub fn apply(&self, config: &mut TesterConfig) {
        if self.docker || self.image.is_some() {
            config.on_docker = true;
        }
        if self.local {
            config.on_docker = false;
        }
        if let Some(image) = &self.image {
            config.docker.image = Some(image.clone());
        }
        if self.show_app_logs {
            config.show_app_logs = true;
        }
        if let Some(secs) = self.timeout_secs {
            config.readiness.timeout_secs = secs;
        }
    }
}

/// Run one session and report it.
pub async fn run_tests_command(config_path: Option<&Path>, args: &RunArgs) -> anyhow::Result<()> {
    let mut config = TesterConfig::read(config_path)?;
    args.apply(&mut config);
    config.validate()?;

    if config.on_docker {
        let docker = check_docker().await;
        if !docker.status.is_ok() {
            anyhow::bail!("{}", docker.summary());
        }
    }

    let tester = config.build_tester();
    tracing::info!(
        app_id = %config.app_id,
        on_docker = config.on_docker,
        "Testing {}",
        tester.target().describe()
    );

    match tester.run().await {
        Ok(report) => {
            print_report(&report, args.json)?;
            Ok(())
        }
        Err(err) => {
            print_failure(&err, args.json)?;
            Err(err.into())
        }
    }
}

fn print_report(report: &SessionReport, json: bool) -> anyhow::Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(report)?);
        return Ok(());
    }

    println!();
    println!("  {}  PASSED", report.tester);
    println!("  base url:   {}", report.base_url);
    if let Some(ready) = report.ready_after {
        println!("  ready in:   {:.1}s", ready.as_secs_f64());
    }
    println!("  total:      {:.1}s", report.elapsed.as_secs_f64());
    Ok(())
}

/// Print the failed session. The error itself is left to the caller, which
/// reports it once on exit.
fn print_failure(err: &RunError, json: bool) -> anyhow::Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(&err.report)?);
        return Ok(());
    }

    eprintln!();
    for line in failure_summary(err) {
        eprintln!("  {}", line);
    }
    Ok(())
}

fn failure_summary(err: &RunError) -> Vec<String> {
    let mut lines = vec![format!("{}  FAILED ({})", err.report.tester, err.kind())];
    if let Some(teardown) = &err.teardown {
        lines.push(format!("also: {}", teardown));
    }
    lines
}
