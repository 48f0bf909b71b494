//! CLI command handling.
//!
//! Provides subcommands for:
//! - Running one end-to-end session (`run`)
//! - Checking Docker and the configuration (`doctor`)
//! - Allocating test ports (`ports`)

mod doctor;
mod ports;
mod run;

pub use doctor::run_doctor_command;
pub use ports::run_ports_command;
pub use run::{RunArgs, run_tests_command};

use clap::{ColorChoice, Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "apptester")]
#[command(about = "Start an application, wait until it answers, run tests against it, stop it")]
#[command(
    long_about = "apptester runs end-to-end tests against a freshly started application.\nExamples:\n  apptester run            # Use apptester.toml\n  apptester run --docker   # Run the container variant\n  apptester doctor         # Check Docker and config"
)]
#[command(version)]
#[command(color = ColorChoice::Auto)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Configuration file path (defaults to ./apptester.toml when present)
    #[arg(short, long, global = true, env = "APPTESTER_CONFIG")]
    pub config: Option<std::path::PathBuf>,

    /// Emit logs as JSON lines
    #[arg(long, global = true, env = "APPTESTER_LOG_JSON")]
    pub log_json: bool,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run one session: start, wait for readiness, test, stop
    #[command(
        about = "Run the end-to-end tests",
        long_about = "Starts the application on a free port, waits for it, runs the tests and always stops it.\nExample: apptester run --docker --show-app-logs"
    )]
    Run(RunArgs),

    /// Probe Docker and validate configuration
    #[command(
        about = "Run diagnostics",
        long_about = "Checks Docker availability and config validity.\nExample: apptester doctor"
    )]
    Doctor,

    /// Allocate free ports the way a session does
    #[command(
        about = "Allocate free ports",
        long_about = "Leases N distinct free TCP ports and prints them.\nExample: apptester ports --count 4"
    )]
    Ports {
        /// Number of ports to lease at once
        #[arg(short = 'n', long, default_value = "1")]
        count: usize,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_run_flags() {
        let cli = Cli::try_parse_from([
            "apptester",
            "run",
            "--docker",
            "--show-app-logs",
            "--timeout-secs",
            "30",
            "--config",
            "e2e.toml",
        ])
        .unwrap();

        assert_eq!(cli.config.as_deref(), Some(std::path::Path::new("e2e.toml")));
        match cli.command {
            Command::Run(args) => {
                assert!(args.docker);
                assert!(!args.local);
                assert!(args.show_app_logs);
                assert_eq!(args.timeout_secs, Some(30));
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_docker_and_local_conflict() {
        let result = Cli::try_parse_from(["apptester", "run", "--docker", "--local"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_global_flags_read_environment() {
        let command = Cli::command();
        let env_of = |id: &str| {
            command
                .get_arguments()
                .find(|arg| arg.get_id() == id)
                .and_then(|arg| arg.get_env())
                .map(|env| env.to_string_lossy().into_owned())
        };
        assert_eq!(env_of("config").as_deref(), Some("APPTESTER_CONFIG"));
        assert_eq!(env_of("log_json").as_deref(), Some("APPTESTER_LOG_JSON"));
    }

    #[test]
    fn test_parse_ports() {
        let cli = Cli::try_parse_from(["apptester", "ports", "-n", "3"]).unwrap();
        assert!(matches!(cli.command, Command::Ports { count: 3 }));
    }
}
