//! apptester: run end-to-end tests against a freshly started application.
//!
//! A run leases a free local port, starts the application on it (as a
//! Docker container or a local process), waits until it answers, runs a test
//! suite against its base URL and always stops it afterwards.

pub mod cli;
pub mod config;
pub mod error;
pub mod runtime;
pub mod tester;
pub mod testing;

pub use config::TesterConfig;
pub use tester::{ApplicationTester, ManagedAppTester, RunError, SessionReport};
