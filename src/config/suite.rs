use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

use crate::tester::suite::{CommandSuite, HttpSmokeSuite, TestSuite};

/// `[tests]`: what to run once the application is ready.
///
/// With a `command`, that command is the suite (`{base_url}` substituted in
/// its args, URL exported in `base_url_env`). Without one, each of
/// `smoke_paths` is fetched and must answer 2xx.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SuiteConfig {
    pub command: Option<String>,
    pub args: Vec<String>,
    pub cwd: Option<PathBuf>,
    pub base_url_env: String,
    pub timeout_secs: u64,
    pub smoke_paths: Vec<String>,
    /// Stream the test command's output instead of capturing it.
    pub show_output: bool,
}

impl Default for SuiteConfig {
    fn default() -> Self {
        Self {
            command: None,
            args: Vec::new(),
            cwd: None,
            base_url_env: "BASE_URL".to_string(),
            timeout_secs: 600,
            smoke_paths: vec!["/".to_string()],
            show_output: false,
        }
    }
}

impl SuiteConfig {
    pub fn build_suite(&self) -> Box<dyn TestSuite> {
        let Some(command) = self.command.as_ref().filter(|c| !c.trim().is_empty()) else {
            return Box::new(HttpSmokeSuite::new(self.smoke_paths.clone()));
        };

        let mut suite = CommandSuite::new(command.clone())
            .with_args(self.args.clone())
            .with_base_url_env(self.base_url_env.clone())
            .with_timeout(Duration::from_secs(self.timeout_secs))
            .with_output(self.show_output);
        if let Some(dir) = &self.cwd {
            suite = suite.with_cwd(dir.clone());
        }
        Box::new(suite)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_smoke_suite_without_command() {
        assert_eq!(SuiteConfig::default().build_suite().name(), "http-smoke");
    }

    #[test]
    fn test_command_suite_when_configured() {
        let config = SuiteConfig {
            command: Some("mvn".to_string()),
            args: vec!["-Dselenide.baseUrl={base_url}".to_string(), "test".to_string()],
            ..Default::default()
        };
        assert_eq!(config.build_suite().name(), "mvn");
    }
}
