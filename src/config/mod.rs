//! Configuration.
//!
//! Values come from `apptester.toml` (or the file given with `--config` or
//! `APPTESTER_CONFIG`), then `APPTESTER_*` environment variables, then
//! command-line flags.
//!
//! ```toml
//! app_id = "shop"
//! on_docker = true
//!
//! [docker]
//! image = "my-org/shop:1.4.0"
//! container_port = 8080
//!
//! [local]
//! command = "java"
//! args = ["-jar", "target/shop.jar", "--server.port={port}"]
//!
//! [readiness]
//! path = "/actuator/health"
//! timeout_secs = 90
//!
//! [tests]
//! command = "mvn"
//! args = ["-Dselenide.baseUrl={base_url}", "test"]
//! ```

mod helpers;
mod readiness;
mod suite;
mod target;

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use serde::Deserialize;

use helpers::{optional_env, parse_bool_env, parse_optional_env};
pub use readiness::{ProbeKind, ReadinessConfig};
pub use suite::SuiteConfig;
pub use target::{DockerTarget, LocalTarget};

use crate::error::ConfigError;
use crate::runtime::{DockerControl, LaunchTarget, LocalProcessControl, ProcessControl};
use crate::tester::ManagedAppTester;

/// Config file looked up in the working directory when none is given.
pub const DEFAULT_CONFIG_FILE: &str = "apptester.toml";

/// Upper bound for any timeout, in seconds (one week).
pub const MAX_TIMEOUT_SECS: u64 = 7 * 24 * 60 * 60;

/// Full tester configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TesterConfig {
    /// Names containers (`{app_id}-{port}`) and the default image.
    /// Defaults to the working directory's name.
    pub app_id: String,
    /// Run the container variant instead of the local process.
    pub on_docker: bool,
    pub show_app_logs: bool,
    /// Extra environment passed to the application.
    pub env: BTreeMap<String, String>,
    pub docker: DockerTarget,
    pub local: Option<LocalTarget>,
    pub readiness: ReadinessConfig,
    pub tests: SuiteConfig,
}

impl TesterConfig {
    /// [`read`](Self::read) and validate.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let config = Self::read(path)?;
        config.validate()?;
        Ok(config)
    }

    /// Read from `path`, or from [`DEFAULT_CONFIG_FILE`] when it exists,
    /// then apply environment overrides and derived defaults.
    ///
    /// Callers layering more overrides on top must call
    /// [`validate`](Self::validate) themselves.
    pub fn read(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None if Path::new(DEFAULT_CONFIG_FILE).exists() => {
                Self::from_file(Path::new(DEFAULT_CONFIG_FILE))?
            }
            None => {
                tracing::debug!("No {} found, using defaults", DEFAULT_CONFIG_FILE);
                Self::default()
            }
        };

        config.apply_env()?;
        config.fill_defaults();
        Ok(config)
    }

    /// Parse a config file without overrides or validation.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        Self::from_toml(&content).map_err(|e| match e {
            ConfigError::Parse { reason, .. } => ConfigError::Parse {
                path: path.display().to_string(),
                reason,
            },
            other => other,
        })
    }

    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|e| ConfigError::Parse {
            path: "<inline>".to_string(),
            reason: e.to_string(),
        })
    }

    /// Apply `APPTESTER_*` environment overrides.
    pub fn apply_env(&mut self) -> Result<(), ConfigError> {
        if let Some(app_id) = optional_env("APPTESTER_APP_ID")? {
            self.app_id = app_id;
        }
        if let Some(image) = optional_env("APPTESTER_IMAGE")? {
            self.docker.image = Some(image);
        }
        self.on_docker = parse_bool_env("APPTESTER_ON_DOCKER", self.on_docker)?;
        self.show_app_logs = parse_bool_env("APPTESTER_SHOW_APP_LOGS", self.show_app_logs)?;
        self.readiness.timeout_secs =
            parse_optional_env("APPTESTER_READY_TIMEOUT_SECS", self.readiness.timeout_secs)?;
        self.readiness.poll_interval_ms =
            parse_optional_env("APPTESTER_POLL_INTERVAL_MS", self.readiness.poll_interval_ms)?;
        Ok(())
    }

    /// Fill values derived from the environment (currently `app_id`).
    pub fn fill_defaults(&mut self) {
        if self.app_id.trim().is_empty() {
            self.app_id = std::env::current_dir()
                .ok()
                .and_then(|dir| dir.file_name().map(|n| n.to_string_lossy().into_owned()))
                .map(|name| sanitize_app_id(&name))
                .filter(|name| !name.is_empty())
                .unwrap_or_else(|| "app".to_string());
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !is_valid_app_id(&self.app_id) {
            return Err(ConfigError::InvalidValue {
                key: "app_id".to_string(),
                message: format!(
                    "'{}' must start with a letter or digit and contain only [a-zA-Z0-9_.-]",
                    self.app_id
                ),
            });
        }
        if self.readiness.poll_interval_ms == 0 {
            return Err(ConfigError::InvalidValue {
                key: "readiness.poll_interval_ms".to_string(),
                message: "must be greater than 0".to_string(),
            });
        }
        check_timeout("readiness.timeout_secs", self.readiness.timeout_secs)?;
        check_timeout("tests.timeout_secs", self.tests.timeout_secs)?;

        if self.on_docker {
            if self.docker.container_port == 0 {
                return Err(ConfigError::InvalidValue {
                    key: "docker.container_port".to_string(),
                    message: "must be greater than 0".to_string(),
                });
            }
        } else {
            let has_command = self
                .local
                .as_ref()
                .is_some_and(|local| !local.command.trim().is_empty());
            if !has_command {
                return Err(ConfigError::MissingRequired {
                    key: "local.command".to_string(),
                    hint: "Add a [local] section with a command, or run on Docker (--docker)"
                        .to_string(),
                });
            }
        }
        Ok(())
    }

    /// The launch target for the selected variant.
    pub fn launch_target(&self) -> LaunchTarget {
        if self.on_docker {
            LaunchTarget::Image {
                image: self.docker.image_for(&self.app_id),
                container_port: self.docker.container_port,
            }
        } else {
            let local = self.local.clone().unwrap_or_default();
            LaunchTarget::Command {
                program: local.command,
                args: local.args,
                cwd: local.cwd,
            }
        }
    }

    /// Build the tester for the selected variant.
    pub fn build_tester(&self) -> ManagedAppTester {
        let control: Arc<dyn ProcessControl> = if self.on_docker {
            Arc::new(DockerControl::new().with_pull_missing(self.docker.pull_missing))
        } else {
            Arc::new(LocalProcessControl::new())
        };
        self.build_tester_with(control)
    }

    /// Build the tester on an explicit control surface.
    pub fn build_tester_with(&self, control: Arc<dyn ProcessControl>) -> ManagedAppTester {
        let mut tester = ManagedAppTester::new(
            self.app_id.clone(),
            control,
            self.launch_target(),
            self.tests.build_suite(),
        )
        .with_probe(self.readiness.build_probe())
        .with_policy(self.readiness.policy())
        .show_app_logs(self.show_app_logs);

        for (key, value) in &self.env {
            tester = tester.with_env(key.clone(), value.clone());
        }
        tester
    }
}

fn check_timeout(key: &str, secs: u64) -> Result<(), ConfigError> {
    if secs == 0 || secs > MAX_TIMEOUT_SECS {
        return Err(ConfigError::InvalidValue {
            key: key.to_string(),
            message: format!("must be between 1 and {} seconds", MAX_TIMEOUT_SECS),
        });
    }
    Ok(())
}

/// Lowercase and replace anything a container name cannot hold.
fn sanitize_app_id(raw: &str) -> String {
    let cleaned: String = raw
        .trim()
        .to_ascii_lowercase()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-') {
                c
            } else {
                '-'
            }
        })
        .collect();
    cleaned
        .trim_start_matches(|c: char| !c.is_ascii_alphanumeric())
        .to_string()
}

fn is_valid_app_id(id: &str) -> bool {
    let mut chars = id.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphanumeric())
        && chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::io::Write;

    const FULL: &str = r#"
app_id = "shop"
on_docker = true
show_app_logs = true

[env]
SPRING_PROFILES_ACTIVE = "e2e"

[docker]
image = "my-org/shop:1.4.0"
container_port = 9090

[local]
command = "java"
args = ["-jar", "target/shop.jar", "--server.port={port}"]

[readiness]
probe = "tcp"
poll_interval_ms = 250
timeout_secs = 90

[tests]
command = "mvn"
args = ["-Dselenide.baseUrl={base_url}", "test"]
timeout_secs = 1200
"#;

    #[test]
    fn test_parse_full_file() {
        let config = TesterConfig::from_toml(FULL).unwrap();

        assert_eq!(config.app_id, "shop");
        assert!(config.on_docker);
        assert!(config.show_app_logs);
        assert_eq!(config.env.get("SPRING_PROFILES_ACTIVE").map(String::as_str), Some("e2e"));
        assert_eq!(config.docker.container_port, 9090);
        assert_eq!(config.readiness.probe, ProbeKind::Tcp);
        assert_eq!(config.readiness.poll_interval_ms, 250);
        assert_eq!(config.tests.timeout_secs, 1200);
        assert_eq!(config.tests.base_url_env, "BASE_URL");
        assert_eq!(
            config.launch_target(),
            LaunchTarget::Image {
                image: "my-org/shop:1.4.0".to_string(),
                container_port: 9090,
            }
        );
        config.validate().unwrap();
    }

    #[test]
    fn test_defaults_for_empty_file() {
        let config = TesterConfig::from_toml("").unwrap();
        assert_eq!(config, TesterConfig::default());
        assert_eq!(config.docker.container_port, 8080);
        assert_eq!(config.readiness.timeout_secs, 60);
        assert_eq!(config.readiness.poll_interval_ms, 500);
    }

    #[test]
    fn test_unknown_key_rejected() {
        let err = TesterConfig::from_toml("app_idd = \"typo\"").unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn test_local_variant_requires_command() {
        let config = TesterConfig {
            app_id: "shop".to_string(),
            ..Default::default()
        };
        let err = config.validate().unwrap_err();
        assert!(matches!(err, ConfigError::MissingRequired { ref key, .. } if key == "local.command"));
    }

    #[test]
    fn test_local_launch_target() {
        let config = TesterConfig::from_toml(
            r#"
app_id = "shop"
[local]
command = "java"
args = ["-jar", "shop.jar"]
cwd = "build"
"#,
        )
        .unwrap();
        config.validate().unwrap();

        assert_eq!(
            config.launch_target(),
            LaunchTarget::Command {
                program: "java".to_string(),
                args: vec!["-jar".to_string(), "shop.jar".to_string()],
                cwd: Some("build".into()),
            }
        );
    }

    #[test]
    fn test_rejects_bad_values() {
        let mut config = TesterConfig::from_toml(FULL).unwrap();
        config.readiness.poll_interval_ms = 0;
        assert!(config.validate().is_err());

        let mut config = TesterConfig::from_toml(FULL).unwrap();
        config.app_id = "-shop".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_timeouts_must_be_bounded() {
        let mut config = TesterConfig::from_toml(FULL).unwrap();
        config.readiness.timeout_secs = u64::MAX;
        let err = config.validate().unwrap_err();
        assert!(
            matches!(err, ConfigError::InvalidValue { ref key, .. } if key == "readiness.timeout_secs")
        );

        let mut config = TesterConfig::from_toml(FULL).unwrap();
        config.tests.timeout_secs = 0;
        let err = config.validate().unwrap_err();
        assert!(
            matches!(err, ConfigError::InvalidValue { ref key, .. } if key == "tests.timeout_secs")
        );

        let mut config = TesterConfig::from_toml(FULL).unwrap();
        config.readiness.timeout_secs = MAX_TIMEOUT_SECS;
        config.tests.timeout_secs = MAX_TIMEOUT_SECS;
        config.validate().unwrap();
    }

    #[test]
    fn test_sanitize_app_id() {
        assert_eq!(sanitize_app_id("My Shop"), "my-shop");
        assert_eq!(sanitize_app_id("__shop.v2"), "shop.v2");
        assert!(is_valid_app_id(&sanitize_app_id("Über App")));
    }

    #[test]
    fn test_env_overrides() {
        let _guard = helpers::ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        // SAFETY: ENV_LOCK serializes env mutation across this crate's tests.
        unsafe {
            std::env::set_var("APPTESTER_APP_ID", "shop-ci");
            std::env::set_var("APPTESTER_IMAGE", "registry.local/shop:ci");
            std::env::set_var("APPTESTER_READY_TIMEOUT_SECS", "15");
            std::env::set_var("APPTESTER_SHOW_APP_LOGS", "false");
        }

        let mut config = TesterConfig::from_toml(FULL).unwrap();
        let result = config.apply_env();

        unsafe {
            std::env::remove_var("APPTESTER_APP_ID");
            std::env::remove_var("APPTESTER_IMAGE");
            std::env::remove_var("APPTESTER_READY_TIMEOUT_SECS");
            std::env::remove_var("APPTESTER_SHOW_APP_LOGS");
        }

        result.unwrap();
        assert_eq!(config.app_id, "shop-ci");
        assert_eq!(config.docker.image_for(&config.app_id), "registry.local/shop:ci");
        assert_eq!(config.readiness.timeout_secs, 15);
        assert_eq!(config.readiness.poll_interval_ms, 250);
        assert!(!config.show_app_logs);
    }

    #[test]
    fn test_invalid_env_override() {
        let _guard = helpers::ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        unsafe {
            std::env::set_var("APPTESTER_POLL_INTERVAL_MS", "fast");
        }

        let mut config = TesterConfig::default();
        let result = config.apply_env();

        unsafe {
            std::env::remove_var("APPTESTER_POLL_INTERVAL_MS");
        }

        let err = result.unwrap_err();
        assert!(
            matches!(err, ConfigError::InvalidValue { ref key, .. } if key == "APPTESTER_POLL_INTERVAL_MS")
        );
    }

    #[test]
    fn test_from_file_reports_path() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "on_docker = \"yes please\"").unwrap();

        let err = TesterConfig::from_file(file.path()).unwrap_err();
        match err {
            ConfigError::Parse { path, .. } => {
                assert_eq!(path, file.path().display().to_string())
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_build_tester_uses_config() {
        let config = TesterConfig::from_toml(FULL).unwrap();
        let tester = config.build_tester_with(Arc::new(crate::testing::StubControl::new()));

        assert_eq!(tester.app_id(), "shop");
        assert_eq!(tester.resource_name(40123), "shop-40123");
        assert_eq!(tester.control().kind(), "stub");
    }
}
