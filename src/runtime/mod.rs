//! Process and container control surfaces.
//!
//! The tester never spawns or removes anything itself; it goes through a
//! [`ProcessControl`], which is either the Docker daemon or a table of local
//! child processes.
//!
//! ```text
//!   ManagedAppTester ──start(spec)──▶ ProcessControl ──┬─▶ DockerControl (bollard)
//!                    ◀─list_running─                   └─▶ LocalProcessControl (tokio::process)
//!                    ──stop(name)──▶
//! ```

pub mod detect;
pub mod docker;
pub mod error;
pub mod local;

use std::path::PathBuf;

use async_trait::async_trait;

pub use detect::{DockerDetection, DockerStatus, check_docker};
pub use docker::{DockerControl, connect_docker};
pub use error::{Result, RuntimeError};
pub use local::LocalProcessControl;

/// What to launch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LaunchTarget {
    /// Run a container from a local image.
    Image {
        /// Image reference, e.g. `my-org/app:1.2.0`.
        image: String,
        /// Port the application listens on inside the container.
        container_port: u16,
    },
    /// Spawn a local command.
    ///
    /// `{port}` and `{base_url}` in arguments and environment values are
    /// replaced before spawning.
    Command {
        program: String,
        args: Vec<String>,
        cwd: Option<PathBuf>,
    },
}

impl LaunchTarget {
    /// Short description for logs.
    pub fn describe(&self) -> String {
        match self {
            LaunchTarget::Image {
                image,
                container_port,
            } => format!("image {} (container port {})", image, container_port),
            LaunchTarget::Command { program, args, .. } => {
                if args.is_empty() {
                    program.clone()
                } else {
                    format!("{} {}", program, args.join(" "))
                }
            }
        }
    }
}

/// Everything a control surface needs to launch one target.
#[derive(Debug, Clone)]
pub struct LaunchSpec {
    /// Unique resource name (container name, process key).
    pub name: String,
    pub target: LaunchTarget,
    /// Port on the host the application must be reachable on.
    pub host_port: u16,
    /// Extra environment: (name, value).
    pub env: Vec<(String, String)>,
    /// Let the application's output reach the console.
    pub show_logs: bool,
}

impl LaunchSpec {
    pub fn new(name: impl Into<String>, target: LaunchTarget, host_port: u16) -> Self {
        Self {
            name: name.into(),
            target,
            host_port,
            env: Vec::new(),
            show_logs: false,
        }
    }

    /// Add an environment variable.
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    /// Set whether application output is shown.
    pub fn with_logs(mut self, show: bool) -> Self {
        self.show_logs = show;
        self
    }

    /// `http://127.0.0.1:{host_port}`.
    pub fn base_url(&self) -> String {
        format!("http://127.0.0.1:{}", self.host_port)
    }

    /// Replace `{port}` and `{base_url}` placeholders.
    pub fn expand(&self, value: &str) -> String {
        value
            .replace("{port}", &self.host_port.to_string())
            .replace("{base_url}", &self.base_url())
    }
}

/// Start/stop surface over local processes or containers.
#[async_trait]
pub trait ProcessControl: Send + Sync {
    /// Kind of runtime, for logs ("docker", "local").
    fn kind(&self) -> &'static str;

    /// Launch `spec.target` under `spec.name`, reachable on `spec.host_port`.
    async fn start(&self, spec: &LaunchSpec) -> Result<()>;

    /// Stop and remove the named resource.
    async fn stop(&self, name: &str) -> Result<()>;

    /// Names of the resources currently running.
    async fn list_running(&self) -> Result<Vec<String>>;

    /// Whether the named resource exists (running or not).
    async fn exists(&self, name: &str) -> Result<bool>;

    /// Whether the named resource is running.
    async fn is_running(&self, name: &str) -> Result<bool> {
        Ok(self.list_running().await?.iter().any(|n| n == name))
    }

    /// Recent output of the named resource, when the runtime keeps it.
    async fn logs(&self, _name: &str) -> Result<Vec<String>> {
        Ok(Vec::new())
    }
}
