//! Can this host run the container variant?
//!
//! `apptester doctor` and `apptester run --docker` call [`check_docker`] so
//! a missing daemon shows up as advice rather than a socket error halfway
//! through a session.

/// Whether the Docker daemon can be used.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DockerStatus {
    Available,
    /// No `docker` executable on PATH.
    NotInstalled,
    /// The executable exists but the daemon refused the connection.
    NotRunning { reason: String },
}

impl DockerStatus {
    pub fn is_ok(&self) -> bool {
        matches!(self, DockerStatus::Available)
    }
}

/// Result of [`check_docker`].
#[derive(Debug, Clone)]
pub struct DockerDetection {
    pub status: DockerStatus,
}

impl DockerDetection {
    /// What the user should do next, if anything.
    pub fn advice(&self) -> Option<&'static str> {
        match self.status {
            DockerStatus::Available => None,
            DockerStatus::NotInstalled => Some(if cfg!(target_os = "linux") {
                "install Docker Engine (docs.docker.com/engine/install) or use --local"
            } else {
                "install Docker Desktop (docs.docker.com/desktop) or use --local"
            }),
            DockerStatus::NotRunning { .. } => Some(if cfg!(target_os = "linux") {
                "start the daemon (systemctl start docker) and retry"
            } else {
                "launch Docker Desktop, wait for it to settle, and retry"
            }),
        }
    }

    /// One-line summary for the terminal.
    pub fn summary(&self) -> String {
        let state = match &self.status {
            DockerStatus::Available => return "Docker daemon reachable".to_string(),
            DockerStatus::NotInstalled => "docker executable not found".to_string(),
            DockerStatus::NotRunning { reason } => format!("Docker daemon unreachable ({})", reason),
        };
        match self.advice() {
            Some(advice) => format!("{}: {}", state, advice),
            None => state,
        }
    }
}

/// Look for the `docker` executable, then try to reach its daemon.
pub async fn check_docker() -> DockerDetection {
    let status = if !docker_on_path() {
        DockerStatus::NotInstalled
    } else {
        match crate::runtime::connect_docker().await {
            Ok(_) => DockerStatus::Available,
            Err(e) => DockerStatus::NotRunning {
                reason: e.to_string(),
            },
        }
    };
    tracing::debug!(?status, "Docker detection finished");
    DockerDetection { status }
}

fn docker_on_path() -> bool {
    let finder = if cfg!(windows) { "where" } else { "which" };
    std::process::Command::new(finder)
        .arg("docker")
        .stdout(std::process::Stdio::null())
        .stderr(std::process::Stdio::null())
        .status()
        .is_ok_and(|s| s.success())
}
