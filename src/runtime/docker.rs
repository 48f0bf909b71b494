//! Container control using Docker.

use std::collections::HashMap;
use std::path::PathBuf;

use bollard::Docker;
use bollard::container::{
    Config, CreateContainerOptions, ListContainersOptions, LogsOptions, RemoveContainerOptions,
    StartContainerOptions,
};
use bollard::image::CreateImageOptions;
use bollard::models::{HostConfig, PortBinding};
use futures::StreamExt;
use tokio::sync::RwLock;

use crate::runtime::error::{Result, RuntimeError};
use crate::runtime::{LaunchSpec, LaunchTarget, ProcessControl};

/// Label put on every container this crate creates.
pub const MANAGED_LABEL: &str = "apptester.managed";

const LOG_TAIL_LINES: &str = "200";

/// Connect to the Docker daemon.
///
/// Tries bollard's local defaults (which honour `DOCKER_HOST`) first, then
/// the per-user sockets of Docker Desktop and rootless Docker.
pub async fn connect_docker() -> Result<Docker> {
    let last_error = match Docker::connect_with_local_defaults() {
        Ok(docker) => match docker.ping().await {
            Ok(_) => return Ok(docker),
            Err(e) => e.to_string(),
        },
        Err(e) => e.to_string(),
    };

    #[cfg(unix)]
    for path in fallback_socket_paths() {
        if !path.exists() {
            continue;
        }
        let path = path.to_string_lossy().to_string();
        if let Ok(docker) = Docker::connect_with_unix(&path, 120, bollard::API_DEFAULT_VERSION)
            && docker.ping().await.is_ok()
        {
            tracing::debug!("Connected to Docker through {}", path);
            return Ok(docker);
        }
    }

    Err(RuntimeError::DockerNotAvailable { reason: last_error })
}

#[cfg(unix)]
fn fallback_socket_paths() -> Vec<PathBuf> {
    let mut paths = Vec::new();
    if let Some(home) = dirs::home_dir() {
        paths.push(home.join(".docker/run/docker.sock"));
        paths.push(home.join(".colima/default/docker.sock"));
    }
    if let Ok(runtime_dir) = std::env::var("XDG_RUNTIME_DIR") {
        paths.push(PathBuf::from(runtime_dir).join("docker.sock"));
    }
    paths
}

/// Starts application containers and removes them again.
///
/// The daemon connection is opened on first use.
pub struct DockerControl {
    docker: RwLock<Option<Docker>>,
    pull_missing: bool,
}

impl DockerControl {
    /// Create a control that requires images to be present locally.
    pub fn new() -> Self {
        Self {
            docker: RwLock::new(None),
            pull_missing: false,
        }
    }

    /// Pull images that are missing locally instead of failing.
    pub fn with_pull_missing(mut self, pull: bool) -> Self {
        self.pull_missing = pull;
        self
    }

    /// Use an existing connection.
    pub fn with_docker(docker: Docker) -> Self {
        Self {
            docker: RwLock::new(Some(docker)),
            pull_missing: false,
        }
    }

    async fn docker(&self) -> Result<Docker> {
        if let Some(docker) = self.docker.read().await.as_ref() {
            return Ok(docker.clone());
        }

        let mut slot = self.docker.write().await;
        if let Some(docker) = slot.as_ref() {
            return Ok(docker.clone());
        }
        let docker = connect_docker().await?;
        *slot = Some(docker.clone());
        tracing::debug!("Docker control initialized");
        Ok(docker)
    }

    /// Whether `image` is present in the local registry.
    pub async fn image_exists(&self, image: &str) -> Result<bool> {
        let docker = self.docker().await?;
        Ok(docker.inspect_image(image).await.is_ok())
    }

    async fn ensure_image(&self, docker: &Docker, image: &str) -> Result<()> {
        if docker.inspect_image(image).await.is_ok() {
            tracing::debug!("Image '{}' exists locally", image);
            return Ok(());
        }

        if !self.pull_missing {
            return Err(RuntimeError::ImageNotFound {
                image: image.to_string(),
            });
        }

        tracing::info!("Pulling image: {}", image);

        let options = CreateImageOptions {
            from_image: image.to_string(),
            ..Default::default()
        };

        let mut stream = docker.create_image(Some(options), None, None);

        while let Some(result) = stream.next().await {
            match result {
                Ok(info) => {
                    if let Some(status) = info.status {
                        tracing::trace!("Pull status: {}", status);
                    }
                }
                Err(e) => {
                    return Err(RuntimeError::ImagePullFailed {
                        image: image.to_string(),
                        reason: e.to_string(),
                    });
                }
            }
        }

        tracing::info!("Pulled image: {}", image);
        Ok(())
    }

    async fn create_container(
        &self,
        docker: &Docker,
        spec: &LaunchSpec,
        image: &str,
        container_port: u16,
    ) -> Result<String> {
        let port_key = format!("{}/tcp", container_port);

        let mut port_bindings = HashMap::new();
        port_bindings.insert(
            port_key.clone(),
            Some(vec![PortBinding {
                host_ip: Some("127.0.0.1".to_string()),
                host_port: Some(spec.host_port.to_string()),
            }]),
        );

        let mut exposed_ports = HashMap::new();
        exposed_ports.insert(port_key, HashMap::new());

        let env: Vec<String> = spec
            .env
            .iter()
            .map(|(k, v)| format!("{}={}", k, spec.expand(v)))
            .collect();

        let mut labels = HashMap::new();
        labels.insert(MANAGED_LABEL.to_string(), "true".to_string());

        let host_config = HostConfig {
            port_bindings: Some(port_bindings),
            // Removal is explicit so logs survive until teardown
            auto_remove: Some(false),
            ..Default::default()
        };

        let config = Config {
            image: Some(image.to_string()),
            env: if env.is_empty() { None } else { Some(env) },
            exposed_ports: Some(exposed_ports),
            labels: Some(labels),
            host_config: Some(host_config),
            ..Default::default()
        };

        let options = CreateContainerOptions {
            name: spec.name.clone(),
            ..Default::default()
        };

        let response = docker
            .create_container(Some(options), config)
            .await
            .map_err(|e| RuntimeError::ContainerCreationFailed {
                name: spec.name.clone(),
                reason: e.to_string(),
            })?;

        for warning in &response.warnings {
            tracing::warn!(container = %spec.name, "Docker: {}", warning);
        }

        Ok(response.id)
    }
}

impl Default for DockerControl {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl ProcessControl for DockerControl {
    fn kind(&self) -> &'static str {
        "docker"
    }

    async fn start(&self, spec: &LaunchSpec) -> Result<()> {
        let (image, container_port) = match &spec.target {
            LaunchTarget::Image {
                image,
                container_port,
            } => (image.as_str(), *container_port),
            LaunchTarget::Command { .. } => {
                return Err(RuntimeError::UnsupportedTarget {
                    control: "docker",
                    reason: "expected an image, got a local command".to_string(),
                });
            }
        };

        let docker = self.docker().await?;
        self.ensure_image(&docker, image).await?;

        // Remove a leftover container with the same name (from a crashed run)
        let _ = docker
            .remove_container(
                &spec.name,
                Some(RemoveContainerOptions {
                    force: true,
                    ..Default::default()
                }),
            )
            .await;

        let id = self
            .create_container(&docker, spec, image, container_port)
            .await?;

        docker
            .start_container(&id, None::<StartContainerOptions<String>>)
            .await
            .map_err(|e| RuntimeError::ContainerStartFailed {
                name: spec.name.clone(),
                reason: e.to_string(),
            })?;

        tracing::info!(
            container = %spec.name,
            port = spec.host_port,
            "Started container {}:{} -> {}",
            spec.host_port,
            container_port,
            image
        );
        Ok(())
    }

    async fn stop(&self, name: &str) -> Result<()> {
        let docker = self.docker().await?;

        match docker
            .remove_container(
                name,
                Some(RemoveContainerOptions {
                    force: true,
                    ..Default::default()
                }),
            )
            .await
        {
            Ok(()) => {
                tracing::debug!(container = %name, "Removed container");
                Ok(())
            }
            Err(e) if is_not_found(&e) => {
                tracing::debug!(container = %name, "Container already gone");
                Ok(())
            }
            Err(e) => Err(RuntimeError::StopFailed {
                name: name.to_string(),
                reason: e.to_string(),
            }),
        }
    }

    async fn list_running(&self) -> Result<Vec<String>> {
        let docker = self.docker().await?;
        let containers = docker
            .list_containers(Some(ListContainersOptions::<String> {
                all: false,
                ..Default::default()
            }))
            .await?;

        Ok(containers
            .into_iter()
            .flat_map(|c| c.names.unwrap_or_default())
            .map(|n| n.trim_start_matches('/').to_string())
            .collect())
    }

    async fn exists(&self, name: &str) -> Result<bool> {
        let docker = self.docker().await?;
        match docker.inspect_container(name, None).await {
            Ok(_) => Ok(true),
            Err(e) if is_not_found(&e) => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn is_running(&self, name: &str) -> Result<bool> {
        let docker = self.docker().await?;
        match docker.inspect_container(name, None).await {
            Ok(info) => Ok(info.state.and_then(|s| s.running).unwrap_or(false)),
            Err(e) if is_not_found(&e) => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn logs(&self, name: &str) -> Result<Vec<String>> {
        let docker = self.docker().await?;
        let options = LogsOptions::<String> {
            stdout: true,
            stderr: true,
            tail: LOG_TAIL_LINES.to_string(),
            ..Default::default()
        };

        let mut stream = docker.logs(name, Some(options));
        let mut lines = Vec::new();
        while let Some(chunk) = stream.next().await {
            match chunk {
                Ok(output) => lines.extend(output.to_string().lines().map(str::to_string)),
                Err(e) => {
                    tracing::debug!(container = %name, "Log stream ended: {}", e);
                    break;
                }
            }
        }
        Ok(lines)
    }
}

fn is_not_found(err: &bollard::errors::Error) -> bool {
    matches!(
        err,
        bollard::errors::Error::DockerResponseServerError {
            status_code: 404,
            ..
        }
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_detection() {
        let missing = bollard::errors::Error::DockerResponseServerError {
            status_code: 404,
            message: "No such container".to_string(),
        };
        let conflict = bollard::errors::Error::DockerResponseServerError {
            status_code: 409,
            message: "conflict".to_string(),
        };
        assert!(is_not_found(&missing));
        assert!(!is_not_found(&conflict));
    }

    #[tokio::test]
    async fn test_rejects_command_target() {
        let control = DockerControl::new();
        let spec = LaunchSpec::new(
            "app-4000",
            LaunchTarget::Command {
                program: "java".to_string(),
                args: vec![],
                cwd: None,
            },
            4000,
        );

        let err = control.start(&spec).await.unwrap_err();
        assert!(matches!(err, RuntimeError::UnsupportedTarget { .. }));
    }

    #[cfg(unix)]
    #[test]
    fn test_fallback_paths_are_sockets() {
        for path in fallback_socket_paths() {
            assert!(path.to_string_lossy().ends_with(".sock"));
        }
    }
}
