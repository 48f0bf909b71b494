//! Error types for process and container control.

use thiserror::Error;

/// Result type for runtime operations.
pub type Result<T> = std::result::Result<T, RuntimeError>;

/// Errors raised by a [`ProcessControl`](crate::runtime::ProcessControl).
#[derive(Debug, Error)]
pub enum RuntimeError {
    /// Docker is not available.
    #[error("Docker not available: {reason}")]
    DockerNotAvailable {
        /// Reason why Docker is unavailable.
        reason: String,
    },

    /// The image is not present locally and pulling is disabled.
    #[error("Image {image} not found in the local Docker registry. Build it first.")]
    ImageNotFound {
        /// Image name.
        image: String,
    },

    /// Failed to pull the image.
    #[error("Failed to pull image '{image}': {reason}")]
    ImagePullFailed {
        /// Image name.
        image: String,
        /// Reason for failure.
        reason: String,
    },

    /// Failed to create the container.
    #[error("Failed to create container '{name}': {reason}")]
    ContainerCreationFailed {
        /// Container name.
        name: String,
        /// Reason for failure.
        reason: String,
    },

    /// Failed to start the container.
    #[error("Failed to start container '{name}': {reason}")]
    ContainerStartFailed {
        /// Container name.
        name: String,
        /// Reason for failure.
        reason: String,
    },

    /// Failed to spawn a local process.
    #[error("Failed to spawn '{program}': {reason}")]
    SpawnFailed {
        /// Program that was launched.
        program: String,
        /// Reason for failure.
        reason: String,
    },

    /// Failed to stop a process or container.
    #[error("Failed to stop '{name}': {reason}")]
    StopFailed {
        /// Resource name.
        name: String,
        /// Reason for failure.
        reason: String,
    },

    /// A resource with this name is already managed.
    #[error("'{name}' is already running")]
    AlreadyRunning {
        /// Resource name.
        name: String,
    },

    /// The launch target doesn't fit this control surface.
    #[error("Unsupported launch target for {control}: {reason}")]
    UnsupportedTarget {
        /// Control surface kind.
        control: &'static str,
        /// Reason.
        reason: String,
    },

    /// Docker API error.
    #[error("Docker API error: {0}")]
    Docker(#[from] bollard::errors::Error),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
