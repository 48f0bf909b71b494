use std::path::PathBuf;

use serde::Deserialize;

/// `[docker]`: run the application from a locally built image.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DockerTarget {
    /// Image reference. Defaults to `{app_id}:latest`.
    pub image: Option<String>,
    /// Port the application listens on inside the container.
    pub container_port: u16,
    /// Pull the image when it is not present locally.
    pub pull_missing: bool,
}

impl Default for DockerTarget {
    fn default() -> Self {
        Self {
            image: None,
            container_port: 8080,
            pull_missing: false,
        }
    }
}

impl DockerTarget {
    /// The image to run for `app_id`.
    pub fn image_for(&self, app_id: &str) -> String {
        self.image
            .clone()
            .filter(|i| !i.trim().is_empty())
            .unwrap_or_else(|| format!("{}:latest", app_id))
    }
}

/// `[local]`: spawn the application as a child process.
///
/// `{port}` and `{base_url}` in `args` are replaced at launch; `PORT` is
/// always exported.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LocalTarget {
    pub command: String,
    pub args: Vec<String>,
    pub cwd: Option<PathBuf>,
}
