//! Local process control.
//!
//! Children are spawned with `kill_on_drop`, so a control that goes away
//! without `stop()` still takes its processes down with it.

use std::collections::HashMap;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::{Child, Command};
use tokio::sync::Mutex;

use crate::runtime::error::{Result, RuntimeError};
use crate::runtime::{LaunchSpec, LaunchTarget, ProcessControl};

struct ManagedChild {
    child: Child,
    program: String,
}

/// Spawns application processes on this machine and kills them again.
pub struct LocalProcessControl {
    children: Mutex<HashMap<String, ManagedChild>>,
    stop_timeout: Duration,
}

impl LocalProcessControl {
    pub fn new() -> Self {
        Self {
            children: Mutex::new(HashMap::new()),
            stop_timeout: Duration::from_secs(10),
        }
    }

    /// How long to wait for a killed process to be reaped.
    pub fn with_stop_timeout(mut self, timeout: Duration) -> Self {
        self.stop_timeout = timeout;
        self
    }

    /// OS pid of a managed process.
    pub async fn pid(&self, name: &str) -> Option<u32> {
        self.children
            .lock()
            .await
            .get(name)
            .and_then(|c| c.child.id())
    }
}

impl Default for LocalProcessControl {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ProcessControl for LocalProcessControl {
    fn kind(&self) -> &'static str {
        "local"
    }

    async fn start(&self, spec: &LaunchSpec) -> Result<()> {
        let (program, args, cwd) = match &spec.target {
            LaunchTarget::Command { program, args, cwd } => (program, args, cwd),
            LaunchTarget::Image { .. } => {
                return Err(RuntimeError::UnsupportedTarget {
                    control: "local",
                    reason: "expected a command, got a container image".to_string(),
                });
            }
        };

        let mut children = self.children.lock().await;
        if let Some(existing) = children.get_mut(&spec.name)
            && matches!(existing.child.try_wait(), Ok(None))
        {
            return Err(RuntimeError::AlreadyRunning {
                name: spec.name.clone(),
            });
        }

        let mut cmd = Command::new(program);
        cmd.args(args.iter().map(|a| spec.expand(a)))
            .env("PORT", spec.host_port.to_string())
            .stdin(Stdio::null())
            .kill_on_drop(true);

        for (key, value) in &spec.env {
            cmd.env(key, spec.expand(value));
        }
        if let Some(dir) = cwd {
            cmd.current_dir(dir);
        }
        if spec.show_logs {
            cmd.stdout(Stdio::inherit()).stderr(Stdio::inherit());
        } else {
            cmd.stdout(Stdio::null()).stderr(Stdio::null());
        }

        let child = cmd.spawn().map_err(|e| RuntimeError::SpawnFailed {
            program: program.clone(),
            reason: e.to_string(),
        })?;

        tracing::info!(
            process = %spec.name,
            pid = child.id(),
            port = spec.host_port,
            "Spawned {}",
            spec.target.describe()
        );

        children.insert(
            spec.name.clone(),
            ManagedChild {
                child,
                program: program.clone(),
            },
        );
        Ok(())
    }

    async fn stop(&self, name: &str) -> Result<()> {
        let Some(mut managed) = self.children.lock().await.remove(name) else {
            tracing::debug!(process = %name, "No such process, nothing to stop");
            return Ok(());
        };

        if let Ok(Some(status)) = managed.child.try_wait() {
            tracing::debug!(process = %name, %status, "Process had already exited");
            return Ok(());
        }

        managed
            .child
            .start_kill()
            .map_err(|e| RuntimeError::StopFailed {
                name: name.to_string(),
                reason: e.to_string(),
            })?;

        match tokio::time::timeout(self.stop_timeout, managed.child.wait()).await {
            Ok(Ok(status)) => {
                tracing::debug!(process = %name, program = %managed.program, %status, "Process stopped");
                Ok(())
            }
            Ok(Err(e)) => Err(RuntimeError::StopFailed {
                name: name.to_string(),
                reason: e.to_string(),
            }),
            Err(_) => Err(RuntimeError::StopFailed {
                name: name.to_string(),
                reason: format!("did not exit within {:?} after kill", self.stop_timeout),
            }),
        }
    }

    async fn list_running(&self) -> Result<Vec<String>> {
        let mut children = self.children.lock().await;
        Ok(children
            .iter_mut()
            .filter_map(|(name, c)| matches!(c.child.try_wait(), Ok(None)).then(|| name.clone()))
            .collect())
    }

    async fn exists(&self, name: &str) -> Result<bool> {
        Ok(self.children.lock().await.contains_key(name))
    }
}

impl Drop for LocalProcessControl {
    fn drop(&mut self) {
        let children = self.children.get_mut();
        if !children.is_empty() {
            tracing::warn!(
                "LocalProcessControl dropped with {} process(es) still managed, killing them",
                children.len()
            );
        }
    }
}
