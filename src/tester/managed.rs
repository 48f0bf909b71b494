//! The concrete tester: a control surface, a probe and a suite plugged
//! into the lifecycle hooks.

use std::sync::Arc;

use async_trait::async_trait;

use crate::runtime::{
    DockerControl, LaunchSpec, LaunchTarget, LocalProcessControl, ProcessControl, RuntimeError,
};
use crate::tester::error::{Result, RunError, TesterError};
use crate::tester::lifecycle::{self, ApplicationTester};
use crate::tester::readiness::{HttpProbe, ReadinessPolicy, ReadinessProbe};
use crate::tester::session::{SessionReport, TesterSession};
use crate::tester::suite::TestSuite;

/// Tester for an application started through a [`ProcessControl`].
///
/// The same type covers the container and local-process variants; only the
/// control surface and the [`LaunchTarget`] differ.
pub struct ManagedAppTester {
    app_id: String,
    control: Arc<dyn ProcessControl>,
    target: LaunchTarget,
    env: Vec<(String, String)>,
    probe: Box<dyn ReadinessProbe>,
    suite: Box<dyn TestSuite>,
    policy: ReadinessPolicy,
    show_app_logs: bool,
}

impl ManagedAppTester {
    /// Create a tester probing `/` over HTTP with the default policy.
    pub fn new(
        app_id: impl Into<String>,
        control: Arc<dyn ProcessControl>,
        target: LaunchTarget,
        suite: Box<dyn TestSuite>,
    ) -> Self {
        Self {
            app_id: app_id.into(),
            control,
            target,
            env: Vec::new(),
            probe: Box::new(HttpProbe::default()),
            suite,
            policy: ReadinessPolicy::default(),
            show_app_logs: false,
        }
    }

    /// Container variant: run `image` and map the leased port to `container_port`.
    pub fn docker(
        app_id: impl Into<String>,
        image: impl Into<String>,
        container_port: u16,
        suite: Box<dyn TestSuite>,
    ) -> Self {
        Self::new(
            app_id,
            Arc::new(DockerControl::new()),
            LaunchTarget::Image {
                image: image.into(),
                container_port,
            },
            suite,
        )
    }

    /// Local variant: spawn `program` with `args` (placeholders allowed).
    pub fn local(
        app_id: impl Into<String>,
        program: impl Into<String>,
        args: Vec<String>,
        suite: Box<dyn TestSuite>,
    ) -> Self {
        Self::new(
            app_id,
            Arc::new(LocalProcessControl::new()),
            LaunchTarget::Command {
                program: program.into(),
                args,
                cwd: None,
            },
            suite,
        )
    }

    pub fn with_probe(mut self, probe: Box<dyn ReadinessProbe>) -> Self {
        self.probe = probe;
        self
    }

    pub fn with_policy(mut self, policy: ReadinessPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    /// Show the application's output (inherited stdio, or container logs at teardown).
    pub fn show_app_logs(mut self, show: bool) -> Self {
        self.show_app_logs = show;
        self
    }

    pub fn app_id(&self) -> &str {
        &self.app_id
    }

    pub fn target(&self) -> &LaunchTarget {
        &self.target
    }

    pub fn control(&self) -> &Arc<dyn ProcessControl> {
        &self.control
    }

    /// Resource name for a session on `port`.
    pub fn resource_name(&self, port: u16) -> String {
        format!("{}-{}", self.app_id, port)
    }

    /// Run one full session.
    pub async fn run(&self) -> std::result::Result<SessionReport, RunError> {
        lifecycle::run(self).await
    }

    fn launch_spec(&self, session: &TesterSession) -> LaunchSpec {
        let mut spec = LaunchSpec::new(
            self.resource_name(session.port()),
            self.target.clone(),
            session.port(),
        )
        .with_logs(self.show_app_logs);
        spec.env = self.env.clone();
        spec
    }

    async fn dump_logs(&self, name: &str) {
        match self.control.logs(name).await {
            Ok(lines) if !lines.is_empty() => {
                for line in lines {
                    tracing::info!(target: "apptester::app", app = %name, "{}", line);
                }
            }
            Ok(_) => {}
            Err(e) => tracing::debug!(app = %name, "Could not fetch application logs: {}", e),
        }
    }
}

#[async_trait]
impl ApplicationTester for ManagedAppTester {
    fn name(&self) -> &str {
        &self.app_id
    }

    fn policy(&self) -> ReadinessPolicy {
        self.policy
    }

    async fn start(&self, session: &mut TesterSession) -> Result<()> {
        let spec = self.launch_spec(session);
        session.register_resource(spec.name.clone());

        tracing::info!(
            runtime = self.control.kind(),
            resource = %spec.name,
            "Starting {}",
            self.target.describe()
        );

        self.control.start(&spec).await.map_err(|e| match e {
            RuntimeError::ImageNotFound { image } => TesterError::startup(
                &spec.name,
                format!("image {} not found locally, build it first", image),
            ),
            other => TesterError::startup(&spec.name, other),
        })
    }

    async fn is_ready(&self, session: &TesterSession) -> bool {
        self.probe.probe(session.base_url()).await
    }

    async fn check_alive(&self, session: &TesterSession) -> Result<()> {
        let Some(name) = session.resource() else {
            return Ok(());
        };

        match self.control.is_running(name).await {
            Ok(true) => Ok(()),
            Ok(false) => {
                if self.show_app_logs {
                    self.dump_logs(name).await;
                }
                Err(TesterError::startup(
                    name,
                    "exited before becoming ready",
                ))
            }
            Err(e) => {
                // The runtime itself hiccuped; let the probe decide.
                tracing::debug!(resource = %name, "Liveness check failed: {}", e);
                Ok(())
            }
        }
    }

    async fn execute(&self, session: &TesterSession) -> Result<()> {
        tracing::info!(suite = %self.suite.name(), base_url = %session.base_url(), "Running suite");
        self.suite.execute(session.base_url()).await
    }

    async fn stop(&self, session: &TesterSession) -> Result<()> {
        let name = session
            .resource()
            .map(str::to_string)
            .unwrap_or_else(|| self.resource_name(session.port()));

        let exists = self
            .control
            .exists(&name)
            .await
            .map_err(|e| TesterError::teardown(&name, e))?;
        if !exists {
            tracing::debug!(resource = %name, "Nothing left to stop");
            return Ok(());
        }

        if self.show_app_logs {
            self.dump_logs(&name).await;
        }

        self.control
            .stop(&name)
            .await
            .map_err(|e| TesterError::teardown(&name, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tester::error::FailureKind;
    use crate::tester::readiness::AlwaysReady;
    use crate::tester::suite::FnSuite;
    use crate::testing::StubControl;
    use std::time::Duration;

    fn passing_suite() -> Box<dyn TestSuite> {
        Box::new(FnSuite::new("ok", |_url: String| async { Ok::<(), String>(()) }))
    }

    fn image() -> LaunchTarget {
        LaunchTarget::Image {
            image: "my-org/shop:1.0.0".to_string(),
            container_port: 8080,
        }
    }

    fn tester(control: Arc<StubControl>, suite: Box<dyn TestSuite>) -> ManagedAppTester {
        ManagedAppTester::new("shop", control, image(), suite)
            .with_probe(Box::new(AlwaysReady))
            .with_policy(ReadinessPolicy::new(
                Duration::from_millis(10),
                Duration::from_millis(200),
            ))
    }

    #[tokio::test]
    async fn test_container_named_after_app_and_port() {
        let control = Arc::new(StubControl::new());
        let report = tester(control.clone(), passing_suite()).run().await.unwrap();

        let expected = format!("shop-{}", report.port);
        assert_eq!(report.resource.as_deref(), Some(expected.as_str()));
        assert_eq!(control.started(), vec![expected.clone()]);
        assert_eq!(control.stopped(), vec![expected]);
        assert!(control.list_running().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_missing_image_is_startup_failure() {
        let control = Arc::new(StubControl::new().missing_image());
        let err = tester(control.clone(), passing_suite()).run().await.unwrap_err();

        assert_eq!(err.kind(), FailureKind::StartupFailure);
        assert!(err.to_string().contains("build it first"));
        // Name was registered but nothing was created, so nothing is removed.
        assert!(control.stopped().is_empty());
    }

    #[tokio::test]
    async fn test_partial_create_is_cleaned_up() {
        let control = Arc::new(StubControl::new().fail_after_create());
        let err = tester(control.clone(), passing_suite()).run().await.unwrap_err();

        assert_eq!(err.kind(), FailureKind::StartupFailure);
        assert_eq!(control.stopped().len(), 1);
    }

    #[tokio::test]
    async fn test_exited_target_fails_fast() {
        let control = Arc::new(StubControl::new().exits_immediately());
        let tester = ManagedAppTester::new("shop", control.clone(), image(), passing_suite())
            .with_policy(ReadinessPolicy::new(
                Duration::from_millis(10),
                Duration::from_secs(30),
            ));

        let err = tester.run().await.unwrap_err();
        assert_eq!(err.kind(), FailureKind::StartupFailure);
        assert!(err.to_string().contains("exited before becoming ready"));
        assert_eq!(control.stopped().len(), 1);
    }

    #[tokio::test]
    async fn test_suite_failure_reported_and_stopped() {
        let control = Arc::new(StubControl::new());
        let suite = Box::new(FnSuite::new("fails", |url: String| async move {
            Err::<(), String>(format!("1 test failed against {}", url))
        }));

        let err = tester(control.clone(), suite).run().await.unwrap_err();
        assert_eq!(err.kind(), FailureKind::TestExecutionFailure);
        assert_eq!(control.stopped().len(), 1);
    }

    #[tokio::test]
    async fn test_stop_failure_is_teardown() {
        let control = Arc::new(StubControl::new().fail_stop());
        let err = tester(control.clone(), passing_suite()).run().await.unwrap_err();
        assert_eq!(err.kind(), FailureKind::TeardownFailure);
    }

    #[tokio::test]
    async fn test_env_and_logs_reach_launch_spec() {
        let control = Arc::new(StubControl::new());
        let tester = tester(control.clone(), passing_suite())
            .with_env("SPRING_PROFILES_ACTIVE", "e2e")
            .show_app_logs(true);

        tester.run().await.unwrap();

        let spec = control.last_spec().unwrap();
        assert!(spec.show_logs);
        assert_eq!(
            spec.env,
            vec![("SPRING_PROFILES_ACTIVE".to_string(), "e2e".to_string())]
        );
    }

    #[tokio::test]
    async fn test_logs_fetched_before_stop_only_when_shown() {
        let control = Arc::new(StubControl::new());
        let report = tester(control.clone(), passing_suite())
            .show_app_logs(true)
            .run()
            .await
            .unwrap();
        let name = report.resource.unwrap();
        assert_eq!(control.log_requests(), vec![name]);

        let control = Arc::new(StubControl::new());
        tester(control.clone(), passing_suite()).run().await.unwrap();
        assert!(control.log_requests().is_empty());
    }
}
