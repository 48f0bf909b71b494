//! Test doubles for the lifecycle and the control surface.
//!
//! Provides:
//! - [`ScriptedTester`]: an [`ApplicationTester`] whose every hook follows a [`Script`]
//!   and counts its calls
//! - [`StubControl`]: an in-memory [`ProcessControl`] recording starts and stops
//!
//! # Usage
//!
//! ```rust,no_run
//! use apptester::testing::{Script, ScriptedTester};
//! use apptester::tester::lifecycle;
//!
//! # async fn example() {
//! let tester = ScriptedTester::new(Script { tests_fail: true, ..Default::default() });
//! let err = lifecycle::run(&tester).await.unwrap_err();
//! assert_eq!(tester.calls().stop, 1);
//! # }
//! ```

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;

use crate::runtime::{LaunchSpec, ProcessControl, RuntimeError};
use crate::tester::error::{Result, TesterError};
use crate::tester::lifecycle::ApplicationTester;
use crate::tester::readiness::ReadinessPolicy;
use crate::tester::session::TesterSession;

/// How the scripted `start` hook behaves.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum StartBehavior {
    #[default]
    Succeed,
    /// Fail before creating anything.
    Fail,
    /// Register a resource, then fail.
    FailAfterRegistering,
    Panic,
}

/// Behaviour of a [`ScriptedTester`].
#[derive(Clone, Debug)]
pub struct Script {
    pub start: StartBehavior,
    /// Time after `start` from which the probe answers true; `None` never does.
    pub ready_after: Option<Duration>,
    /// How long each probe call takes.
    pub probe_latency: Duration,
    /// `false` makes the liveness check report a dead target.
    pub alive: bool,
    pub tests_fail: bool,
    pub tests_panic: bool,
    pub stop_fails: bool,
    pub policy: ReadinessPolicy,
}

impl Default for Script {
    fn default() -> Self {
        Self {
            start: StartBehavior::Succeed,
            ready_after: Some(Duration::ZERO),
            probe_latency: Duration::ZERO,
            alive: true,
            tests_fail: false,
            tests_panic: false,
            stop_fails: false,
            policy: ReadinessPolicy::new(Duration::from_millis(10), Duration::from_secs(5)),
        }
    }
}

/// Hook call counts.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Calls {
    pub start: u32,
    pub ready: u32,
    pub execute: u32,
    pub stop: u32,
}

/// A tester driven entirely by a [`Script`].
pub struct ScriptedTester {
    script: Script,
    started_at: Mutex<Option<Instant>>,
    start_calls: AtomicU32,
    ready_calls: AtomicU32,
    execute_calls: AtomicU32,
    stop_calls: AtomicU32,
    events: Mutex<Vec<&'static str>>,
}

impl ScriptedTester {
    pub fn new(script: Script) -> Self {
        Self {
            script,
            started_at: Mutex::new(None),
            start_calls: AtomicU32::new(0),
            ready_calls: AtomicU32::new(0),
            execute_calls: AtomicU32::new(0),
            stop_calls: AtomicU32::new(0),
            events: Mutex::new(Vec::new()),
        }
    }

    /// Call counts so far.
    pub fn calls(&self) -> Calls {
        Calls {
            start: self.start_calls.load(Ordering::SeqCst),
            ready: self.ready_calls.load(Ordering::SeqCst),
            execute: self.execute_calls.load(Ordering::SeqCst),
            stop: self.stop_calls.load(Ordering::SeqCst),
        }
    }

    /// Hooks in call order ("ready" only for successful probes).
    pub fn events(&self) -> Vec<&'static str> {
        self.lock_events().clone()
    }

    fn record(&self, event: &'static str) {
        self.lock_events().push(event);
    }

    fn lock_events(&self) -> std::sync::MutexGuard<'_, Vec<&'static str>> {
        self.events.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl ApplicationTester for ScriptedTester {
    fn name(&self) -> &str {
        "scripted"
    }

    fn policy(&self) -> ReadinessPolicy {
        self.script.policy
    }

    async fn start(&self, session: &mut TesterSession) -> Result<()> {
        self.start_calls.fetch_add(1, Ordering::SeqCst);
        self.record("start");
        *self.started_at.lock().unwrap_or_else(|e| e.into_inner()) = Some(Instant::now());

        match self.script.start {
            StartBehavior::Succeed => {
                session.register_resource(format!("scripted-{}", session.port()));
                Ok(())
            }
            StartBehavior::Fail => Err(TesterError::startup("scripted", "artifact missing")),
            StartBehavior::FailAfterRegistering => {
                session.register_resource(format!("scripted-{}", session.port()));
                Err(TesterError::startup("scripted", "created but could not start"))
            }
            StartBehavior::Panic => panic!("start exploded"),
        }
    }

    async fn is_ready(&self, _session: &TesterSession) -> bool {
        self.ready_calls.fetch_add(1, Ordering::SeqCst);
        if !self.script.probe_latency.is_zero() {
            tokio::time::sleep(self.script.probe_latency).await;
        }

        let started_at = *self.started_at.lock().unwrap_or_else(|e| e.into_inner());
        let ready = match (self.script.ready_after, started_at) {
            (Some(after), Some(at)) => at.elapsed() >= after,
            _ => false,
        };
        if ready {
            self.record("ready");
        }
        ready
    }

    async fn check_alive(&self, _session: &TesterSession) -> Result<()> {
        if self.script.alive {
            Ok(())
        } else {
            Err(TesterError::startup("scripted", "exited before becoming ready"))
        }
    }

    async fn execute(&self, session: &TesterSession) -> Result<()> {
        self.execute_calls.fetch_add(1, Ordering::SeqCst);
        self.record("execute");

        if self.script.tests_panic {
            panic!("assertion exploded");
        }
        if self.script.tests_fail {
            return Err(TesterError::test_execution(
                session.base_url(),
                "1 of 3 tests failed",
            ));
        }
        Ok(())
    }

    async fn stop(&self, session: &TesterSession) -> Result<()> {
        self.stop_calls.fetch_add(1, Ordering::SeqCst);
        self.record("stop");

        if self.script.stop_fails {
            return Err(TesterError::teardown(
                session.resource().unwrap_or("scripted"),
                "daemon went away",
            ));
        }
        Ok(())
    }
}

#[derive(Default)]
struct StubState {
    /// name -> running
    resources: HashMap<String, bool>,
    started: Vec<String>,
    stopped: Vec<String>,
    last_spec: Option<LaunchSpec>,
    log_requests: Vec<String>,
}

/// In-memory [`ProcessControl`].
#[derive(Default)]
pub struct StubControl {
    state: Mutex<StubState>,
    missing_image: bool,
    fail_after_create: bool,
    exits_immediately: bool,
    fail_stop: bool,
}

impl StubControl {
    pub fn new() -> Self {
        Self::default()
    }

    /// `start` fails with `ImageNotFound` before creating anything.
    pub fn missing_image(mut self) -> Self {
        self.missing_image = true;
        self
    }

    /// `start` creates the resource, then fails.
    pub fn fail_after_create(mut self) -> Self {
        self.fail_after_create = true;
        self
    }

    /// Started resources are immediately not running.
    pub fn exits_immediately(mut self) -> Self {
        self.exits_immediately = true;
        self
    }

    /// `stop` always fails.
    pub fn fail_stop(mut self) -> Self {
        self.fail_stop = true;
        self
    }

    /// Names passed to a successful `start`.
    pub fn started(&self) -> Vec<String> {
        self.lock().started.clone()
    }

    /// Names removed by `stop`.
    pub fn stopped(&self) -> Vec<String> {
        self.lock().stopped.clone()
    }

    /// Names whose logs were requested.
    pub fn log_requests(&self) -> Vec<String> {
        self.lock().log_requests.clone()
    }

    /// The last spec `start` received.
    pub fn last_spec(&self) -> Option<LaunchSpec> {
        self.lock().last_spec.clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, StubState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl ProcessControl for StubControl {
    fn kind(&self) -> &'static str {
        "stub"
    }

    async fn start(&self, spec: &LaunchSpec) -> crate::runtime::Result<()> {
        let mut state = self.lock();
        state.last_spec = Some(spec.clone());

        if self.missing_image {
            return Err(RuntimeError::ImageNotFound {
                image: spec.target.describe(),
            });
        }

        state
            .resources
            .insert(spec.name.clone(), !self.exits_immediately);

        if self.fail_after_create {
            return Err(RuntimeError::ContainerStartFailed {
                name: spec.name.clone(),
                reason: "port is already allocated".to_string(),
            });
        }

        state.started.push(spec.name.clone());
        Ok(())
    }

    async fn stop(&self, name: &str) -> crate::runtime::Result<()> {
        if self.fail_stop {
            return Err(RuntimeError::StopFailed {
                name: name.to_string(),
                reason: "daemon went away".to_string(),
            });
        }

        let mut state = self.lock();
        if state.resources.remove(name).is_some() {
            state.stopped.push(name.to_string());
        }
        Ok(())
    }

    async fn list_running(&self) -> crate::runtime::Result<Vec<String>> {
        Ok(self
            .lock()
            .resources
            .iter()
            .filter(|(_, running)| **running)
            .map(|(name, _)| name.clone())
            .collect())
    }

    async fn exists(&self, name: &str) -> crate::runtime::Result<bool> {
        Ok(self.lock().resources.contains_key(name))
    }

    async fn logs(&self, name: &str) -> crate::runtime::Result<Vec<String>> {
        self.lock().log_requests.push(name.to_string());
        Ok(vec![format!("{} started", name)])
    }
}
