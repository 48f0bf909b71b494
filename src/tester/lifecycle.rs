//! The shared start / wait / test / stop orchestration.

use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::time::Duration;

use async_trait::async_trait;
use futures::FutureExt;
use tokio::time::Instant;

use crate::tester::error::{Result, RunError, TesterError};
use crate::tester::port::PortLease;
use crate::tester::readiness::ReadinessPolicy;
use crate::tester::session::{SessionReport, SessionState, TesterSession};

/// Capabilities a concrete tester plugs into [`run`].
///
/// Variants only decide how the target starts and stops, what "ready"
/// means and which tests run. Ordering, polling and guaranteed teardown
/// live in [`run`].
#[async_trait]
pub trait ApplicationTester: Send + Sync {
    /// Name used in logs and resource names.
    fn name(&self) -> &str;

    /// Polling policy for the readiness phase.
    fn policy(&self) -> ReadinessPolicy {
        ReadinessPolicy::default()
    }

    /// Launch the target on `session.port()`.
    ///
    /// Register the resource on the session before any step that can
    /// leave something behind, so teardown still releases it when this
    /// returns an error.
    async fn start(&self, session: &mut TesterSession) -> Result<()>;

    /// Whether the target answers on `session.base_url()`.
    async fn is_ready(&self, session: &TesterSession) -> bool;

    /// Run the test routine against `session.base_url()`.
    async fn execute(&self, session: &TesterSession) -> Result<()>;

    /// Release what `start` created. Called at most once per session.
    async fn stop(&self, session: &TesterSession) -> Result<()>;

    /// Fail the readiness phase early when the target already died.
    async fn check_alive(&self, _session: &TesterSession) -> Result<()> {
        Ok(())
    }
}

/// Drive one session of `tester` through its whole lifecycle.
///
/// Teardown runs on every exit path. A failure of the start, readiness or
/// test phase is returned after teardown; a teardown failure only decides
/// the outcome when nothing failed before it.
pub async fn run<T>(tester: &T) -> std::result::Result<SessionReport, RunError>
where
    T: ApplicationTester + ?Sized,
{
    let policy = tester.policy();
    let clock = Instant::now();
    let mut session = TesterSession::new(tester.name());

    tracing::info!(tester = %tester.name(), "Starting tester session");

    session.advance(SessionState::Starting);
    let mut ready_after = None;

    let primary = match start_phase(tester, &mut session).await {
        Err(e) => Some(e),
        Ok(()) => {
            session.advance(SessionState::WaitingReady);
            match wait_until_ready(tester, &session, &policy).await {
                Err(e) => Some(e),
                Ok(waited) => {
                    ready_after = Some(waited);
                    session.advance(SessionState::Running);
                    tracing::info!(base_url = %session.base_url(), "Executing tests");
                    guarded(tester.execute(&session), |msg| {
                        TesterError::test_execution(session.base_url(), msg)
                    })
                    .await
                    .err()
                }
            }
        }
    };

    if let Some(e) = &primary {
        tracing::error!(tester = %tester.name(), kind = %e.kind(), "{}", e);
    }

    session.advance(SessionState::Stopping);
    let teardown = stop_phase(tester, &session).await.err();

    let (primary, teardown) = match (primary, teardown) {
        (Some(p), Some(t)) => {
            tracing::warn!(tester = %tester.name(), "Teardown also failed: {}", t);
            (Some(p), Some(t))
        }
        (Some(p), None) => (Some(p), None),
        (None, Some(t)) => {
            tracing::error!(tester = %tester.name(), "{}", t);
            (Some(t), None)
        }
        (None, None) => (None, None),
    };

    session.advance(if primary.is_some() {
        SessionState::Failed
    } else {
        SessionState::Succeeded
    });

    let mut report = session.report(clock.elapsed(), ready_after);

    match primary {
        None => {
            tracing::info!(
                tester = %tester.name(),
                elapsed = ?report.elapsed,
                "Tester session succeeded"
            );
            Ok(report)
        }
        Some(primary) => {
            report.failure = Some(primary.kind());
            Err(RunError {
                primary,
                teardown,
                report,
            })
        }
    }
}

async fn start_phase<T>(tester: &T, session: &mut TesterSession) -> Result<()>
where
    T: ApplicationTester + ?Sized,
{
    let lease = PortLease::acquire()
        .map_err(|e| TesterError::startup(tester.name(), format!("no free port: {}", e)))?;
    session.bind_port(lease);
    session.release_port_socket();

    tracing::info!(
        tester = %tester.name(),
        port = session.port(),
        "Launching application"
    );

    let name = tester.name().to_string();
    guarded(tester.start(session), |msg| TesterError::startup(name, msg)).await?;
    session.mark_started();
    Ok(())
}

async fn wait_until_ready<T>(
    tester: &T,
    session: &TesterSession,
    policy: &ReadinessPolicy,
) -> Result<Duration>
where
    T: ApplicationTester + ?Sized,
{
    let started = Instant::now();
    // `None` means the timeout is too large to represent: wait without a deadline.
    let deadline = started.checked_add(policy.ready_timeout);
    let mut attempts: u32 = 0;

    loop {
        guarded(tester.check_alive(session), |msg| {
            TesterError::startup(tester.name(), msg)
        })
        .await?;

        let remaining = time_left(deadline);
        if remaining.is_zero() {
            break;
        }

        attempts += 1;
        let probe = AssertUnwindSafe(tester.is_ready(session)).catch_unwind();
        match tokio::time::timeout(remaining, probe).await {
            Ok(Ok(true)) => {
                let waited = started.elapsed();
                tracing::info!(
                    base_url = %session.base_url(),
                    attempts,
                    waited = ?waited,
                    "Application is ready"
                );
                return Ok(waited);
            }
            Ok(Ok(false)) => {
                tracing::trace!(attempts, "Application not ready yet");
            }
            Ok(Err(panic)) => {
                tracing::warn!("Readiness probe panicked: {}", panic_message(&panic));
            }
            Err(_) => {
                tracing::debug!(attempts, "Readiness probe still pending at deadline");
                break;
            }
        }

        let remaining = time_left(deadline);
        if remaining.is_zero() {
            break;
        }
        tokio::time::sleep(policy.poll_interval.min(remaining)).await;
    }

    Err(TesterError::ReadinessTimeout {
        url: session.base_url().to_string(),
        timeout: policy.ready_timeout,
    })
}

fn time_left(deadline: Option<Instant>) -> Duration {
    match deadline {
        Some(deadline) => deadline.saturating_duration_since(Instant::now()),
        None => Duration::MAX,
    }
}

async fn stop_phase<T>(tester: &T, session: &TesterSession) -> Result<()>
where
    T: ApplicationTester + ?Sized,
{
    if !session.needs_stop() {
        tracing::debug!(tester = %tester.name(), "Nothing was started, skipping stop");
        return Ok(());
    }

    let name = session.resource().unwrap_or(tester.name()).to_string();
    tracing::info!(tester = %tester.name(), resource = %name, "Stopping application");

    guarded(tester.stop(session), |msg| TesterError::teardown(&name, msg)).await?;

    tracing::info!(tester = %tester.name(), resource = %name, "Stopped application");
    Ok(())
}

/// Await a hook, turning a panic into the phase's error.
async fn guarded<F, E>(fut: F, on_panic: E) -> Result<()>
where
    F: Future<Output = Result<()>>,
    E: FnOnce(String) -> TesterError,
{
    match AssertUnwindSafe(fut).catch_unwind().await {
        Ok(result) => result,
        Err(panic) => Err(on_panic(format!("panicked: {}", panic_message(&panic)))),
    }
}

fn panic_message(panic: &Box<dyn Any + Send>) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
