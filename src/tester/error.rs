//! Error types for the application tester lifecycle.

use std::time::Duration;

use thiserror::Error;

use crate::tester::session::SessionReport;

/// Result type for tester operations.
pub type Result<T> = std::result::Result<T, TesterError>;

/// Errors that can occur while driving an application through its lifecycle.
#[derive(Debug, Error)]
pub enum TesterError {
    /// The target could not be launched (missing image, spawn failure, no free port).
    #[error("Application '{name}' failed to start: {reason}")]
    Startup {
        /// Application or resource name.
        name: String,
        /// Reason for failure.
        reason: String,
    },

    /// The readiness probe never succeeded before the deadline.
    #[error("Application did not become ready at {url} within {timeout:?}")]
    ReadinessTimeout {
        /// URL that was probed.
        url: String,
        /// Configured deadline.
        timeout: Duration,
    },

    /// The test routine reported failures.
    #[error("Tests failed against {base_url}: {reason}")]
    TestExecution {
        /// Base URL the tests ran against.
        base_url: String,
        /// Reason for failure.
        reason: String,
    },

    /// Stopping the target failed.
    #[error("Failed to stop '{name}': {reason}")]
    Teardown {
        /// Resource name.
        name: String,
        /// Reason for failure.
        reason: String,
    },
}

impl TesterError {
    /// Classify this error.
    pub fn kind(&self) -> FailureKind {
        match self {
            TesterError::Startup { .. } => FailureKind::StartupFailure,
            TesterError::ReadinessTimeout { .. } => FailureKind::ReadinessTimeout,
            TesterError::TestExecution { .. } => FailureKind::TestExecutionFailure,
            TesterError::Teardown { .. } => FailureKind::TeardownFailure,
        }
    }

    pub(crate) fn startup(name: impl Into<String>, reason: impl ToString) -> Self {
        TesterError::Startup {
            name: name.into(),
            reason: reason.to_string(),
        }
    }

    pub(crate) fn test_execution(base_url: impl Into<String>, reason: impl ToString) -> Self {
        TesterError::TestExecution {
            base_url: base_url.into(),
            reason: reason.to_string(),
        }
    }

    pub(crate) fn teardown(name: impl Into<String>, reason: impl ToString) -> Self {
        TesterError::Teardown {
            name: name.into(),
            reason: reason.to_string(),
        }
    }
}

/// The four ways a run can fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub enum FailureKind {
    StartupFailure,
    ReadinessTimeout,
    TestExecutionFailure,
    TeardownFailure,
}

impl FailureKind {
    /// Human-readable name.
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureKind::StartupFailure => "startup failure",
            FailureKind::ReadinessTimeout => "readiness timeout",
            FailureKind::TestExecutionFailure => "test execution failure",
            FailureKind::TeardownFailure => "teardown failure",
        }
    }
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A failed run.
///
/// `primary` is the first failure of the run. A teardown error that followed
/// an earlier failure is kept in `teardown` and never replaces `primary`.
#[derive(Debug, Error)]
#[error("{primary}")]
pub struct RunError {
    /// The failure that decides the outcome of the run.
    pub primary: TesterError,
    /// Teardown failure that happened after `primary`, if any.
    pub teardown: Option<TesterError>,
    /// What the session went through.
    pub report: SessionReport,
}

impl RunError {
    /// Kind of the deciding failure.
    pub fn kind(&self) -> FailureKind {
        self.primary.kind()
    }
}
