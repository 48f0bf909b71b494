//! End-to-end application testing lifecycle.
//!
//! One session of an [`ApplicationTester`] acquires a free port, starts the
//! application on it, polls until it answers, runs the tests against its base
//! URL and always stops it again, whatever happened before. The first failure
//! decides the outcome; a teardown failure after it is reported alongside.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────────┐
//! │                         lifecycle::run()                             │
//! │                                                                      │
//! │   ┌───────────┐    ┌──────────────┐    ┌───────────┐                 │
//! │   │ PortLease │───▶│   start()    │───▶│ is_ready()│◀─┐ poll_interval│
//! │   │ 127.0.0.1 │    │ (container / │    │  (probe)  │──┘ until        │
//! │   └───────────┘    │   process)   │    └─────┬─────┘    ready_timeout│
//! │                    └──────┬───────┘          │                       │
//! │                           │ failure          ▼                       │
//! │                           │            ┌───────────┐                 │
//! │                           │            │ execute() │                 │
//! │                           │            │  (suite)  │                 │
//! │                           │            └─────┬─────┘                 │
//! │                           ▼                  ▼                       │
//! │                    ┌──────────────────────────────┐                  │
//! │                    │ stop()  (always, once)       │                  │
//! │                    └──────────────┬───────────────┘                  │
//! │                                   ▼                                  │
//! │                      Succeeded │ Failed(first failure)               │
//! └──────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```rust,no_run
//! use apptester::tester::{HttpSmokeSuite, ManagedAppTester};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let tester = ManagedAppTester::docker(
//!     "shop",
//!     "my-org/shop:1.4.0",
//!     8080,
//!     Box::new(HttpSmokeSuite::new(["/", "/cart"])),
//! );
//! let report = tester.run().await?;
//! println!("ready after {:?}", report.ready_after);
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod lifecycle;
pub mod managed;
pub mod port;
pub mod readiness;
pub mod session;
pub mod suite;

pub use error::{FailureKind, Result, RunError, TesterError};
pub use lifecycle::{ApplicationTester, run};
pub use managed::ManagedAppTester;
pub use port::PortLease;
pub use readiness::{AlwaysReady, HttpProbe, ReadinessPolicy, ReadinessProbe, TcpProbe};
pub use session::{SessionReport, SessionState, TesterSession};
pub use suite::{CommandSuite, FnSuite, HttpSmokeSuite, TestSuite};
