//! Readiness probing.

use std::time::Duration;

use async_trait::async_trait;

/// How often and how long to poll for readiness.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadinessPolicy {
    /// Pause between two probe attempts.
    pub poll_interval: Duration,
    /// Give up once this much time has passed since the first probe.
    pub ready_timeout: Duration,
}

impl Default for ReadinessPolicy {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(500),
            ready_timeout: Duration::from_secs(60),
        }
    }
}

impl ReadinessPolicy {
    pub fn new(poll_interval: Duration, ready_timeout: Duration) -> Self {
        Self {
            poll_interval,
            ready_timeout,
        }
    }
}

/// A predicate polled against the base URL until it holds.
#[async_trait]
pub trait ReadinessProbe: Send + Sync {
    /// Short description for logs.
    fn describe(&self) -> String;

    /// Whether the application currently answers.
    ///
    /// Errors such as refused connections are expected while the target
    /// boots and must read as `false`.
    async fn probe(&self, base_url: &str) -> bool;
}

/// HTTP GET readiness check: any 2xx is ready.
pub struct HttpProbe {
    path: String,
    client: reqwest::Client,
}

impl HttpProbe {
    /// Probe `path` relative to the base URL (e.g. "/" or "/actuator/health").
    pub fn new(path: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(5))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            path: path.into(),
            client,
        }
    }

    /// Full URL probed for a base URL.
    pub fn url(&self, base_url: &str) -> String {
        format!(
            "{}/{}",
            base_url.trim_end_matches('/'),
            self.path.trim_start_matches('/')
        )
    }
}

impl Default for HttpProbe {
    fn default() -> Self {
        Self::new("/")
    }
}

#[async_trait]
impl ReadinessProbe for HttpProbe {
    fn describe(&self) -> String {
        format!("HTTP GET {}", self.path)
    }

    async fn probe(&self, base_url: &str) -> bool {
        let url = self.url(base_url);
        match self.client.get(&url).send().await {
            Ok(resp) => {
                let status = resp.status();
                tracing::debug!(%url, %status, "Readiness probe answered");
                status.is_success()
            }
            Err(e) => {
                // Connection refused is expected during startup
                if e.is_connect() {
                    tracing::trace!(%url, "Readiness probe: connection refused");
                } else {
                    tracing::debug!(%url, "Readiness probe error: {}", e);
                }
                false
            }
        }
    }
}

/// TCP connect readiness check.
pub struct TcpProbe {
    connect_timeout: Duration,
}

impl TcpProbe {
    pub fn new() -> Self {
        Self {
            connect_timeout: Duration::from_secs(2),
        }
    }
}

impl Default for TcpProbe {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ReadinessProbe for TcpProbe {
    fn describe(&self) -> String {
        "TCP connect".to_string()
    }

    async fn probe(&self, base_url: &str) -> bool {
        use tokio::net::TcpStream;

        let addr = base_url
            .trim_start_matches("http://")
            .trim_start_matches("https://")
            .trim_end_matches('/');

        matches!(
            tokio::time::timeout(self.connect_timeout, TcpStream::connect(addr)).await,
            Ok(Ok(_))
        )
    }
}

/// Readiness is assumed as soon as the target started.
pub struct AlwaysReady;

#[async_trait]
impl ReadinessProbe for AlwaysReady {
    fn describe(&self) -> String {
        "none".to_string()
    }

    async fn probe(&self, _base_url: &str) -> bool {
        true
    }
}
