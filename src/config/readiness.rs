use std::time::Duration;

use serde::Deserialize;

use crate::tester::readiness::{
    AlwaysReady, HttpProbe, ReadinessPolicy, ReadinessProbe, TcpProbe,
};

/// How readiness is checked.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProbeKind {
    /// GET `path` and expect a 2xx answer.
    #[default]
    Http,
    /// Accept as soon as the port takes connections.
    Tcp,
    /// No probing; ready right after start.
    None,
}

/// `[readiness]`
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ReadinessConfig {
    pub probe: ProbeKind,
    pub path: String,
    pub poll_interval_ms: u64,
    pub timeout_secs: u64,
}

impl Default for ReadinessConfig {
    fn default() -> Self {
        let policy = ReadinessPolicy::default();
        Self {
            probe: ProbeKind::Http,
            path: "/".to_string(),
            poll_interval_ms: policy.poll_interval.as_millis() as u64,
            timeout_secs: policy.ready_timeout.as_secs(),
        }
    }
}

impl ReadinessConfig {
    pub fn policy(&self) -> ReadinessPolicy {
        ReadinessPolicy::new(
            Duration::from_millis(self.poll_interval_ms),
            Duration::from_secs(self.timeout_secs),
        )
    }

    pub fn build_probe(&self) -> Box<dyn ReadinessProbe> {
        match self.probe {
            ProbeKind::Http => Box::new(HttpProbe::new(self.path.clone())),
            ProbeKind::Tcp => Box::new(TcpProbe::new()),
            ProbeKind::None => Box::new(AlwaysReady),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_policy() {
        let config = ReadinessConfig::default();
        assert_eq!(config.policy(), ReadinessPolicy::default());
        assert_eq!(config.probe, ProbeKind::Http);
    }

    #[test]
    fn test_probe_selection() {
        let mut config = ReadinessConfig {
            path: "/actuator/health".to_string(),
            ..Default::default()
        };
        assert!(config.build_probe().describe().contains("/actuator/health"));

        config.probe = ProbeKind::Tcp;
        assert_eq!(config.build_probe().describe(), "TCP connect");
    }
}
