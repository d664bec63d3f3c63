//! Per-run settings threaded through every component call.

use std::time::Duration;

use crate::config::UserConfig;

/// Polling policy for dependency readiness waits.
#[derive(Debug, Clone, PartialEq)]
pub struct WaitPolicy {
    /// First poll interval; doubled after every not-ready probe.
    pub initial_interval: Duration,
    /// Upper bound for the poll interval.
    pub max_interval: Duration,
    /// Total wait budget, applied only when timeouts are enabled.
    pub timeout: Duration,
}

impl Default for WaitPolicy {
    fn default() -> Self {
        Self {
            initial_interval: Duration::from_secs(2),
            max_interval: Duration::from_secs(30),
            timeout: Duration::from_secs(15 * 60),
        }
    }
}

/// Everything a run needs to know about where and how it installs.
#[derive(Debug, Clone)]
pub struct RunContext {
    /// Namespace releases and claims land in unless they say otherwise.
    pub namespace: String,
    /// Prefix joined onto every release name.
    pub prefix: String,
    /// Platform version, used when a release pins no chart version.
    pub version: String,
    /// Whether dependency waits and chart readiness checks are bounded.
    pub timeouts: bool,
    pub wait: WaitPolicy,
    /// Readiness budget handed to the chart operation.
    pub chart_timeout: Duration,
    /// Render and report only; touch nothing.
    pub dry_run: bool,
    pub user: UserConfig,
}

impl RunContext {
    pub fn new(namespace: &str, version: &str) -> Self {
        Self {
            namespace: namespace.to_string(),
            prefix: String::new(),
            version: version.to_string(),
            timeouts: true,
            wait: WaitPolicy::default(),
            chart_timeout: Duration::from_secs(10 * 60),
            dry_run: false,
            user: UserConfig::default(),
        }
    }

    /// Cluster-side release name for a logical release.
    pub fn release_name(&self, name: &str) -> String {
        if self.prefix.is_empty() {
            name.to_string()
        } else {
            format!("{}-{}", self.prefix, name)
        }
    }

    /// Dependency wait budget, or `None` when timeouts are disabled.
    pub fn dependency_timeout(&self) -> Option<Duration> {
        self.timeouts.then_some(self.wait.timeout)
    }

    /// Chart readiness budget, or `None` when timeouts are disabled.
    pub fn chart_timeout(&self) -> Option<Duration> {
        self.timeouts.then_some(self.chart_timeout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn release_name_applies_prefix() {
        let mut ctx = RunContext::new("platform", "1.0.0");
        assert_eq!(ctx.release_name("gateway"), "gateway");
        ctx.prefix = "staging".to_string();
        assert_eq!(ctx.release_name("gateway"), "staging-gateway");
    }

    #[test]
    fn disabling_timeouts_clears_budgets() {
        let mut ctx = RunContext::new("platform", "1.0.0");
        assert!(ctx.dependency_timeout().is_some());
        ctx.timeouts = false;
        assert_eq!(ctx.dependency_timeout(), None);
        assert_eq!(ctx.chart_timeout(), None);
    }
}
