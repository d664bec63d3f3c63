//! Dependency readiness waits with exponential backoff.

use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, info};

use shipyard_cluster::ObjectStore;
use shipyard_core::WaitPolicy;

use crate::error::StepError;

/// Poll interval that doubles on every not-ready probe, up to a cap.
#[derive(Debug)]
pub struct Backoff {
    current: Duration,
    base: Duration,
    max: Duration,
    attempts: u32,
}

impl Backoff {
    pub fn new(policy: &WaitPolicy) -> Self {
        Self {
            current: policy.initial_interval,
            base: policy.initial_interval,
            max: policy.max_interval.max(policy.initial_interval),
            attempts: 0,
        }
    }

    /// Interval to sleep before the next probe.
    pub fn next_interval(&self) -> Duration {
        self.current
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Record a not-ready probe and grow the interval.
    pub fn not_ready(&mut self) {
        self.attempts += 1;
        self.current = (self.current * 2).min(self.max);
    }

    pub fn reset(&mut self) {
        self.attempts = 0;
        self.current = self.base;
    }
}

/// Block until `release_name` reports ready.
///
/// With `timeout` set the wait fails once the budget is spent; without it
/// the wait is unbounded. Probe errors abort immediately.
pub async fn wait_until_ready(
    store: &dyn ObjectStore,
    namespace: &str,
    release_name: &str,
    policy: &WaitPolicy,
    timeout: Option<Duration>,
) -> Result<(), StepError> {
    let started = Instant::now();
    let mut backoff = Backoff::new(policy);

    loop {
        if store.release_ready(namespace, release_name).await? {
            info!(
                dependency = %release_name,
                %namespace,
                probes = backoff.attempts() + 1,
                "dependency ready"
            );
            return Ok(());
        }
        backoff.not_ready();

        let mut sleep = backoff.next_interval();
        if let Some(limit) = timeout {
            let waited = started.elapsed();
            if waited >= limit {
                return Err(StepError::DependencyTimeout {
                    dependency: release_name.to_string(),
                    waited,
                });
            }
            // Never sleep past the deadline; probe once more at it.
            sleep = sleep.min(limit - waited);
        }
        debug!(
            dependency = %release_name,
            %namespace,
            next_probe = ?sleep,
            "dependency not ready"
        );
        tokio::time::sleep(sleep).await;
    }
}
