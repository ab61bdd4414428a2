//! Health gate: bounded retry loop in front of upstream admission.

use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, error, info};

use fleetwatch_core::HealthSettings;

use crate::probe::{ProbeResult, http_probe};

/// Stand-in deadline for ceilings too large to add to the clock.
const FAR_FUTURE: Duration = Duration::from_secs(30 * 365 * 24 * 3600);

/// Outcome of gating a single node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthOutcome {
    /// The node answered its health path successfully.
    Healthy { attempts: u32 },
    /// The wall-clock ceiling passed without a successful probe.
    TimedOut { attempts: u32 },
}

impl HealthOutcome {
    pub fn is_healthy(&self) -> bool {
        matches!(self, HealthOutcome::Healthy { .. })
    }
}

/// Blocks until a node serves traffic or the ceiling is reached.
#[trait_variant::make(HealthGate: Send)]
pub trait LocalHealthGate {
    /// `address` is `host:port`; `ceiling` bounds the whole wait.
    async fn await_healthy(&self, address: &str, ceiling: Duration) -> HealthOutcome;
}

/// Health gate backed by [`http_probe`].
#[derive(Debug, Clone)]
pub struct HttpHealthGate {
    settings: HealthSettings,
}

impl HttpHealthGate {
    pub fn new(settings: HealthSettings) -> Self {
        Self { settings }
    }
}

impl HealthGate for HttpHealthGate {
    async fn await_healthy(&self, address: &str, ceiling: Duration) -> HealthOutcome {
        let now = Instant::now();
        let deadline = now.checked_add(ceiling).unwrap_or(now + FAR_FUTURE);
        let mut attempts = 0u32;

        debug!(%address, path = %self.settings.path, ?ceiling, "health gate waiting");

        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                break;
            }

            attempts += 1;
            let probe_timeout = self.settings.probe_timeout.min(remaining);
            match http_probe(address, &self.settings.path, probe_timeout).await {
                ProbeResult::Healthy { status } => {
                    info!(%address, attempts, status, "node passed health gate");
                    return HealthOutcome::Healthy { attempts };
                }
                ProbeResult::Unhealthy { status } => {
                    debug!(%address, attempts, status, "node answered but is not ready");
                }
                ProbeResult::Failed(failure) => {
                    debug!(%address, attempts, ?failure, "node not reachable yet");
                }
            }

            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                break;
            }
            tokio::time::sleep(self.settings.retry_interval.min(remaining)).await;
        }

        error!(
            %address,
            attempts,
            ceiling_secs = ceiling.as_secs(),
            "node did not become healthy before the endpoint timeout"
        );
        HealthOutcome::TimedOut { attempts }
    }
}
