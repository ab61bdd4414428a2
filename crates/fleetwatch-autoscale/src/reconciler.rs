//! Reconciler: the periodic classify → decide → act → gate → sync pass.
//!
//! Passes never overlap. Shutdown is only observed between passes, so a
//! pass that is waiting on a health gate or a proxy reload finishes before
//! the loop exits.

use std::collections::BTreeSet;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{error, info, warn};

use fleetwatch_cloud::{CloudError, ComputeApi, MetricsApi};
use fleetwatch_core::{
    FleetSnapshot, Node, NodeId, NodeState, WatchdogConfig, WatchedTag, classify,
};
use fleetwatch_health::HealthGate;
use fleetwatch_lifecycle::{LifecycleError, LifecycleManager};
use fleetwatch_proxy::{ConfigStore, Reloader, SyncStats, UpstreamSync};

use crate::decision::{Action, ScaleDecider};

const FAR_FUTURE: Duration = Duration::from_secs(30 * 365 * 24 * 3600);

/// Errors that abort a pass before any action is taken.
#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error("failed to list fleet nodes: {0}")]
    Listing(#[source] CloudError),
}

/// What happened when the chosen action was executed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionOutcome {
    /// Nothing was attempted.
    Skipped,
    /// The node was created or started and is awaiting the health gate.
    Launched(NodeId),
    Stopped(NodeId),
    /// Creation refused because the fleet is at its node limit.
    CapacityExhausted,
    Failed(String),
}

/// Snapshot and decision, without side effects.
#[derive(Debug, Clone)]
pub struct Plan {
    pub snapshot: FleetSnapshot,
    pub action: Action,
    /// Running nodes whose alarm is firing. `None` if alarms could not be read.
    pub overloaded: Option<usize>,
    /// Tagged nodes still pending. Not part of the snapshot.
    pub pending: Vec<NodeId>,
}

/// Summary of one reconciliation pass.
#[derive(Debug, Clone)]
pub struct PassReport {
    pub running: usize,
    pub stopped: usize,
    pub action: Action,
    pub outcome: ActionOutcome,
    /// Nodes that passed the health gate this pass.
    pub admitted: Vec<NodeId>,
    /// Running nodes held out of the upstream until they pass the gate.
    pub deferred: Vec<NodeId>,
    /// `None` if the upstream could not be rewritten.
    pub upstream: Option<SyncStats>,
}

/// Drives the fleet toward its target size on a timer.
pub struct Reconciler<C, M, G, S, R> {
    lifecycle: LifecycleManager<C, M>,
    gate: G,
    upstream: UpstreamSync<S, R>,
    decider: ScaleDecider,
    tag: WatchedTag,
    check_period: Duration,
    endpoint_timeout: Duration,
    /// Running nodes that have not yet passed the health gate.
    deferred: BTreeSet<NodeId>,
}

impl<C, M, G, S, R> Reconciler<C, M, G, S, R>
where
    C: ComputeApi,
    M: MetricsApi,
    G: HealthGate,
    S: ConfigStore,
    R: Reloader,
{
    pub fn new(
        lifecycle: LifecycleManager<C, M>,
        gate: G,
        upstream: UpstreamSync<S, R>,
        config: &WatchdogConfig,
    ) -> Self {
        Self {
            lifecycle,
            gate,
            upstream,
            decider: ScaleDecider::new(config.alarm_binding.clone(), config.node_limit),
            tag: config.watched_tag.clone(),
            check_period: config.check_period,
            endpoint_timeout: config.endpoint_timeout,
            deferred: BTreeSet::new(),
        }
    }

    pub fn lifecycle(&self) -> &LifecycleManager<C, M> {
        &self.lifecycle
    }

    pub fn upstream(&self) -> &UpstreamSync<S, R> {
        &self.upstream
    }

    /// Nodes currently held out of the upstream.
    pub fn deferred(&self) -> impl Iterator<Item = &NodeId> {
        self.deferred.iter()
    }

    /// Classify the fleet and decide, without acting.
    pub async fn plan(&self) -> Result<Plan, ReconcileError> {
        let nodes = self
            .lifecycle
            .compute()
            .list_by_tag(&self.tag)
            .await
            .map_err(ReconcileError::Listing)?;
        let pending = nodes
            .iter()
            .filter(|n| n.state == NodeState::Pending)
            .map(|n| n.id.clone())
            .collect();
        let snapshot = classify(nodes);

        let prefix = self.lifecycle.binding().prefix();
        let (action, overloaded) = match self.lifecycle.metrics().list_by_name_prefix(prefix).await
        {
            Ok(alarms) => (
                self.decider.decide(&snapshot, &alarms),
                Some(self.decider.overloaded(&snapshot, &alarms)),
            ),
            Err(e) if snapshot.running.is_empty() => {
                // Bootstrap does not depend on alarms.
                warn!(code = %e.code, message = %e.message, "alarm listing failed");
                (self.decider.decide(&snapshot, &[]), None)
            }
            Err(e) => {
                warn!(
                    code = %e.code,
                    message = %e.message,
                    "alarm listing failed, skipping scaling this pass"
                );
                (Action::NoOp, None)
            }
        };

        Ok(Plan {
            snapshot,
            action,
            overloaded,
            pending,
        })
    }

    /// Run one full reconciliation pass.
    pub async fn run_pass(&mut self) -> Result<PassReport, ReconcileError> {
        let Plan {
            snapshot,
            action,
            pending,
            ..
        } = self.plan().await?;

        // Forget deferred nodes that are neither running nor still booting.
        self.deferred
            .retain(|id| snapshot.is_running(id) || pending.contains(id));

        let mut members: Vec<Node> = snapshot.running.clone();
        let mut candidate: Option<Node> = None;

        let outcome = match &action {
            Action::NoOp => ActionOutcome::Skipped,
            Action::CreateNode => match self.lifecycle.create().await {
                Ok(node) => {
                    let id = node.id.clone();
                    candidate = Some(node);
                    ActionOutcome::Launched(id)
                }
                Err(LifecycleError::NodeLimitReached { limit, current }) => {
                    warn!(limit, current, "node limit reached, creation refused");
                    ActionOutcome::CapacityExhausted
                }
                Err(LifecycleError::AlarmBinding { node, source }) => {
                    error!(
                        node_id = %node.id,
                        code = %source.code,
                        message = %source.message,
                        "node created without alarm"
                    );
                    self.deferred.insert(node.id.clone());
                    ActionOutcome::Failed(format!("alarm binding failed for {}", node.id))
                }
                Err(e) => {
                    error!(error = %e, "node creation failed, retrying next pass");
                    if let Some(id) = e.launched_node() {
                        warn!(
                            node_id = %id,
                            "launched node held back until it passes the health gate"
                        );
                        self.deferred.insert(id.clone());
                    }
                    ActionOutcome::Failed(e.to_string())
                }
            },
            Action::StartNode(id) => match self.lifecycle.start(id).await {
                Some(node) => {
                    candidate = Some(node);
                    ActionOutcome::Launched(id.clone())
                }
                None => ActionOutcome::Failed(format!("start of {id} failed")),
            },
            Action::StopNode(id) => {
                if self.lifecycle.stop(id).await {
                    members.retain(|n| &n.id != id);
                    self.deferred.remove(id);
                    ActionOutcome::Stopped(id.clone())
                } else {
                    ActionOutcome::Failed(format!("stop of {id} failed"))
                }
            }
        };

        // The new node goes first; deferred nodes share what is left of the
        // same endpoint timeout.
        let mut to_gate: Vec<Node> = candidate.into_iter().collect();
        to_gate.extend(
            members
                .iter()
                .filter(|n| self.deferred.contains(&n.id))
                .cloned(),
        );
        members.retain(|n| !self.deferred.contains(&n.id));

        let started = Instant::now();
        let deadline = started
            .checked_add(self.endpoint_timeout)
            .unwrap_or(started + FAR_FUTURE);

        let mut admitted = Vec::new();
        for node in to_gate {
            let address = node.upstream_entry(self.upstream.port()).to_string();
            let ceiling = deadline.saturating_duration_since(Instant::now());
            let outcome = self.gate.await_healthy(&address, ceiling).await;
            if outcome.is_healthy() {
                self.deferred.remove(&node.id);
                admitted.push(node.id.clone());
                members.push(node);
            } else {
                warn!(node_id = %node.id, "node deferred until it passes the health gate");
                self.deferred.insert(node.id.clone());
            }
        }

        let upstream = match self.upstream.reconcile(&members).await {
            Ok(stats) => Some(stats),
            Err(e) => {
                error!(error = %e, "upstream sync failed");
                None
            }
        };

        let report = PassReport {
            running: snapshot.running.len(),
            stopped: snapshot.stopped.len(),
            action,
            outcome,
            admitted,
            deferred: self.deferred.iter().cloned().collect(),
            upstream,
        };

        info!(
            running = report.running,
            stopped = report.stopped,
            action = %report.action,
            outcome = ?report.outcome,
            admitted = report.admitted.len(),
            deferred = report.deferred.len(),
            "reconciliation pass complete"
        );

        Ok(report)
    }

    /// Run passes every `check_period` until `shutdown` fires.
    pub async fn run(&mut self, mut shutdown: watch::Receiver<bool>) {
        info!(
            interval_secs = self.check_period.as_secs(),
            "reconciler started"
        );

        loop {
            if *shutdown.borrow() {
                break;
            }

            if let Err(e) = self.run_pass().await {
                error!(error = %e, "reconciliation pass failed");
            }

            tokio::select! {
                _ = tokio::time::sleep(self.check_period) => {}
                _ = shutdown.changed() => {
                    break;
                }
            }
        }

        info!("reconciler shutting down");
    }
}
