//! Scale decision engine.
//!
//! Pure: the same fleet and alarm states always produce the same action.
//! Capacity checks that need the cloud live in the lifecycle manager.

use std::collections::HashSet;
use std::fmt;

use tracing::{debug, warn};

use fleetwatch_core::{Alarm, AlarmBinding, AlarmState, FleetSnapshot, NodeId};

/// The single corrective action a pass may take.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    CreateNode,
    StartNode(NodeId),
    StopNode(NodeId),
    NoOp,
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Action::CreateNode => f.write_str("create"),
            Action::StartNode(id) => write!(f, "start {id}"),
            Action::StopNode(id) => write!(f, "stop {id}"),
            Action::NoOp => f.write_str("none"),
        }
    }
}

/// Decides the next action from the fleet snapshot and alarm states.
#[derive(Debug, Clone)]
pub struct ScaleDecider {
    binding: AlarmBinding,
    node_limit: usize,
}

impl ScaleDecider {
    pub fn new(binding: AlarmBinding, node_limit: usize) -> Self {
        Self {
            binding,
            node_limit,
        }
    }

    /// Running nodes whose bound alarm is firing.
    ///
    /// Alarms whose name does not map back to a running node are ignored.
    pub fn overloaded(&self, snapshot: &FleetSnapshot, alarms: &[Alarm]) -> usize {
        let firing: HashSet<NodeId> = alarms
            .iter()
            .filter(|a| a.state == AlarmState::Alarm)
            .filter_map(|a| self.binding.node_id(&a.name))
            .filter(|id| snapshot.is_running(id))
            .collect();
        firing.len()
    }

    pub fn decide(&self, snapshot: &FleetSnapshot, alarms: &[Alarm]) -> Action {
        let running = snapshot.running.len();

        if running == 0 {
            debug!(stopped = snapshot.stopped.len(), "no running nodes, bootstrapping");
            return self.scale_out(snapshot);
        }

        let overloaded = self.overloaded(snapshot, alarms);
        debug!(running, overloaded, "evaluated fleet load");

        if overloaded >= running {
            return self.scale_out(snapshot);
        }

        if running - overloaded > 1
            && let Some(last) = snapshot.running.last()
        {
            return Action::StopNode(last.id.clone());
        }

        Action::NoOp
    }

    fn scale_out(&self, snapshot: &FleetSnapshot) -> Action {
        if let Some(first) = snapshot.stopped.first() {
            return Action::StartNode(first.id.clone());
        }

        let running = snapshot.running.len();
        if running >= self.node_limit {
            warn!(
                running,
                node_limit = self.node_limit,
                "fleet under pressure but node limit reached, no action taken"
            );
            return Action::NoOp;
        }

        Action::CreateNode
    }
}
