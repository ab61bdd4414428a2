//! Instance classification.
//!
//! Splits a raw node listing into the running and stopped partitions the
//! decision engine works with. Order within each partition follows the
//! input so that "first stopped" and "last running" are stable choices.

use tracing::warn;

use crate::types::{FleetSnapshot, Node, NodeState};

/// Partition `nodes` into running and stopped.
///
/// Nodes in any other state (pending, terminated, unknown) are left out of
/// both partitions and reported with a warning.
pub fn classify(nodes: Vec<Node>) -> FleetSnapshot {
    let mut snapshot = FleetSnapshot::default();

    for node in nodes {
        match node.state {
            NodeState::Running => snapshot.running.push(node),
            NodeState::Stopped => snapshot.stopped.push(node),
            other => {
                warn!(
                    node_id = %node.id,
                    state = %other,
                    "node in transitional or unknown state, excluded from this pass"
                );
            }
        }
    }

    snapshot
}
