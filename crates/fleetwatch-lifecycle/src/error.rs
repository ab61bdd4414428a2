//! Lifecycle error types.

use thiserror::Error;

use fleetwatch_cloud::CloudError;
use fleetwatch_core::{Node, NodeId, NodeState};

/// Errors surfaced by [`LifecycleManager::create`](crate::LifecycleManager::create).
#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("node limit of {limit} reached ({current} live nodes)")]
    NodeLimitReached { limit: usize, current: usize },

    #[error("launch failed: {0}")]
    Launch(#[source] CloudError),

    #[error("launched node {id} is {state}, expected running")]
    NotRunning { id: NodeId, state: NodeState },

    #[error("could not confirm launched node {id}: {source}")]
    Unconfirmed {
        id: NodeId,
        #[source]
        source: CloudError,
    },

    #[error("failed to bind alarm to node {}: {source}", .node.id)]
    AlarmBinding {
        /// The node that was launched without an alarm.
        node: Node,
        #[source]
        source: CloudError,
    },

    #[error("cloud error: {0}")]
    Cloud(#[from] CloudError),
}

impl LifecycleError {
    /// The node left behind by a launch that did not fully complete.
    pub fn launched_node(&self) -> Option<&NodeId> {
        match self {
            LifecycleError::NotRunning { id, .. } | LifecycleError::Unconfirmed { id, .. } => {
                Some(id)
            }
            LifecycleError::AlarmBinding { node, .. } => Some(&node.id),
            _ => None,
        }
    }
}

pub type LifecycleResult<T> = Result<T, LifecycleError>;
