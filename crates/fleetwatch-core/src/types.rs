//! Domain types for the fleetwatch controller.
//!
//! Nodes and alarms are owned by external systems; these types are the
//! transient view the controller holds for the duration of one pass.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::binding::{AlarmName, NodeId};

// ── Node ──────────────────────────────────────────────────────────

/// Lifecycle state of a compute node as reported by the compute API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeState {
    Pending,
    Running,
    Stopped,
    Terminated,
    Unknown,
}

impl fmt::Display for NodeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            NodeState::Pending => "pending",
            NodeState::Running => "running",
            NodeState::Stopped => "stopped",
            NodeState::Terminated => "terminated",
            NodeState::Unknown => "unknown",
        };
        f.write_str(s)
    }
}

/// A compute node running the watched workload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Node {
    pub id: NodeId,
    pub state: NodeState,
    /// Private address (no port). May be empty while the node is not running.
    pub private_address: String,
}

impl Node {
    /// Upstream entry for this node on the application port.
    pub fn upstream_entry(&self, port: u16) -> UpstreamEntry {
        UpstreamEntry {
            host: self.private_address.clone(),
            port,
        }
    }
}

// ── Alarm ─────────────────────────────────────────────────────────

/// State of a metrics alarm.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlarmState {
    Ok,
    Alarm,
    InsufficientData,
}

/// A CPU-utilization alarm watching a single node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Alarm {
    pub name: AlarmName,
    /// Node id recorded as the alarm's metric dimension.
    pub bound_node_id: NodeId,
    pub state: AlarmState,
}

/// Aggregation applied to the metric over one period.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Statistic {
    Average,
    Maximum,
    Minimum,
    Sum,
    SampleCount,
}

/// Comparison between the aggregated metric and the threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Comparison {
    GreaterThanThreshold,
    GreaterThanOrEqualToThreshold,
    LessThanThreshold,
    LessThanOrEqualToThreshold,
}

// ── Upstream ──────────────────────────────────────────────────────

/// A `host:port` member of the reverse-proxy upstream.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct UpstreamEntry {
    pub host: String,
    pub port: u16,
}

impl fmt::Display for UpstreamEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

// ── Snapshot ──────────────────────────────────────────────────────

/// Per-pass working set: every node is in at most one partition.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FleetSnapshot {
    pub running: Vec<Node>,
    pub stopped: Vec<Node>,
}

impl FleetSnapshot {
    /// Upstream entries for every running node, in listing order.
    pub fn upstream_entries(&self, port: u16) -> Vec<UpstreamEntry> {
        self.running.iter().map(|n| n.upstream_entry(port)).collect()
    }

    pub fn is_running(&self, id: &NodeId) -> bool {
        self.running.iter().any(|n| &n.id == id)
    }
}
