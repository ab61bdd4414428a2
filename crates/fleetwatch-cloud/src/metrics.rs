//! Metrics / alarm API capability.

use fleetwatch_core::{Alarm, AlarmName, AlarmSpec, NodeId};

use crate::error::CloudResult;

/// Parameters for creating (or overwriting) a node's CPU alarm.
#[derive(Debug, Clone, PartialEq)]
pub struct CpuAlarmRequest {
    pub name: AlarmName,
    pub node_id: NodeId,
    pub spec: AlarmSpec,
}

/// Alarm primitives of the metrics API.
#[trait_variant::make(MetricsApi: Send)]
pub trait LocalMetricsApi {
    async fn list_by_name_prefix(&self, prefix: &str) -> CloudResult<Vec<Alarm>>;

    /// `Ok(None)` when no alarm carries `name`.
    async fn get_by_name(&self, name: &AlarmName) -> CloudResult<Option<Alarm>>;

    /// Create the alarm, replacing any alarm of the same name.
    async fn put_cpu_alarm(&self, request: &CpuAlarmRequest) -> CloudResult<()>;

    /// Fails with a not-found error when the alarm does not exist.
    async fn delete_alarm(&self, name: &AlarmName) -> CloudResult<()>;
}
