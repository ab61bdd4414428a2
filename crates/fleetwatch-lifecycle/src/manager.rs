//! Lifecycle manager: wraps compute primitives with alarm binding.

use tracing::{debug, info, warn};

use fleetwatch_cloud::{CloudError, ComputeApi, CpuAlarmRequest, MetricsApi};
use fleetwatch_core::{
    AlarmBinding, AlarmSpec, LaunchTemplate, Node, NodeId, NodeState, WatchdogConfig, WatchedTag,
};

use crate::error::{LifecycleError, LifecycleResult};

/// Creates, starts, stops and purges fleet nodes.
pub struct LifecycleManager<C, M> {
    compute: C,
    metrics: M,
    binding: AlarmBinding,
    alarm: AlarmSpec,
    template: LaunchTemplate,
    tag: WatchedTag,
    node_limit: usize,
}

impl<C: ComputeApi, M: MetricsApi> LifecycleManager<C, M> {
    pub fn new(compute: C, metrics: M, config: &WatchdogConfig) -> Self {
        Self {
            compute,
            metrics,
            binding: config.alarm_binding.clone(),
            alarm: config.alarm.clone(),
            template: config.template.clone(),
            tag: config.watched_tag.clone(),
            node_limit: config.node_limit,
        }
    }

    pub fn compute(&self) -> &C {
        &self.compute
    }

    pub fn metrics(&self) -> &M {
        &self.metrics
    }

    pub fn binding(&self) -> &AlarmBinding {
        &self.binding
    }

    /// Launch a node from the configured template and bind its alarm.
    ///
    /// Refuses when the fleet already has `node_limit` live (running or
    /// pending) nodes. A node that launched but could not be confirmed or
    /// alarmed is not cleaned up here.
    pub async fn create(&self) -> LifecycleResult<Node> {
        let listed = self.compute.list_by_tag(&self.tag).await?;
        let live = listed
            .iter()
            .filter(|n| matches!(n.state, NodeState::Running | NodeState::Pending))
            .count();
        if live >= self.node_limit {
            return Err(LifecycleError::NodeLimitReached {
                limit: self.node_limit,
                current: live,
            });
        }

        let launched = self
            .compute
            .launch_from_template(&self.template, &self.tag)
            .await
            .map_err(LifecycleError::Launch)?;
        debug!(node_id = %launched.id, "node launched, confirming state");

        let node = match self.compute.get(&launched.id).await {
            Ok(node) => node,
            Err(source) => {
                return Err(LifecycleError::Unconfirmed {
                    id: launched.id,
                    source,
                });
            }
        };
        if node.state != NodeState::Running {
            return Err(LifecycleError::NotRunning {
                id: node.id,
                state: node.state,
            });
        }

        if let Err(source) = self.bind_alarm(&node.id).await {
            return Err(LifecycleError::AlarmBinding { node, source });
        }

        info!(
            node_id = %node.id,
            address = %node.private_address,
            alarm = %self.binding.alarm_name(&node.id),
            "node created"
        );
        Ok(node)
    }

    /// Start a stopped node, restoring its alarm if it went missing.
    ///
    /// Returns the running node, or `None` if the start failed.
    pub async fn start(&self, id: &NodeId) -> Option<Node> {
        let node = match self.compute.start(id).await {
            Ok(node) => node,
            Err(e) => {
                log_cloud_error(id, "start", &e);
                return None;
            }
        };

        if let Err(e) = self.ensure_alarm(id).await {
            log_cloud_error(id, "restore alarm", &e);
        }

        info!(node_id = %id, address = %node.private_address, "node started");
        Some(node)
    }

    /// Stop a running node. Its alarm is left in place.
    pub async fn stop(&self, id: &NodeId) -> bool {
        match self.compute.stop(id).await {
            Ok(_) => {
                info!(node_id = %id, "node stopped");
                true
            }
            Err(e) => {
                log_cloud_error(id, "stop", &e);
                false
            }
        }
    }

    /// Terminate a node and delete its alarm.
    ///
    /// Returns whether the node is terminated afterwards, so purging an
    /// already terminated node succeeds again. A missing alarm is only a
    /// warning.
    pub async fn purge(&self, id: &NodeId) -> bool {
        let terminated = match self.compute.terminate(id).await {
            Ok(node) => {
                info!(node_id = %id, state = %node.state, "node terminated");
                node.state == NodeState::Terminated
            }
            Err(e) => {
                log_cloud_error(id, "terminate", &e);
                false
            }
        };

        let name = self.binding.alarm_name(id);
        match self.metrics.delete_alarm(&name).await {
            Ok(()) => debug!(node_id = %id, alarm = %name, "alarm deleted"),
            Err(e) if e.is_not_found() => {
                warn!(node_id = %id, alarm = %name, "alarm already absent on purge");
            }
            Err(e) => log_cloud_error(id, "delete alarm", &e),
        }

        terminated
    }

    async fn bind_alarm(&self, id: &NodeId) -> Result<(), CloudError> {
        let request = CpuAlarmRequest {
            name: self.binding.alarm_name(id),
            node_id: id.clone(),
            spec: self.alarm.clone(),
        };
        self.metrics.put_cpu_alarm(&request).await?;
        debug!(node_id = %id, alarm = %request.name, "alarm bound");
        Ok(())
    }

    async fn ensure_alarm(&self, id: &NodeId) -> Result<(), CloudError> {
        let name = self.binding.alarm_name(id);
        if self.metrics.get_by_name(&name).await?.is_some() {
            return Ok(());
        }
        info!(node_id = %id, alarm = %name, "alarm missing, recreating");
        self.bind_alarm(id).await
    }
}

fn log_cloud_error(id: &NodeId, operation: &str, e: &CloudError) {
    warn!(
        node_id = %id,
        operation,
        code = %e.code,
        message = %e.message,
        "cloud API call failed"
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use fleetwatch_cloud::{CloudOp, MetricsApi, SimulatedCloud};
    use fleetwatch_core::{AlarmState, SimulatedNode};

    const CONFIG: &str = r#"
node_limit = 2
application_port = 8080
alarm_name_prefix = "cpu-"
check_period = "60s"
endpoint_timeout = "1m"

[watched_tag]
key = "workload"
value = "api"

[template]
id = "lt-0123"

[proxy]
config_path = "/tmp/upstream.toml"
upstream = "api"
"#;

    fn config() -> WatchdogConfig {
        WatchdogConfig::from_toml_str(CONFIG).unwrap()
    }

    fn cloud_with(nodes: &[(&str, NodeState)]) -> SimulatedCloud {
        let seeds: Vec<SimulatedNode> = nodes
            .iter()
            .map(|(id, state)| SimulatedNode {
                id: NodeId::new(*id).unwrap(),
                state: *state,
                private_address: "10.9.0.1".to_string(),
            })
            .collect();
        SimulatedCloud::seeded(&config().watched_tag, &seeds)
    }

    fn manager(cloud: &SimulatedCloud) -> LifecycleManager<SimulatedCloud, SimulatedCloud> {
        LifecycleManager::new(cloud.clone(), cloud.clone(), &config())
    }

    fn id(raw: &str) -> NodeId {
        NodeId::new(raw).unwrap()
    }

    #[tokio::test]
    async fn create_launches_node_and_binds_alarm() {
        let cloud = SimulatedCloud::new();
        let mgr = manager(&cloud);

        let node = mgr.create().await.unwrap();
        assert_eq!(node.state, NodeState::Running);

        let alarms = cloud.list_by_name_prefix("cpu-").await.unwrap();
        assert_eq!(alarms.len(), 1);
        assert_eq!(alarms[0].name.as_str(), format!("cpu-{}", node.id));
        assert_eq!(alarms[0].bound_node_id, node.id);
    }

    #[tokio::test]
    async fn create_refuses_at_node_limit() {
        let cloud = cloud_with(&[("i-1", NodeState::Running), ("i-2", NodeState::Pending)]);
        let err = manager(&cloud).create().await.unwrap_err();
        assert!(matches!(
            err,
            LifecycleError::NodeLimitReached { limit: 2, current: 2 }
        ));
        assert_eq!(cloud.nodes().len(), 2);
    }

    #[tokio::test]
    async fn create_ignores_stopped_nodes_for_limit() {
        let cloud = cloud_with(&[("i-1", NodeState::Running), ("i-2", NodeState::Stopped)]);
        assert!(manager(&cloud).create().await.is_ok());
    }

    #[tokio::test]
    async fn create_propagates_launch_failure() {
        let cloud = SimulatedCloud::new();
        cloud.fail_next(
            CloudOp::Launch,
            CloudError::new("InvalidLaunchTemplateId.NotFound", "no such template"),
        );
        let err = manager(&cloud).create().await.unwrap_err();
        match err {
            LifecycleError::Launch(e) => assert_eq!(e.code, "InvalidLaunchTemplateId.NotFound"),
            other => panic!("unexpected error: {other}"),
        }
        assert!(cloud.alarms().is_empty());
    }

    #[tokio::test]
    async fn create_reports_node_left_without_alarm() {
        let cloud = SimulatedCloud::new();
        cloud.fail_next(CloudOp::PutAlarm, CloudError::new("Throttling", "rate exceeded"));
        let err = manager(&cloud).create().await.unwrap_err();
        match err {
            LifecycleError::AlarmBinding { node, source } => {
                assert_eq!(source.code, "Throttling");
                assert_eq!(cloud.node(&node.id).unwrap().state, NodeState::Running);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn create_reports_unconfirmed_node() {
        let cloud = SimulatedCloud::new();
        cloud.fail_next(CloudOp::Get, CloudError::new("RequestLimitExceeded", "slow down"));
        let err = manager(&cloud).create().await.unwrap_err();

        let launched = err.launched_node().cloned().unwrap();
        assert!(matches!(
            &err,
            LifecycleError::Unconfirmed { source, .. } if source.code == "RequestLimitExceeded"
        ));
        assert_eq!(cloud.node(&launched).unwrap().state, NodeState::Running);
        assert!(cloud.alarms().is_empty());
    }

    #[tokio::test]
    async fn refused_create_leaves_no_node_behind() {
        let cloud = cloud_with(&[("i-1", NodeState::Running), ("i-2", NodeState::Running)]);
        let err = manager(&cloud).create().await.unwrap_err();
        assert!(err.launched_node().is_none());
    }

    #[tokio::test]
    async fn start_recreates_missing_alarm() {
        let cloud = cloud_with(&[("i-1", NodeState::Stopped)]);
        let mgr = manager(&cloud);

        let node = mgr.start(&id("i-1")).await.unwrap();
        assert_eq!(node.state, NodeState::Running);

        let alarm = cloud.alarm(&mgr.binding().alarm_name(&id("i-1"))).unwrap();
        assert_eq!(alarm.bound_node_id, id("i-1"));
    }

    #[tokio::test]
    async fn start_keeps_existing_alarm() {
        let cloud = cloud_with(&[("i-1", NodeState::Stopped)]);
        let mgr = manager(&cloud);
        let name = mgr.binding().alarm_name(&id("i-1"));
        cloud
            .put_cpu_alarm(&CpuAlarmRequest {
                name: name.clone(),
                node_id: id("i-1"),
                spec: AlarmSpec::default(),
            })
            .await
            .unwrap();
        cloud.set_alarm_state(&name, AlarmState::Ok);

        mgr.start(&id("i-1")).await.unwrap();
        // Not overwritten: the state set above survives.
        assert_eq!(cloud.alarm(&name).unwrap().state, AlarmState::Ok);
    }

    #[tokio::test]
    async fn start_failure_is_swallowed() {
        let cloud = cloud_with(&[("i-1", NodeState::Stopped)]);
        cloud.fail_next(CloudOp::Start, CloudError::new("InternalError", "boom"));
        assert!(manager(&cloud).start(&id("i-1")).await.is_none());
        assert_eq!(cloud.node(&id("i-1")).unwrap().state, NodeState::Stopped);
    }

    #[tokio::test]
    async fn stop_keeps_alarm() {
        let cloud = SimulatedCloud::new();
        let mgr = manager(&cloud);
        let node = mgr.create().await.unwrap();

        assert!(mgr.stop(&node.id).await);
        assert_eq!(cloud.node(&node.id).unwrap().state, NodeState::Stopped);
        assert!(cloud.alarm(&mgr.binding().alarm_name(&node.id)).is_some());
    }

    #[tokio::test]
    async fn stop_failure_returns_false() {
        let cloud = cloud_with(&[("i-1", NodeState::Running)]);
        cloud.fail_next(CloudOp::Stop, CloudError::new("Unavailable", "try later"));
        assert!(!manager(&cloud).stop(&id("i-1")).await);
    }

    #[tokio::test]
    async fn purge_terminates_and_deletes_alarm() {
        let cloud = SimulatedCloud::new();
        let mgr = manager(&cloud);
        let node = mgr.create().await.unwrap();

        assert!(mgr.purge(&node.id).await);
        assert_eq!(cloud.node(&node.id).unwrap().state, NodeState::Terminated);
        assert!(cloud.alarms().is_empty());
    }

    #[tokio::test]
    async fn purge_without_alarm_is_safe() {
        let cloud = cloud_with(&[("i-1", NodeState::Stopped)]);
        assert!(manager(&cloud).purge(&id("i-1")).await);
        assert_eq!(cloud.node(&id("i-1")).unwrap().state, NodeState::Terminated);
    }

    #[tokio::test]
    async fn purge_is_idempotent() {
        let cloud = SimulatedCloud::new();
        let mgr = manager(&cloud);
        let node = mgr.create().await.unwrap();

        assert!(mgr.purge(&node.id).await);
        assert!(mgr.purge(&node.id).await);
        assert_eq!(cloud.node(&node.id).unwrap().state, NodeState::Terminated);
        assert!(cloud.alarms().is_empty());
    }

    #[tokio::test]
    async fn purge_unknown_node_returns_false() {
        let cloud = SimulatedCloud::new();
        assert!(!manager(&cloud).purge(&id("i-404")).await);
    }
}
