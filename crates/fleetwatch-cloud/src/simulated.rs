//! In-memory cloud implementing both capability traits.
//!
//! Node transitions complete instantly. Alarm states never change on their
//! own; tests and dev-mode operators drive them with
//! [`SimulatedCloud::set_alarm_state`]. Any call can be made to fail once
//! with [`SimulatedCloud::fail_next`].

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};

use tracing::debug;

use fleetwatch_core::{
    Alarm, AlarmName, AlarmState, LaunchTemplate, Node, NodeId, NodeState, SimulatedNode,
    TemplateRef, WatchedTag,
};

use crate::compute::ComputeApi;
use crate::error::{CloudError, CloudResult};
use crate::metrics::{CpuAlarmRequest, MetricsApi};

/// Cloud operation, used to target injected failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CloudOp {
    ListByTag,
    Get,
    Launch,
    Start,
    Stop,
    Terminate,
    ListAlarms,
    GetAlarm,
    PutAlarm,
    DeleteAlarm,
}

struct SimNode {
    node: Node,
    tag: WatchedTag,
}

#[derive(Default)]
struct SimState {
    /// Insertion order doubles as listing order.
    nodes: Vec<SimNode>,
    alarms: BTreeMap<AlarmName, Alarm>,
    failures: HashMap<CloudOp, CloudError>,
    /// Launch refuses once this many non-terminated nodes exist.
    capacity: Option<usize>,
    next_id: u64,
}

impl SimState {
    fn take_failure(&mut self, op: CloudOp) -> CloudResult<()> {
        match self.failures.remove(&op) {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn node_mut(&mut self, id: &NodeId) -> CloudResult<&mut Node> {
        self.nodes
            .iter_mut()
            .map(|s| &mut s.node)
            .find(|n| &n.id == id)
            .ok_or_else(|| CloudError::not_found(format!("node {id} does not exist")))
    }

    fn allocate(&mut self) -> CloudResult<(NodeId, String)> {
        self.next_id += 1;
        let n = self.next_id;
        let id = NodeId::new(format!("i-{n:017x}"))
            .map_err(|e| CloudError::new("InternalError", e.to_string()))?;
        let address = format!("10.0.{}.{}", (n / 250) % 250, n % 250 + 1);
        Ok((id, address))
    }
}

/// Shared-handle in-memory cloud. Clones observe the same state.
#[derive(Clone, Default)]
pub struct SimulatedCloud {
    inner: Arc<Mutex<SimState>>,
}

impl SimulatedCloud {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a cloud pre-populated with `nodes`, all carrying `tag`.
    pub fn seeded(tag: &WatchedTag, nodes: &[SimulatedNode]) -> Self {
        let cloud = Self::new();
        for seed in nodes {
            cloud.insert_node(
                tag,
                Node {
                    id: seed.id.clone(),
                    state: seed.state,
                    private_address: seed.private_address.clone(),
                },
            );
        }
        cloud
    }

    fn lock(&self) -> MutexGuard<'_, SimState> {
        self.inner.lock().expect("simulated cloud lock")
    }

    /// Add a node directly, bypassing launch.
    pub fn insert_node(&self, tag: &WatchedTag, node: Node) {
        self.lock().nodes.push(SimNode {
            node,
            tag: tag.clone(),
        });
    }

    /// Make the next call of `op` fail with `error`.
    pub fn fail_next(&self, op: CloudOp, error: CloudError) {
        self.lock().failures.insert(op, error);
    }

    /// Limit how many live nodes launch will allow.
    pub fn set_capacity(&self, capacity: usize) {
        self.lock().capacity = Some(capacity);
    }

    /// Set the state of an existing alarm. Returns false if it does not exist.
    pub fn set_alarm_state(&self, name: &AlarmName, state: AlarmState) -> bool {
        match self.lock().alarms.get_mut(name) {
            Some(alarm) => {
                alarm.state = state;
                true
            }
            None => false,
        }
    }

    /// Set the state of every alarm.
    pub fn set_all_alarm_states(&self, state: AlarmState) {
        for alarm in self.lock().alarms.values_mut() {
            alarm.state = state;
        }
    }

    /// Current view of a node, regardless of tag.
    pub fn node(&self, id: &NodeId) -> Option<Node> {
        self.lock()
            .nodes
            .iter()
            .find(|s| &s.node.id == id)
            .map(|s| s.node.clone())
    }

    /// All nodes, regardless of tag, in insertion order.
    pub fn nodes(&self) -> Vec<Node> {
        self.lock().nodes.iter().map(|s| s.node.clone()).collect()
    }

    /// All alarms, ordered by name.
    pub fn alarms(&self) -> Vec<Alarm> {
        self.lock().alarms.values().cloned().collect()
    }

    pub fn alarm(&self, name: &AlarmName) -> Option<Alarm> {
        self.lock().alarms.get(name).cloned()
    }

    fn transition(
        &self,
        op: CloudOp,
        id: &NodeId,
        allowed_from: &[NodeState],
        to: NodeState,
    ) -> CloudResult<Node> {
        let mut state = self.lock();
        state.take_failure(op)?;
        let node = state.node_mut(id)?;
        if node.state == to {
            return Ok(node.clone());
        }
        if !allowed_from.contains(&node.state) {
            return Err(CloudError::new(
                "IncorrectInstanceState",
                format!("node {id} is {} and cannot become {to}", node.state),
            ));
        }
        node.state = to;
        debug!(node_id = %id, state = %to, "simulated node transition");
        Ok(node.clone())
    }
}

impl ComputeApi for SimulatedCloud {
    async fn list_by_tag(&self, tag: &WatchedTag) -> CloudResult<Vec<Node>> {
        let mut state = self.lock();
        state.take_failure(CloudOp::ListByTag)?;
        Ok(state
            .nodes
            .iter()
            .filter(|s| &s.tag == tag)
            .map(|s| s.node.clone())
            .collect())
    }

    async fn get(&self, id: &NodeId) -> CloudResult<Node> {
        let mut state = self.lock();
        state.take_failure(CloudOp::Get)?;
        state.node_mut(id).map(|n| n.clone())
    }

    async fn launch_from_template(
        &self,
        template: &LaunchTemplate,
        tag: &WatchedTag,
    ) -> CloudResult<Node> {
        let mut state = self.lock();
        state.take_failure(CloudOp::Launch)?;

        let reference = match &template.reference {
            TemplateRef::Id(id) => id,
            TemplateRef::Name(name) => name,
        };
        if reference.trim().is_empty() {
            return Err(CloudError::new(
                "InvalidLaunchTemplate",
                "launch template reference is empty",
            ));
        }

        if let Some(capacity) = state.capacity {
            let live = state
                .nodes
                .iter()
                .filter(|s| s.node.state != NodeState::Terminated)
                .count();
            if live >= capacity {
                return Err(CloudError::new(
                    "InsufficientInstanceCapacity",
                    "no capacity available for the requested template",
                ));
            }
        }

        let (id, private_address) = state.allocate()?;
        let node = Node {
            id,
            state: NodeState::Running,
            private_address,
        };
        state.nodes.push(SimNode {
            node: node.clone(),
            tag: tag.clone(),
        });
        debug!(node_id = %node.id, template = %reference, "simulated node launched");
        Ok(node)
    }

    async fn start(&self, id: &NodeId) -> CloudResult<Node> {
        self.transition(CloudOp::Start, id, &[NodeState::Stopped], NodeState::Running)
    }

    async fn stop(&self, id: &NodeId) -> CloudResult<Node> {
        self.transition(CloudOp::Stop, id, &[NodeState::Running], NodeState::Stopped)
    }

    async fn terminate(&self, id: &NodeId) -> CloudResult<Node> {
        self.transition(
            CloudOp::Terminate,
            id,
            &[
                NodeState::Pending,
                NodeState::Running,
                NodeState::Stopped,
                NodeState::Unknown,
            ],
            NodeState::Terminated,
        )
    }
}

impl MetricsApi for SimulatedCloud {
    async fn list_by_name_prefix(&self, prefix: &str) -> CloudResult<Vec<Alarm>> {
        let mut state = self.lock();
        state.take_failure(CloudOp::ListAlarms)?;
        Ok(state
            .alarms
            .values()
            .filter(|a| a.name.as_str().starts_with(prefix))
            .cloned()
            .collect())
    }

    async fn get_by_name(&self, name: &AlarmName) -> CloudResult<Option<Alarm>> {
        let mut state = self.lock();
        state.take_failure(CloudOp::GetAlarm)?;
        Ok(state.alarms.get(name).cloned())
    }

    async fn put_cpu_alarm(&self, request: &CpuAlarmRequest) -> CloudResult<()> {
        let mut state = self.lock();
        state.take_failure(CloudOp::PutAlarm)?;
        state.alarms.insert(
            request.name.clone(),
            Alarm {
                name: request.name.clone(),
                bound_node_id: request.node_id.clone(),
                state: AlarmState::InsufficientData,
            },
        );
        debug!(alarm = %request.name, node_id = %request.node_id, "simulated alarm stored");
        Ok(())
    }

    async fn delete_alarm(&self, name: &AlarmName) -> CloudResult<()> {
        let mut state = self.lock();
        state.take_failure(CloudOp::DeleteAlarm)?;
        match state.alarms.remove(name) {
            Some(_) => Ok(()),
            None => Err(CloudError::not_found(format!("alarm {name} does not exist"))),
        }
    }
}
