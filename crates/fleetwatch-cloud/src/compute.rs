//! Compute API capability.

use fleetwatch_core::{LaunchTemplate, Node, NodeId, WatchedTag};

use crate::error::CloudResult;

/// Node primitives of the compute API.
///
/// Every mutating call blocks until the node reaches the call's terminal
/// state (running, stopped or terminated) and returns the node as observed
/// at that point.
#[trait_variant::make(ComputeApi: Send)]
pub trait LocalComputeApi {
    /// All nodes carrying `tag`, in the provider's listing order.
    async fn list_by_tag(&self, tag: &WatchedTag) -> CloudResult<Vec<Node>>;

    async fn get(&self, id: &NodeId) -> CloudResult<Node>;

    /// Launch one node from `template`, tagged with `tag`.
    async fn launch_from_template(
        &self,
        template: &LaunchTemplate,
        tag: &WatchedTag,
    ) -> CloudResult<Node>;

    async fn start(&self, id: &NodeId) -> CloudResult<Node>;

    async fn stop(&self, id: &NodeId) -> CloudResult<Node>;

    async fn terminate(&self, id: &NodeId) -> CloudResult<Node>;
}
