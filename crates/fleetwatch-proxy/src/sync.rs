//! Upstream synchronization: bridges the live fleet to the proxy config.
//!
//! `UpstreamSync` replaces the upstream's member list wholesale with one
//! `host:port` entry per running node, persists the config, then reloads
//! the proxy. Member order carries no meaning, so there is no diffing.

use tracing::{info, warn};

use fleetwatch_core::Node;

use crate::error::ProxyResult;
use crate::reload::Reloader;
use crate::store::{ConfigGuard, ConfigStore};

/// Sync statistics.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SyncStats {
    /// Members present before the rewrite.
    pub removed: usize,
    /// Members written.
    pub members: Vec<String>,
    /// Whether the reload command succeeded.
    pub reloaded: bool,
}

/// Rewrites one upstream block and reloads the proxy.
pub struct UpstreamSync<S, R> {
    store: S,
    reloader: R,
    upstream: String,
    port: u16,
}

impl<S: ConfigStore, R: Reloader> UpstreamSync<S, R> {
    pub fn new(store: S, reloader: R, upstream: impl Into<String>, port: u16) -> Self {
        Self {
            store,
            reloader,
            upstream: upstream.into(),
            port,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Application port appended to every member address.
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Verify the configured upstream block exists.
    pub fn check(&self) -> ProxyResult<()> {
        self.store.load()?.upstream(&self.upstream).map(|_| ())
    }

    /// Current members of the upstream block.
    pub fn members(&self) -> ProxyResult<Vec<String>> {
        Ok(self.store.load()?.upstream(&self.upstream)?.members().to_vec())
    }

    /// Make the upstream exactly the set of `running` nodes.
    ///
    /// Load and persist errors are returned. A failed reload is logged and
    /// reported through `SyncStats::reloaded`.
    pub async fn reconcile(&self, running: &[Node]) -> ProxyResult<SyncStats> {
        let mut stats = SyncStats::default();

        {
            let mut guard = ConfigGuard::acquire(&self.store)?;
            let block = guard.upstream_mut(&self.upstream)?;

            let existing = block.members().to_vec();
            for member in &existing {
                block.remove_member(member);
            }
            stats.removed = existing.len();

            for node in running {
                if node.private_address.is_empty() {
                    warn!(node_id = %node.id, "running node has no private address, skipped");
                    continue;
                }
                let member = node.upstream_entry(self.port).to_string();
                if block.add_member(&member) {
                    stats.members.push(member);
                }
            }

            guard.release()?;
        }

        match self.reloader.reload().await {
            Ok(()) => stats.reloaded = true,
            Err(e) => warn!(error = %e, "proxy reload failed, config persisted"),
        }

        info!(
            upstream = %self.upstream,
            members = stats.members.len(),
            removed = stats.removed,
            reloaded = stats.reloaded,
            "upstream sync complete"
        );

        Ok(stats)
    }
}
