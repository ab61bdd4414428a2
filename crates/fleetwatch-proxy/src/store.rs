//! Proxy config store and scoped write guard.
//!
//! The controller owns the upstream config file exclusively. Writes go
//! through [`ConfigGuard`]: load, mutate in memory, and persist when the
//! guard is released or dropped, whichever comes first.

use std::collections::BTreeMap;
use std::ops::{Deref, DerefMut};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use crate::error::{ProxyError, ProxyResult};

/// One named upstream: the set of backends the proxy balances across.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UpstreamBlock {
    #[serde(default)]
    members: Vec<String>,
    /// Settings this controller does not manage, kept as found.
    #[serde(flatten)]
    extra: toml::Table,
}

impl UpstreamBlock {
    pub fn members(&self) -> &[String] {
        &self.members
    }

    /// Add `member` unless already present. Returns whether it was added.
    pub fn add_member(&mut self, member: &str) -> bool {
        if self.members.iter().any(|m| m == member) {
            return false;
        }
        self.members.push(member.to_string());
        true
    }

    /// Remove `member`. Returns whether it was present.
    pub fn remove_member(&mut self, member: &str) -> bool {
        let before = self.members.len();
        self.members.retain(|m| m != member);
        self.members.len() != before
    }
}

/// In-memory proxy configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProxyConfig {
    #[serde(default)]
    upstreams: BTreeMap<String, UpstreamBlock>,
    #[serde(flatten)]
    extra: toml::Table,
}

impl ProxyConfig {
    pub fn from_toml_str(content: &str) -> ProxyResult<Self> {
        Ok(toml::from_str(content)?)
    }

    pub fn to_toml_string(&self) -> ProxyResult<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    pub fn upstream(&self, name: &str) -> ProxyResult<&UpstreamBlock> {
        self.upstreams
            .get(name)
            .ok_or_else(|| ProxyError::MissingUpstream(name.to_string()))
    }

    pub fn upstream_mut(&mut self, name: &str) -> ProxyResult<&mut UpstreamBlock> {
        self.upstreams
            .get_mut(name)
            .ok_or_else(|| ProxyError::MissingUpstream(name.to_string()))
    }

    /// Insert an empty upstream block if none exists under `name`.
    pub fn ensure_upstream(&mut self, name: &str) -> &mut UpstreamBlock {
        self.upstreams.entry(name.to_string()).or_default()
    }
}

/// Where the proxy configuration lives.
pub trait ConfigStore {
    fn load(&self) -> ProxyResult<ProxyConfig>;

    fn dump(&self, config: &ProxyConfig) -> ProxyResult<()>;
}

/// TOML file on local disk. Writes replace the file atomically.
#[derive(Debug, Clone)]
pub struct TomlFileStore {
    path: PathBuf,
}

impl TomlFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn io_error(&self, source: std::io::Error) -> ProxyError {
        ProxyError::Io {
            path: self.path.clone(),
            source,
        }
    }
}

impl ConfigStore for TomlFileStore {
    fn load(&self) -> ProxyResult<ProxyConfig> {
        let content = std::fs::read_to_string(&self.path).map_err(|e| self.io_error(e))?;
        ProxyConfig::from_toml_str(&content)
    }

    fn dump(&self, config: &ProxyConfig) -> ProxyResult<()> {
        let content = config.to_toml_string()?;
        let tmp = self.path.with_extension("tmp");
        std::fs::write(&tmp, content).map_err(|e| self.io_error(e))?;
        std::fs::rename(&tmp, &self.path).map_err(|e| self.io_error(e))?;
        debug!(path = ?self.path, "proxy config written");
        Ok(())
    }
}

/// Loaded config that is written back when released or dropped.
pub struct ConfigGuard<'s, S: ConfigStore> {
    store: &'s S,
    config: ProxyConfig,
    persisted: bool,
}

impl<'s, S: ConfigStore> ConfigGuard<'s, S> {
    pub fn acquire(store: &'s S) -> ProxyResult<Self> {
        let config = store.load()?;
        Ok(Self {
            store,
            config,
            persisted: false,
        })
    }

    /// Persist now and report the outcome.
    pub fn release(mut self) -> ProxyResult<()> {
        self.persisted = true;
        self.store.dump(&self.config)
    }
}

impl<S: ConfigStore> Deref for ConfigGuard<'_, S> {
    type Target = ProxyConfig;

    fn deref(&self) -> &ProxyConfig {
        &self.config
    }
}

impl<S: ConfigStore> DerefMut for ConfigGuard<'_, S> {
    fn deref_mut(&mut self) -> &mut ProxyConfig {
        &mut self.config
    }
}

impl<S: ConfigStore> Drop for ConfigGuard<'_, S> {
    fn drop(&mut self) {
        if self.persisted {
            return;
        }
        if let Err(e) = self.store.dump(&self.config) {
            error!(error = %e, "failed to persist proxy config on early exit");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
listen = 80

[upstreams.api]
members = ["10.0.0.1:8080", "10.0.0.2:8080"]
strategy = "least_conn"

[upstreams.static]
members = ["10.0.9.9:80"]
"#;

    fn temp_store(content: &str) -> (tempfile::TempDir, TomlFileStore) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("upstream.toml");
        std::fs::write(&path, content).unwrap();
        (dir, TomlFileStore::new(path))
    }

    #[test]
    fn parses_upstreams_and_keeps_unknown_keys() {
        let config = ProxyConfig::from_toml_str(SAMPLE).unwrap();
        assert_eq!(config.upstream("api").unwrap().members().len(), 2);

        let text = config.to_toml_string().unwrap();
        assert!(text.contains("least_conn"));
        assert!(text.contains("listen = 80"));
        assert!(text.contains("10.0.9.9:80"));
    }

    #[test]
    fn missing_upstream_is_an_error() {
        let mut config = ProxyConfig::from_toml_str(SAMPLE).unwrap();
        assert!(matches!(
            config.upstream_mut("web"),
            Err(ProxyError::MissingUpstream(name)) if name == "web"
        ));
    }

    #[test]
    fn add_member_deduplicates() {
        let mut block = UpstreamBlock::default();
        assert!(block.add_member("10.0.0.1:8080"));
        assert!(!block.add_member("10.0.0.1:8080"));
        assert_eq!(block.members(), ["10.0.0.1:8080"]);
        assert!(block.remove_member("10.0.0.1:8080"));
        assert!(!block.remove_member("10.0.0.1:8080"));
    }

    #[test]
    fn guard_release_persists_changes() {
        let (_dir, store) = temp_store(SAMPLE);
        let mut guard = ConfigGuard::acquire(&store).unwrap();
        guard.upstream_mut("api").unwrap().add_member("10.0.0.3:8080");
        guard.release().unwrap();

        let reloaded = store.load().unwrap();
        assert_eq!(reloaded.upstream("api").unwrap().members().len(), 3);
    }

    #[test]
    fn guard_persists_on_early_exit() {
        let (_dir, store) = temp_store(SAMPLE);

        let result: ProxyResult<()> = (|| {
            let mut guard = ConfigGuard::acquire(&store)?;
            guard.upstream_mut("api")?.remove_member("10.0.0.1:8080");
            guard.upstream_mut("missing")?;
            guard.release()
        })();
        assert!(matches!(result, Err(ProxyError::MissingUpstream(_))));

        let reloaded = store.load().unwrap();
        assert_eq!(reloaded.upstream("api").unwrap().members(), ["10.0.0.2:8080"]);
    }

    #[test]
    fn load_missing_file_is_io_error() {
        let store = TomlFileStore::new("/nonexistent/fleetwatch/upstream.toml");
        assert!(matches!(store.load(), Err(ProxyError::Io { .. })));
    }

    #[test]
    fn dump_leaves_no_temp_file() {
        let (dir, store) = temp_store(SAMPLE);
        let config = store.load().unwrap();
        store.dump(&config).unwrap();
        let entries: Vec<_> = std::fs::read_dir(dir.path()).unwrap().collect();
        assert_eq!(entries.len(), 1);
    }
}
