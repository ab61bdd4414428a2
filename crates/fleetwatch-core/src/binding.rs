//! Typed node ↔ alarm binding.
//!
//! The compute API and the metrics API share no key except the alarm name,
//! which is built as `prefix + node_id`. Both halves are validated up front
//! so the mapping stays a bijection: the prefix is fixed per process, and
//! node ids are restricted to a charset that cannot smuggle in separators
//! or whitespace.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, ConfigResult};

const MAX_NODE_ID_LEN: usize = 64;
const MAX_PREFIX_LEN: usize = 200;

fn is_node_id_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-')
}

fn is_prefix_char(c: char) -> bool {
    is_node_id_char(c) || matches!(c, ':' | '/')
}

/// Cloud-assigned node identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct NodeId(String);

impl NodeId {
    /// Validate and wrap a raw node id.
    pub fn new(raw: impl Into<String>) -> ConfigResult<Self> {
        let raw = raw.into();
        if raw.is_empty() || raw.len() > MAX_NODE_ID_LEN || !raw.chars().all(is_node_id_char) {
            return Err(ConfigError::InvalidNodeId(raw));
        }
        Ok(Self(raw))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for NodeId {
    type Error = ConfigError;

    fn try_from(value: String) -> ConfigResult<Self> {
        Self::new(value)
    }
}

impl From<NodeId> for String {
    fn from(id: NodeId) -> Self {
        id.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Name of a metrics alarm.
///
/// Any string is a legal alarm name on the metrics side; only names produced
/// by an [`AlarmBinding`] map back to a node.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AlarmName(String);

impl AlarmName {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AlarmName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Bijective mapping between node ids and alarm names.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlarmBinding {
    prefix: String,
}

impl AlarmBinding {
    /// Build a binding for the given alarm name prefix.
    pub fn new(prefix: impl Into<String>) -> ConfigResult<Self> {
        let prefix = prefix.into();
        if prefix.is_empty() || prefix.len() > MAX_PREFIX_LEN || !prefix.chars().all(is_prefix_char)
        {
            return Err(ConfigError::InvalidAlarmPrefix(prefix));
        }
        Ok(Self { prefix })
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Alarm name bound to `node`.
    pub fn alarm_name(&self, node: &NodeId) -> AlarmName {
        AlarmName(format!("{}{}", self.prefix, node.as_str()))
    }

    /// Node bound to `name`, if the name was produced by this binding.
    pub fn node_id(&self, name: &AlarmName) -> Option<NodeId> {
        let suffix = name.as_str().strip_prefix(&self.prefix)?;
        NodeId::new(suffix).ok()
    }
}
