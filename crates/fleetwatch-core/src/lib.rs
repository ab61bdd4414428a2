//! fleetwatch-core: shared types for the fleetwatch controller.
//!
//! Holds the data model every other crate speaks: nodes and their
//! lifecycle states, CPU alarms, the typed node ↔ alarm binding, the
//! per-pass fleet snapshot, and the immutable `WatchdogConfig`.
//!
//! # Alarm binding
//!
//! There is no local database. A node and its alarm are joined purely by
//! name: `alarm_name = prefix + node_id`. [`AlarmBinding`] owns the prefix
//! and performs both directions of the mapping; [`NodeId`] rejects any id
//! that could make the mapping non-invertible.

pub mod binding;
pub mod classify;
pub mod config;
pub mod error;
pub mod types;

pub use binding::{AlarmBinding, AlarmName, NodeId};
pub use classify::classify;
pub use config::{
    AlarmSpec, ConfigOverrides, HealthSettings, LaunchTemplate, ProxySettings, SimulatedNode,
    SimulationConfig, TemplateRef, WatchdogConfig, WatchedTag, parse_duration,
};
pub use error::{ConfigError, ConfigResult};
pub use types::*;
