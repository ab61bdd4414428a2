//! fleetwatch-cloud: the cloud capabilities the controller consumes.
//!
//! The controller never talks to a cloud SDK directly. It is generic over
//! two capability traits:
//!
//! - [`ComputeApi`]: list, launch, start, stop and terminate nodes
//! - [`MetricsApi`]: list, read, create and delete CPU alarms
//!
//! Both traits are declared once with `trait_variant`, producing a `Send`
//! variant for use on the tokio runtime and a local variant for
//! single-threaded callers.
//!
//! [`SimulatedCloud`] implements both in memory. It backs the daemon's dev
//! mode and every test that needs a fleet.

pub mod compute;
pub mod error;
pub mod metrics;
pub mod simulated;

pub use compute::{ComputeApi, LocalComputeApi};
pub use error::{CloudError, CloudResult};
pub use metrics::{CpuAlarmRequest, LocalMetricsApi, MetricsApi};
pub use simulated::{CloudOp, SimulatedCloud};
