//! fleetwatch-autoscale: alarm-driven fleet scaling.
//!
//! Each pass reads the tagged fleet and its CPU alarms, takes at most one
//! corrective action, gates any newly started node on its health endpoint,
//! and rewrites the proxy upstream.
//!
//! # Scaling Algorithm
//!
//! ```text
//! overloaded = running nodes whose alarm is in ALARM
//!
//! if running == 0:
//!     StartNode(stopped[0]) or CreateNode       // bootstrap, alarms ignored
//! elif overloaded >= running:
//!     StartNode(stopped[0]) or CreateNode       // create capped at node_limit
//! elif running - overloaded > 1:
//!     StopNode(running[last])
//! else:
//!     NoOp
//! ```
//!
//! One idle node of slack is tolerated before shrinking, so load hovering
//! around a single alarm's threshold does not thrash the fleet.

pub mod decision;
pub mod reconciler;

pub use decision::{Action, ScaleDecider};
pub use reconciler::{ActionOutcome, PassReport, Plan, ReconcileError, Reconciler};
