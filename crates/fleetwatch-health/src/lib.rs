//! fleetwatch-health: readiness gating for newly started nodes.
//!
//! A node that was just created or started is not admitted to the proxy
//! upstream until its application answers `GET <path>` with a 2xx.
//!
//! # Gate loop
//!
//! ```text
//! deadline = now + endpoint_timeout
//! loop:
//!     http_probe(address, path, probe_timeout) → ProbeResult
//!     Healthy            → admit
//!     Unhealthy | Failed → sleep(retry_interval)   // fixed, 0 by default
//!     past deadline      → TimedOut (logged, node deferred to next pass)
//! ```

pub mod gate;
pub mod probe;

pub use gate::{HealthGate, HealthOutcome, HttpHealthGate, LocalHealthGate};
pub use probe::{ProbeFailure, ProbeResult, http_probe};
