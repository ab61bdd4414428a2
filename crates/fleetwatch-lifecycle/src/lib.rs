//! fleetwatch-lifecycle: node transitions bound to alarm lifecycle.
//!
//! Every node the controller creates or starts carries a CPU alarm named
//! through the process's `AlarmBinding`. Stopping a node keeps its alarm
//! dormant for reuse; purging removes both.
//!
//! # Failure policy
//!
//! | operation | cloud error                         |
//! |-----------|-------------------------------------|
//! | `create`  | returned to the caller              |
//! | `start`   | logged, `None` returned             |
//! | `stop`    | logged, `false` returned            |
//! | `purge`   | logged; missing alarm is a warning  |

pub mod error;
pub mod manager;

pub use error::{LifecycleError, LifecycleResult};
pub use manager::LifecycleManager;
