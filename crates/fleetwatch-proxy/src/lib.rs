//! fleetwatch-proxy: keeps the reverse-proxy upstream in step with the fleet.
//!
//! # Components
//!
//! - **`store`**: upstream config file, plus `ConfigGuard`, which writes the
//!   config back on every exit path
//! - **`reload`**: runs the host's reload command after a write
//! - **`sync`**: `UpstreamSync`, the wholesale replace-then-reload reconciler

pub mod error;
pub mod reload;
pub mod store;
pub mod sync;

pub use error::{ProxyError, ProxyResult};
pub use reload::{CommandReloader, LocalReloader, Reloader};
pub use store::{ConfigGuard, ConfigStore, ProxyConfig, TomlFileStore, UpstreamBlock};
pub use sync::{SyncStats, UpstreamSync};
