//! Proxy reload.

use tokio::process::Command;
use tracing::debug;

use crate::error::{ProxyError, ProxyResult};

/// Makes the running proxy pick up the persisted config.
#[trait_variant::make(Reloader: Send)]
pub trait LocalReloader {
    async fn reload(&self) -> ProxyResult<()>;
}

/// Runs a host command (e.g. `systemctl reload nginx`) and checks its exit code.
#[derive(Debug, Clone)]
pub struct CommandReloader {
    argv: Vec<String>,
}

impl CommandReloader {
    pub fn new(argv: Vec<String>) -> Self {
        Self { argv }
    }
}

impl Reloader for CommandReloader {
    async fn reload(&self) -> ProxyResult<()> {
        let Some((program, args)) = self.argv.split_first() else {
            return Err(ProxyError::Reload("empty reload command".to_string()));
        };

        let output = Command::new(program)
            .args(args)
            .output()
            .await
            .map_err(|e| ProxyError::Reload(format!("failed to run {program}: {e}")))?;

        if output.status.success() {
            debug!(command = %self.argv.join(" "), "proxy reloaded");
            return Ok(());
        }

        let stderr = String::from_utf8_lossy(&output.stderr);
        Err(ProxyError::Reload(format!(
            "{} exited with {}: {}",
            self.argv.join(" "),
            output
                .status
                .code()
                .map_or_else(|| "signal".to_string(), |c| c.to_string()),
            stderr.trim()
        )))
    }
}
