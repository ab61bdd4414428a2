//! Proxy error types.

use std::path::PathBuf;

use thiserror::Error;

pub type ProxyResult<T> = Result<T, ProxyError>;

#[derive(Debug, Error)]
pub enum ProxyError {
    #[error("proxy config io error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse proxy config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("failed to serialize proxy config: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("upstream block {0:?} not found in proxy config")]
    MissingUpstream(String),

    #[error("proxy reload failed: {0}")]
    Reload(String),
}
