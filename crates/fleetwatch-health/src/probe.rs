//! Single HTTP liveness probe.

use std::time::Duration;

use bytes::Bytes;
use http::header::{HOST, USER_AGENT};
use http::{Request, StatusCode};
use http_body_util::Empty;
use hyper_util::rt::TokioIo;
use tokio::net::TcpStream;
use tracing::debug;

/// Why a probe produced no HTTP status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeFailure {
    Connect,
    Handshake,
    Request,
    TimedOut,
}

/// Result of a single health probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeResult {
    Healthy { status: u16 },
    Unhealthy { status: u16 },
    Failed(ProbeFailure),
}

impl ProbeResult {
    pub fn is_healthy(&self) -> bool {
        matches!(self, ProbeResult::Healthy { .. })
    }
}

/// GET `http://{address}{path}` once, bounded by `timeout`. Any 2xx is healthy.
pub async fn http_probe(address: &str, path: &str, timeout: Duration) -> ProbeResult {
    let uri = format!("http://{address}{path}");

    let status = match tokio::time::timeout(timeout, fetch_status(address, &uri)).await {
        Ok(Ok(status)) => status,
        Ok(Err(failure)) => return ProbeResult::Failed(failure),
        Err(_) => {
            debug!(%uri, ?timeout, "health probe timed out");
            return ProbeResult::Failed(ProbeFailure::TimedOut);
        }
    };

    if status.is_success() {
        ProbeResult::Healthy {
            status: status.as_u16(),
        }
    } else {
        debug!(%status, %uri, "health endpoint answered non-2xx");
        ProbeResult::Unhealthy {
            status: status.as_u16(),
        }
    }
}

async fn fetch_status(address: &str, uri: &str) -> Result<StatusCode, ProbeFailure> {
    let stream = TcpStream::connect(address).await.map_err(|e| {
        debug!(error = %e, %uri, "health probe connection failed");
        ProbeFailure::Connect
    })?;

    let (mut sender, conn) = hyper::client::conn::http1::handshake(TokioIo::new(stream))
        .await
        .map_err(|e| {
            debug!(error = %e, %uri, "health probe handshake failed");
            ProbeFailure::Handshake
        })?;
    tokio::spawn(async move {
        if let Err(e) = conn.await {
            debug!(error = %e, "health probe connection closed with error");
        }
    });

    let request = Request::get(uri)
        .header(HOST, address)
        .header(USER_AGENT, concat!("fleetwatch/", env!("CARGO_PKG_VERSION")))
        .body(Empty::<Bytes>::new())
        .map_err(|e| {
            debug!(error = %e, %uri, "health probe request invalid");
            ProbeFailure::Request
        })?;

    let response = sender.send_request(request).await.map_err(|e| {
        debug!(error = %e, %uri, "health probe request failed");
        ProbeFailure::Request
    })?;
    Ok(response.status())
}
