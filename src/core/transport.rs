//! Fire-and-forget delivery of reports.
//!
//! One report is one UDP datagram of UTF-8 JSON. Nothing is awaited from
//! the collector, nothing is retried, and payloads larger than a datagram
//! are not split.

use std::net::SocketAddr;

use thiserror::Error;
use tokio::net::{lookup_host, UdpSocket};
use tracing::trace;

use super::report::Report;
use crate::config::agent::CollectorEndpoint;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Failed to encode report: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Failed to resolve collector {endpoint}: {reason}")]
    Resolve { endpoint: String, reason: String },

    #[error("Failed to open UDP socket: {0}")]
    Bind(#[source] std::io::Error),

    #[error("Failed to send datagram to {endpoint}: {source}")]
    Send {
        endpoint: String,
        #[source]
        source: std::io::Error,
    },
}

/// Anything that can ship a finished report somewhere.
#[async_trait::async_trait]
pub trait Transport: Send + Sync {
    /// Hands the report to the network layer and returns the bytes sent.
    async fn send(&self, report: &Report) -> Result<usize, TransportError>;
}

/// Sends each report from a fresh ephemeral IPv4 socket that is dropped
/// right after the datagram leaves.
#[derive(Debug, Clone)]
pub struct UdpTransport {
    endpoint: CollectorEndpoint,
}

impl UdpTransport {
    pub fn new(endpoint: CollectorEndpoint) -> Self {
        Self { endpoint }
    }

    /// First IPv4 address of the collector; the sending socket is IPv4 only.
    async fn resolve(&self) -> Result<SocketAddr, TransportError> {
        let resolve_err = |reason: String| TransportError::Resolve {
            endpoint: self.endpoint.to_string(),
            reason,
        };

        lookup_host((self.endpoint.host.as_str(), self.endpoint.port))
            .await
            .map_err(|e| resolve_err(e.to_string()))?
            .find(SocketAddr::is_ipv4)
            .ok_or_else(|| resolve_err("no IPv4 address".to_string()))
    }
}

#[async_trait::async_trait]
impl Transport for UdpTransport {
    async fn send(&self, report: &Report) -> Result<usize, TransportError> {
        let payload = report.to_json()?;
        let target = self.resolve().await?;

        let socket = UdpSocket::bind(("0.0.0.0", 0))
            .await
            .map_err(TransportError::Bind)?;

        let sent = socket
            .send_to(&payload, target)
            .await
            .map_err(|source| TransportError::Send {
                endpoint: self.endpoint.to_string(),
                source,
            })?;

        trace!(bytes = sent, endpoint = %self.endpoint, "Datagram handed off");
        Ok(sent)
    }
}
