//! # Connection Factory
//!
//! The invoker opens a fresh connection for every call and drops it when the call is over.
//! [`Connector`] is the seam that produces those connections: [`ChannelConnector`] dials real
//! endpoints, while tests can hand out an in-process server.
use async_trait::async_trait;
use tonic::transport::{Channel, Endpoint};
use tracing::debug;

#[derive(Debug, thiserror::Error)]
pub enum ConnectError {
    #[error("Invalid endpoint address '{address}': '{source}'")]
    InvalidAddress {
        address: String,
        source: tonic::transport::Error,
    },
    #[error("Failed to connect to '{address}': '{source}'")]
    Unreachable {
        address: String,
        source: tonic::transport::Error,
    },
}

/// Opens a transport to a resolved endpoint address.
#[async_trait]
pub trait Connector: Send + Sync {
    /// The transport handed to the gRPC client. Dropping it closes the connection.
    type Service: Send + 'static;

    async fn connect(&self, address: &str) -> Result<Self::Service, ConnectError>;
}

/// Dials endpoints over HTTP/2 with `tonic`'s [`Channel`].
#[derive(Debug, Clone, Copy, Default)]
pub struct ChannelConnector;

#[async_trait]
impl Connector for ChannelConnector {
    type Service = Channel;

    async fn connect(&self, address: &str) -> Result<Channel, ConnectError> {
        let endpoint = Endpoint::from_shared(address.to_string()).map_err(|source| {
            ConnectError::InvalidAddress {
                address: address.to_string(),
                source,
            }
        })?;

        let channel = endpoint
            .connect()
            .await
            .map_err(|source| ConnectError::Unreachable {
                address: address.to_string(),
                source,
            })?;

        debug!(address, "connected");
        Ok(channel)
    }
}
