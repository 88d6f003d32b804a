//! TCP connector for the onboard telemetry server

use tokio::net::TcpStream;
use tracing::debug;

use super::{BoxedStream, Connector};
use crate::types::Endpoint;

/// Plain TCP connection to `host:port`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TcpConnector;

#[async_trait::async_trait]
impl Connector for TcpConnector {
    async fn connect(&self, endpoint: &Endpoint) -> std::io::Result<BoxedStream> {
        let stream = TcpStream::connect((endpoint.host.as_str(), endpoint.port)).await?;
        // Poll frames are tiny; don't let Nagle batch them.
        stream.set_nodelay(true)?;
        debug!(endpoint = %endpoint, local = ?stream.local_addr().ok(), "TCP connected");
        Ok(Box::new(stream))
    }
}
