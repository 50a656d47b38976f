//! Transport abstraction over the serial-over-radio link.
//!
//! The protocol engine only needs a bidirectional byte stream to a remote
//! address; discovery, pairing and permissions live outside this crate.
//! [`TcpTransport`] connects to bridge devices that expose the radio link as
//! a TCP endpoint. [`MockTransport`] provides an in-memory link for tests.

use std::future::Future;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;

use crate::error::Result;

mod mock;

pub use mock::{MockTransport, RemoteDevice};

/// Opens a bidirectional byte stream to a remote address.
///
/// Implementations report connect failures as
/// [`VmcError::Transport`](crate::VmcError::Transport).
pub trait Transport: Send + Sync + 'static {
    /// The connected byte stream.
    type Stream: AsyncRead + AsyncWrite + Send + Unpin + 'static;

    /// Open a connection to the given address.
    fn connect(&self, address: &str) -> impl Future<Output = Result<Self::Stream>> + Send;
}

/// Transport for serial-over-radio bridges reachable over TCP.
#[derive(Debug, Default, Clone)]
pub struct TcpTransport;

impl TcpTransport {
    /// Create a new TCP transport.
    pub fn new() -> Self {
        Self
    }
}

impl Transport for TcpTransport {
    type Stream = TcpStream;

    async fn connect(&self, address: &str) -> Result<Self::Stream> {
        let stream = TcpStream::connect(address).await?;
        // Frames are 6 bytes; coalescing them behind Nagle only adds latency.
        stream.set_nodelay(true)?;
        Ok(stream)
    }
}
