//! In-memory transport for hardware-free testing.
//!
//! Each prepared connection is one half of a [`tokio::io::duplex`] pair; the
//! other half is handed to the test as a [`RemoteDevice`] that can script
//! the controller's side of the conversation: read command frames, reply
//! with response bytes (valid, corrupt or fragmented) and hang up.

use std::collections::VecDeque;
use std::io;
use std::sync::{Arc, Mutex};

use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream};

use super::Transport;
use crate::error::{Result, VmcError};
use crate::protocol::COMMAND_FRAME_SIZE;

/// Transport that serves pre-arranged in-memory connections.
///
/// `connect` hands out prepared duplex streams in FIFO order and fails with
/// a transport error once the queue is exhausted, which makes connect
/// failures scriptable too. Clones share the queue, so a test can keep a
/// clone to arrange reconnections after the client takes ownership.
#[derive(Clone)]
pub struct MockTransport {
    streams: Arc<Mutex<VecDeque<DuplexStream>>>,
}

impl MockTransport {
    /// Create an empty mock transport (every connect attempt fails).
    pub fn new() -> Self {
        Self {
            streams: Arc::new(Mutex::new(VecDeque::new())),
        }
    }

    /// Create a mock transport with one prepared connection and return the
    /// device side of the link.
    pub fn with_connection() -> (Self, RemoteDevice) {
        let transport = Self::new();
        let device = transport.add_connection();
        (transport, device)
    }

    /// Queue one more connection; returns the device side.
    pub fn add_connection(&self) -> RemoteDevice {
        self.add_connection_with_capacity(256)
    }

    /// Queue one more connection with a custom in-memory buffer capacity.
    ///
    /// A capacity smaller than a command frame makes client writes stall
    /// until the device reads, which lets tests script a wedged link.
    pub fn add_connection_with_capacity(&self, capacity: usize) -> RemoteDevice {
        let (local, remote) = tokio::io::duplex(capacity);
        self.streams
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push_back(local);
        RemoteDevice { stream: remote }
    }
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl Transport for MockTransport {
    type Stream = DuplexStream;

    async fn connect(&self, _address: &str) -> Result<Self::Stream> {
        self.streams
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .pop_front()
            .ok_or_else(|| {
                VmcError::Transport(io::Error::new(
                    io::ErrorKind::ConnectionRefused,
                    "no prepared mock connection",
                ))
            })
    }
}

/// The controller's side of a mock link.
pub struct RemoteDevice {
    stream: DuplexStream,
}

impl RemoteDevice {
    /// Read exactly one 6-byte command frame.
    pub async fn read_command(&mut self) -> io::Result<[u8; COMMAND_FRAME_SIZE]> {
        let mut frame = [0u8; COMMAND_FRAME_SIZE];
        self.stream.read_exact(&mut frame).await?;
        Ok(frame)
    }

    /// Send raw bytes toward the client, in one chunk.
    pub async fn send(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.stream.write_all(bytes).await
    }

    /// Close the link, as a dropped radio connection would.
    pub async fn hang_up(mut self) {
        let _ = self.stream.shutdown().await;
    }
}
