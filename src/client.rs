//! Client runtime: command/response correlation and connection lifecycle.
//!
//! The client enforces the protocol's single-flight rule: at most one
//! command is ever awaiting a response. [`VmcClient::send`] suspends the
//! caller and resolves exactly once with the response or exactly one error,
//! whichever of the read loop, the deadline timer or a connection teardown
//! gets there first.
//!
//! # Example
//!
//! ```ignore
//! use vmclink::{Command, TcpTransport, VmcClient};
//!
//! #[tokio::main]
//! async fn main() -> vmclink::Result<()> {
//!     let client = VmcClient::new(TcpTransport::new());
//!     client.connect("192.168.4.1:9100").await?;
//!
//!     let response = client
//!         .send(Command::Dispense {
//!             driver_board: 0,
//!             slot: 12,
//!             use_drop_sensor: true,
//!         })
//!         .await?;
//!
//!     if response.is_success() && response.has_product_delivery() {
//!         println!("product dropped");
//!     }
//!     Ok(())
//! }
//! ```

use std::io;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::io::{AsyncReadExt, AsyncWriteExt, ReadHalf, WriteHalf};
use tokio::sync::{broadcast, oneshot};
use tokio::task::JoinHandle;

use crate::command::Command;
use crate::error::{Result, VmcError};
use crate::protocol::{FrameBuffer, Response, DEFAULT_RESYNC_WARN_THRESHOLD};
use crate::transport::Transport;

/// Default read buffer size. Inbound traffic is 5-byte frames plus noise;
/// a small buffer is plenty.
pub const DEFAULT_READ_BUFFER_SIZE: usize = 256;

/// Default capacity of the response and disconnect broadcast channels.
pub const DEFAULT_BROADCAST_CAPACITY: usize = 32;

/// Configuration for the client runtime.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Size of the transport read buffer.
    pub read_buffer_size: usize,
    /// Capacity of the broadcast channels (lagging subscribers skip ahead).
    pub broadcast_capacity: usize,
    /// Run of discarded bytes after which the framer logs a warning.
    pub resync_warn_threshold: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            read_buffer_size: DEFAULT_READ_BUFFER_SIZE,
            broadcast_capacity: DEFAULT_BROADCAST_CAPACITY,
            resync_warn_threshold: DEFAULT_RESYNC_WARN_THRESHOLD,
        }
    }
}

/// Frame accounting for the current client, for diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinkStats {
    /// Checksum-valid frames accepted.
    pub frames_emitted: u64,
    /// Bytes discarded during resynchronization.
    pub bytes_discarded: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ConnectionState {
    Disconnected,
    Connected,
}

/// The one outstanding request, if any. Taking it out of its `Option` under
/// the shared lock is what makes resolution exactly-once: there is no path
/// to the oneshot sender except through that take.
struct Pending {
    seq: u64,
    tx: oneshot::Sender<Result<Response>>,
}

/// Receive-side state. The frame buffer and the pending request are not
/// independently consistent, so they live behind a single lock, acquired
/// together and never held across an await.
struct Shared {
    state: ConnectionState,
    /// Bumped on every connect/disconnect; lets a stale read task recognize
    /// that it no longer owns the connection.
    generation: u64,
    pending: Option<Pending>,
    framer: FrameBuffer,
}

struct Inner<T: Transport> {
    transport: T,
    shared: Mutex<Shared>,
    writer: tokio::sync::Mutex<Option<WriteHalf<T::Stream>>>,
    read_task: Mutex<Option<JoinHandle<()>>>,
    responses: broadcast::Sender<Response>,
    disconnects: broadcast::Sender<()>,
    next_seq: AtomicU64,
    config: ClientConfig,
}

/// Client driving one vending-machine controller over a [`Transport`].
///
/// Cheap to clone; all clones share the same connection and single-flight
/// slot.
pub struct VmcClient<T: Transport> {
    inner: Arc<Inner<T>>,
}

impl<T: Transport> Clone for VmcClient<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: Transport> VmcClient<T> {
    /// Create a client with default configuration.
    pub fn new(transport: T) -> Self {
        Self::with_config(transport, ClientConfig::default())
    }

    /// Create a client with custom configuration.
    pub fn with_config(transport: T, config: ClientConfig) -> Self {
        let (responses, _) = broadcast::channel(config.broadcast_capacity);
        let (disconnects, _) = broadcast::channel(config.broadcast_capacity);
        Self {
            inner: Arc::new(Inner {
                transport,
                shared: Mutex::new(Shared {
                    state: ConnectionState::Disconnected,
                    generation: 0,
                    pending: None,
                    framer: FrameBuffer::with_warn_threshold(config.resync_warn_threshold),
                }),
                writer: tokio::sync::Mutex::new(None),
                read_task: Mutex::new(None),
                responses,
                disconnects,
                next_seq: AtomicU64::new(0),
                config,
            }),
        }
    }

    /// Connect to the controller at the given address.
    ///
    /// Any existing connection is torn down first, so `connect` is safe to
    /// call repeatedly. On success a background read task starts feeding
    /// inbound bytes through the frame buffer.
    pub async fn connect(&self, address: &str) -> Result<()> {
        self.disconnect().await;

        let stream = self.inner.transport.connect(address).await?;
        let (reader, writer) = tokio::io::split(stream);

        *self.inner.writer.lock().await = Some(writer);

        let generation = {
            let mut shared = self.inner.lock_shared();
            shared.generation += 1;
            shared.state = ConnectionState::Connected;
            shared.framer.clear();
            shared.generation
        };

        let inner = Arc::clone(&self.inner);
        let handle = tokio::spawn(read_loop(inner, reader, generation));
        *lock_recovering(&self.inner.read_task) = Some(handle);

        tracing::debug!(address, "connected");
        Ok(())
    }

    /// Tear down the connection.
    ///
    /// Safe to call at any time, including with no active connection and
    /// concurrently with an in-flight command: a pending request is resolved
    /// with [`VmcError::ConnectionLost`] before this returns. A deliberate
    /// disconnect does not emit on the disconnect notification stream.
    pub async fn disconnect(&self) {
        let task = lock_recovering(&self.inner.read_task).take();

        let pending = {
            let mut shared = self.inner.lock_shared();
            shared.generation += 1;
            shared.state = ConnectionState::Disconnected;
            shared.framer.clear();
            shared.pending.take()
        };
        if let Some(pending) = pending {
            let _ = pending.tx.send(Err(VmcError::ConnectionLost));
        }

        if let Some(mut writer) = self.inner.writer.lock().await.take() {
            let _ = writer.shutdown().await;
        }
        if let Some(task) = task {
            task.abort();
        }
    }

    /// Send a command and wait for its response.
    ///
    /// Terminates in exactly one outcome:
    /// - `Ok(response)`: a checksum-valid frame arrived in time;
    /// - [`VmcError::Validation`]: bad parameters, nothing transmitted;
    /// - [`VmcError::Busy`]: another command is in flight (synchronous,
    ///   no state change, the original command is undisturbed);
    /// - [`VmcError::NotConnected`]: no active connection;
    /// - [`VmcError::Transport`]: the frame could not be written;
    /// - [`VmcError::Timeout`]: the deadline elapsed;
    /// - [`VmcError::ConnectionLost`]: the link closed while waiting.
    ///
    /// Once the frame is written the controller may act on the command even
    /// if the local side stops waiting; there is no cancel-in-flight.
    pub async fn send(&self, command: Command) -> Result<Response> {
        let frame = command.encode()?;
        let timeout = command.response_timeout();
        let seq = self.inner.next_seq.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();

        {
            let mut shared = self.inner.lock_shared();
            if shared.state != ConnectionState::Connected {
                return Err(VmcError::NotConnected);
            }
            if shared.pending.is_some() {
                return Err(VmcError::Busy);
            }
            shared.pending = Some(Pending { seq, tx });
        }

        tracing::debug!(?command, seq, "sending command frame");

        // One deadline covers the write and the wait for the response, so a
        // stalled link cannot hold the caller past the command's timeout.
        let deadline = tokio::time::Instant::now() + timeout;

        let write_result = tokio::time::timeout_at(deadline, async {
            let mut writer = self.inner.writer.lock().await;
            match writer.as_mut() {
                Some(writer) => {
                    writer.write_all(&frame).await?;
                    writer.flush().await
                }
                None => Err(io::Error::new(
                    io::ErrorKind::NotConnected,
                    "connection torn down before write",
                )),
            }
        })
        .await;
        let write_error = match write_result {
            Ok(Ok(())) => None,
            Ok(Err(err)) => Some(VmcError::Transport(err)),
            Err(_) => Some(VmcError::Timeout),
        };
        if let Some(err) = write_error {
            return match self.inner.take_pending_if(seq) {
                Some(_) => Err(err),
                // Someone else already resolved us (disconnect racing the
                // failed write); report that outcome instead.
                None => rx.await.unwrap_or(Err(VmcError::ConnectionLost)),
            };
        }

        // Deadline timer; races the read task for the pending slot.
        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move {
            tokio::time::sleep_until(deadline).await;
            if let Some(pending) = inner.take_pending_if(seq) {
                tracing::warn!(seq, "response deadline elapsed");
                let _ = pending.tx.send(Err(VmcError::Timeout));
            }
        });

        match rx.await {
            Ok(result) => result,
            // The sender can only be dropped unresolved if the whole client
            // was torn down mid-flight.
            Err(_) => Err(VmcError::ConnectionLost),
        }
    }

    /// Subscribe to every accepted response frame, unsolicited ones
    /// included.
    pub fn responses(&self) -> broadcast::Receiver<Response> {
        self.inner.responses.subscribe()
    }

    /// Subscribe to unexpected connection-loss notifications.
    pub fn disconnects(&self) -> broadcast::Receiver<()> {
        self.inner.disconnects.subscribe()
    }

    /// Whether a connection is currently active.
    pub fn is_connected(&self) -> bool {
        self.inner.lock_shared().state == ConnectionState::Connected
    }

    /// Frame accounting for the life of this client.
    pub fn link_stats(&self) -> LinkStats {
        let shared = self.inner.lock_shared();
        LinkStats {
            frames_emitted: shared.framer.frames_emitted(),
            bytes_discarded: shared.framer.bytes_discarded(),
        }
    }
}

impl<T: Transport> Inner<T> {
    fn lock_shared(&self) -> MutexGuard<'_, Shared> {
        lock_recovering(&self.shared)
    }

    /// Take the pending request only if it is still the one identified by
    /// `seq`. Exactly one caller can ever succeed for a given request.
    fn take_pending_if(&self, seq: u64) -> Option<Pending> {
        let mut shared = self.lock_shared();
        match &shared.pending {
            Some(pending) if pending.seq == seq => shared.pending.take(),
            _ => None,
        }
    }

    /// Resolve the pending request (if any) with an accepted response and
    /// broadcast it.
    fn deliver(&self, response: Response) {
        let pending = self.lock_shared().pending.take();
        match pending {
            Some(pending) => {
                let _ = pending.tx.send(Ok(response));
            }
            None => {
                tracing::debug!(board = response.driver_board, "unsolicited response");
            }
        }
        // No receivers is fine; broadcast errors only mean nobody listened.
        let _ = self.responses.send(response);
    }

    /// Unexpected end-of-stream or read error. A no-op if a deliberate
    /// disconnect (or a newer connection) already superseded `generation`.
    async fn handle_connection_loss(&self, generation: u64) {
        let pending = {
            let mut shared = self.lock_shared();
            if shared.generation != generation {
                return;
            }
            shared.state = ConnectionState::Disconnected;
            shared.framer.clear();
            shared.pending.take()
        };
        if let Some(pending) = pending {
            let _ = pending.tx.send(Err(VmcError::ConnectionLost));
        }
        if let Some(mut writer) = self.writer.lock().await.take() {
            let _ = writer.shutdown().await;
        }

        tracing::warn!("connection lost");
        let _ = self.disconnects.send(());
    }
}

/// Lock a std mutex, recovering the guard if a panicking thread poisoned it.
fn lock_recovering<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Background read task: feed every inbound chunk through the frame buffer
/// and deliver accepted responses, until end-of-stream or error.
async fn read_loop<T: Transport>(
    inner: Arc<Inner<T>>,
    mut reader: ReadHalf<T::Stream>,
    generation: u64,
) {
    let mut buf = vec![0u8; inner.config.read_buffer_size];
    loop {
        match reader.read(&mut buf).await {
            Ok(0) => {
                tracing::debug!("transport end of stream");
                break;
            }
            Ok(n) => {
                let responses = {
                    let mut shared = inner.lock_shared();
                    if shared.generation != generation {
                        // A disconnect/reconnect overtook us; the buffer is
                        // no longer ours to touch.
                        return;
                    }
                    shared.framer.push(&buf[..n])
                };
                for response in responses {
                    inner.deliver(response);
                }
            }
            Err(err) => {
                tracing::error!(error = %err, "transport read failed");
                break;
            }
        }
    }
    inner.handle_connection_loss(generation).await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::wire_format::checksum;
    use crate::transport::MockTransport;

    fn response_frame(r1: u8, r2: u8, r3: u8, r4: u8) -> [u8; 5] {
        [r1, r2, r3, r4, checksum(&[r1, r2, r3, r4])]
    }

    fn dispense(driver_board: u8) -> Command {
        Command::Dispense {
            driver_board,
            slot: 10,
            use_drop_sensor: true,
        }
    }

    async fn connected_client() -> (VmcClient<MockTransport>, crate::transport::RemoteDevice) {
        let (transport, device) = MockTransport::with_connection();
        let client = VmcClient::new(transport);
        client.connect("mock").await.expect("connect");
        (client, device)
    }

    #[tokio::test]
    async fn test_send_round_trip() {
        let (client, mut device) = connected_client().await;

        let device_task = tokio::spawn(async move {
            let frame = device.read_command().await.expect("command frame");
            assert_eq!(frame, [0x03, 0xFC, 0x0A, 0xF5, 0xAA, 0x55]);
            device
                .send(&response_frame(0x03, 0x5D, 0x00, 0xAA))
                .await
                .expect("response");
            device
        });

        let response = client.send(dispense(3)).await.expect("response");
        assert!(response.is_success());
        assert!(response.has_product_delivery());
        assert_eq!(response.driver_board, 3);

        device_task.await.expect("device task");
    }

    #[tokio::test]
    async fn test_validation_error_before_any_state_change() {
        let (client, _device) = connected_client().await;

        let result = client
            .send(Command::Dispense {
                driver_board: 1,
                slot: 0,
                use_drop_sensor: false,
            })
            .await;
        assert!(matches!(result, Err(VmcError::Validation(_))));

        // The failed validation left the client idle.
        assert!(lock_ok(&client));
    }

    fn lock_ok(client: &VmcClient<MockTransport>) -> bool {
        client.inner.lock_shared().pending.is_none()
    }

    #[tokio::test]
    async fn test_busy_while_pending() {
        let (client, mut device) = connected_client().await;

        let sender = client.clone();
        let first = tokio::spawn(async move { sender.send(dispense(1)).await });

        // The frame arriving at the device proves the first send holds the
        // pending slot.
        let _ = device.read_command().await.expect("command frame");

        let result = client.send(Command::SelfCheck { driver_board: 1 }).await;
        assert!(matches!(result, Err(VmcError::Busy)));

        // The original command still resolves normally.
        device
            .send(&response_frame(0x01, 0x5D, 0x00, 0xAA))
            .await
            .expect("response");
        let response = first.await.expect("join").expect("response");
        assert!(response.is_success());
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_when_device_stays_silent() {
        let (client, mut device) = connected_client().await;

        let started = tokio::time::Instant::now();
        let send = client.send(Command::SelfCheck { driver_board: 1 });
        let device_task = tokio::spawn(async move {
            let _ = device.read_command().await;
            device // keep the link open; just never reply
        });

        let result = send.await;
        assert!(matches!(result, Err(VmcError::Timeout)));
        assert_eq!(started.elapsed(), std::time::Duration::from_secs(5));

        drop(device_task);
        // The timed-out request no longer occupies the pending slot.
        assert!(lock_ok(&client));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stalled_write_hits_deadline() {
        let transport = MockTransport::new();
        // Capacity 1 cannot absorb a 6-byte frame, so the write stalls until
        // the device reads; this device never does.
        let _device = transport.add_connection_with_capacity(1);
        let client = VmcClient::new(transport);
        client.connect("mock").await.expect("connect");

        let started = tokio::time::Instant::now();
        let result = client.send(Command::SelfCheck { driver_board: 1 }).await;

        assert!(matches!(result, Err(VmcError::Timeout)));
        assert_eq!(started.elapsed(), std::time::Duration::from_secs(5));
        // The timed-out write released the pending slot.
        assert!(lock_ok(&client));
    }

    #[tokio::test(start_paused = true)]
    async fn test_dispense_uses_longer_deadline() {
        let (client, mut device) = connected_client().await;

        let started = tokio::time::Instant::now();
        let send = client.send(dispense(1));
        let device_task = tokio::spawn(async move {
            let _ = device.read_command().await;
            device
        });

        assert!(matches!(send.await, Err(VmcError::Timeout)));
        assert_eq!(started.elapsed(), std::time::Duration::from_secs(10));
        drop(device_task);
    }

    #[tokio::test(start_paused = true)]
    async fn test_late_response_is_unsolicited() {
        let (client, mut device) = connected_client().await;
        let mut responses = client.responses();

        let send = client.send(Command::SelfCheck { driver_board: 1 });
        let device_task = tokio::spawn(async move {
            let _ = device.read_command().await;
            device
        });
        assert!(matches!(send.await, Err(VmcError::Timeout)));

        // The response shows up after the deadline: broadcast only, and the
        // client is free for the next command.
        let mut device = device_task.await.expect("join");
        device
            .send(&response_frame(0x01, 0x5D, 0x00, 0x00))
            .await
            .expect("late response");

        let late = responses.recv().await.expect("broadcast");
        assert_eq!(late.driver_board, 1);
        assert!(lock_ok(&client));
    }

    #[tokio::test]
    async fn test_unsolicited_response_broadcast_only() {
        let (client, mut device) = connected_client().await;
        let mut responses = client.responses();

        device
            .send(&response_frame(0x02, 0x5D, 0x00, 0x01))
            .await
            .expect("unsolicited");

        let response = responses.recv().await.expect("broadcast");
        assert_eq!(response.driver_board, 2);
        assert!(response.is_door_open());

        // State untouched: a normal exchange still works.
        let device_task = tokio::spawn(async move {
            let _ = device.read_command().await.expect("command frame");
            device
                .send(&response_frame(0x02, 0x5D, 0x00, 0x00))
                .await
                .expect("response");
        });
        let response = client
            .send(Command::DoorStatus { driver_board: 2 })
            .await
            .expect("response");
        assert!(response.is_success());
        device_task.await.expect("device task");
    }

    #[tokio::test]
    async fn test_solicited_response_also_broadcast() {
        let (client, mut device) = connected_client().await;
        let mut responses = client.responses();

        let device_task = tokio::spawn(async move {
            let _ = device.read_command().await.expect("command frame");
            device
                .send(&response_frame(0x01, 0x5D, 0x00, 0x00))
                .await
                .expect("response");
        });

        let direct = client
            .send(Command::SelfCheck { driver_board: 1 })
            .await
            .expect("response");
        let broadcast = responses.recv().await.expect("broadcast");
        assert_eq!(direct, broadcast);
        device_task.await.expect("device task");
    }

    #[tokio::test]
    async fn test_disconnect_resolves_pending() {
        let (client, mut device) = connected_client().await;

        let sender = client.clone();
        let pending = tokio::spawn(async move { sender.send(dispense(1)).await });
        let _ = device.read_command().await.expect("command frame");

        client.disconnect().await;

        let result = pending.await.expect("join");
        assert!(matches!(result, Err(VmcError::ConnectionLost)));
        assert!(!client.is_connected());
    }

    #[tokio::test]
    async fn test_disconnect_is_idempotent() {
        let (client, _device) = connected_client().await;
        client.disconnect().await;
        client.disconnect().await;
        assert!(!client.is_connected());
    }

    #[tokio::test]
    async fn test_send_while_disconnected() {
        let (transport, _device) = MockTransport::with_connection();
        let client = VmcClient::new(transport);

        let result = client.send(dispense(1)).await;
        assert!(matches!(result, Err(VmcError::NotConnected)));
    }

    #[tokio::test]
    async fn test_unexpected_loss_notifies_and_resolves() {
        let (client, mut device) = connected_client().await;
        let mut disconnects = client.disconnects();

        let sender = client.clone();
        let pending = tokio::spawn(async move { sender.send(dispense(1)).await });
        let _ = device.read_command().await.expect("command frame");

        device.hang_up().await;

        let result = pending.await.expect("join");
        assert!(matches!(result, Err(VmcError::ConnectionLost)));
        disconnects.recv().await.expect("loss notification");
        assert!(!client.is_connected());
    }

    #[tokio::test]
    async fn test_loss_without_pending_only_notifies() {
        let (client, device) = connected_client().await;
        let mut disconnects = client.disconnects();

        device.hang_up().await;

        disconnects.recv().await.expect("loss notification");
        assert!(!client.is_connected());
    }

    #[tokio::test]
    async fn test_reconnect_after_loss() {
        let (transport, device) = MockTransport::with_connection();
        let client = VmcClient::new(transport.clone());
        client.connect("mock").await.expect("connect");

        let mut disconnects = client.disconnects();
        device.hang_up().await;
        disconnects.recv().await.expect("loss notification");

        let mut device = transport.add_connection();
        client.connect("mock").await.expect("reconnect");
        assert!(client.is_connected());

        let device_task = tokio::spawn(async move {
            let _ = device.read_command().await.expect("command frame");
            device
                .send(&response_frame(0x01, 0x5D, 0x00, 0x00))
                .await
                .expect("response");
        });
        let response = client
            .send(Command::SelfCheck { driver_board: 1 })
            .await
            .expect("response");
        assert!(response.is_success());
        device_task.await.expect("device task");
    }

    #[tokio::test]
    async fn test_connect_failure_is_transport_error() {
        let client = VmcClient::new(MockTransport::new());
        let result = client.connect("mock").await;
        assert!(matches!(result, Err(VmcError::Transport(_))));
        assert!(!client.is_connected());
    }

    #[tokio::test]
    async fn test_noise_before_response_resyncs() {
        let (client, mut device) = connected_client().await;

        let device_task = tokio::spawn(async move {
            let _ = device.read_command().await.expect("command frame");
            // One noise byte, then the real frame.
            let mut bytes = vec![0xFF];
            bytes.extend_from_slice(&response_frame(0x01, 0x5D, 0x00, 0xAA));
            device.send(&bytes).await.expect("noisy response");
        });

        let response = client.send(dispense(1)).await.expect("response");
        assert!(response.is_success());
        device_task.await.expect("device task");

        let stats = client.link_stats();
        assert_eq!(stats.frames_emitted, 1);
        assert_eq!(stats.bytes_discarded, 1);
    }
}
