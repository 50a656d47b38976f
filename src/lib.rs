//! # vmclink
//!
//! Protocol engine for driving a vending-machine controller (VMC) over a
//! serial-over-radio byte link.
//!
//! The hard part of talking to a VMC is not the transport, it is the
//! protocol discipline: 6-byte command frames with complement-pair
//! integrity bytes, 5-byte checksummed responses arriving in a continuous
//! and possibly corrupted stream, and a strict one-command-in-flight rule
//! with per-command deadlines. This crate owns exactly that discipline.
//!
//! ## Architecture
//!
//! - [`protocol`]: wire format, response decoding, resynchronizing frame
//!   buffer
//! - [`Command`]: the command catalog with validation and byte layout
//! - [`transport`]: the byte-link seam (TCP bridge + in-memory mock)
//! - [`VmcClient`]: single-flight correlation and connection lifecycle
//!
//! ## Example
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
//!     println!("delivered: {}", response.has_product_delivery());
//!     Ok(())
//! }
//! ```

pub mod command;
pub mod error;
pub mod protocol;
pub mod transport;

mod client;

pub use client::{ClientConfig, LinkStats, VmcClient};
pub use command::Command;
pub use error::{Result, VmcError};
pub use protocol::{DropSensorFault, FrameBuffer, MotorFault, Response};
pub use transport::{MockTransport, TcpTransport, Transport};
