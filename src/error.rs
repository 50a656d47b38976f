//! Error types for vmclink.

use thiserror::Error;

/// Main error type for all vmclink operations.
#[derive(Debug, Error)]
pub enum VmcError {
    /// Command parameters failed validation; nothing was transmitted.
    #[error("invalid command: {0}")]
    Validation(String),

    /// A command is already awaiting its response (single-flight protocol).
    #[error("a command is already in flight")]
    Busy,

    /// No active connection to the controller.
    #[error("not connected")]
    NotConnected,

    /// Transport-level failure while connecting or writing.
    #[error("transport error: {0}")]
    Transport(#[from] std::io::Error),

    /// The response deadline elapsed with no valid response frame.
    #[error("response timeout")]
    Timeout,

    /// The connection closed or broke while a command was pending.
    #[error("connection lost")]
    ConnectionLost,
}

/// Result type alias using VmcError.
pub type Result<T> = std::result::Result<T, VmcError>;
