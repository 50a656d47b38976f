//! Frame buffer for accumulating partial reads and resynchronizing.
//!
//! The response protocol has no start-of-frame marker: the only way to find
//! a frame boundary in a corrupted stream is to test each 5-byte window
//! against the checksum. The buffer therefore runs a single accumulating
//! state: append the chunk, then repeatedly take the first 5 bytes as a
//! candidate frame; on a checksum hit emit it and drop 5 bytes, on a miss
//! drop exactly 1 byte and retry (resync-by-one).
//!
//! Every iteration strictly shrinks the buffer, so `push` terminates for any
//! finite input and leaves fewer than 5 bytes buffered. Recovery after
//! corruption relies solely on checksum collision probability (1 in 256 per
//! misaligned window); a run of discarded bytes past the configured
//! threshold is logged as a sign of a noisy or misbehaving link.
//!
//! # Example
//!
//! ```
//! use vmclink::protocol::FrameBuffer;
//!
//! let mut buffer = FrameBuffer::new();
//! // Noise byte followed by a valid frame.
//! let responses = buffer.push(&[0xFF, 0x00, 0x5D, 0x00, 0x00, 0x5D]);
//! assert_eq!(responses.len(), 1);
//! assert_eq!(buffer.bytes_discarded(), 1);
//! ```

use bytes::BytesMut;

use super::response::Response;
use super::wire_format::RESPONSE_FRAME_SIZE;

/// Default run length of discarded bytes that triggers a warning.
pub const DEFAULT_RESYNC_WARN_THRESHOLD: u64 = 64;

/// Buffer for accumulating inbound bytes and extracting checksum-valid
/// response frames.
///
/// Owned exclusively by the reader side; appended at the tail, trimmed at
/// the head, never both ends at once.
pub struct FrameBuffer {
    /// Accumulated bytes awaiting a frame boundary.
    buffer: BytesMut,
    /// Bytes discarded since the last valid frame.
    resync_run: u64,
    /// Total bytes discarded over the buffer's lifetime.
    bytes_discarded: u64,
    /// Total valid frames emitted over the buffer's lifetime.
    frames_emitted: u64,
    /// Discard-run length past which a warning is logged.
    resync_warn_threshold: u64,
}

impl FrameBuffer {
    /// Create a new frame buffer with the default warning threshold.
    pub fn new() -> Self {
        Self::with_warn_threshold(DEFAULT_RESYNC_WARN_THRESHOLD)
    }

    /// Create a new frame buffer with a custom resync warning threshold.
    ///
    /// A threshold of 0 is treated as 1: the warning fires on the first
    /// discarded byte of a run.
    pub fn with_warn_threshold(resync_warn_threshold: u64) -> Self {
        Self {
            buffer: BytesMut::with_capacity(64),
            resync_run: 0,
            bytes_discarded: 0,
            frames_emitted: 0,
            resync_warn_threshold,
        }
    }

    /// Push a chunk of inbound bytes and extract all checksum-valid frames.
    ///
    /// This is the main API for processing transport reads. Chunk boundaries
    /// carry no meaning: feeding the same bytes in any fragmentation yields
    /// the same responses. Checksum-invalid windows are consumed one byte at
    /// a time and never surface to the caller.
    pub fn push(&mut self, data: &[u8]) -> Vec<Response> {
        self.buffer.extend_from_slice(data);

        let mut responses = Vec::new();

        while self.buffer.len() >= RESPONSE_FRAME_SIZE {
            let mut candidate = [0u8; RESPONSE_FRAME_SIZE];
            candidate.copy_from_slice(&self.buffer[..RESPONSE_FRAME_SIZE]);

            let response = Response::decode(&candidate);
            if response.is_checksum_valid() {
                let _ = self.buffer.split_to(RESPONSE_FRAME_SIZE);
                self.frames_emitted += 1;
                if self.resync_run > 0 {
                    tracing::debug!(
                        discarded = self.resync_run,
                        "frame boundary recovered after resync"
                    );
                    self.resync_run = 0;
                }
                responses.push(response);
            } else {
                let _ = self.buffer.split_to(1);
                self.bytes_discarded += 1;
                self.resync_run += 1;
                if self.resync_run == self.resync_warn_threshold.max(1) {
                    tracing::warn!(
                        discarded = self.resync_run,
                        "still scanning for a frame boundary; link may be noisy"
                    );
                }
            }
        }

        responses
    }

    /// Number of bytes currently buffered (always < 5 between pushes).
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    /// Check if the buffer is empty.
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Total bytes discarded during resynchronization.
    pub fn bytes_discarded(&self) -> u64 {
        self.bytes_discarded
    }

    /// Total checksum-valid frames emitted.
    pub fn frames_emitted(&self) -> u64 {
        self.frames_emitted
    }

    /// Clear buffered bytes and the resync run counter.
    ///
    /// Called on disconnect; lifetime counters are kept for diagnostics.
    pub fn clear(&mut self) {
        self.buffer.clear();
        self.resync_run = 0;
    }
}

impl Default for FrameBuffer {
    fn default() -> Self {
        Self::new()
    }
}
