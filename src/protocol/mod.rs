//! Binary protocol layer: wire format, response decoding and the
//! resynchronizing frame buffer.

mod frame_buffer;
mod response;
pub mod wire_format;

pub use frame_buffer::{FrameBuffer, DEFAULT_RESYNC_WARN_THRESHOLD};
pub use response::{DropSensorFault, MotorFault, Response};
pub use wire_format::{
    checksum, command_frame, complement, opcodes, COMMAND_FRAME_SIZE, RESPONSE_FRAME_SIZE,
};
