//! Wire format constants and frame arithmetic.
//!
//! Command frame, 6 bytes:
//! ```text
//! ┌──────┬─────────┬──────┬─────────┬──────┬─────────┐
//! │ D1   │ D2      │ D3   │ D4      │ D5   │ D6      │
//! │ board│ 0xFF-D1 │ op   │ 0xFF-D3 │ param│ 0xFF-D5 │
//! └──────┴─────────┴──────┴─────────┴──────┴─────────┘
//! ```
//!
//! Response frame, 5 bytes:
//! ```text
//! ┌──────┬────────┬───────┬─────────┬──────────┐
//! │ R1   │ R2     │ R3    │ R4      │ R5       │
//! │ board│ status │ error │ product │ checksum │
//! └──────┴────────┴───────┴─────────┴──────────┘
//! ```
//!
//! The odd/even complement pairs of the command frame act as a per-byte
//! integrity marker. The response checksum is `(R1+R2+R3+R4) mod 256`.

/// Command frame size in bytes (fixed, exactly 6).
pub const COMMAND_FRAME_SIZE: usize = 6;

/// Response frame size in bytes (fixed, exactly 5).
pub const RESPONSE_FRAME_SIZE: usize = 5;

/// Response status byte: command executed successfully.
pub const STATUS_SUCCESS: u8 = 0x5D;

/// Response status byte: command failed. Any value other than
/// [`STATUS_SUCCESS`] is also treated as failure.
pub const STATUS_FAILURE: u8 = 0x5C;

/// Product-delivery flag: a product was dropped.
pub const PRODUCT_DELIVERED: u8 = 0xAA;

/// Product-delivery flag: nothing was dropped.
pub const PRODUCT_NONE: u8 = 0x00;

/// Door-status responses report an open door with this value in R4.
pub const DOOR_OPEN: u8 = 0x01;

/// Parameter byte for enabled/on (drop sensor, lighting, temperature control).
pub const PARAM_ENABLED: u8 = 0xAA;

/// Parameter byte for disabled/off.
pub const PARAM_DISABLED: u8 = 0x55;

/// Op-code constants for the D3 byte. Dispense carries the slot number in
/// D3 instead of an op-code.
pub mod opcodes {
    /// Driver board self-check.
    pub const SELF_CHECK: u8 = 0x64;
    /// Read the current cabinet temperature.
    pub const READ_TEMPERATURE: u8 = 0xDC;
    /// Set the target cabinet temperature.
    pub const SET_TARGET_TEMPERATURE: u8 = 0xCE;
    /// Enable or disable temperature control.
    pub const TEMPERATURE_CONTROL: u8 = 0xCC;
    /// Switch cabinet lighting on or off.
    pub const LIGHTING: u8 = 0xDD;
    /// Query the cabinet door switch.
    pub const DOOR_STATUS: u8 = 0xDF;
    /// Configure a slot as belt-driven.
    pub const SET_BELT_SLOT: u8 = 0x68;
    /// Configure a slot as spiral-driven.
    pub const SET_SPIRAL_SLOT: u8 = 0x74;
    /// Configure a slot as a single (unmerged) slot.
    pub const SET_SINGLE_SLOT: u8 = 0xC9;
    /// Merge a slot with its neighbour (dual slot).
    pub const SET_DUAL_SLOT: u8 = 0xCA;
}

/// Bitwise complement used for the command frame integrity pairs.
#[inline]
pub fn complement(byte: u8) -> u8 {
    0xFF - byte
}

/// Response checksum: wrapping byte sum over R1..R4.
#[inline]
pub fn checksum(bytes: &[u8]) -> u8 {
    bytes.iter().fold(0u8, |sum, b| sum.wrapping_add(*b))
}

/// Build a command frame from the three payload bytes.
///
/// D2, D4 and D6 are filled with the complements of D1, D3 and D5.
///
/// # Example
///
/// ```
/// use vmclink::protocol::command_frame;
///
/// let frame = command_frame(0x03, 0x0A, 0xAA);
/// assert_eq!(frame, [0x03, 0xFC, 0x0A, 0xF5, 0xAA, 0x55]);
/// ```
#[inline]
pub fn command_frame(d1: u8, d3: u8, d5: u8) -> [u8; COMMAND_FRAME_SIZE] {
    [d1, complement(d1), d3, complement(d3), d5, complement(d5)]
}
