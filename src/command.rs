//! Command catalog: every operation the driver boards understand, with
//! parameter validation, byte layout and per-command response timeouts.
//!
//! A command is an immutable value; [`Command::encode`] validates it and
//! produces exactly one 6-byte frame. Validation happens inside `encode`,
//! before any byte is built, so an out-of-contract frame can never leave
//! this module.

use std::time::Duration;

use crate::error::{Result, VmcError};
use crate::protocol::wire_format::{command_frame, opcodes, PARAM_DISABLED, PARAM_ENABLED};
use crate::protocol::COMMAND_FRAME_SIZE;

/// Valid slot number range (inclusive).
pub const SLOT_RANGE: std::ops::RangeInclusive<u8> = 1..=80;

/// Valid target temperature range in °C (inclusive).
pub const TEMPERATURE_RANGE: std::ops::RangeInclusive<i8> = -50..=100;

/// Response deadline for every command except dispense.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Response deadline for dispense; mechanical actuation takes longer.
pub const DISPENSE_TIMEOUT: Duration = Duration::from_secs(10);

/// A command addressed to one driver board.
///
/// `driver_board` covers the full byte range by construction; the remaining
/// parameters are range-checked at encode time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Run the motor of one slot and dispense a product.
    Dispense {
        /// Target driver board.
        driver_board: u8,
        /// Slot number, 1-80. Placed directly in D3 (no op-code).
        slot: u8,
        /// Whether the drop sensor verifies the delivery.
        use_drop_sensor: bool,
    },
    /// Driver board self-check.
    SelfCheck {
        /// Target driver board.
        driver_board: u8,
    },
    /// Read the current cabinet temperature.
    ReadTemperature {
        /// Target driver board.
        driver_board: u8,
    },
    /// Set the target cabinet temperature.
    SetTargetTemperature {
        /// Target driver board.
        driver_board: u8,
        /// Target temperature in °C, -50 to 100.
        temperature: i8,
    },
    /// Enable or disable temperature control.
    TemperatureControl {
        /// Target driver board.
        driver_board: u8,
        /// Whether the compressor/heater loop runs.
        enable: bool,
    },
    /// Switch cabinet lighting on or off.
    Lighting {
        /// Target driver board.
        driver_board: u8,
        /// Whether the lights are on.
        on: bool,
    },
    /// Query the cabinet door switch.
    DoorStatus {
        /// Target driver board.
        driver_board: u8,
    },
    /// Configure a slot as belt-driven.
    SetBeltSlot {
        /// Target driver board.
        driver_board: u8,
        /// Slot number, 1-80.
        slot: u8,
    },
    /// Configure a slot as spiral-driven.
    SetSpiralSlot {
        /// Target driver board.
        driver_board: u8,
        /// Slot number, 1-80.
        slot: u8,
    },
    /// Configure a slot as a single (unmerged) slot.
    SetSingleSlot {
        /// Target driver board.
        driver_board: u8,
        /// Slot number, 1-80.
        slot: u8,
    },
    /// Merge a slot with its neighbour (dual slot).
    SetDualSlot {
        /// Target driver board.
        driver_board: u8,
        /// Slot number, 1-80.
        slot: u8,
    },
}

impl Command {
    /// Driver board this command is addressed to (D1).
    pub fn driver_board(&self) -> u8 {
        match *self {
            Self::Dispense { driver_board, .. }
            | Self::SelfCheck { driver_board }
            | Self::ReadTemperature { driver_board }
            | Self::SetTargetTemperature { driver_board, .. }
            | Self::TemperatureControl { driver_board, .. }
            | Self::Lighting { driver_board, .. }
            | Self::DoorStatus { driver_board }
            | Self::SetBeltSlot { driver_board, .. }
            | Self::SetSpiralSlot { driver_board, .. }
            | Self::SetSingleSlot { driver_board, .. }
            | Self::SetDualSlot { driver_board, .. } => driver_board,
        }
    }

    /// How long to wait for this command's response before timing out.
    pub fn response_timeout(&self) -> Duration {
        match self {
            Self::Dispense { .. } => DISPENSE_TIMEOUT,
            _ => DEFAULT_TIMEOUT,
        }
    }

    /// Validate the command's parameters without encoding.
    pub fn validate(&self) -> Result<()> {
        match *self {
            Self::Dispense { slot, .. }
            | Self::SetBeltSlot { slot, .. }
            | Self::SetSpiralSlot { slot, .. }
            | Self::SetSingleSlot { slot, .. }
            | Self::SetDualSlot { slot, .. } => {
                if !SLOT_RANGE.contains(&slot) {
                    return Err(VmcError::Validation(format!(
                        "slot {} out of range {}..={}",
                        slot,
                        SLOT_RANGE.start(),
                        SLOT_RANGE.end()
                    )));
                }
                Ok(())
            }
            Self::SetTargetTemperature { temperature, .. } => {
                if !TEMPERATURE_RANGE.contains(&temperature) {
                    return Err(VmcError::Validation(format!(
                        "temperature {} out of range {}..={}",
                        temperature,
                        TEMPERATURE_RANGE.start(),
                        TEMPERATURE_RANGE.end()
                    )));
                }
                Ok(())
            }
            _ => Ok(()),
        }
    }

    /// Validate and encode into a 6-byte command frame.
    ///
    /// # Example
    ///
    /// ```
    /// use vmclink::Command;
    ///
    /// let frame = Command::Dispense {
    ///     driver_board: 3,
    ///     slot: 10,
    ///     use_drop_sensor: true,
    /// }
    /// .encode()
    /// .unwrap();
    /// assert_eq!(frame, [0x03, 0xFC, 0x0A, 0xF5, 0xAA, 0x55]);
    /// ```
    pub fn encode(&self) -> Result<[u8; COMMAND_FRAME_SIZE]> {
        self.validate()?;

        let d1 = self.driver_board();
        let (d3, d5) = match *self {
            Self::Dispense {
                slot,
                use_drop_sensor,
                ..
            } => (slot, on_off(use_drop_sensor)),
            Self::SelfCheck { .. } => (opcodes::SELF_CHECK, 0x00),
            Self::ReadTemperature { .. } => (opcodes::READ_TEMPERATURE, 0x00),
            Self::SetTargetTemperature { temperature, .. } => {
                (opcodes::SET_TARGET_TEMPERATURE, temperature as u8)
            }
            Self::TemperatureControl { enable, .. } => {
                (opcodes::TEMPERATURE_CONTROL, on_off(enable))
            }
            Self::Lighting { on, .. } => (opcodes::LIGHTING, on_off(on)),
            Self::DoorStatus { .. } => (opcodes::DOOR_STATUS, 0x00),
            Self::SetBeltSlot { slot, .. } => (opcodes::SET_BELT_SLOT, slot),
            Self::SetSpiralSlot { slot, .. } => (opcodes::SET_SPIRAL_SLOT, slot),
            Self::SetSingleSlot { slot, .. } => (opcodes::SET_SINGLE_SLOT, slot),
            Self::SetDualSlot { slot, .. } => (opcodes::SET_DUAL_SLOT, slot),
        };

        Ok(command_frame(d1, d3, d5))
    }
}

#[inline]
fn on_off(enabled: bool) -> u8 {
    if enabled {
        PARAM_ENABLED
    } else {
        PARAM_DISABLED
    }
}
