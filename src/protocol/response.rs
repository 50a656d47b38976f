//! Response frame decoding and fault enumerations.
//!
//! A [`Response`] is decoded from exactly 5 bytes and always succeeds
//! structurally; whether the frame is trustworthy is a separate question
//! answered by [`Response::is_checksum_valid`]. The stream framer only
//! surfaces checksum-valid responses, so anything reaching application code
//! through the client has already passed that gate.

use std::fmt;

use super::wire_format::{
    checksum, DOOR_OPEN, PRODUCT_DELIVERED, RESPONSE_FRAME_SIZE, STATUS_SUCCESS,
};

/// A decoded 5-byte response frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Response {
    /// Driver board that produced the response (R1).
    pub driver_board: u8,
    /// Raw status byte (R2). `0x5D` is success, anything else is failure.
    pub status: u8,
    /// Error code (R3); on the success path this carries variant-specific
    /// data such as the current temperature.
    pub error_code: u8,
    /// Product-delivery flag or variant-specific data (R4).
    pub product_flag: u8,
    /// Checksum byte as received (R5).
    pub checksum: u8,
    checksum_valid: bool,
}

impl Response {
    /// Decode a response from exactly [`RESPONSE_FRAME_SIZE`] bytes.
    ///
    /// # Example
    ///
    /// ```
    /// use vmclink::protocol::Response;
    ///
    /// let response = Response::decode(&[0x00, 0x5D, 0x00, 0x00, 0x5D]);
    /// assert!(response.is_success());
    /// assert!(response.is_checksum_valid());
    /// assert!(!response.has_product_delivery());
    /// ```
    pub fn decode(bytes: &[u8; RESPONSE_FRAME_SIZE]) -> Self {
        let expected = checksum(&bytes[..4]);
        Self {
            driver_board: bytes[0],
            status: bytes[1],
            error_code: bytes[2],
            product_flag: bytes[3],
            checksum: bytes[4],
            checksum_valid: bytes[4] == expected,
        }
    }

    /// Whether the received checksum matches `(R1+R2+R3+R4) mod 256`.
    #[inline]
    pub fn is_checksum_valid(&self) -> bool {
        self.checksum_valid
    }

    /// Whether the board reported success (`R2 == 0x5D`).
    #[inline]
    pub fn is_success(&self) -> bool {
        self.status == STATUS_SUCCESS
    }

    /// Whether the drop sensor confirmed a product delivery (`R4 == 0xAA`).
    #[inline]
    pub fn has_product_delivery(&self) -> bool {
        self.product_flag == PRODUCT_DELIVERED
    }

    /// Whether a door-status response reports the door open (`R4 == 0x01`).
    #[inline]
    pub fn is_door_open(&self) -> bool {
        self.product_flag == DOOR_OPEN
    }

    /// Current temperature in °C, for temperature-read responses (R3 as a
    /// signed byte).
    #[inline]
    pub fn temperature(&self) -> i8 {
        self.error_code as i8
    }

    /// Standby/target temperature in °C, for responses that report it in R4.
    #[inline]
    pub fn standby_temperature(&self) -> i8 {
        self.product_flag as i8
    }

    /// Motor/MOSFET fault from the upper nibble of the error code.
    #[inline]
    pub fn motor_fault(&self) -> MotorFault {
        MotorFault::from_nibble(self.error_code >> 4)
    }

    /// Drop-sensor fault from the lower nibble of the error code.
    #[inline]
    pub fn drop_sensor_fault(&self) -> DropSensorFault {
        DropSensorFault::from_nibble(self.error_code & 0x0F)
    }

    /// Human-readable description of both fault nibbles.
    ///
    /// Derived view only; not used anywhere on the protocol path.
    pub fn error_description(&self) -> String {
        format!(
            "motor: {}, drop sensor: {}",
            self.motor_fault(),
            self.drop_sensor_fault()
        )
    }
}

/// Motor/MOSFET fault reported in the upper nibble of the error code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MotorFault {
    /// No fault.
    Normal,
    /// PMOS transistor shorted.
    PmosShort,
    /// NMOS transistor shorted.
    NmosShort,
    /// Motor winding shorted.
    MotorShort,
    /// Motor circuit open.
    MotorOpen,
    /// Motor rotation did not complete in time.
    RotationTimeout,
    /// Value outside the enumerated range.
    Unknown(u8),
}

impl MotorFault {
    fn from_nibble(nibble: u8) -> Self {
        match nibble {
            0 => Self::Normal,
            1 => Self::PmosShort,
            2 => Self::NmosShort,
            3 => Self::MotorShort,
            4 => Self::MotorOpen,
            5 => Self::RotationTimeout,
            other => Self::Unknown(other),
        }
    }
}

impl fmt::Display for MotorFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Normal => write!(f, "normal"),
            Self::PmosShort => write!(f, "PMOS short"),
            Self::NmosShort => write!(f, "NMOS short"),
            Self::MotorShort => write!(f, "motor short"),
            Self::MotorOpen => write!(f, "motor open"),
            Self::RotationTimeout => write!(f, "rotation timeout"),
            Self::Unknown(v) => write!(f, "unknown ({:#x})", v),
        }
    }
}

/// Drop-sensor fault reported in the lower nibble of the error code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropSensorFault {
    /// No fault.
    Normal,
    /// Sensor fired while no dispense was in progress.
    SpuriousSignal,
    /// Sensor stayed silent while disabled.
    MissingSignal,
    /// Sensor fired during product pass-through.
    PassThroughSignal,
    /// Value outside the enumerated range.
    Unknown(u8),
}

impl DropSensorFault {
    fn from_nibble(nibble: u8) -> Self {
        match nibble {
            0 => Self::Normal,
            1 => Self::SpuriousSignal,
            2 => Self::MissingSignal,
            3 => Self::PassThroughSignal,
            other => Self::Unknown(other),
        }
    }
}

impl fmt::Display for DropSensorFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Normal => write!(f, "normal"),
            Self::SpuriousSignal => write!(f, "spurious signal while idle"),
            Self::MissingSignal => write!(f, "missing signal while disabled"),
            Self::PassThroughSignal => write!(f, "signal during pass-through"),
            Self::Unknown(v) => write!(f, "unknown ({:#x})", v),
        }
    }
}
