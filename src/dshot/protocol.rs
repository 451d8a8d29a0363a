//! # DShot Protocol Constants and Types
//!
//! Core protocol definitions for DShot600 and its bidirectional extension.

use crate::error::{EscLinkError, Result};

/// DShot600 bit rate in bits per second
pub const DSHOT600_BIT_RATE: u32 = 600_000;

/// Bits per command frame (11-bit value + telemetry flag + CRC4)
pub const FRAME_BITS: usize = 16;

/// Highest special command code
pub const SPECIAL_COMMAND_MAX: u8 = 47;

/// Lowest throttle code
pub const THROTTLE_MIN_CODE: u16 = 48;

/// Highest throttle code (11-bit)
pub const THROTTLE_MAX_CODE: u16 = 2047;

/// Mask for the 11-bit command value
pub const VALUE11_MASK: u16 = 0x07FF;

/// NRZI bits in a BDShot reply (1 leading bit + 20 GCR bits)
pub const REPLY_NRZI_BITS: u32 = 21;

/// GCR bits in a BDShot reply (four 5-bit groups)
pub const REPLY_GCR_BITS: u32 = 20;

/// Maximum run pairs kept from one receive window
pub const MAX_CAPTURE_RUNS: usize = 64;

/// Default mechanical pole pairs (14-pole motor)
pub const DEFAULT_POLE_PAIRS: u8 = 7;

/// One eRPM period unit in microseconds per minute
pub const ERPM_PERIOD_NUMERATOR: u32 = 60_000_000;

/// EDT type code: temperature in °C
pub const EDT_TYPE_TEMPERATURE: u8 = 0x2;

/// EDT type code: voltage in 0.25 V steps
pub const EDT_TYPE_VOLTAGE: u8 = 0x4;

/// EDT type code: current in 1 A steps
pub const EDT_TYPE_CURRENT: u8 = 0x6;

/// Named DShot special commands (codes 0-47)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpecialCommand {
    MotorStop,
    /// Beep tone 1-5
    Beep { count: u8 },
    EscInfo,
    SpinDirection1,
    SpinDirection2,
    Mode3d { enabled: bool },
    SaveSettings,
    ExtendedTelemetry { enabled: bool },
    /// Spin direction normal (`false`) or reversed (`true`)
    Reverse(bool),
    /// ESC LED 0-3 on/off
    Led { id: u8, enabled: bool },
}

impl TryFrom<SpecialCommand> for u8 {
    type Error = EscLinkError;

    fn try_from(command: SpecialCommand) -> Result<Self> {
        let code = match command {
            SpecialCommand::MotorStop => 0,
            SpecialCommand::Beep { count } => {
                if !(1..=5).contains(&count) {
                    return Err(EscLinkError::Command(format!(
                        "beep count {} outside 1-5",
                        count
                    )));
                }
                count
            }
            SpecialCommand::EscInfo => 6,
            SpecialCommand::SpinDirection1 => 7,
            SpecialCommand::SpinDirection2 => 8,
            SpecialCommand::Mode3d { enabled } => if enabled { 10 } else { 9 },
            SpecialCommand::SaveSettings => 12,
            SpecialCommand::ExtendedTelemetry { enabled } => if enabled { 13 } else { 14 },
            SpecialCommand::Reverse(reversed) => if reversed { 21 } else { 20 },
            SpecialCommand::Led { id, enabled } => {
                if id > 3 {
                    return Err(EscLinkError::Command(format!("LED id {} outside 0-3", id)));
                }
                let base = if enabled { 22 } else { 26 };
                base + id
            }
        };
        Ok(code)
    }
}
