//! # BDShot Reply Decoder
//!
//! Decodes ESC telemetry replies captured as run lengths.
//!
//! Pipeline:
//!
//! ```text
//! runs ─► 21 NRZI bits ─► 20 GCR bits ─► 4 × 5b→4b ─► payload12 + CRC4 ─► classify
//! ```
//!
//! Payload layouts (12 bits):
//!
//! ```text
//! eRPM: eee m mmmm mmmm   period_us = m << e, bit 8 (m MSB) = 1
//! EDT:  tttt 0... vvvv vvvv   t = type code, v = raw value, bit 8 = 0
//! ```

use tracing::trace;

use super::gcr::decode_group;
use crate::dshot::crc::crc4;
use crate::dshot::protocol::*;
use crate::dshot::waveform::expand_runs;
use crate::error::DecodeError;

/// Kind of a decoded telemetry frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TelemetryKind {
    Erpm,
    EdtTemperature,
    EdtVoltage,
    EdtCurrent,
    /// Any other EDT type code
    EdtOther(u8),
}

impl TelemetryKind {
    /// Short lowercase name, used in telemetry records
    pub fn as_str(&self) -> &'static str {
        match self {
            TelemetryKind::Erpm => "erpm",
            TelemetryKind::EdtTemperature => "temperature",
            TelemetryKind::EdtVoltage => "voltage",
            TelemetryKind::EdtCurrent => "current",
            TelemetryKind::EdtOther(_) => "other",
        }
    }
}

/// A successfully decoded BDShot reply
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TelemetryFrame {
    /// Frame classification
    pub kind: TelemetryKind,

    /// 12-bit payload
    pub payload: u16,

    /// 4-bit checksum received with the payload
    pub crc: u8,

    /// eRPM for `Erpm`, raw 8-bit value for EDT kinds
    pub value: u32,
}

impl TelemetryFrame {
    /// Classify a CRC-checked 12-bit payload
    pub fn classify(payload: u16, crc: u8) -> Self {
        let payload = payload & 0x0FFF;

        if payload & 0x100 == 0 {
            let type_code = (payload >> 8) as u8;
            let kind = match type_code {
                EDT_TYPE_TEMPERATURE => TelemetryKind::EdtTemperature,
                EDT_TYPE_VOLTAGE => TelemetryKind::EdtVoltage,
                EDT_TYPE_CURRENT => TelemetryKind::EdtCurrent,
                other => TelemetryKind::EdtOther(other),
            };
            return Self {
                kind,
                payload,
                crc,
                value: u32::from(payload & 0xFF),
            };
        }

        let exponent = (payload >> 9) & 0x7;
        let mantissa = u32::from(payload & 0x1FF);
        let period_us = mantissa.max(1) << exponent;
        Self {
            kind: TelemetryKind::Erpm,
            payload,
            crc,
            value: ERPM_PERIOD_NUMERATOR.checked_div(period_us).unwrap_or(0),
        }
    }

    /// eRPM if this is an eRPM frame
    pub fn erpm(&self) -> Option<u32> {
        match self.kind {
            TelemetryKind::Erpm => Some(self.value),
            _ => None,
        }
    }

    /// Raw EDT byte if this is an EDT frame
    pub fn edt_value(&self) -> Option<u8> {
        match self.kind {
            TelemetryKind::Erpm => None,
            _ => Some(self.value as u8),
        }
    }
}

/// Decode the 16-bit value carried by a reply (payload12 << 4 | CRC4)
fn decode_value16(highs: &[u16], lows: &[u16], reply_bit_ticks: u16) -> Result<u16, DecodeError> {
    let nrzi = expand_runs(highs, lows, reply_bit_ticks)
        .map_err(|collected| DecodeError::InsufficientBits { collected })?;

    // g[i] = nrzi[i] ^ nrzi[i-1]; masking drops the leading bit
    let gcr20 = (nrzi ^ (nrzi >> 1)) & ((1 << REPLY_GCR_BITS) - 1);

    let mut value16 = 0u16;
    for group in 0..4 {
        let code = ((gcr20 >> (15 - 5 * group)) & 0x1F) as u8;
        let nibble = decode_group(code).ok_or(DecodeError::InvalidGcr { group, code })?;
        value16 = (value16 << 4) | u16::from(nibble);
    }

    Ok(value16)
}

/// Decode a captured reply, reporting why it failed
///
/// # Errors
///
/// Returns error if:
/// - The runs do not cover 21 NRZI bits
/// - A 5-bit group is not a valid GCR code
/// - The CRC4 does not match the payload
pub fn decode_reply(
    highs: &[u16],
    lows: &[u16],
    reply_bit_ticks: u16,
) -> Result<TelemetryFrame, DecodeError> {
    let value16 = decode_value16(highs, lows, reply_bit_ticks)?;

    let payload = value16 >> 4;
    let received = (value16 & 0x0F) as u8;
    let expected = crc4(payload);
    if expected != received {
        return Err(DecodeError::CrcMismatch { expected, received });
    }

    Ok(TelemetryFrame::classify(payload, received))
}

/// Decode a captured reply, `None` on any structural failure
pub fn decode(highs: &[u16], lows: &[u16], reply_bit_ticks: u16) -> Option<TelemetryFrame> {
    match decode_reply(highs, lows, reply_bit_ticks) {
        Ok(frame) => Some(frame),
        Err(e) => {
            trace!("Dropped BDShot reply: {}", e);
            None
        }
    }
}

/// Build a 16-bit reply value (payload + CRC4) from a 12-bit payload
pub fn reply_value(payload12: u16) -> u16 {
    let payload = payload12 & 0x0FFF;
    (payload << 4) | u16::from(crc4(payload))
}

/// Encode an eRPM period as a 12-bit payload
///
/// The exponent is chosen so the mantissa has its MSB set, which is what
/// distinguishes eRPM from EDT frames. Periods below 256 µs or above
/// `511 << 7` µs cannot be expressed that way.
pub fn erpm_payload(period_us: u32) -> Option<u16> {
    (0..=7u32).find_map(|exponent| {
        let mantissa = period_us >> exponent;
        (0x100..=0x1FF)
            .contains(&mantissa)
            .then(|| ((exponent << 9) | mantissa) as u16)
    })
}

/// Build a 12-bit EDT payload from a type code and raw value
pub fn edt_payload(type_code: u8, value: u8) -> u16 {
    (u16::from(type_code & 0x0E) << 8) | u16::from(value)
}
