//! # DShot Packet Codec
//!
//! Maps normalized throttle and special commands onto 11-bit DShot values and
//! builds/validates 16-bit frames.
//!
//! ```text
//! bit  15 ........ 5 | 4         | 3 .. 0
//!      11-bit value  | telemetry | CRC4 over bits 15..4
//! ```

use super::crc::crc4;
use super::protocol::*;

/// Throttle and command encoder
///
/// The lowest transmitted throttle code is `48 + idle_offset`; code 0 is
/// never produced by throttle mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacketCodec {
    min_code: u16,
}

impl Default for PacketCodec {
    fn default() -> Self {
        Self {
            min_code: THROTTLE_MIN_CODE,
        }
    }
}

impl PacketCodec {
    /// Creates a codec with an idle offset in throttle codes above 48.
    ///
    /// The offset is clamped so that `min_code` stays within 48..=2047.
    #[must_use]
    pub fn with_idle_offset(idle_offset: u16) -> Self {
        let span = THROTTLE_MAX_CODE - THROTTLE_MIN_CODE;
        Self {
            min_code: THROTTLE_MIN_CODE + idle_offset.min(span),
        }
    }

    /// Creates a codec with a digital idle expressed as a percentage of the
    /// throttle span (0.0 to 20.0).
    ///
    /// # Examples
    ///
    /// ```
    /// use dshot_link::dshot::codec::PacketCodec;
    ///
    /// assert_eq!(PacketCodec::from_idle_percent(0.0).min_code(), 48);
    /// assert_eq!(PacketCodec::from_idle_percent(10.0).min_code(), 48 + 200);
    /// ```
    #[must_use]
    pub fn from_idle_percent(percent: f32) -> Self {
        let fraction = if percent.is_nan() {
            0.0
        } else {
            percent.clamp(0.0, 20.0) / 100.0
        };
        let span = f32::from(THROTTLE_MAX_CODE - THROTTLE_MIN_CODE);
        Self::with_idle_offset((fraction * span).round() as u16)
    }

    /// Lowest throttle code this codec emits
    #[must_use]
    pub fn min_code(&self) -> u16 {
        self.min_code
    }

    /// Map a normalized throttle to an 11-bit throttle code
    ///
    /// NaN and values ≤ 0 map to `min_code`, values ≥ 1 map to 2047. The
    /// result is monotonic nondecreasing in `x`.
    ///
    /// # Examples
    ///
    /// ```
    /// use dshot_link::dshot::codec::PacketCodec;
    ///
    /// let codec = PacketCodec::default();
    /// assert_eq!(codec.encode_throttle(0.0), 48);
    /// assert_eq!(codec.encode_throttle(1.0), 2047);
    /// assert_eq!(codec.encode_throttle(f32::NAN), 48);
    /// ```
    pub fn encode_throttle(&self, x: f32) -> u16 {
        if x.is_nan() || x <= 0.0 {
            return self.min_code;
        }
        let x = x.min(1.0);
        let span = f32::from(THROTTLE_MAX_CODE - self.min_code);
        let code = self.min_code + (x * span).round() as u16;
        code.clamp(self.min_code, THROTTLE_MAX_CODE)
    }

    /// Clamp a raw special command code to 0..=47
    pub fn encode_special(&self, code: u8) -> u16 {
        u16::from(code.min(SPECIAL_COMMAND_MAX))
    }
}

/// Build a 16-bit frame from an 11-bit value and the telemetry request flag
///
/// Bits above the 11-bit range are masked off.
///
/// # Examples
///
/// ```
/// use dshot_link::dshot::codec::build_frame;
///
/// let frame = build_frame(1046, false);
/// assert_eq!(frame >> 5, 1046);
/// assert_eq!(frame & 0x0F, 0x06);
/// ```
pub fn build_frame(value11: u16, telemetry: bool) -> u16 {
    let value12 = ((value11 & VALUE11_MASK) << 1) | u16::from(telemetry);
    (value12 << 4) | u16::from(crc4(value12))
}

/// Split a 16-bit frame into its 12-bit field and verify the CRC4
///
/// # Returns
///
/// * `Some((payload12, true))` when the checksum matches
/// * `None` on a checksum mismatch
pub fn decode_and_validate(frame: u16) -> Option<(u16, bool)> {
    let payload = frame >> 4;
    let received = (frame & 0x0F) as u8;
    if crc4(payload) != received {
        return None;
    }
    Some((payload, true))
}

/// 11-bit value carried by a frame
pub fn frame_value(frame: u16) -> u16 {
    frame >> 5
}

/// Telemetry request flag carried by a frame
pub fn frame_requests_telemetry(frame: u16) -> bool {
    frame & 0x10 != 0
}
