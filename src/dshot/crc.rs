//! # DShot CRC4
//!
//! 4-bit checksum shared by command frames and BDShot replies.
//!
//! The protected field is the 12-bit value (11-bit command + telemetry flag,
//! or a 12-bit telemetry payload). The checksum is the XOR of its three nibbles.

/// Mask for the 12-bit protected field
pub const VALUE12_MASK: u16 = 0x0FFF;

/// Calculate the CRC4 of a 12-bit value
///
/// Bits above bit 11 are ignored.
///
/// # Examples
///
/// ```
/// use dshot_link::dshot::crc::crc4;
///
/// assert_eq!(crc4(0x123), 0x1 ^ 0x2 ^ 0x3);
/// ```
pub const fn crc4(value12: u16) -> u8 {
    let v = value12 & VALUE12_MASK;
    ((v ^ (v >> 4) ^ (v >> 8)) & 0x0F) as u8
}

/// Nibble-by-nibble CRC4 (slow, for verification)
#[allow(dead_code)]
fn crc4_slow(value12: u16) -> u8 {
    let mut v = value12 & VALUE12_MASK;
    let mut crc = 0u8;

    for _ in 0..3 {
        crc ^= (v & 0x0F) as u8;
        v >>= 4;
    }

    crc & 0x0F
}
