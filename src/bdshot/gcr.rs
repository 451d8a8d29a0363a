//! # GCR Line Code
//!
//! 4-bit ↔ 5-bit Group Code Recording tables used by BDShot replies, and the
//! NRZI/run-length encoder that mirrors what an ESC puts on the wire.

use crate::dshot::protocol::REPLY_GCR_BITS;
use crate::dshot::waveform::RunLengthSample;

/// Marker for 5-bit codes with no 4-bit value
pub const GCR_INVALID: u8 = 0xFF;

/// 4-bit nibble → 5-bit GCR code
pub const GCR_ENCODE: [u8; 16] = [
    0x19, 0x1B, 0x12, 0x13, 0x1D, 0x15, 0x16, 0x17,
    0x1A, 0x09, 0x0A, 0x0B, 0x1E, 0x0D, 0x0E, 0x0F,
];

/// 5-bit GCR code → 4-bit nibble (`GCR_INVALID` for the 16 unused codes)
pub const GCR_DECODE: [u8; 32] = generate_gcr_decode_table();

/// Generate the decode table at compile time from the encode table
const fn generate_gcr_decode_table() -> [u8; 32] {
    let mut table = [GCR_INVALID; 32];
    let mut nibble = 0;

    while nibble < 16 {
        table[GCR_ENCODE[nibble] as usize] = nibble as u8;
        nibble += 1;
    }

    table
}

/// Look up a 5-bit code, `None` if it is not a valid GCR code
pub fn decode_group(code: u8) -> Option<u8> {
    match GCR_DECODE[(code & 0x1F) as usize] {
        GCR_INVALID => None,
        nibble => Some(nibble),
    }
}

/// Encode a 16-bit value as 20 GCR bits (four groups, most significant first)
pub fn encode_gcr(value16: u16) -> u32 {
    (0..4u16).rev().fold(0u32, |acc, shift| {
        let nibble = (value16 >> (shift * 4)) & 0x0F;
        (acc << 5) | u32::from(GCR_ENCODE[nibble as usize])
    })
}

/// Turn 20 GCR bits into the alternating run lengths an ESC transmits
///
/// The NRZI stream starts with a leading 0 and toggles on every GCR 1 bit.
/// Each run of equal levels becomes `run_bits × reply_bit_ticks` ticks, the
/// first run landing in the high slot. An odd trailing run is padded with a
/// one-bit low run.
pub fn gcr_to_runs(gcr20: u32, reply_bit_ticks: u16) -> RunLengthSample {
    let mut runs: Vec<u16> = Vec::new();
    let mut level = 0u32;
    let mut run_bits = 1u16;

    for k in 0..REPLY_GCR_BITS {
        let next = level ^ ((gcr20 >> (REPLY_GCR_BITS - 1 - k)) & 1);
        if next == level {
            run_bits += 1;
        } else {
            runs.push(run_bits);
            run_bits = 1;
            level = next;
        }
    }
    runs.push(run_bits);
    if runs.len() % 2 == 1 {
        runs.push(1);
    }

    RunLengthSample::from_pairs(
        runs.chunks(2)
            .map(|pair| (pair[0] * reply_bit_ticks, pair[1] * reply_bit_ticks)),
    )
}

/// Encode a 16-bit reply value into a capture sample
///
/// # Examples
///
/// ```
/// use dshot_link::bdshot::gcr::encode_reply;
/// use dshot_link::dshot::waveform::runs_to_bits;
///
/// let sample = encode_reply(0xFFF0, 53);
/// assert!(runs_to_bits(&sample.highs, &sample.lows, 53).is_some());
/// ```
pub fn encode_reply(value16: u16, reply_bit_ticks: u16) -> RunLengthSample {
    gcr_to_runs(encode_gcr(value16), reply_bit_ticks)
}
