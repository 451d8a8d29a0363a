//! # Waveform Transcoder
//!
//! Converts frames to timed pulse pairs for transmission, and expands captured
//! run lengths back into the NRZI bit stream of a BDShot reply.
//!
//! Per-bit timing relative to the bit period `T`:
//!
//! ```text
//! logical 1: HIGH 0.75·T   then LOW 0.25·T
//! logical 0: HIGH 0.375·T  then LOW 0.625·T
//! ```
//!
//! Replies come back 25% faster, with a bit period of `4/5·T`.

use super::protocol::{DSHOT600_BIT_RATE, FRAME_BITS, MAX_CAPTURE_RUNS, REPLY_NRZI_BITS};

/// One transmitted bit: high time followed by low time, in peripheral ticks
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PulsePair {
    pub high_ticks: u16,
    pub low_ticks: u16,
}

/// Pulse sequence of one 16-bit frame, MSB first
pub type FramePulses = [PulsePair; FRAME_BITS];

/// Alternating high/low run lengths captured during one receive window
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunLengthSample {
    pub highs: Vec<u16>,
    pub lows: Vec<u16>,
}

impl RunLengthSample {
    /// Build a sample from (high, low) pairs, keeping at most 64 pairs
    pub fn from_pairs<I>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (u16, u16)>,
    {
        let (highs, lows) = pairs.into_iter().take(MAX_CAPTURE_RUNS).unzip();
        Self { highs, lows }
    }

    /// Number of complete run pairs
    pub fn len(&self) -> usize {
        self.highs.len().min(self.lows.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Tick counts derived once from the bit rate and peripheral clock
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaveformTiming {
    /// Ticks per command bit
    pub bit_ticks: u16,
    /// High time of a logical 1
    pub one_high: u16,
    /// High time of a logical 0
    pub zero_high: u16,
    /// Ticks per reply bit
    pub reply_bit_ticks: u16,
}

impl WaveformTiming {
    /// DShot600 timing for a given peripheral tick clock
    ///
    /// # Examples
    ///
    /// ```
    /// use dshot_link::dshot::waveform::WaveformTiming;
    ///
    /// // 80 MHz APB / 2 = 40 MHz, 25 ns per tick
    /// let t = WaveformTiming::dshot600(40_000_000);
    /// assert_eq!((t.bit_ticks, t.one_high, t.zero_high, t.reply_bit_ticks), (67, 50, 25, 53));
    /// ```
    pub fn dshot600(peripheral_clock_hz: u32) -> Self {
        Self::for_bit_rate(peripheral_clock_hz, DSHOT600_BIT_RATE)
    }

    fn for_bit_rate(clock_hz: u32, bit_rate: u32) -> Self {
        let ticks = (u64::from(clock_hz) + u64::from(bit_rate) / 2) / u64::from(bit_rate.max(1));
        let bit_ticks = ticks.clamp(2, u64::from(u16::MAX)) as u16;
        let bit = u32::from(bit_ticks);
        Self {
            bit_ticks,
            one_high: (bit * 3 / 4) as u16,
            zero_high: (bit * 3 / 8) as u16,
            reply_bit_ticks: (bit * 4 / 5) as u16,
        }
    }

    /// Low time of a logical 1
    pub fn one_low(&self) -> u16 {
        self.bit_ticks - self.one_high
    }

    /// Low time of a logical 0
    pub fn zero_low(&self) -> u16 {
        self.bit_ticks - self.zero_high
    }

    /// Convert a frame into 16 pulse pairs, MSB first
    pub fn frame_to_pulses(&self, frame: u16) -> FramePulses {
        let mut pulses = [PulsePair::default(); FRAME_BITS];
        for (i, pulse) in pulses.iter_mut().enumerate() {
            let bit = frame & (1 << (FRAME_BITS - 1 - i)) != 0;
            *pulse = if bit {
                PulsePair { high_ticks: self.one_high, low_ticks: self.one_low() }
            } else {
                PulsePair { high_ticks: self.zero_high, low_ticks: self.zero_low() }
            };
        }
        pulses
    }

    /// Frame duration in microseconds, rounded up
    pub fn frame_duration_us(&self, clock_hz: u32) -> u32 {
        let ticks = u64::from(self.bit_ticks) * FRAME_BITS as u64 * 1_000_000;
        ticks.div_ceil(u64::from(clock_hz.max(1))) as u32
    }
}

/// Recover a frame from 16 pulse pairs
///
/// A bit is 1 when its high part is longer than half its period.
pub fn pulses_to_frame(pulses: &[PulsePair]) -> Option<u16> {
    if pulses.len() != FRAME_BITS {
        return None;
    }
    let frame = pulses.iter().fold(0u16, |acc, p| {
        let total = u32::from(p.high_ticks) + u32::from(p.low_ticks);
        let bit = u32::from(p.high_ticks) * 2 > total;
        (acc << 1) | u16::from(bit)
    });
    Some(frame)
}

fn round_div(x: u16, d: u16) -> u32 {
    (u32::from(x) + u32::from(d) / 2) / u32::from(d)
}

/// Expand alternating run lengths into the 21-bit NRZI stream of a reply
///
/// Runs alternate starting with HIGH, whose logical level is 0 (the leading
/// synthetic bit). Each run contributes `round(run / reply_bit_ticks)` bits,
/// at least one. Collection stops at 21 bits; the first collected bit ends
/// up in bit 20 of the result.
///
/// # Returns
///
/// * `Ok(bits)` - the 21 NRZI bits
/// * `Err(collected)` - number of bits available when the runs ran out
pub fn expand_runs(highs: &[u16], lows: &[u16], reply_bit_ticks: u16) -> Result<u32, u32> {
    if reply_bit_ticks == 0 {
        return Err(0);
    }

    let mut nrzi = 0u32;
    let mut nbits = 0u32;
    let mut level = 0u32;

    for (&high, &low) in highs.iter().zip(lows.iter()) {
        for run in [high, low] {
            if nbits >= REPLY_NRZI_BITS {
                break;
            }
            let count = round_div(run, reply_bit_ticks).max(1);
            for _ in 0..count.min(REPLY_NRZI_BITS - nbits) {
                nrzi = (nrzi << 1) | level;
                nbits += 1;
            }
            level ^= 1;
        }
        if nbits >= REPLY_NRZI_BITS {
            break;
        }
    }

    if nbits < REPLY_NRZI_BITS {
        return Err(nbits);
    }
    Ok(nrzi)
}

/// Expand alternating run lengths into 21 NRZI bits, or `None` if too few
pub fn runs_to_bits(highs: &[u16], lows: &[u16], reply_bit_ticks: u16) -> Option<u32> {
    expand_runs(highs, lows, reply_bit_ticks).ok()
}
