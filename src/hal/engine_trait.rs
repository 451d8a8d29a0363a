//! Trait abstraction for the one-wire waveform peripheral to enable testing

use crate::channel::ChannelIndex;
use crate::dshot::waveform::{PulsePair, RunLengthSample, WaveformTiming};
use crate::error::HwError;

/// Receive glitch filter in ticks (~250 ns at 40 MHz)
pub const RX_FILTER_TICKS: u16 = 10;

/// Receive idle threshold in ticks (~3 bit periods at DShot600)
pub const RX_IDLE_THRESHOLD_TICKS: u16 = 200;

/// Line level while idle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdleLevel {
    Low,
    High,
}

/// Physical line configuration handed to the engine at `begin()`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineConfig {
    /// Peripheral tick clock in Hz
    pub clock_hz: u32,

    /// Level driven between frames
    pub idle_level: IdleLevel,

    /// Open-drain output with pull-up, so the ESC can drive replies on the same pin
    pub open_drain: bool,

    /// Pulses shorter than this many ticks are ignored on receive
    pub rx_filter_ticks: u16,

    /// Line idle for this many ticks ends a capture
    pub rx_idle_threshold_ticks: u16,

    /// Derived bit timing
    pub timing: WaveformTiming,
}

impl LineConfig {
    /// DShot600 line for a given peripheral clock
    pub fn dshot600(clock_hz: u32, bidirectional: bool) -> Self {
        Self {
            clock_hz,
            idle_level: IdleLevel::Low,
            open_drain: bidirectional,
            rx_filter_ticks: RX_FILTER_TICKS,
            rx_idle_threshold_ticks: RX_IDLE_THRESHOLD_TICKS,
            timing: WaveformTiming::dshot600(clock_hz),
        }
    }
}

/// Trait for waveform peripheral operations
///
/// `transmit` blocks only for the physical duration of one frame.
/// `poll_capture` never blocks.
#[cfg_attr(test, mockall::automock)]
pub trait WaveformEngine: Send {
    /// Configure a channel as the transmitter for the line
    fn configure_tx(&mut self, channel: ChannelIndex, line: &LineConfig) -> Result<(), HwError>;

    /// Configure a channel as the receiver on the same line
    fn configure_rx(&mut self, channel: ChannelIndex, line: &LineConfig) -> Result<(), HwError>;

    /// Undo a channel configuration
    fn deconfigure(&mut self, channel: ChannelIndex);

    /// Send pulses and wait until they are on the wire
    fn transmit(&mut self, channel: ChannelIndex, pulses: &[PulsePair]) -> Result<(), HwError>;

    /// Start capturing on a receive channel
    fn begin_receive_window(&mut self, channel: ChannelIndex) -> Result<(), HwError>;

    /// Take a completed capture if one is available
    fn poll_capture(&mut self, channel: ChannelIndex) -> Option<RunLengthSample>;

    /// Stop capturing
    fn end_receive_window(&mut self, channel: ChannelIndex);
}
