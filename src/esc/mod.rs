//! # ESC Driver Module
//!
//! Driver interface shared by ESC protocols and the DShot600 link scheduler.
//!
//! ## Link States
//!
//! | State | Transmits |
//! |-------|-----------|
//! | Disarmed | nothing (one idle frame on disarm) |
//! | ArmedZero | idle code, throttle below the hysteresis band |
//! | ArmedActive | mapped throttle |
//!
//! ## Usage
//!
//! ```
//! use std::sync::Arc;
//! use dshot_link::channel::ChannelPool;
//! use dshot_link::esc::{EscDriver, EscLinkConfig, EscLinkScheduler};
//! use dshot_link::hal::{MonotonicClock, SimulatedEsc};
//!
//! let pool = Arc::new(ChannelPool::new(8));
//! let mut esc = EscLinkScheduler::new(
//!     SimulatedEsc::new(),
//!     MonotonicClock::new(),
//!     &pool,
//!     EscLinkConfig::default(),
//! );
//!
//! esc.begin()?;
//! esc.arm(true);
//! esc.write_normalized(0.25);
//! esc.end();
//! # Ok::<(), dshot_link::error::EscLinkError>(())
//! ```

pub mod scheduler;

pub use scheduler::{EscLinkConfig, EscLinkScheduler};

use crate::bdshot::TelemetryFrame;
use crate::error::Result;

/// Conservative command rate limit for DShot600
pub const DSHOT_MAX_RATE_HZ: u16 = 4000;

/// What a driver supports, so callers can discover optional features
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EscCapabilities {
    /// Driver can read telemetry back from the ESC
    pub bidirectional_telemetry: bool,

    /// ESC needs a throttle range calibration before use
    pub needs_calibration: bool,

    /// Highest sensible command update rate
    pub max_rate_hz: u16,
}

/// Arming and zero-throttle hysteresis folded into one state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LinkState {
    #[default]
    Disarmed,
    ArmedZero,
    ArmedActive,
}

impl LinkState {
    pub fn is_armed(&self) -> bool {
        !matches!(self, LinkState::Disarmed)
    }
}

/// Latest decoded telemetry, returned once per fresh update
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EscTelemetry {
    /// Mechanical RPM (eRPM / pole pairs), saturated at 65535
    pub rpm: u16,
    pub temperature_c: u8,
    pub millivolts: u32,
    pub milliamps: u32,

    /// Most recent frame that updated this snapshot
    pub last_frame: TelemetryFrame,
}

/// Capability-tagged ESC driver interface
///
/// Methods that send a frame return whether the frame went out. A `false`
/// covers every non-error refusal: not initialized, disarmed, or dropped by
/// the rate gate.
pub trait EscDriver {
    /// Acquire channels and configure the line
    fn begin(&mut self) -> Result<()>;

    /// Send idle, release every channel and return to Disarmed
    fn end(&mut self);

    fn caps(&self) -> EscCapabilities;

    fn arm(&mut self, on: bool);

    /// Command a throttle in 0.0..=1.0
    fn write_normalized(&mut self, x: f32) -> bool;

    /// Set the command rate; 0 is ignored
    fn set_update_rate(&mut self, rate_hz: u16);

    /// Take the telemetry snapshot if it changed since the last read
    fn read_telemetry(&mut self) -> Option<EscTelemetry>;

    /// Send a raw special command (0..=47)
    fn send_special(&mut self, code: u8) -> bool;

    /// Select normal or reversed spin direction
    fn set_direction(&mut self, reversed: bool) -> bool;
}
