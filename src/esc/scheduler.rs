//! # DShot600 Link Scheduler
//!
//! Drives one ESC over a [`WaveformEngine`]: arming, zero-throttle
//! hysteresis, a fire-or-drop rate gate, periodic BDShot telemetry windows
//! and a consume-on-read telemetry cache.
//!
//! The scheduler owns no thread. Every call either sends one frame or
//! returns immediately.

use std::sync::Arc;

use tracing::{debug, info, trace, warn};

use super::{EscCapabilities, EscDriver, EscTelemetry, LinkState, DSHOT_MAX_RATE_HZ};
use crate::bdshot::{decode_reply, TelemetryFrame, TelemetryKind};
use crate::channel::{ChannelIndex, ChannelLease, ChannelPool};
use crate::config::Config;
use crate::dshot::codec::{build_frame, PacketCodec};
use crate::dshot::protocol::{SpecialCommand, DEFAULT_POLE_PAIRS};
use crate::error::{EscLinkError, Result};
use crate::hal::{Clock, LineConfig, WaveformEngine};

/// Leave the zero state at or above this throttle
pub const ZERO_EXIT_THRESHOLD: f32 = 0.04;

/// Return to the zero state at or below this throttle
pub const ZERO_ENTER_THRESHOLD: f32 = 0.02;

/// Shortest allowed command period
pub const MIN_PERIOD_US: u64 = 100;

/// Default command period (2 kHz)
pub const DEFAULT_PERIOD_US: u64 = 500;

/// Settings for one ESC link
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EscLinkConfig {
    /// Open-drain line with a receive channel for BDShot replies
    pub bidirectional: bool,
    pub update_rate_hz: u16,
    pub pole_pairs: u8,
    /// Request telemetry on every Nth transmitted throttle frame
    pub telemetry_request_divisor: u8,
    /// Sent in the zero state and on disarm
    pub idle_code: u16,
    pub digital_idle_percent: f32,
    pub peripheral_clock_hz: u32,
    pub millivolts_per_lsb: u32,
    pub milliamps_per_lsb: u32,
}

impl Default for EscLinkConfig {
    fn default() -> Self {
        Self::from(&Config::default())
    }
}

impl From<&Config> for EscLinkConfig {
    fn from(config: &Config) -> Self {
        Self {
            bidirectional: config.esc.bidirectional,
            update_rate_hz: config.esc.update_rate_hz,
            pole_pairs: config.esc.pole_pairs,
            telemetry_request_divisor: config.esc.telemetry_request_divisor,
            idle_code: config.esc.idle_code,
            digital_idle_percent: config.esc.digital_idle_percent,
            peripheral_clock_hz: config.timing.peripheral_clock_hz,
            millivolts_per_lsb: config.calibration.millivolts_per_lsb,
            milliamps_per_lsb: config.calibration.milliamps_per_lsb,
        }
    }
}

/// Command period for an update rate, `None` for a rate of 0
fn period_for_rate(rate_hz: u16) -> Option<u64> {
    if rate_hz == 0 {
        return None;
    }
    Some((1_000_000 / u64::from(rate_hz)).max(MIN_PERIOD_US))
}

/// Decoded values accumulated across replies
#[derive(Debug, Clone, Default)]
struct TelemetryCache {
    rpm: u16,
    temperature_c: u8,
    millivolts: u32,
    milliamps: u32,
    last_frame: Option<TelemetryFrame>,
    fresh: bool,
}

impl TelemetryCache {
    fn update(&mut self, frame: TelemetryFrame, pole_pairs: u8, config: &EscLinkConfig) {
        match frame.kind {
            TelemetryKind::Erpm => {
                let rpm = frame.value / u32::from(pole_pairs.max(1));
                self.rpm = rpm.min(u32::from(u16::MAX)) as u16;
            }
            TelemetryKind::EdtTemperature => self.temperature_c = frame.value as u8,
            TelemetryKind::EdtVoltage => {
                self.millivolts = frame.value.saturating_mul(config.millivolts_per_lsb);
            }
            TelemetryKind::EdtCurrent => {
                self.milliamps = frame.value.saturating_mul(config.milliamps_per_lsb);
            }
            TelemetryKind::EdtOther(type_code) => {
                trace!("Ignoring EDT frame with type 0x{:X}", type_code);
                return;
            }
        }
        self.last_frame = Some(frame);
        self.fresh = true;
    }

    fn take(&mut self) -> Option<EscTelemetry> {
        if !self.fresh {
            return None;
        }
        self.fresh = false;
        Some(EscTelemetry {
            rpm: self.rpm,
            temperature_c: self.temperature_c,
            millivolts: self.millivolts,
            milliamps: self.milliamps,
            last_frame: self.last_frame?,
        })
    }
}

/// DShot600 driver for one ESC line
pub struct EscLinkScheduler<E: WaveformEngine, C: Clock> {
    engine: E,
    clock: C,
    tx: ChannelLease,
    rx: ChannelLease,
    config: EscLinkConfig,
    codec: PacketCodec,
    line: LineConfig,
    state: LinkState,
    initialized: bool,
    period_us: u64,
    next_due_us: u64,
    telemetry_counter: u8,
    pole_pairs: u8,
    cache: TelemetryCache,
}

impl<E: WaveformEngine, C: Clock> EscLinkScheduler<E, C> {
    /// Create an uninitialized link; channels are taken from `pool` on `begin()`
    pub fn new(engine: E, clock: C, pool: &Arc<ChannelPool>, config: EscLinkConfig) -> Self {
        let pole_pairs = if config.pole_pairs == 0 {
            DEFAULT_POLE_PAIRS
        } else {
            config.pole_pairs
        };

        Self {
            engine,
            clock,
            tx: ChannelLease::new(pool),
            rx: ChannelLease::new(pool),
            codec: PacketCodec::from_idle_percent(config.digital_idle_percent),
            line: LineConfig::dshot600(config.peripheral_clock_hz, config.bidirectional),
            state: LinkState::Disarmed,
            initialized: false,
            period_us: period_for_rate(config.update_rate_hz).unwrap_or(DEFAULT_PERIOD_US),
            next_due_us: 0,
            telemetry_counter: 0,
            pole_pairs,
            cache: TelemetryCache::default(),
            config,
        }
    }

    pub fn state(&self) -> LinkState {
        self.state
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    pub fn period_us(&self) -> u64 {
        self.period_us
    }

    /// Time one frame occupies the line
    pub fn frame_duration_us(&self) -> u32 {
        self.line.timing.frame_duration_us(self.line.clock_hz)
    }

    pub fn pole_pairs(&self) -> u8 {
        self.pole_pairs
    }

    /// Transmit channel index while initialized
    pub fn tx_channel(&self) -> Option<ChannelIndex> {
        self.tx.index()
    }

    /// Receive channel index while initialized in bidirectional mode
    pub fn rx_channel(&self) -> Option<ChannelIndex> {
        self.rx.index()
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    /// Set motor pole pairs used for eRPM to RPM conversion (0 selects 7)
    pub fn set_pole_pairs(&mut self, pole_pairs: u8) {
        self.pole_pairs = if pole_pairs == 0 {
            DEFAULT_POLE_PAIRS
        } else {
            pole_pairs
        };
    }

    /// Send a named special command
    ///
    /// Commands with invalid parameters are logged and not sent.
    pub fn send_command(&mut self, command: SpecialCommand) -> bool {
        match u8::try_from(command) {
            Ok(code) => self.send_special(code),
            Err(e) => {
                warn!("{}", e);
                false
            }
        }
    }

    fn acquire(lease: &mut ChannelLease) -> Result<ChannelIndex> {
        lease.acquire_any();
        lease.index().ok_or(EscLinkError::ResourceExhausted)
    }

    fn setup_channels(&mut self) -> Result<()> {
        let tx = Self::acquire(&mut self.tx)?;
        if let Err(e) = self.engine.configure_tx(tx, &self.line) {
            self.tx.release();
            return Err(EscLinkError::HardwareConfig(e));
        }

        if !self.config.bidirectional {
            return Ok(());
        }

        let rx = match Self::acquire(&mut self.rx) {
            Ok(rx) => rx,
            Err(e) => {
                self.engine.deconfigure(tx);
                self.tx.release();
                return Err(e);
            }
        };
        if let Err(e) = self.engine.configure_rx(rx, &self.line) {
            self.engine.deconfigure(tx);
            self.tx.release();
            self.rx.release();
            return Err(EscLinkError::HardwareConfig(e));
        }
        Ok(())
    }

    fn release_channels(&mut self) {
        for lease in [&mut self.rx, &mut self.tx] {
            if let Some(index) = lease.index() {
                self.engine.deconfigure(index);
                lease.release();
            }
        }
    }

    /// Fire-or-drop gate: `true` and re-armed if a frame may go out now
    fn rate_gate(&mut self) -> bool {
        let now = self.clock.now_us();
        if now < self.next_due_us {
            return false;
        }
        self.next_due_us = now + self.period_us;
        true
    }

    fn next_state(&self, x: f32) -> LinkState {
        match self.state {
            LinkState::ArmedZero if x >= ZERO_EXIT_THRESHOLD => LinkState::ArmedActive,
            LinkState::ArmedActive if x <= ZERO_ENTER_THRESHOLD => LinkState::ArmedZero,
            state => state,
        }
    }

    fn transmit(&mut self, value: u16, telemetry: bool) -> bool {
        let Some(tx) = self.tx.index() else {
            return false;
        };
        let frame = build_frame(value, telemetry);
        let pulses = self.line.timing.frame_to_pulses(frame);

        match self.engine.transmit(tx, &pulses) {
            Ok(()) => {
                trace!("Sent DShot frame 0x{:04X} (value {}, tlm {})", frame, value, telemetry);
                true
            }
            Err(e) => {
                warn!("{}", EscLinkError::Transmit(e));
                false
            }
        }
    }

    /// Idle frame outside the rate gate; the gate restarts from this send
    fn send_idle(&mut self) -> bool {
        self.next_due_us = self.clock.now_us() + self.period_us;
        self.transmit(self.config.idle_code, false)
    }

    fn collect_telemetry(&mut self) {
        let Some(rx) = self.rx.index() else {
            return;
        };

        if let Err(e) = self.engine.begin_receive_window(rx) {
            debug!("Could not open receive window on channel {}: {}", rx, e);
            return;
        }

        if let Some(sample) = self.engine.poll_capture(rx) {
            let ticks = self.line.timing.reply_bit_ticks;
            match decode_reply(&sample.highs, &sample.lows, ticks) {
                Ok(frame) => {
                    debug!("Telemetry {} = {}", frame.kind.as_str(), frame.value);
                    self.cache.update(frame, self.pole_pairs, &self.config);
                }
                Err(e) => debug!("Dropped telemetry reply: {}", EscLinkError::from(e)),
            }
        }

        self.engine.end_receive_window(rx);
    }
}

impl<E: WaveformEngine, C: Clock> EscDriver for EscLinkScheduler<E, C> {
    fn begin(&mut self) -> Result<()> {
        if self.initialized {
            return Ok(());
        }

        self.setup_channels()?;

        self.initialized = true;
        self.state = LinkState::Disarmed;
        self.telemetry_counter = 0;
        self.next_due_us = self.clock.now_us();
        info!(
            "DShot600 link up on tx channel {:?}, rx channel {:?}, {} us period, {} us frames",
            self.tx.index(),
            self.rx.index(),
            self.period_us,
            self.frame_duration_us()
        );
        Ok(())
    }

    fn end(&mut self) {
        if !self.initialized {
            return;
        }

        self.send_idle();
        self.release_channels();
        self.state = LinkState::Disarmed;
        self.initialized = false;
        self.next_due_us = 0;
        self.telemetry_counter = 0;
        self.cache = TelemetryCache::default();
        info!("DShot600 link released");
    }

    fn caps(&self) -> EscCapabilities {
        EscCapabilities {
            bidirectional_telemetry: self.config.bidirectional,
            needs_calibration: false,
            max_rate_hz: DSHOT_MAX_RATE_HZ,
        }
    }

    fn arm(&mut self, on: bool) {
        if on {
            if self.state == LinkState::Disarmed {
                self.state = LinkState::ArmedZero;
                info!("ESC armed");
            }
            return;
        }

        if self.state.is_armed() {
            info!("ESC disarmed");
        }
        self.state = LinkState::Disarmed;
        if self.initialized {
            self.send_idle();
        }
    }

    fn write_normalized(&mut self, x: f32) -> bool {
        if !self.initialized || !self.state.is_armed() {
            return false;
        }

        let x = if x.is_nan() { 0.0 } else { x.clamp(0.0, 1.0) };
        let state = self.next_state(x);
        if state != self.state {
            debug!("Throttle state {:?} -> {:?} at {:.3}", self.state, state, x);
            self.state = state;
        }

        if !self.rate_gate() {
            return false;
        }

        self.telemetry_counter = self.telemetry_counter.saturating_add(1);
        let request = self.telemetry_counter >= self.config.telemetry_request_divisor;
        if request {
            self.telemetry_counter = 0;
        }

        let value = match self.state {
            LinkState::ArmedActive => self.codec.encode_throttle(x),
            _ => self.config.idle_code,
        };

        if !self.transmit(value, request) {
            return false;
        }

        if request {
            self.collect_telemetry();
        }
        true
    }

    fn set_update_rate(&mut self, rate_hz: u16) {
        if let Some(period_us) = period_for_rate(rate_hz) {
            self.period_us = period_us;
            debug!("Update rate {} Hz, period {} us", rate_hz, period_us);
        }
    }

    fn read_telemetry(&mut self) -> Option<EscTelemetry> {
        self.cache.take()
    }

    fn send_special(&mut self, code: u8) -> bool {
        if !self.initialized || !self.state.is_armed() {
            return false;
        }
        if !self.rate_gate() {
            return false;
        }
        let value = self.codec.encode_special(code);
        self.transmit(value, false)
    }

    fn set_direction(&mut self, reversed: bool) -> bool {
        self.send_command(SpecialCommand::Reverse(reversed))
    }
}

impl<E: WaveformEngine, C: Clock> Drop for EscLinkScheduler<E, C> {
    fn drop(&mut self) {
        self.end();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bdshot::decoder::{edt_payload, erpm_payload, reply_value};
    use crate::bdshot::gcr::encode_reply;
    use crate::dshot::codec::{frame_requests_telemetry, frame_value};
    use crate::dshot::protocol::{EDT_TYPE_CURRENT, EDT_TYPE_TEMPERATURE, EDT_TYPE_VOLTAGE};
    use crate::dshot::waveform::RunLengthSample;
    use crate::error::HwError;
    use crate::hal::clock::mocks::ManualClock;
    use crate::hal::engine_trait::mocks::RecordingEngine;
    use crate::hal::engine_trait::MockWaveformEngine;

    const TICKS: u16 = 53;

    type TestLink = EscLinkScheduler<RecordingEngine, ManualClock>;

    fn link_config() -> EscLinkConfig {
        EscLinkConfig {
            telemetry_request_divisor: 1,
            ..EscLinkConfig::default()
        }
    }

    fn setup(config: EscLinkConfig) -> (TestLink, RecordingEngine, ManualClock, Arc<ChannelPool>) {
        let engine = RecordingEngine::new();
        let clock = ManualClock::new();
        let pool = Arc::new(ChannelPool::new(8));
        let link = EscLinkScheduler::new(engine.clone(), clock.clone(), &pool, config);
        (link, engine, clock, pool)
    }

    fn armed(config: EscLinkConfig) -> (TestLink, RecordingEngine, ManualClock, Arc<ChannelPool>) {
        let (mut link, engine, clock, pool) = setup(config);
        link.begin().unwrap();
        link.arm(true);
        (link, engine, clock, pool)
    }

    fn erpm_reply(period_us: u32) -> RunLengthSample {
        encode_reply(reply_value(erpm_payload(period_us).unwrap()), TICKS)
    }

    fn edt_reply(type_code: u8, value: u8) -> RunLengthSample {
        encode_reply(reply_value(edt_payload(type_code, value)), TICKS)
    }

    #[test]
    fn test_begin_acquires_tx_and_rx() {
        let (mut link, engine, _clock, pool) = setup(link_config());
        link.begin().unwrap();

        assert!(link.is_initialized());
        assert_eq!(link.state(), LinkState::Disarmed);
        assert_eq!(pool.count_free(), 6);
        let tx = link.tx_channel().unwrap();
        let rx = link.rx_channel().unwrap();
        assert_ne!(tx, rx);
        assert_eq!(engine.configured_channels(), vec![(tx, false), (rx, true)]);
    }

    #[test]
    fn test_begin_unidirectional_uses_one_channel() {
        let config = EscLinkConfig {
            bidirectional: false,
            ..link_config()
        };
        let (mut link, engine, _clock, pool) = setup(config);
        link.begin().unwrap();

        assert_eq!(pool.count_free(), 7);
        assert_eq!(link.rx_channel(), None);
        assert_eq!(engine.configured_channels().len(), 1);
        assert!(!link.caps().bidirectional_telemetry);
    }

    #[test]
    fn test_begin_is_idempotent() {
        let (mut link, engine, _clock, pool) = setup(link_config());
        link.begin().unwrap();
        link.begin().unwrap();
        assert_eq!(pool.count_free(), 6);
        assert_eq!(engine.configured_channels().len(), 2);
    }

    #[test]
    fn test_begin_on_exhausted_pool() {
        let pool = Arc::new(ChannelPool::new(0));
        let mut link = EscLinkScheduler::new(
            RecordingEngine::new(),
            ManualClock::new(),
            &pool,
            link_config(),
        );
        assert!(matches!(link.begin(), Err(EscLinkError::ResourceExhausted)));
        assert!(!link.is_initialized());
    }

    #[test]
    fn test_begin_without_rx_channel_releases_tx() {
        let engine = RecordingEngine::new();
        let pool = Arc::new(ChannelPool::new(1));
        let mut link = EscLinkScheduler::new(engine.clone(), ManualClock::new(), &pool, link_config());

        assert!(matches!(link.begin(), Err(EscLinkError::ResourceExhausted)));
        assert_eq!(pool.count_free(), 1);
        assert!(engine.configured_channels().is_empty());
        assert_eq!(link.tx_channel(), None);
    }

    #[test]
    fn test_begin_configure_failure_releases_channels() {
        let (mut link, engine, _clock, pool) = setup(link_config());
        engine.set_configure_error(HwError::Rejected("no pin".to_string()));

        let result = link.begin();
        assert!(matches!(result, Err(EscLinkError::HardwareConfig(HwError::Rejected(_)))));
        assert_eq!(pool.count_free(), 8);
        assert!(!link.is_initialized());
    }

    #[test]
    fn test_rx_configure_failure_deconfigures_tx() {
        let mut engine = MockWaveformEngine::new();
        engine.expect_configure_tx().times(1).returning(|_, _| Ok(()));
        engine
            .expect_configure_rx()
            .times(1)
            .returning(|channel, _| Err(HwError::Busy(channel)));
        engine.expect_deconfigure().withf(|&channel| channel == 0).times(1).return_const(());
        engine.expect_transmit().never();

        let pool = Arc::new(ChannelPool::new(4));
        let mut link = EscLinkScheduler::new(engine, ManualClock::new(), &pool, link_config());

        let result = link.begin();
        assert!(matches!(result, Err(EscLinkError::HardwareConfig(HwError::Busy(1)))));
        assert_eq!(pool.count_free(), 4);
    }

    #[test]
    fn test_write_requires_begin_and_arm() {
        let (mut link, engine, _clock, _pool) = setup(link_config());
        link.arm(true);
        assert!(!link.write_normalized(0.5), "not initialized");

        link.begin().unwrap();
        link.arm(false);
        assert_eq!(engine.sent_frames().len(), 1, "disarm sends idle");
        assert!(!link.write_normalized(0.5), "disarmed");
        assert_eq!(engine.sent_frames().len(), 1);
    }

    #[test]
    fn test_hysteresis_stays_zero() {
        let (mut link, _engine, clock, _pool) = armed(link_config());
        for x in [0.01, 0.03, 0.01] {
            link.write_normalized(x);
            assert_eq!(link.state(), LinkState::ArmedZero, "x = {}", x);
            clock.advance(link.period_us());
        }
    }

    #[test]
    fn test_hysteresis_enter_and_exit() {
        let (mut link, _engine, clock, _pool) = armed(link_config());
        let expected = [
            (0.01, LinkState::ArmedZero),
            (0.05, LinkState::ArmedActive),
            (0.03, LinkState::ArmedActive),
            (0.02, LinkState::ArmedZero),
        ];
        for (x, state) in expected {
            link.write_normalized(x);
            assert_eq!(link.state(), state, "x = {}", x);
            clock.advance(link.period_us());
        }
    }

    #[test]
    fn test_hysteresis_updates_even_when_rate_limited() {
        let (mut link, engine, _clock, _pool) = armed(link_config());
        assert!(link.write_normalized(0.0));
        assert!(!link.write_normalized(0.5));
        assert_eq!(link.state(), LinkState::ArmedActive);
        assert_eq!(engine.sent_frames().len(), 1);
    }

    #[test]
    fn test_zero_state_sends_idle_code() {
        let (mut link, engine, clock, _pool) = armed(link_config());
        link.write_normalized(0.03);
        clock.advance(link.period_us());
        link.write_normalized(f32::NAN);
        clock.advance(link.period_us());
        link.write_normalized(-3.0);

        let values: Vec<u16> = engine.sent_frames().into_iter().map(frame_value).collect();
        assert_eq!(values, vec![48, 48, 48]);
    }

    #[test]
    fn test_active_state_sends_mapped_throttle() {
        let (mut link, engine, clock, _pool) = armed(link_config());
        link.write_normalized(0.5);
        clock.advance(link.period_us());
        link.write_normalized(7.0);

        let values: Vec<u16> = engine.sent_frames().into_iter().map(frame_value).collect();
        assert_eq!(values, vec![PacketCodec::default().encode_throttle(0.5), 2047]);
    }

    #[test]
    fn test_custom_idle_code() {
        let config = EscLinkConfig {
            idle_code: 0,
            ..link_config()
        };
        let (mut link, engine, _clock, _pool) = armed(config);
        link.write_normalized(0.0);
        assert_eq!(frame_value(engine.sent_frames()[0]), 0);
    }

    #[test]
    fn test_digital_idle_raises_min_throttle() {
        let config = EscLinkConfig {
            digital_idle_percent: 10.0,
            ..link_config()
        };
        let (mut link, engine, _clock, _pool) = armed(config);
        link.write_normalized(0.04);
        assert!(frame_value(engine.sent_frames()[0]) >= 248);
    }

    #[test]
    fn test_two_writes_within_period_send_one_frame() {
        let (mut link, engine, clock, _pool) = armed(link_config());
        assert!(link.write_normalized(0.5));
        clock.advance(link.period_us() - 1);
        assert!(!link.write_normalized(0.5));
        assert_eq!(engine.sent_frames().len(), 1);

        clock.advance(1);
        assert!(link.write_normalized(0.5));
        assert_eq!(engine.sent_frames().len(), 2);
    }

    #[test]
    fn test_telemetry_requested_every_nth_frame() {
        let config = EscLinkConfig {
            telemetry_request_divisor: 4,
            ..link_config()
        };
        let (mut link, engine, clock, _pool) = armed(config);
        for _ in 0..8 {
            assert!(link.write_normalized(0.3));
            clock.advance(link.period_us());
        }

        let requests: Vec<bool> = engine
            .sent_frames()
            .into_iter()
            .map(frame_requests_telemetry)
            .collect();
        assert_eq!(requests, vec![false, false, false, true, false, false, false, true]);
        assert_eq!(*engine.windows_opened.lock().unwrap(), 2);
        assert_eq!(*engine.windows_closed.lock().unwrap(), 2);
    }

    #[test]
    fn test_default_divisor_is_32() {
        let (mut link, engine, clock, _pool) = armed(EscLinkConfig::default());
        for _ in 0..32 {
            link.write_normalized(0.3);
            clock.advance(link.period_us());
        }
        let frames = engine.sent_frames();
        assert_eq!(frames.len(), 32);
        assert!(frames[..31].iter().all(|&f| !frame_requests_telemetry(f)));
        assert!(frame_requests_telemetry(frames[31]));
    }

    #[test]
    fn test_no_receive_window_without_rx_channel() {
        let config = EscLinkConfig {
            bidirectional: false,
            ..link_config()
        };
        let (mut link, engine, _clock, _pool) = armed(config);
        engine.queue_capture(erpm_reply(1428));
        assert!(link.write_normalized(0.3));
        assert!(frame_requests_telemetry(engine.sent_frames()[0]));
        assert_eq!(*engine.windows_opened.lock().unwrap(), 0);
        assert!(link.read_telemetry().is_none());
    }

    #[test]
    fn test_erpm_reply_updates_rpm() {
        let (mut link, engine, _clock, _pool) = armed(link_config());
        engine.queue_capture(erpm_reply(1428));
        assert!(link.write_normalized(0.3));

        let telemetry = link.read_telemetry().unwrap();
        // 60e6 / 1428 = 42016 eRPM over 7 pole pairs
        assert_eq!(telemetry.rpm, 6002);
        assert_eq!(telemetry.last_frame.kind, TelemetryKind::Erpm);
        assert_eq!(telemetry.last_frame.value, 42016);
    }

    #[test]
    fn test_read_telemetry_consumes() {
        let (mut link, engine, _clock, _pool) = armed(link_config());
        engine.queue_capture(erpm_reply(1428));
        link.write_normalized(0.3);

        assert!(link.read_telemetry().is_some());
        assert!(link.read_telemetry().is_none());
    }

    #[test]
    fn test_edt_replies_use_calibration() {
        let config = EscLinkConfig {
            millivolts_per_lsb: 100,
            ..link_config()
        };
        let (mut link, engine, clock, _pool) = armed(config);
        engine.queue_capture(edt_reply(EDT_TYPE_TEMPERATURE, 45));
        engine.queue_capture(edt_reply(EDT_TYPE_VOLTAGE, 168));
        engine.queue_capture(edt_reply(EDT_TYPE_CURRENT, 12));
        for _ in 0..3 {
            link.write_normalized(0.3);
            clock.advance(link.period_us());
        }

        let telemetry = link.read_telemetry().unwrap();
        assert_eq!(telemetry.temperature_c, 45);
        assert_eq!(telemetry.millivolts, 16_800);
        assert_eq!(telemetry.milliamps, 12_000);
        assert_eq!(telemetry.last_frame.kind, TelemetryKind::EdtCurrent);
    }

    #[test]
    fn test_unknown_edt_is_not_fresh() {
        let (mut link, engine, _clock, _pool) = armed(link_config());
        engine.queue_capture(edt_reply(0x8, 3));
        link.write_normalized(0.3);
        assert!(link.read_telemetry().is_none());
    }

    #[test]
    fn test_decode_failure_keeps_cache() {
        let (mut link, engine, clock, _pool) = armed(link_config());
        engine.queue_capture(erpm_reply(1428));
        link.write_normalized(0.3);
        clock.advance(link.period_us());

        engine.queue_capture(RunLengthSample::from_pairs([(53, 53), (53, 53)]));
        link.write_normalized(0.3);

        let telemetry = link.read_telemetry().unwrap();
        assert_eq!(telemetry.rpm, 6002);

        clock.advance(link.period_us());
        let mut corrupt = erpm_reply(1428);
        corrupt.highs.truncate(2);
        corrupt.lows.truncate(2);
        engine.queue_capture(corrupt);
        link.write_normalized(0.3);
        assert!(link.read_telemetry().is_none());
    }

    #[test]
    fn test_missing_capture_closes_window() {
        let (mut link, engine, _clock, _pool) = armed(link_config());
        assert!(link.write_normalized(0.3));
        assert_eq!(*engine.windows_opened.lock().unwrap(), 1);
        assert_eq!(*engine.windows_closed.lock().unwrap(), 1);
        assert!(link.read_telemetry().is_none());
    }

    #[test]
    fn test_pole_pairs_conversion() {
        let config = link_config();
        let mut cache = TelemetryCache::default();
        let frame = TelemetryFrame {
            kind: TelemetryKind::Erpm,
            payload: 0,
            crc: 0,
            value: 42_000,
        };
        cache.update(frame, 7, &config);
        assert_eq!(cache.take().unwrap().rpm, 6000);

        let fast = TelemetryFrame { value: 60_000_000, ..frame };
        cache.update(fast, 1, &config);
        assert_eq!(cache.take().unwrap().rpm, u16::MAX);
    }

    #[test]
    fn test_set_pole_pairs_zero_selects_default() {
        let (mut link, _engine, _clock, _pool) = setup(link_config());
        link.set_pole_pairs(12);
        assert_eq!(link.pole_pairs(), 12);
        link.set_pole_pairs(0);
        assert_eq!(link.pole_pairs(), 7);
    }

    #[test]
    fn test_transmit_failure_returns_false() {
        let (mut link, engine, _clock, _pool) = armed(link_config());
        engine.set_transmit_error(HwError::Busy(0));
        assert!(!link.write_normalized(0.5));
        assert_eq!(*engine.windows_opened.lock().unwrap(), 0);
    }

    #[test]
    fn test_transmit_failure_with_mock_engine() {
        let mut engine = MockWaveformEngine::new();
        engine.expect_configure_tx().returning(|_, _| Ok(()));
        engine.expect_deconfigure().return_const(());
        engine
            .expect_transmit()
            .returning(|channel, _| Err(HwError::Busy(channel)));
        engine.expect_begin_receive_window().never();

        let config = EscLinkConfig {
            bidirectional: false,
            ..link_config()
        };
        let pool = Arc::new(ChannelPool::new(2));
        let mut link = EscLinkScheduler::new(engine, ManualClock::new(), &pool, config);
        link.begin().unwrap();
        link.arm(true);
        assert!(!link.write_normalized(0.5));
        link.end();
        assert_eq!(pool.count_free(), 2);
    }

    #[test]
    fn test_disarm_sends_idle_and_rearms_gate() {
        let (mut link, engine, _clock, _pool) = armed(link_config());
        assert!(link.write_normalized(0.8));
        link.arm(false);

        let frames = engine.sent_frames();
        assert_eq!(frames.len(), 2);
        assert_eq!(frame_value(frames[1]), 48);
        assert!(!frame_requests_telemetry(frames[1]));
        assert_eq!(link.state(), LinkState::Disarmed);

        link.arm(true);
        assert_eq!(link.state(), LinkState::ArmedZero);
        assert!(!link.write_normalized(0.8), "gate restarted by disarm");
    }

    #[test]
    fn test_arm_twice_keeps_state() {
        let (mut link, _engine, _clock, _pool) = armed(link_config());
        link.write_normalized(0.5);
        assert_eq!(link.state(), LinkState::ArmedActive);
        link.arm(true);
        assert_eq!(link.state(), LinkState::ArmedActive);
    }

    #[test]
    fn test_end_releases_everything() {
        let (mut link, engine, clock, pool) = armed(link_config());
        link.write_normalized(0.5);
        clock.advance(1);
        link.end();

        assert!(!link.is_initialized());
        assert_eq!(link.state(), LinkState::Disarmed);
        assert_eq!(pool.count_free(), 8);
        assert!(engine.configured_channels().is_empty());
        assert_eq!(frame_value(*engine.sent_frames().last().unwrap()), 48);
        assert!(!link.write_normalized(0.5));

        link.end();
        assert_eq!(engine.sent_frames().len(), 2);
    }

    #[test]
    fn test_end_discards_cached_telemetry() {
        let (mut link, engine, _clock, _pool) = armed(link_config());
        engine.queue_capture(erpm_reply(1428));
        assert!(link.write_normalized(0.3));

        link.end();
        link.begin().unwrap();
        assert!(link.read_telemetry().is_none());
    }

    #[test]
    fn test_frame_duration() {
        let (link, _engine, _clock, _pool) = setup(link_config());
        assert_eq!(link.frame_duration_us(), 27);
        assert!(u64::from(link.frame_duration_us()) < MIN_PERIOD_US);
    }

    #[test]
    fn test_rate_gate_follows_absolute_time() {
        let (mut link, engine, clock, _pool) = armed(link_config());
        clock.set(10_000);
        assert!(link.write_normalized(0.5));
        clock.set(10_000 + link.period_us() - 1);
        assert!(!link.write_normalized(0.5));
        clock.set(20_000);
        assert!(link.write_normalized(0.5));
        assert_eq!(engine.sent_frames().len(), 2);
    }

    #[test]
    fn test_begin_after_end() {
        let (mut link, _engine, _clock, pool) = armed(link_config());
        link.end();
        link.begin().unwrap();
        assert_eq!(pool.count_free(), 6);
        assert_eq!(link.state(), LinkState::Disarmed);
    }

    #[test]
    fn test_drop_releases_channels() {
        let (link, engine, _clock, pool) = armed(link_config());
        drop(link);
        assert_eq!(pool.count_free(), 8);
        assert_eq!(engine.sent_frames().len(), 1);
    }

    #[test]
    fn test_two_links_share_pool() {
        let pool = Arc::new(ChannelPool::new(4));
        let mut a = EscLinkScheduler::new(RecordingEngine::new(), ManualClock::new(), &pool, link_config());
        let mut b = EscLinkScheduler::new(RecordingEngine::new(), ManualClock::new(), &pool, link_config());
        let mut c = EscLinkScheduler::new(RecordingEngine::new(), ManualClock::new(), &pool, link_config());

        a.begin().unwrap();
        b.begin().unwrap();
        assert!(matches!(c.begin(), Err(EscLinkError::ResourceExhausted)));

        a.end();
        c.begin().unwrap();
        assert_eq!(pool.count_free(), 0);
    }

    #[test]
    fn test_send_special() {
        let (mut link, engine, clock, _pool) = setup(link_config());
        assert!(!link.send_special(1));
        link.begin().unwrap();
        assert!(!link.send_special(1), "disarmed");

        link.arm(true);
        assert!(link.send_special(3));
        assert!(!link.send_special(3), "rate limited");
        clock.advance(link.period_us());
        assert!(link.send_special(200));

        let frames = engine.sent_frames();
        assert_eq!(frame_value(frames[0]), 3);
        assert_eq!(frame_value(frames[1]), 47);
        assert!(frames.iter().all(|&f| !frame_requests_telemetry(f)));
    }

    #[test]
    fn test_set_direction() {
        let (mut link, engine, clock, _pool) = armed(link_config());
        assert!(link.set_direction(true));
        clock.advance(link.period_us());
        assert!(link.set_direction(false));

        let values: Vec<u16> = engine.sent_frames().into_iter().map(frame_value).collect();
        assert_eq!(values, vec![21, 20]);
    }

    #[test]
    fn test_send_command_rejects_invalid_parameters() {
        let (mut link, engine, _clock, _pool) = armed(link_config());
        assert!(!link.send_command(SpecialCommand::Beep { count: 9 }));
        assert!(engine.sent_frames().is_empty());
        assert!(link.send_command(SpecialCommand::Beep { count: 2 }));
        assert_eq!(frame_value(engine.sent_frames()[0]), 2);
    }

    #[test]
    fn test_set_update_rate() {
        let (mut link, _engine, _clock, _pool) = setup(link_config());
        assert_eq!(link.period_us(), 500);
        link.set_update_rate(0);
        assert_eq!(link.period_us(), 500);
        link.set_update_rate(1000);
        assert_eq!(link.period_us(), 1000);
        link.set_update_rate(20_000);
        assert_eq!(link.period_us(), MIN_PERIOD_US);
    }

    #[test]
    fn test_caps() {
        let (link, _engine, _clock, _pool) = setup(link_config());
        let caps = link.caps();
        assert!(caps.bidirectional_telemetry);
        assert!(!caps.needs_calibration);
        assert_eq!(caps.max_rate_hz, 4000);
    }

    #[test]
    fn test_link_config_from_config() {
        let mut config = Config::default();
        config.esc.update_rate_hz = 1000;
        config.calibration.milliamps_per_lsb = 500;
        let link = EscLinkConfig::from(&config);
        assert_eq!(link.update_rate_hz, 1000);
        assert_eq!(link.milliamps_per_lsb, 500);
        assert_eq!(link.telemetry_request_divisor, 32);
    }
}
