//! In-process ESC simulator implementing [`WaveformEngine`]
//!
//! Decodes transmitted pulse trains back into DShot frames and answers
//! telemetry requests with BDShot replies: eRPM proportional to throttle,
//! interleaved with EDT temperature, voltage and current.

use std::collections::HashMap;

use tracing::{debug, trace};

use super::engine_trait::{LineConfig, WaveformEngine};
use crate::bdshot::decoder::{edt_payload, erpm_payload, reply_value};
use crate::bdshot::gcr::encode_reply;
use crate::channel::ChannelIndex;
use crate::dshot::codec::{decode_and_validate, frame_value};
use crate::dshot::protocol::*;
use crate::dshot::waveform::{pulses_to_frame, PulsePair, RunLengthSample};
use crate::error::HwError;

/// eRPM at full throttle
const SIM_MAX_ERPM: u32 = 140_000;

/// Reply sequence: eRPM on most requests, one EDT quantity in between
const REPLY_CYCLE: [Option<u8>; 6] = [
    None,
    Some(EDT_TYPE_TEMPERATURE),
    None,
    Some(EDT_TYPE_VOLTAGE),
    None,
    Some(EDT_TYPE_CURRENT),
];

#[derive(Debug, Clone, Copy)]
struct ChannelSetup {
    receiver: bool,
    line: LineConfig,
}

/// Simulated ESC on a single line
#[derive(Debug, Default)]
pub struct SimulatedEsc {
    channels: HashMap<ChannelIndex, ChannelSetup>,
    throttle_code: u16,
    frames_received: u64,
    crc_errors: u64,
    reply_index: usize,
    pending_reply: Option<RunLengthSample>,
    window_open: bool,
}

impl SimulatedEsc {
    pub fn new() -> Self {
        Self::default()
    }

    /// Last throttle code received (0..=2047)
    pub fn throttle_code(&self) -> u16 {
        self.throttle_code
    }

    /// Number of valid frames received
    pub fn frames_received(&self) -> u64 {
        self.frames_received
    }

    /// Number of frames rejected for a bad checksum
    pub fn crc_errors(&self) -> u64 {
        self.crc_errors
    }

    fn throttle_fraction(&self) -> f32 {
        if self.throttle_code < THROTTLE_MIN_CODE {
            return 0.0;
        }
        f32::from(self.throttle_code - THROTTLE_MIN_CODE)
            / f32::from(THROTTLE_MAX_CODE - THROTTLE_MIN_CODE)
    }

    fn next_reply_payload(&mut self) -> u16 {
        let slot = REPLY_CYCLE[self.reply_index % REPLY_CYCLE.len()];
        self.reply_index = self.reply_index.wrapping_add(1);
        let throttle = self.throttle_fraction();

        match slot {
            None => {
                let erpm = (throttle * SIM_MAX_ERPM as f32) as u32;
                // A stopped motor reports the longest period
                erpm_payload(ERPM_PERIOD_NUMERATOR.checked_div(erpm).unwrap_or(u32::MAX))
                    .unwrap_or(0xFFF)
            }
            Some(EDT_TYPE_TEMPERATURE) => {
                edt_payload(EDT_TYPE_TEMPERATURE, 30 + (throttle * 45.0) as u8)
            }
            Some(EDT_TYPE_VOLTAGE) => {
                // 16.8 V pack sagging under load, 0.25 V per step
                edt_payload(EDT_TYPE_VOLTAGE, 67 - (throttle * 8.0) as u8)
            }
            Some(type_code) => edt_payload(type_code, (throttle * 40.0) as u8),
        }
    }

    fn tx_line(&self, channel: ChannelIndex) -> Result<LineConfig, HwError> {
        match self.channels.get(&channel) {
            Some(setup) if !setup.receiver => Ok(setup.line),
            _ => Err(HwError::NotConfigured(channel)),
        }
    }
}

impl WaveformEngine for SimulatedEsc {
    fn configure_tx(&mut self, channel: ChannelIndex, line: &LineConfig) -> Result<(), HwError> {
        if line.clock_hz == 0 {
            return Err(HwError::Rejected("zero peripheral clock".to_string()));
        }
        self.channels.insert(channel, ChannelSetup { receiver: false, line: *line });
        debug!("Simulated ESC: tx on channel {}", channel);
        Ok(())
    }

    fn configure_rx(&mut self, channel: ChannelIndex, line: &LineConfig) -> Result<(), HwError> {
        if !line.open_drain {
            return Err(HwError::Rejected("receive needs an open-drain line".to_string()));
        }
        self.channels.insert(channel, ChannelSetup { receiver: true, line: *line });
        debug!("Simulated ESC: rx on channel {}", channel);
        Ok(())
    }

    fn deconfigure(&mut self, channel: ChannelIndex) {
        self.channels.remove(&channel);
    }

    fn transmit(&mut self, channel: ChannelIndex, pulses: &[PulsePair]) -> Result<(), HwError> {
        let line = self.tx_line(channel)?;
        let frame = pulses_to_frame(pulses)
            .ok_or_else(|| HwError::Rejected(format!("{} pulses, expected {}", pulses.len(), FRAME_BITS)))?;

        let Some((payload, _)) = decode_and_validate(frame) else {
            self.crc_errors += 1;
            trace!("Simulated ESC: bad CRC in frame 0x{:04X}", frame);
            return Ok(());
        };

        self.frames_received += 1;
        let value = frame_value(frame);
        if value >= THROTTLE_MIN_CODE || value == 0 {
            self.throttle_code = value;
        }

        if payload & 1 == 1 {
            let reply = reply_value(self.next_reply_payload());
            self.pending_reply = Some(encode_reply(reply, line.timing.reply_bit_ticks));
        }
        Ok(())
    }

    fn begin_receive_window(&mut self, channel: ChannelIndex) -> Result<(), HwError> {
        match self.channels.get(&channel) {
            Some(setup) if setup.receiver => {
                self.window_open = true;
                Ok(())
            }
            _ => Err(HwError::NotConfigured(channel)),
        }
    }

    fn poll_capture(&mut self, _channel: ChannelIndex) -> Option<RunLengthSample> {
        if !self.window_open {
            return None;
        }
        self.pending_reply.take()
    }

    fn end_receive_window(&mut self, _channel: ChannelIndex) {
        self.window_open = false;
    }
}
