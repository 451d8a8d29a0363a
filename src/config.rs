//! # Configuration Module
//!
//! Handles loading and validating configuration from TOML files.

use serde::Deserialize;
use serde::de::Error;
use std::fs;
use std::path::Path;

use crate::error::{EscLinkError, Result};

/// Main configuration structure
#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    pub esc: EscConfig,
    pub timing: TimingConfig,
    pub channels: ChannelsConfig,
    pub calibration: CalibrationConfig,
    pub bench: BenchConfig,
}

/// Per-ESC link configuration
#[derive(Debug, Deserialize, Clone)]
pub struct EscConfig {
    #[serde(default = "default_pole_pairs")]
    pub pole_pairs: u8,

    #[serde(default = "default_update_rate_hz")]
    pub update_rate_hz: u16,

    #[serde(default = "default_bidirectional")]
    pub bidirectional: bool,

    #[serde(default = "default_telemetry_request_divisor")]
    pub telemetry_request_divisor: u8,

    /// Command sent for zero throttle and on disarm
    #[serde(default = "default_idle_code")]
    pub idle_code: u16,

    #[serde(default)]
    pub digital_idle_percent: f32,
}

/// Peripheral timing configuration
#[derive(Debug, Deserialize, Clone)]
pub struct TimingConfig {
    #[serde(default = "default_peripheral_clock_hz")]
    pub peripheral_clock_hz: u32,
}

/// Hardware channel pool configuration
#[derive(Debug, Deserialize, Clone)]
pub struct ChannelsConfig {
    #[serde(default = "default_pool_size")]
    pub pool_size: usize,
}

/// EDT scaling, which depends on ESC firmware
#[derive(Debug, Deserialize, Clone)]
pub struct CalibrationConfig {
    #[serde(default = "default_millivolts_per_lsb")]
    pub millivolts_per_lsb: u32,

    #[serde(default = "default_milliamps_per_lsb")]
    pub milliamps_per_lsb: u32,
}

/// Bench runner configuration
#[derive(Debug, Deserialize, Clone)]
pub struct BenchConfig {
    #[serde(default = "default_loop_hz")]
    pub loop_hz: u32,

    /// Run length in seconds, 0 runs until Ctrl+C
    #[serde(default)]
    pub duration_s: u64,

    #[serde(default = "default_telemetry_log_interval_ms")]
    pub telemetry_log_interval_ms: u64,
}

// Default value functions
fn default_pole_pairs() -> u8 { 7 }
fn default_update_rate_hz() -> u16 { 2000 }
fn default_bidirectional() -> bool { true }
fn default_telemetry_request_divisor() -> u8 { 32 }
fn default_idle_code() -> u16 { 48 }

fn default_peripheral_clock_hz() -> u32 { 40_000_000 }

fn default_pool_size() -> usize { 8 }

fn default_millivolts_per_lsb() -> u32 { 250 }
fn default_milliamps_per_lsb() -> u32 { 1000 }

fn default_loop_hz() -> u32 { 1000 }
fn default_telemetry_log_interval_ms() -> u64 { 500 }

impl Default for EscConfig {
    fn default() -> Self {
        Self {
            pole_pairs: default_pole_pairs(),
            update_rate_hz: default_update_rate_hz(),
            bidirectional: default_bidirectional(),
            telemetry_request_divisor: default_telemetry_request_divisor(),
            idle_code: default_idle_code(),
            digital_idle_percent: 0.0,
        }
    }
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self { peripheral_clock_hz: default_peripheral_clock_hz() }
    }
}

impl Default for ChannelsConfig {
    fn default() -> Self {
        Self { pool_size: default_pool_size() }
    }
}

impl Default for CalibrationConfig {
    fn default() -> Self {
        Self {
            millivolts_per_lsb: default_millivolts_per_lsb(),
            milliamps_per_lsb: default_milliamps_per_lsb(),
        }
    }
}

impl Default for BenchConfig {
    fn default() -> Self {
        Self {
            loop_hz: default_loop_hz(),
            duration_s: 0,
            telemetry_log_interval_ms: default_telemetry_log_interval_ms(),
        }
    }
}

fn invalid(message: &str) -> EscLinkError {
    EscLinkError::Config(toml::de::Error::custom(message))
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the configuration file
    ///
    /// # Returns
    ///
    /// * `Result<Config>` - Loaded and validated configuration
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - File cannot be read
    /// - TOML parsing fails
    /// - Validation fails
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use dshot_link::config::Config;
    ///
    /// let config = Config::load("config/default.toml")?;
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        Self::parse(&contents)
    }

    /// Parse and validate configuration from a TOML string
    pub fn parse(contents: &str) -> Result<Self> {
        let config: Config = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration values
    ///
    /// # Errors
    ///
    /// Returns error if any configuration value is out of valid range
    pub fn validate(&self) -> Result<()> {
        if self.esc.pole_pairs == 0 {
            return Err(invalid("pole_pairs must be between 1 and 255"));
        }

        if self.esc.update_rate_hz == 0 || self.esc.update_rate_hz > 10000 {
            return Err(invalid("update_rate_hz must be between 1 and 10000"));
        }

        if self.esc.telemetry_request_divisor == 0 {
            return Err(invalid("telemetry_request_divisor must be greater than 0"));
        }

        // 0 is a legal DShot command (motor stop) but never the default
        if self.esc.idle_code > 2047 {
            return Err(invalid("idle_code must be between 0 and 2047"));
        }

        if self.esc.idle_code > 47 && self.esc.idle_code < 48 + self.idle_offset_codes() {
            return Err(invalid("idle_code must not be below the digital idle throttle"));
        }

        if !(0.0..=20.0).contains(&self.esc.digital_idle_percent) {
            return Err(invalid("digital_idle_percent must be between 0.0 and 20.0"));
        }

        if !(8_000_000..=160_000_000).contains(&self.timing.peripheral_clock_hz) {
            return Err(invalid("peripheral_clock_hz must be between 8000000 and 160000000"));
        }

        if self.channels.pool_size == 0 || self.channels.pool_size > 16 {
            return Err(invalid("pool_size must be between 1 and 16"));
        }

        if self.esc.bidirectional && self.channels.pool_size < 2 {
            return Err(invalid("bidirectional telemetry needs a pool_size of at least 2"));
        }

        if self.calibration.millivolts_per_lsb == 0 || self.calibration.milliamps_per_lsb == 0 {
            return Err(invalid("calibration constants must be greater than 0"));
        }

        if self.bench.loop_hz == 0 || self.bench.loop_hz > 10000 {
            return Err(invalid("loop_hz must be between 1 and 10000"));
        }

        if self.bench.telemetry_log_interval_ms == 0 || self.bench.telemetry_log_interval_ms > 60000 {
            return Err(invalid("telemetry_log_interval_ms must be between 1 and 60000"));
        }

        Ok(())
    }

    fn idle_offset_codes(&self) -> u16 {
        crate::dshot::codec::PacketCodec::from_idle_percent(self.esc.digital_idle_percent).min_code() - 48
    }
}
