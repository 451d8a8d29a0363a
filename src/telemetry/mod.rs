//! # Telemetry Module
//!
//! Formats decoded ESC telemetry as JSONL (JSON Lines) records.
//!
//! Each record carries a UTC timestamp, the ESC label and the latest
//! converted values:
//!
//! ```text
//! {"timestamp":"2026-01-01T12:00:00Z","esc":"esc0","rpm":6002,"temperature_c":41,"volts":16.5,"amps":12.0,"kind":"erpm"}
//! ```

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::Result;
use crate::esc::EscTelemetry;

/// One telemetry sample in engineering units
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TelemetryRecord {
    pub timestamp: DateTime<Utc>,
    pub esc: String,
    pub rpm: u16,
    pub temperature_c: u8,
    pub volts: f32,
    pub amps: f32,
    /// Kind of the frame that produced this sample
    pub kind: &'static str,
}

impl TelemetryRecord {
    /// Record a telemetry snapshot taken now
    pub fn new(esc: &str, telemetry: &EscTelemetry) -> Self {
        Self::with_timestamp(Utc::now(), esc, telemetry)
    }

    pub fn with_timestamp(timestamp: DateTime<Utc>, esc: &str, telemetry: &EscTelemetry) -> Self {
        Self {
            timestamp,
            esc: esc.to_string(),
            rpm: telemetry.rpm,
            temperature_c: telemetry.temperature_c,
            volts: telemetry.millivolts as f32 / 1000.0,
            amps: telemetry.milliamps as f32 / 1000.0,
            kind: telemetry.last_frame.kind.as_str(),
        }
    }

    /// Render as a single newline-terminated JSON line
    ///
    /// # Errors
    ///
    /// Returns error if serialization fails
    pub fn to_jsonl(&self) -> Result<String> {
        let mut line = serde_json::to_string(self)?;
        line.push('\n');
        Ok(line)
    }
}
