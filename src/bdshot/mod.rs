//! # BDShot Module
//!
//! Bidirectional DShot telemetry replies.
//!
//! This module handles:
//! - NRZI differential decoding of captured run lengths
//! - 5-bit to 4-bit GCR table lookup
//! - CRC4 validation of the reply payload
//! - Classification into eRPM and Extended Digital Telemetry (EDT)

pub mod gcr;
pub mod decoder;

pub use decoder::{decode, decode_reply, TelemetryFrame, TelemetryKind};
