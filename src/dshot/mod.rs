//! # DShot Protocol Module
//!
//! Implementation of the DShot600 command protocol.
//!
//! This module handles:
//! - Throttle and special command encoding (11-bit values)
//! - 16-bit frame layout with CRC4
//! - Conversion of frames to timed pulse pairs and of captured run lengths
//!   back to bits

pub mod protocol;
pub mod codec;
pub mod crc;
pub mod waveform;
