//! # DShot Link Library
//!
//! Drive brushless ESCs with DShot600 and read back BDShot telemetry.
//!
//! This library provides the frame codec, pulse timing, BDShot reply decoding,
//! a shared hardware channel allocator and the per-ESC link scheduler. The
//! waveform peripheral is abstracted behind [`hal::WaveformEngine`].

pub mod config;
pub mod error;
pub mod dshot;
pub mod bdshot;
pub mod channel;
pub mod hal;
pub mod esc;
pub mod telemetry;
