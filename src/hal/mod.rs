//! # Hardware Abstraction Module
//!
//! Collaborator interfaces consumed by the ESC link.
//!
//! This module handles:
//! - The waveform engine trait (transmit pulses, capture replies)
//! - Line configuration for a shared one-wire DShot line
//! - The monotonic clock behind the rate gate
//! - An in-process simulated ESC for bench runs

pub mod engine_trait;
pub mod clock;
pub mod sim;

pub use clock::{Clock, MonotonicClock};
pub use engine_trait::{IdleLevel, LineConfig, WaveformEngine};
pub use sim::SimulatedEsc;
