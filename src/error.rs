//! # Error Types
//!
//! Custom error types for the DShot link using `thiserror`.

use thiserror::Error;

/// Main error type for the DShot link
#[derive(Debug, Error)]
pub enum EscLinkError {
    /// No free hardware timing channel was available
    #[error("No free hardware channel available")]
    ResourceExhausted,

    /// The waveform engine rejected a channel configuration
    #[error("Hardware configuration failed: {0}")]
    HardwareConfig(HwError),

    /// The waveform engine failed to send a frame
    #[error("Transmit failed: {0}")]
    Transmit(HwError),

    /// BDShot reply could not be decoded
    #[error("BDShot decode error: {0}")]
    Decode(#[from] DecodeError),

    /// Invalid special command parameters
    #[error("Invalid DShot command: {0}")]
    Command(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] toml::de::Error),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Telemetry record serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Errors reported by a waveform engine
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HwError {
    /// Peripheral refused the request
    #[error("peripheral rejected request: {0}")]
    Rejected(String),

    /// Channel is still busy with a previous operation
    #[error("channel {0} busy")]
    Busy(usize),

    /// Channel was used before being configured
    #[error("channel {0} not configured")]
    NotConfigured(usize),
}

/// Structural failures while decoding a BDShot reply
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum DecodeError {
    /// Capture ran out of runs before 21 NRZI bits were assembled
    #[error("insufficient bits in capture: {collected} of 21")]
    InsufficientBits { collected: u32 },

    /// A 5-bit group is not a valid GCR code
    #[error("invalid GCR code 0x{code:02X} in group {group}")]
    InvalidGcr { group: usize, code: u8 },

    /// Reply checksum does not match its payload
    #[error("CRC mismatch: expected 0x{expected:X}, got 0x{received:X}")]
    CrcMismatch { expected: u8, received: u8 },
}

/// Result type alias for the DShot link
pub type Result<T> = std::result::Result<T, EscLinkError>;
