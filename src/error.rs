// SPDX-License-Identifier: GPL-3.0-only
//! Error types for the brightness key service
//!
//! Only startup failures are errors. Missing panels, absent consumers and
//! unrecognized notification codes are handled where they occur and never
//! surface here.

use thiserror::Error;

/// Main error type
#[derive(Error, Debug)]
pub enum Error {
    /// The serialized event gate could not be created
    #[error("Failed to create event gate: {0}")]
    ExecutionContext(String),

    /// The consumer presence watch could not be set up
    #[error("Failed to track notification consumers: {0}")]
    ConsumerTracking(String),

    /// Registering interest on a single panel device failed
    #[error("Failed to register interest on {device}: {reason}")]
    Registration { device: String, reason: String },

    /// No panel accepted an interest registration
    #[error("Unable to register any interests for video notifications")]
    NoEventSource,

    /// The event gate stopped before answering
    #[error("Event gate is closed")]
    GateClosed,

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Virtual keyboard error
    #[error("Keyboard output error: {0}")]
    Keyboard(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for Error
pub type Result<T> = std::result::Result<T, Error>;
