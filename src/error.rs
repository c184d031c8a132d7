//! Unified error types for the contactor controller.
//!
//! Only start-up can fail in a way the caller has to handle: an invalid
//! parameter table or a timer that refuses to arm.  Runtime anomalies are
//! never errors; they become event flags and fault codes that the state
//! machine consumes.  All variants are `Copy` so they can be logged and
//! passed around without allocation.

use core::fmt;

use crate::sensors::LineError;
use crate::timers::TimerError;

// ---------------------------------------------------------------------------
// Top-level error
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// Configuration failed validation.  The message names the field.
    Config(&'static str),
    /// A logical timer could not be armed.
    Timer(TimerError),
    /// A sensor line could not be decoded.
    Sensor(LineError),
    /// Start-up precondition failed.
    Init(&'static str),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Config(msg) => write!(f, "config: {msg}"),
            Self::Timer(e) => write!(f, "timer: {e}"),
            Self::Sensor(e) => write!(f, "sensor: {e}"),
            Self::Init(msg) => write!(f, "init: {msg}"),
        }
    }
}

impl core::error::Error for Error {}

impl From<TimerError> for Error {
    fn from(e: TimerError) -> Self {
        Self::Timer(e)
    }
}

impl From<LineError> for Error {
    fn from(e: LineError) -> Self {
        Self::Sensor(e)
    }
}

/// Crate-wide `Result` alias.
pub type Result<T> = core::result::Result<T, Error>;
