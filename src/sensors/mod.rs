//! High-voltage sensor line decode and calibration.
//!
//! The isolated HV sense board streams one ASCII line per sample:
//!
//! ```text
//!   "19632,19500,1043\r\n"
//!    hv1   hv2   hv3      (raw ADC counts)
//! ```
//!
//! [`parse_line`] turns a line into [`RawCounts`]; [`RawCounts::calibrate`]
//! applies the per-channel [`Calibration`](crate::config::Calibration)
//! to produce volts.  Neither step touches the contactor context: the
//! sensor-line handler owns that.

use core::fmt;

use crate::config::CalibrationTable;

/// Longest line the transport hands over.
pub const LINE_CAPACITY: usize = 48;

/// One completed sensor line as delivered by the transport.
pub type SensorLine = heapless::String<LINE_CAPACITY>;

/// Number of HV channels on a line.
pub const HV_CHANNELS: usize = 3;

// ───────────────────────────────────────────────────────────────
// Errors
// ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineError {
    /// Nothing but whitespace.
    Empty,
    /// Fewer or more than three fields.
    FieldCount(usize),
    /// Field `n` (0-based) is not a decimal count in `0..=65535`.
    BadField(usize),
}

impl fmt::Display for LineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => write!(f, "empty line"),
            Self::FieldCount(n) => write!(f, "expected {} fields, got {}", HV_CHANNELS, n),
            Self::BadField(i) => write!(f, "field {} is not an ADC count", i),
        }
    }
}

// ───────────────────────────────────────────────────────────────
// Raw counts
// ───────────────────────────────────────────────────────────────

/// Raw ADC counts from one sensor line.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RawCounts {
    pub hv1: u16,
    pub hv2: u16,
    pub hv3: u16,
}

/// Calibrated sensor values in volts.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct HvVolts {
    pub hv1: f32,
    pub hv2: f32,
    pub hv3: f32,
}

impl RawCounts {
    pub fn calibrate(&self, cal: &CalibrationTable) -> HvVolts {
        HvVolts {
            hv1: cal.hv1.apply(self.hv1),
            hv2: cal.hv2.apply(self.hv2),
            hv3: cal.hv3.apply(self.hv3),
        }
    }
}

/// Decode `"hv1,hv2,hv3"` with optional surrounding whitespace / CR.
///
/// Whitespace around each field is tolerated; signs, decimals and
/// empty fields are not.
pub fn parse_line(line: &str) -> Result<RawCounts, LineError> {
    let line = line.trim();
    if line.is_empty() {
        return Err(LineError::Empty);
    }

    let mut counts = [0u16; HV_CHANNELS];
    let mut n = 0;
    for field in line.split(',') {
        if n < HV_CHANNELS {
            counts[n] = parse_count(field.trim()).ok_or(LineError::BadField(n))?;
        }
        n += 1;
    }
    if n != HV_CHANNELS {
        return Err(LineError::FieldCount(n));
    }

    Ok(RawCounts {
        hv1: counts[0],
        hv2: counts[1],
        hv3: counts[2],
    })
}

fn parse_count(field: &str) -> Option<u16> {
    if field.is_empty() || !field.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    field.parse().ok()
}
