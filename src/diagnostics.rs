//! Contactor closure timing and diagnostic read-out.
//!
//! [`ClosureTimer`] watches each coil drive against its aux contact and
//! records how long the contact took to follow: coil energised → aux
//! reads closed, coil released → aux reads open.  The numbers are what a
//! bench operator uses to tune the close/open delays.
//!
//! A command message can ask for one [`DiagItem`] in byte 1; the answer
//! goes out as a 5-byte diagnostic frame.

use crate::sensors::RawCounts;

/// Items a command message may request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum DiagItem {
    RawHv1 = 1,
    RawHv2 = 2,
    RawHv3 = 3,
    Close1Ms = 4,
    Close2Ms = 5,
    Open1Ms = 6,
    Open2Ms = 7,
}

impl DiagItem {
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            1 => Some(Self::RawHv1),
            2 => Some(Self::RawHv2),
            3 => Some(Self::RawHv3),
            4 => Some(Self::Close1Ms),
            5 => Some(Self::Close2Ms),
            6 => Some(Self::Open1Ms),
            7 => Some(Self::Open2Ms),
            _ => None,
        }
    }

    pub const fn code(self) -> u8 {
        self as u8
    }

    /// Current value of the item.
    pub fn value(self, raw: &RawCounts, timing: &ClosureTimer) -> u32 {
        match self {
            Self::RawHv1 => u32::from(raw.hv1),
            Self::RawHv2 => u32::from(raw.hv2),
            Self::RawHv3 => u32::from(raw.hv3),
            Self::Close1Ms => timing.contactor(0).close_ms,
            Self::Close2Ms => timing.contactor(1).close_ms,
            Self::Open1Ms => timing.contactor(0).open_ms,
            Self::Open2Ms => timing.contactor(1).open_ms,
        }
    }
}

// ───────────────────────────────────────────────────────────────
// Closure timing
// ───────────────────────────────────────────────────────────────

/// Timing state for one contactor.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ContactTiming {
    /// Last measured coil-on → aux-closed time (ms, 0 = never seen).
    pub close_ms: u32,
    /// Last measured coil-off → aux-open time (ms, 0 = never seen).
    pub open_ms: u32,
    coil_on: bool,
    on_since: Option<u64>,
    off_since: Option<u64>,
}

impl ContactTiming {
    fn observe(&mut self, coil_on: bool, aux_closed: bool, now_ms: u64) {
        if coil_on != self.coil_on {
            self.coil_on = coil_on;
            if coil_on {
                self.on_since = Some(now_ms);
                self.off_since = None;
            } else {
                self.off_since = Some(now_ms);
                self.on_since = None;
            }
        }

        if let Some(t0) = self.on_since.filter(|_| coil_on && aux_closed) {
            self.close_ms = elapsed(t0, now_ms);
            self.on_since = None;
        }
        if let Some(t0) = self.off_since.filter(|_| !coil_on && !aux_closed) {
            self.open_ms = elapsed(t0, now_ms);
            self.off_since = None;
        }
    }
}

fn elapsed(from: u64, to: u64) -> u32 {
    u32::try_from(to.saturating_sub(from)).unwrap_or(u32::MAX)
}

/// Closure timers for both contactors.
#[derive(Debug, Clone, Default)]
pub struct ClosureTimer {
    contacts: [ContactTiming; 2],
}

impl ClosureTimer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed the current coil drives and aux readings.
    pub fn observe(&mut self, coils: [bool; 2], aux_closed: [bool; 2], now_ms: u64) {
        for (i, contact) in self.contacts.iter_mut().enumerate() {
            contact.observe(coils[i], aux_closed[i], now_ms);
        }
    }

    /// Timing for contactor `index` (0 = #1, 1 = #2).
    pub fn contactor(&self, index: usize) -> ContactTiming {
        self.contacts.get(index).copied().unwrap_or_default()
    }
}
