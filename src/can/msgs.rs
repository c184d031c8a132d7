//! Outbound frame builders.
//!
//! Status (4 bytes):
//!
//! ```text
//!   byte 0: bit 7 faulted, bit 6 warning, bits 3..0 state code
//!   byte 1: last command byte received
//!   byte 2: fault code
//!   byte 3: bit 7 coil #1, bit 6 coil #2, bit 5 aux #1 closed,
//!           bit 4 aux #2 closed, bit 3 interlock
//! ```
//!
//! Telemetry (8 bytes): two little-endian `f32`.
//! Diagnostic (5 bytes): item code, then a little-endian `u32`.

use super::CanFrame;

pub const STATUS_FAULTED: u8 = 1 << 7;
pub const STATUS_WARNING: u8 = 1 << 6;
pub const STATUS_STATE_MASK: u8 = 0x0F;

pub const OUT_COIL1: u8 = 1 << 7;
pub const OUT_COIL2: u8 = 1 << 6;
pub const OUT_AUX1: u8 = 1 << 5;
pub const OUT_AUX2: u8 = 1 << 4;
pub const OUT_INTERLOCK: u8 = 1 << 3;

/// Everything a status frame reports.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatusWord {
    pub state_code: u8,
    pub faulted: bool,
    pub warning: bool,
    pub last_command: u8,
    pub fault_code: u8,
    pub coil1: bool,
    pub coil2: bool,
    pub aux1_closed: bool,
    pub aux2_closed: bool,
    pub interlock: bool,
}

impl StatusWord {
    pub fn encode(&self) -> [u8; 4] {
        let mut b0 = self.state_code & STATUS_STATE_MASK;
        if self.faulted {
            b0 |= STATUS_FAULTED;
        }
        if self.warning {
            b0 |= STATUS_WARNING;
        }

        let mut b3 = 0;
        for (on, bit) in [
            (self.coil1, OUT_COIL1),
            (self.coil2, OUT_COIL2),
            (self.aux1_closed, OUT_AUX1),
            (self.aux2_closed, OUT_AUX2),
            (self.interlock, OUT_INTERLOCK),
        ] {
            if on {
                b3 |= bit;
            }
        }

        [b0, self.last_command, self.fault_code, b3]
    }

    /// Inverse of [`encode`](Self::encode), for bus monitors and tests.
    pub fn decode(data: &[u8]) -> Option<Self> {
        let [b0, b1, b2, b3] = *data.get(..4)? else {
            return None;
        };
        Some(Self {
            state_code: b0 & STATUS_STATE_MASK,
            faulted: b0 & STATUS_FAULTED != 0,
            warning: b0 & STATUS_WARNING != 0,
            last_command: b1,
            fault_code: b2,
            coil1: b3 & OUT_COIL1 != 0,
            coil2: b3 & OUT_COIL2 != 0,
            aux1_closed: b3 & OUT_AUX1 != 0,
            aux2_closed: b3 & OUT_AUX2 != 0,
            interlock: b3 & OUT_INTERLOCK != 0,
        })
    }
}

pub fn status_frame(id: u32, status: &StatusWord) -> CanFrame {
    CanFrame::new(id, &status.encode())
}

/// Two readings packed as little-endian `f32`.
pub fn telemetry_frame(id: u32, first: f32, second: f32) -> CanFrame {
    let mut payload = [0u8; 8];
    payload[..4].copy_from_slice(&first.to_le_bytes());
    payload[4..].copy_from_slice(&second.to_le_bytes());
    CanFrame::new(id, &payload)
}

/// Split a telemetry payload back into its two readings.
pub fn telemetry_values(frame: &CanFrame) -> Option<(f32, f32)> {
    let first: [u8; 4] = frame.data.get(0..4)?.try_into().ok()?;
    let second: [u8; 4] = frame.data.get(4..8)?.try_into().ok()?;
    Some((f32::from_le_bytes(first), f32::from_le_bytes(second)))
}

pub fn diag_frame(id: u32, item: u8, value: u32) -> CanFrame {
    let v = value.to_le_bytes();
    CanFrame::new(id, &[item, v[0], v[1], v[2], v[3]])
}
