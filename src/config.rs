//! Contactor parameter table.
//!
//! Loaded once before the control loop starts and read-only afterwards.
//! `Default` reproduces the hard-coded parameter set the controller ships
//! with; a JSON override can be supplied to the bench binary.
//!
//! Naming: suffix `_ms` is milliseconds, `_v` volts, `_pct` percent.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

// ---------------------------------------------------------------------------
// Hardware option bits
// ---------------------------------------------------------------------------

/// Hardware configuration option bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HwConfig(pub u32);

impl HwConfig {
    /// Contactor #1 has auxiliary contacts.
    pub const AUX1_PRESENT: u32 = 1 << 0;
    /// Aux #1 input level is high when contactor #1 is closed.
    pub const AUX1_SENSE: u32 = 1 << 1;
    /// Contactor #2 has auxiliary contacts.
    pub const AUX2_PRESENT: u32 = 1 << 2;
    /// Aux #2 input level is high when contactor #2 is closed.
    pub const AUX2_SENSE: u32 = 1 << 3;
    /// Coil #1 drops to a PWM hold level after closure.
    pub const PWM_CONTACTOR1: u32 = 1 << 5;
    /// Coil #2 drops to a PWM hold level after closure.
    pub const PWM_CONTACTOR2: u32 = 1 << 6;

    pub const fn has(self, bit: u32) -> bool {
        self.0 & bit != 0
    }

    pub const fn aux1_present(self) -> bool {
        self.has(Self::AUX1_PRESENT)
    }

    pub const fn aux2_present(self) -> bool {
        self.has(Self::AUX2_PRESENT)
    }

    /// Interpret a raw aux #1 input level as "contact closed".
    pub const fn aux1_closed(self, level_high: bool) -> bool {
        level_high == self.has(Self::AUX1_SENSE)
    }

    /// Interpret a raw aux #2 input level as "contact closed".
    pub const fn aux2_closed(self, level_high: bool) -> bool {
        level_high == self.has(Self::AUX2_SENSE)
    }
}

// ---------------------------------------------------------------------------
// Calibration
// ---------------------------------------------------------------------------

/// Linear calibration: `value = (raw - offset) * scale`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Calibration {
    pub offset: f32,
    pub scale: f32,
}

impl Calibration {
    /// Calibration from a reference point: `applied` volts read as `adc` counts.
    pub fn from_reference(applied: f32, adc: u16, offset: f32) -> Self {
        Self {
            offset,
            scale: applied / (f32::from(adc) - offset),
        }
    }

    pub fn apply(&self, raw: u16) -> f32 {
        (f32::from(raw) - self.offset) * self.scale
    }

    /// Inverse of [`apply`](Self::apply), saturating to the ADC range.
    pub fn counts_for(&self, value: f32) -> u16 {
        let counts = value / self.scale + self.offset;
        counts.clamp(0.0, f32::from(u16::MAX)) as u16
    }
}

/// Per-channel calibration set.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CalibrationTable {
    /// Battery minus to contactor #1 battery side.
    pub hv1: Calibration,
    /// Battery minus to contactor #1 load side.
    pub hv2: Calibration,
    /// Across contactor #2 / pre-charge resistor.
    pub hv3: Calibration,
    /// Battery string current.
    pub current1: Calibration,
}

// ---------------------------------------------------------------------------
// CAN identifiers
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CanIds {
    /// Heartbeat: hv1 : current1.
    pub heartbeat1: u32,
    /// Heartbeat: hv2 : hv3.
    pub heartbeat2: u32,
    /// Poll response: hv1 : current1.
    pub poll_response1: u32,
    /// Poll response: hv2 : hv3.
    pub poll_response2: u32,
    /// Command response (and diagnostic response).
    pub command_response: u32,
    /// Keep-alive response, state-change broadcast and status heartbeat.
    pub keepalive_response: u32,
    /// Inbound: command.
    pub command_in: u32,
    /// Inbound: keep-alive / connect command.
    pub keepalive_in: u32,
    /// Inbound: time-sync poll.
    pub poll_in: u32,
}

// ---------------------------------------------------------------------------
// Parameter table
// ---------------------------------------------------------------------------

/// Complete contactor parameter set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContactorConfig {
    /// Parameter table layout version.
    pub version: u32,
    pub hw: HwConfig,

    // --- Watchdogs ---
    /// Command / keep-alive message timeout.
    pub keepalive_timeout_ms: u32,
    /// Sensor line timeout.
    pub sensor_timeout_ms: u32,

    // --- Voltage thresholds ---
    /// Battery string (hv1) must be above this to connect.
    pub battery_low_v: f32,
    /// Max |hv1 - hv2| once contactor #1 has closed.
    pub hv1_minus_hv2_max_v: f32,
    /// Voltage across contactor #2 at which pre-charge is complete.
    pub precharge_end_v: f32,
    /// Max voltage across contactor #2 after it has closed.
    pub diff_after_v: f32,

    // --- Sequencing delays ---
    pub close1_ms: u32,
    pub close2_ms: u32,
    pub open1_ms: u32,
    pub open2_ms: u32,
    /// Pre-charge always runs at least this long after #1 closes.
    pub precharge_min_ms: u32,
    /// Window after the minimum for the pre-charge voltage to be reached.
    pub precharge_max_ms: u32,

    // --- Heartbeats (while connected) ---
    pub heartbeat1_ms: u32,
    pub heartbeat2_ms: u32,

    // --- Coil PWM ---
    /// Hold level after closure delay, coil #1 (0-100%).
    pub pwm1_pct: f32,
    /// Hold level after closure delay, coil #2 (0-100%).
    pub pwm2_pct: f32,
    /// PWM timer period in counts (duty range is 0..=period).
    pub pwm_period: u16,

    pub calibration: CalibrationTable,
    pub can: CanIds,
}

impl Default for ContactorConfig {
    fn default() -> Self {
        Self {
            version: 1,
            hw: HwConfig(HwConfig::PWM_CONTACTOR1 | HwConfig::PWM_CONTACTOR2),

            keepalive_timeout_ms: 1500,
            sensor_timeout_ms: 250,

            battery_low_v: 30.0,
            hv1_minus_hv2_max_v: 10.0,
            precharge_end_v: 3.0,
            diff_after_v: 3.0,

            close1_ms: 100,
            close2_ms: 100,
            open1_ms: 50,
            open2_ms: 50,
            precharge_min_ms: 4000,
            precharge_max_ms: 6000,

            heartbeat1_ms: 1000,
            heartbeat2_ms: 1000,

            pwm1_pct: 100.0,
            pwm2_pct: 100.0,
            pwm_period: 3999,

            calibration: CalibrationTable {
                hv1: Calibration::from_reference(159.7, 19632, 3.0),
                hv2: Calibration::from_reference(159.7, 19500, 3.0),
                hv3: Calibration::from_reference(159.7, 19507, 3.0),
                current1: Calibration {
                    offset: 32768.0,
                    scale: 0.01,
                },
            },

            can: CanIds {
                heartbeat1: 0xFF80_0000,
                heartbeat2: 0xFF00_0000,
                poll_response1: 0x5040_0000,
                poll_response2: 0x5060_0000,
                command_response: 0xE360_0000,
                keepalive_response: 0xE3C0_0000,
                command_in: 0xE360_000C,
                keepalive_in: 0xE380_0000,
                poll_in: 0x0040_0000,
            },
        }
    }
}

impl ContactorConfig {
    /// Reject parameter sets the state machine cannot run safely with.
    /// Values are never clamped.
    pub fn validate(&self) -> Result<()> {
        let delays = [
            (self.keepalive_timeout_ms, "keepalive_timeout_ms must be > 0"),
            (self.sensor_timeout_ms, "sensor_timeout_ms must be > 0"),
            (self.close1_ms, "close1_ms must be > 0"),
            (self.close2_ms, "close2_ms must be > 0"),
            (self.open1_ms, "open1_ms must be > 0"),
            (self.open2_ms, "open2_ms must be > 0"),
            (self.precharge_min_ms, "precharge_min_ms must be > 0"),
            (self.precharge_max_ms, "precharge_max_ms must be > 0"),
            (self.heartbeat1_ms, "heartbeat1_ms must be > 0"),
            (self.heartbeat2_ms, "heartbeat2_ms must be > 0"),
        ];
        if let Some((_, msg)) = delays.iter().find(|(ms, _)| *ms == 0) {
            return Err(Error::Config(msg));
        }

        if !(self.battery_low_v > 0.0) {
            return Err(Error::Config("battery_low_v must be > 0"));
        }
        if !(self.hv1_minus_hv2_max_v > 0.0) {
            return Err(Error::Config("hv1_minus_hv2_max_v must be > 0"));
        }
        if !(self.precharge_end_v > 0.0) {
            return Err(Error::Config("precharge_end_v must be > 0"));
        }
        if !(self.diff_after_v > 0.0) {
            return Err(Error::Config("diff_after_v must be > 0"));
        }
        if !(0.0..=100.0).contains(&self.pwm1_pct) || !(0.0..=100.0).contains(&self.pwm2_pct) {
            return Err(Error::Config("pwm percent must be within 0-100"));
        }
        if self.pwm_period == 0 {
            return Err(Error::Config("pwm_period must be > 0"));
        }

        let cal = &self.calibration;
        if [cal.hv1, cal.hv2, cal.hv3, cal.current1]
            .iter()
            .any(|c| !c.scale.is_finite() || c.scale == 0.0 || !c.offset.is_finite())
        {
            return Err(Error::Config("calibration scale must be finite and non-zero"));
        }

        let ids = &self.can;
        if ids.command_in == ids.keepalive_in
            || ids.command_in == ids.poll_in
            || ids.keepalive_in == ids.poll_in
        {
            return Err(Error::Config("inbound CAN ids must be distinct"));
        }

        Ok(())
    }

    /// PWM hold count for a coil at `pct` percent of the timer period.
    pub fn hold_counts(&self, pct: f32) -> u16 {
        let period = f32::from(self.pwm_period) + 1.0;
        let counts = pct * 0.01 * period - 1.0;
        counts.clamp(0.0, f32::from(self.pwm_period)) as u16
    }
}
