//! Shared mutable context threaded through every handler and state.
//!
//! `ContactorContext` is the blackboard: event handlers write readings
//! and request flags into it, the state functions read those and write
//! coil requests back, and the output aggregator turns the requests into
//! port calls.  It is owned by the control task and never shared.

use log::warn;

use crate::config::ContactorConfig;
use crate::sensors::RawCounts;

use super::ContactorState;

// ---------------------------------------------------------------------------
// Typed flag sets
// ---------------------------------------------------------------------------

macro_rules! flag_set {
    (
        $(#[$meta:meta])*
        $name:ident : $repr:ty {
            $( $(#[$fmeta:meta])* $flag:ident = $bit:expr; )*
        }
    ) => {
        $(#[$meta])*
        #[derive(Clone, Copy, PartialEq, Eq, Default)]
        pub struct $name($repr);

        impl $name {
            $( $(#[$fmeta])* pub const $flag: Self = Self(1 << $bit); )*

            pub const fn empty() -> Self {
                Self(0)
            }

            pub const fn bits(self) -> $repr {
                self.0
            }

            pub const fn contains(self, other: Self) -> bool {
                self.0 & other.0 == other.0
            }

            pub fn insert(&mut self, other: Self) {
                self.0 |= other.0;
            }

            pub fn remove(&mut self, other: Self) {
                self.0 &= !other.0;
            }

            /// Insert when `on`, remove otherwise.
            pub fn set(&mut self, other: Self, on: bool) {
                if on {
                    self.insert(other);
                } else {
                    self.remove(other);
                }
            }
        }

        impl core::ops::BitOr for $name {
            type Output = Self;
            fn bitor(self, rhs: Self) -> Self {
                Self(self.0 | rhs.0)
            }
        }

        impl core::fmt::Debug for $name {
            fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                let mut list = f.debug_set();
                $(
                    if self.contains(Self::$flag) {
                        list.entry(&stringify!($flag));
                    }
                )*
                list.finish()
            }
        }
    };
}

flag_set! {
    /// Why the state machine should act.
    EventFlags: u16 {
        /// Command / keep-alive watchdog expired.
        CMD_TIMEOUT = 0;
        /// Sequencing delay expired.
        DELAY_EXPIRED = 1;
        /// Sensor line watchdog expired.
        SENSOR_TIMEOUT = 2;
        /// Command message received.
        CAN_CMD = 3;
        /// Keep-alive message received.
        CAN_KEEPALIVE = 4;
        /// Poll message received.
        CAN_POLL = 5;
        /// Reset requested.
        CMD_RESET = 6;
        /// Connect requested (cleared = disconnect requested).
        CMD_CONNECT = 7;
        /// Readings are current (not timed out).
        HV_NEW = 8;
    }
}

flag_set! {
    /// What is being driven / reported.
    OutputFlags: u8 {
        K1 = 0;
        K2 = 1;
        AUX1 = 2;
        AUX2 = 3;
        INTERLOCK = 4;
        KEEPALIVE = 5;
        SENSOR_FAULT = 6;
    }
}

// ---------------------------------------------------------------------------
// Fault codes
// ---------------------------------------------------------------------------

/// Fault code carried in byte 2 of every status frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum FaultCode {
    #[default]
    NoFault = 0,
    Contactor1OffAux1On = 1,
    Contactor2OffAux2On = 2,
    BatteryLow = 3,
    PrechargeVoltageNotReached = 4,
    Contactor1OnAux1Off = 5,
    Contactor2OnAux2Off = 6,
    Contactor1ClosedVoltsTooBig = 7,
    Contactor2ClosedVoltsTooBig = 8,
    Contactor1DoesNotAppearClosed = 9,
}

impl FaultCode {
    pub const fn code(self) -> u8 {
        self as u8
    }

    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(Self::NoFault),
            1 => Some(Self::Contactor1OffAux1On),
            2 => Some(Self::Contactor2OffAux2On),
            3 => Some(Self::BatteryLow),
            4 => Some(Self::PrechargeVoltageNotReached),
            5 => Some(Self::Contactor1OnAux1Off),
            6 => Some(Self::Contactor2OnAux2Off),
            7 => Some(Self::Contactor1ClosedVoltsTooBig),
            8 => Some(Self::Contactor2ClosedVoltsTooBig),
            9 => Some(Self::Contactor1DoesNotAppearClosed),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Sequencing sub-states
// ---------------------------------------------------------------------------

/// Connect sequence steps.  Only meaningful while `Connecting`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum ConnectSubstate {
    /// Coil #1 pulled in, waiting for the closure delay.
    Close1 = 1,
    /// Minimum pre-charge time.
    PrechargeMin = 2,
    /// Waiting for the voltage across #2 to fall.
    PrechargeWait = 3,
    /// Coil #2 pulled in, waiting for the closure delay.
    Close2 = 4,
}

/// Disconnect sequence steps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisconnectPhase {
    /// Coil #2 released, waiting for it to open.
    OpenCoil2,
    /// Coil #1 released, waiting for it to open.
    OpenCoil1,
}

/// Requested coil drive, before PWM translation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CoilRequest {
    #[default]
    Off,
    /// Full pull-in current.
    Pull,
    /// Reduced hold level once closed.
    Hold,
}

impl CoilRequest {
    pub const fn is_on(self) -> bool {
        !matches!(self, Self::Off)
    }
}

/// What the service should do with the delay timer after this step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DelayRequest {
    #[default]
    Keep,
    Start(u32),
    Cancel,
}

// ---------------------------------------------------------------------------
// Readings
// ---------------------------------------------------------------------------

/// Latest calibrated readings.
#[derive(Debug, Clone, Copy, Default)]
pub struct HvReadings {
    /// Battery string voltage.
    pub hv1: f32,
    /// Load side of contactor #1.
    pub hv2: f32,
    /// Across contactor #2 / pre-charge resistor.
    pub hv3: f32,
    /// `hv1 - hv2`.
    pub hv1_minus_hv2: f32,
    /// Battery string current.
    pub current1: f32,
    pub raw: RawCounts,
    /// Accepted sensor lines so far (wrapping).
    pub seq: u32,
}

/// Aux contact readings, already corrected for sense polarity.
/// An absent aux contact always reads open.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AuxInputs {
    pub aux1_closed: bool,
    pub aux2_closed: bool,
}

// ---------------------------------------------------------------------------
// ContactorContext
// ---------------------------------------------------------------------------

pub struct ContactorContext {
    // -- Configuration --
    pub config: ContactorConfig,

    // -- Inputs --
    pub hv: HvReadings,
    pub aux: AuxInputs,
    pub events: EventFlags,
    /// Byte 0 of the last command / keep-alive.
    pub last_command: u8,
    /// Monotonic time of the current wake.
    pub now_ms: u64,

    // -- State --
    /// Mirrors the engine's current state.
    pub state: ContactorState,
    pub substate: ConnectSubstate,
    pub disconnect_phase: DisconnectPhase,
    pub fault: FaultCode,
    /// Pre-charge was already complete when #1 closed.
    pub warning: bool,
    /// `hv.seq` when the last coil was pulled in.
    pub energised_seq: u32,

    // -- Outputs --
    pub outputs: OutputFlags,
    pub coil1: CoilRequest,
    pub coil2: CoilRequest,
    pub interlock: bool,
    pub delay: DelayRequest,
}

impl ContactorContext {
    pub fn new(config: ContactorConfig) -> Self {
        Self {
            config,
            hv: HvReadings::default(),
            aux: AuxInputs::default(),
            events: EventFlags::empty(),
            last_command: 0,
            now_ms: 0,
            state: ContactorState::Disconnected,
            substate: ConnectSubstate::Close1,
            disconnect_phase: DisconnectPhase::OpenCoil2,
            fault: FaultCode::NoFault,
            warning: false,
            energised_seq: 0,
            outputs: OutputFlags::empty(),
            coil1: CoilRequest::Off,
            coil2: CoilRequest::Off,
            interlock: false,
            delay: DelayRequest::Keep,
        }
    }

    /// Readings are current.
    pub fn hv_fresh(&self) -> bool {
        self.events.contains(EventFlags::HV_NEW)
    }

    pub fn connect_requested(&self) -> bool {
        self.events.contains(EventFlags::CMD_CONNECT)
    }

    pub fn reset_requested(&self) -> bool {
        self.events.contains(EventFlags::CMD_RESET)
    }

    /// A coil was just pulled in; closure checks wait for a newer line.
    pub fn mark_energised(&mut self) {
        self.energised_seq = self.hv.seq;
    }

    /// A line has been accepted since the last pull-in.
    pub fn reading_since_energise(&self) -> bool {
        self.hv.seq != self.energised_seq
    }

    /// Arm the sequencing delay.  Any expiry already seen is discarded.
    pub fn start_delay(&mut self, ms: u32) {
        self.events.remove(EventFlags::DELAY_EXPIRED);
        self.delay = DelayRequest::Start(ms);
    }

    pub fn cancel_delay(&mut self) {
        self.events.remove(EventFlags::DELAY_EXPIRED);
        self.delay = DelayRequest::Cancel;
    }

    /// A delay expiry is pending (not consumed).
    pub fn delay_expired(&self) -> bool {
        self.events.contains(EventFlags::DELAY_EXPIRED)
    }

    /// Consume a pending delay expiry.
    pub fn take_delay_expired(&mut self) -> bool {
        let expired = self.events.contains(EventFlags::DELAY_EXPIRED);
        self.events.remove(EventFlags::DELAY_EXPIRED);
        expired
    }

    /// Record `code` and request the transition into `Faulting`.
    pub fn fault(&mut self, code: FaultCode) -> Option<ContactorState> {
        warn!("fault {:?} (code {}) in {:?}", code, code.code(), self.state);
        self.fault = code;
        Some(ContactorState::Faulting)
    }

    /// Coils released and interlock off.
    pub fn all_off(&mut self) {
        self.coil2 = CoilRequest::Off;
        self.coil1 = CoilRequest::Off;
        self.interlock = false;
    }
}
