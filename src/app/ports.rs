//! Port traits: the hexagonal boundary between domain logic and the outside world.
//!
//! ```text
//!   Adapter ──▶ Port trait ──▶ ContactorService (domain)
//! ```
//!
//! Driven adapters (line transport, mailboxes, coil drivers, bus, timers,
//! event sinks) implement these traits.  The
//! [`ContactorService`](super::service::ContactorService) consumes them
//! through generics, so the domain core never touches hardware directly.
//!
//! None of the port calls made from the control loop can fail in a way
//! the domain could act on: a dropped frame or a missed line shows up
//! later as a watchdog expiry, which the state machine already handles.

use crate::can::{CanFrame, Mailbox};
use crate::sensors::SensorLine;
use crate::timers::{TimerError, TimerId};

// ───────────────────────────────────────────────────────────────
// Inputs (hardware → domain)
// ───────────────────────────────────────────────────────────────

/// Completed lines from the HV sense board.
pub trait SensorLinePort {
    /// Take the most recent completed line, if one is waiting.
    fn take_line(&mut self) -> Option<SensorLine>;
}

/// Inbound mailboxes.  Taking a frame frees the slot.
pub trait MailboxPort {
    fn take_frame(&mut self, mailbox: Mailbox) -> Option<CanFrame>;
}

/// Raw aux contact input levels.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AuxLevels {
    pub aux1_high: bool,
    pub aux2_high: bool,
}

pub trait AuxPort {
    fn read_aux(&mut self) -> AuxLevels;
}

/// Monotonic time.
pub trait ClockPort {
    fn now_ms(&self) -> u64;
}

// ───────────────────────────────────────────────────────────────
// Outputs (domain → hardware)
// ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Coil {
    One,
    Two,
}

/// Electrical drive for one coil.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CoilDrive {
    #[default]
    Off,
    /// 100 % duty.
    Full,
    /// PWM hold at `counts` out of the timer period.
    Hold(u16),
}

impl CoilDrive {
    pub const fn is_on(self) -> bool {
        !matches!(self, Self::Off)
    }
}

pub trait CoilPort {
    fn set_coil(&mut self, coil: Coil, drive: CoilDrive);

    /// Interlock FET enabling the downstream load.
    fn set_interlock(&mut self, on: bool);
}

/// Outbound bus frames.
pub trait BusPort {
    fn send(&mut self, frame: &CanFrame);
}

/// Everything the control loop needs from the board, in one bound.
pub trait ContactorHw:
    SensorLinePort + MailboxPort + AuxPort + CoilPort + BusPort + ClockPort
{
}

impl<T> ContactorHw for T where
    T: SensorLinePort + MailboxPort + AuxPort + CoilPort + BusPort + ClockPort
{
}

// ───────────────────────────────────────────────────────────────
// Timers
// ───────────────────────────────────────────────────────────────

/// Arm and disarm the logical timers.  `&self` so the bank can be shared
/// with whatever drives its countdown.
pub trait TimerPort {
    /// (Re)start `id` with `period_ms`.  Restarting a running timer
    /// resets its countdown.
    fn start(&self, id: TimerId, period_ms: u32) -> Result<(), TimerError>;

    fn stop(&self, id: TimerId);

    /// Whether `id` is counting down.  An expiry notification for a
    /// timer that is running again is stale.
    fn is_running(&self, id: TimerId) -> bool;
}

impl<T: TimerPort + ?Sized> TimerPort for &T {
    fn start(&self, id: TimerId, period_ms: u32) -> Result<(), TimerError> {
        (**self).start(id, period_ms)
    }

    fn stop(&self, id: TimerId) {
        (**self).stop(id);
    }

    fn is_running(&self, id: TimerId) -> bool {
        (**self).is_running(id)
    }
}

/// Callback the timer bank invokes on expiry.  The notifier implements
/// this by posting the timer's bit; the bank knows nothing about
/// notifications.
pub trait TimerDelegate {
    fn on_timer_expired(&self, id: TimerId);
}

// ───────────────────────────────────────────────────────────────
// Event sink (domain → logging / telemetry)
// ───────────────────────────────────────────────────────────────

/// The domain emits structured
/// [`ContactorEvent`](super::events::ContactorEvent)s through this port.
pub trait EventSink {
    fn emit(&mut self, event: &super::events::ContactorEvent);
}
