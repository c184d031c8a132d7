//! Logical timer bank.
//!
//! Three countdown slots driven by [`TimerBank::tick`] from whatever
//! time source the platform has (a hardware timer ISR on target, the
//! simulated clock on the bench).  Expiry is reported through a
//! [`TimerDelegate`]; the bank knows nothing about notifications or the
//! contactor context.
//!
//! ```text
//!  time source ──▶ TimerBank::tick ──▶ TimerDelegate ──▶ Notifier
//!                      ▲
//!  control task ───────┘ start / stop (TimerPort)
//! ```
//!
//! All slots are atomics so `start`/`stop` from the control task and
//! `tick` from the time source may interleave freely.

use core::fmt;
use core::sync::atomic::{AtomicU32, Ordering};

use log::debug;

use crate::app::ports::{TimerDelegate, TimerPort};

// ═══════════════════════════════════════════════════════════════
//  Timer identifiers
// ═══════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum TimerId {
    /// Command / keep-alive message watchdog.  Auto-reloads.
    CommandKeepAlive = 0,
    /// General-purpose sequencing delay.  One-shot.
    Delay = 1,
    /// Sensor line watchdog.  One-shot, re-armed on every good line.
    SensorWatchdog = 2,
}

impl TimerId {
    pub const COUNT: usize = 3;
    pub const ALL: [TimerId; Self::COUNT] =
        [Self::CommandKeepAlive, Self::Delay, Self::SensorWatchdog];

    pub const fn name(self) -> &'static str {
        match self {
            Self::CommandKeepAlive => "keepalive",
            Self::Delay => "delay",
            Self::SensorWatchdog => "sensor-wd",
        }
    }

    pub const fn auto_reload(self) -> bool {
        matches!(self, Self::CommandKeepAlive)
    }
}

// ═══════════════════════════════════════════════════════════════
//  Errors
// ═══════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerError {
    /// A timer cannot be armed with a zero period.
    ZeroPeriod(TimerId),
}

impl fmt::Display for TimerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ZeroPeriod(id) => write!(f, "{} armed with zero period", id.name()),
        }
    }
}

// ═══════════════════════════════════════════════════════════════
//  Timer bank
// ═══════════════════════════════════════════════════════════════

/// Fixed set of countdown timers, one slot per [`TimerId`].
///
/// A slot with `remaining == 0` is idle.  `period` is kept for the
/// auto-reload slot and zeroed by [`stop`](TimerPort::stop).
pub struct TimerBank {
    remaining: [AtomicU32; TimerId::COUNT],
    period: [AtomicU32; TimerId::COUNT],
}

impl TimerBank {
    pub const fn new() -> Self {
        Self {
            remaining: [const { AtomicU32::new(0) }; TimerId::COUNT],
            period: [const { AtomicU32::new(0) }; TimerId::COUNT],
        }
    }

    /// Advance every running slot by `elapsed_ms`.
    ///
    /// Each slot that reaches zero during this call is reported once via
    /// `delegate.on_timer_expired()`.  An auto-reload slot is re-armed
    /// with its period unless it was stopped concurrently.
    pub fn tick(&self, elapsed_ms: u32, delegate: &impl TimerDelegate) {
        if elapsed_ms == 0 {
            return;
        }
        for id in TimerId::ALL {
            let slot = &self.remaining[id as usize];
            let mut current = slot.load(Ordering::Acquire);
            let expired = loop {
                if current == 0 {
                    break false;
                }
                let next = current.saturating_sub(elapsed_ms);
                match slot.compare_exchange_weak(
                    current,
                    next,
                    Ordering::AcqRel,
                    Ordering::Acquire,
                ) {
                    Ok(_) => break next == 0,
                    Err(actual) => current = actual,
                }
            };

            if !expired {
                continue;
            }

            if id.auto_reload() {
                let period = self.period[id as usize].load(Ordering::Acquire);
                if period > 0 {
                    // A start() racing with us wins.
                    let _ = slot.compare_exchange(0, period, Ordering::AcqRel, Ordering::Acquire);
                }
            }
            debug!("timer {} expired", id.name());
            delegate.on_timer_expired(id);
        }
    }

    /// Milliseconds until `id` expires (0 when idle).
    pub fn remaining_ms(&self, id: TimerId) -> u32 {
        self.remaining[id as usize].load(Ordering::Acquire)
    }
}

impl Default for TimerBank {
    fn default() -> Self {
        Self::new()
    }
}

impl TimerPort for TimerBank {
    fn start(&self, id: TimerId, period_ms: u32) -> Result<(), TimerError> {
        if period_ms == 0 {
            return Err(TimerError::ZeroPeriod(id));
        }
        self.period[id as usize].store(period_ms, Ordering::Release);
        self.remaining[id as usize].store(period_ms, Ordering::Release);
        Ok(())
    }

    fn stop(&self, id: TimerId) {
        self.period[id as usize].store(0, Ordering::Release);
        self.remaining[id as usize].store(0, Ordering::Release);
    }

    fn is_running(&self, id: TimerId) -> bool {
        self.remaining_ms(id) > 0
    }
}

// ═══════════════════════════════════════════════════════════════
//  Tests
// ═══════════════════════════════════════════════════════════════
