//! Notification word and event classifier.
//!
//! Producers are:
//! - the timer bank (watchdogs, sequencing delay)
//! - the sensor line transport (line ready)
//! - the CAN mailbox delivery (command, keep-alive, poll)
//! - the ADC driver (sample block ready)
//!
//! Each producer owns one bit and only ever ORs it into the word.  The
//! control task is the single consumer: it waits for a non-zero word,
//! lets [`classify`] pick exactly one source and clears that source's
//! bit before handling it.  A post for the same source that lands while
//! the handler runs sets the bit again and produces another wake.
//!
//! ```text
//! ┌─────────────┐     ┌──────────────┐     ┌──────────────┐
//! │ Timer bank  │────▶│              │     │              │
//! │ Sensor line │────▶│  Notifier    │────▶│ Control task │
//! │ CAN mailbox │────▶│  (atomic)    │     │  (consumer)  │
//! │ ADC         │────▶│              │     │              │
//! └─────────────┘     └──────────────┘     └──────────────┘
//! ```

use core::sync::atomic::{AtomicU32, Ordering};

use embassy_sync::blocking_mutex::raw::RawMutex;
use embassy_sync::signal::Signal;

use crate::app::ports::TimerDelegate;
use crate::timers::TimerId;

/// Notification sources, in dispatch priority order.
/// Lower discriminant = higher priority when several bits are pending.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Notification {
    /// ADC sample block ready.
    AdcReady = 0,
    /// A complete sensor line is available.
    SensorLine = 1,
    /// Reserved.
    Spare = 2,
    /// Sensor line watchdog expired.
    SensorWatchdog = 3,
    /// Command / keep-alive watchdog expired.
    CommandWatchdog = 4,
    /// Sequencing delay expired.
    DelayTimeout = 5,
    /// Command message in its mailbox.
    CommandMsg = 6,
    /// Keep-alive message in its mailbox.
    KeepAliveMsg = 7,
    /// Time-sync poll in its mailbox.
    PollMsg = 8,
}

impl Notification {
    pub const COUNT: usize = 9;

    /// Every bit this module knows about.
    pub const KNOWN_MASK: u32 = (1 << Self::COUNT) - 1;

    pub const fn bit(self) -> u32 {
        1 << self as u32
    }

    pub fn from_index(i: u32) -> Option<Self> {
        match i {
            0 => Some(Self::AdcReady),
            1 => Some(Self::SensorLine),
            2 => Some(Self::Spare),
            3 => Some(Self::SensorWatchdog),
            4 => Some(Self::CommandWatchdog),
            5 => Some(Self::DelayTimeout),
            6 => Some(Self::CommandMsg),
            7 => Some(Self::KeepAliveMsg),
            8 => Some(Self::PollMsg),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::AdcReady => "adc-ready",
            Self::SensorLine => "sensor-line",
            Self::Spare => "spare",
            Self::SensorWatchdog => "sensor-watchdog",
            Self::CommandWatchdog => "command-watchdog",
            Self::DelayTimeout => "delay-timeout",
            Self::CommandMsg => "command-msg",
            Self::KeepAliveMsg => "keepalive-msg",
            Self::PollMsg => "poll-msg",
        }
    }
}

impl From<TimerId> for Notification {
    fn from(id: TimerId) -> Self {
        match id {
            TimerId::CommandKeepAlive => Self::CommandWatchdog,
            TimerId::Delay => Self::DelayTimeout,
            TimerId::SensorWatchdog => Self::SensorWatchdog,
        }
    }
}

// ── Classifier ────────────────────────────────────────────────

/// Outcome of classifying one pending word.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Dispatch {
    /// The single source to handle this wake, if any.
    pub event: Option<Notification>,
    /// Bits taken out of the word by this dispatch.
    pub consumed: u32,
}

/// Pick the highest-priority known source in `pending`.
///
/// Only that source's bit is consumed; the rest stay pending.  A word
/// holding nothing but unknown bits is consumed whole without dispatch,
/// otherwise the consumer would spin on it forever.
pub fn classify(pending: u32) -> Dispatch {
    let known = pending & Notification::KNOWN_MASK;
    if known != 0 {
        let index = known.trailing_zeros();
        if let Some(event) = Notification::from_index(index) {
            return Dispatch {
                event: Some(event),
                consumed: 1 << index,
            };
        }
    }
    Dispatch {
        event: None,
        consumed: pending & !Notification::KNOWN_MASK,
    }
}

// ── Notifier ──────────────────────────────────────────────────

/// The shared notification word plus a wake signal for the consumer.
///
/// `post` is lock-free and may be called from interrupt context; the
/// `Signal` only needs the raw mutex for the wake hand-off.
pub struct Notifier<M: RawMutex> {
    word: AtomicU32,
    wake: Signal<M, ()>,
}

impl<M: RawMutex> Notifier<M> {
    pub const fn new() -> Self {
        Self {
            word: AtomicU32::new(0),
            wake: Signal::new(),
        }
    }

    /// OR `bits` into the word and wake the consumer.
    pub fn post(&self, bits: u32) {
        if bits == 0 {
            return;
        }
        self.word.fetch_or(bits, Ordering::AcqRel);
        self.wake.signal(());
    }

    /// Post a single source.
    pub fn notify(&self, source: Notification) {
        self.post(source.bit());
    }

    /// Take the next source out of the word without blocking.
    ///
    /// The chosen bit is cleared here, before its handler runs.  Bits
    /// of lower priority stay pending.
    pub fn take(&self) -> Option<Dispatch> {
        let pending = self.word.load(Ordering::Acquire);
        if pending == 0 {
            return None;
        }
        let dispatch = classify(pending);
        // Producers only set bits, so clearing what was seen is safe.
        self.word.fetch_and(!dispatch.consumed, Ordering::AcqRel);
        Some(dispatch)
    }

    /// Block until a source is pending and take it.  There is no
    /// timeout.
    pub async fn wait(&self) -> Dispatch {
        loop {
            self.wake.reset();
            if let Some(dispatch) = self.take() {
                return dispatch;
            }
            self.wake.wait().await;
        }
    }

    /// Current word without clearing anything.
    pub fn peek(&self) -> u32 {
        self.word.load(Ordering::Acquire)
    }
}

impl<M: RawMutex> Default for Notifier<M> {
    fn default() -> Self {
        Self::new()
    }
}

impl<M: RawMutex> TimerDelegate for Notifier<M> {
    fn on_timer_expired(&self, id: TimerId) {
        self.notify(Notification::from(id));
    }
}
