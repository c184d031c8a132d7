//! Mock hardware adapter for integration tests.
//!
//! Records every coil / interlock call and every outbound frame so tests
//! can assert on the full output history without a plant model.  Timers
//! are simulated by hand: a test decides when one expires.

use std::cell::RefCell;
use std::collections::VecDeque;

use contactor::adapters::log_sink::RecordingSink;
use contactor::app::events::ContactorEvent;
use contactor::app::ports::{
    AuxLevels, AuxPort, BusPort, ClockPort, Coil, CoilDrive, CoilPort, MailboxPort,
    SensorLinePort, TimerPort,
};
use contactor::app::service::ContactorService;
use contactor::can::{CanFrame, Mailbox};
use contactor::config::ContactorConfig;
use contactor::events::{Notification, classify};
use contactor::sensors::SensorLine;
use contactor::timers::{TimerError, TimerId};

// ── Output call record ────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub enum OutputCall {
    Coil(Coil, CoilDrive),
    Interlock(bool),
}

// ── MockBoard ─────────────────────────────────────────────────

pub struct MockBoard {
    pub now_ms: u64,
    pub lines: VecDeque<SensorLine>,
    pub mailboxes: [VecDeque<CanFrame>; Mailbox::COUNT],
    pub aux: AuxLevels,
    pub calls: Vec<OutputCall>,
    pub sent: Vec<CanFrame>,
}

#[allow(dead_code)]
impl MockBoard {
    pub fn new() -> Self {
        Self {
            now_ms: 0,
            lines: VecDeque::new(),
            mailboxes: [VecDeque::new(), VecDeque::new(), VecDeque::new()],
            aux: AuxLevels::default(),
            calls: Vec::new(),
            sent: Vec::new(),
        }
    }

    pub fn push_line(&mut self, text: &str) {
        let mut line = SensorLine::new();
        line.push_str(text).expect("line fits");
        self.lines.push_back(line);
    }

    pub fn coil(&self, coil: Coil) -> CoilDrive {
        self.calls
            .iter()
            .rev()
            .find_map(|c| match c {
                OutputCall::Coil(which, drive) if *which == coil => Some(*drive),
                _ => None,
            })
            .unwrap_or(CoilDrive::Off)
    }

    pub fn interlock(&self) -> bool {
        self.calls
            .iter()
            .rev()
            .find_map(|c| match c {
                OutputCall::Interlock(on) => Some(*on),
                _ => None,
            })
            .unwrap_or(false)
    }

    pub fn frames_with_id(&self, id: u32) -> Vec<&CanFrame> {
        self.sent.iter().filter(|f| f.id == id).collect()
    }
}

impl Default for MockBoard {
    fn default() -> Self {
        Self::new()
    }
}

impl SensorLinePort for MockBoard {
    fn take_line(&mut self) -> Option<SensorLine> {
        self.lines.pop_front()
    }
}

impl MailboxPort for MockBoard {
    fn take_frame(&mut self, mailbox: Mailbox) -> Option<CanFrame> {
        self.mailboxes[mailbox as usize].pop_front()
    }
}

impl AuxPort for MockBoard {
    fn read_aux(&mut self) -> AuxLevels {
        self.aux
    }
}

impl CoilPort for MockBoard {
    fn set_coil(&mut self, coil: Coil, drive: CoilDrive) {
        self.calls.push(OutputCall::Coil(coil, drive));
    }

    fn set_interlock(&mut self, on: bool) {
        self.calls.push(OutputCall::Interlock(on));
    }
}

impl BusPort for MockBoard {
    fn send(&mut self, frame: &CanFrame) {
        self.sent.push(frame.clone());
    }
}

impl ClockPort for MockBoard {
    fn now_ms(&self) -> u64 {
        self.now_ms
    }
}

// ── MockTimers ────────────────────────────────────────────────

#[derive(Default)]
pub struct MockTimers {
    running: RefCell<[Option<u32>; TimerId::COUNT]>,
    pub starts: RefCell<Vec<(TimerId, u32)>>,
}

#[allow(dead_code)]
impl MockTimers {
    pub fn period(&self, id: TimerId) -> Option<u32> {
        self.running.borrow()[id as usize]
    }

    /// The timer ran out.  One-shot timers stop; the auto-reload one
    /// keeps running.
    pub fn expire(&self, id: TimerId) {
        if !id.auto_reload() {
            self.running.borrow_mut()[id as usize] = None;
        }
    }
}

impl TimerPort for MockTimers {
    fn start(&self, id: TimerId, period_ms: u32) -> Result<(), TimerError> {
        if period_ms == 0 {
            return Err(TimerError::ZeroPeriod(id));
        }
        self.running.borrow_mut()[id as usize] = Some(period_ms);
        self.starts.borrow_mut().push((id, period_ms));
        Ok(())
    }

    fn stop(&self, id: TimerId) {
        self.running.borrow_mut()[id as usize] = None;
    }

    fn is_running(&self, id: TimerId) -> bool {
        self.running.borrow()[id as usize].is_some()
    }
}

// ── Rig: service + mocks ──────────────────────────────────────

pub struct Rig {
    pub svc: ContactorService,
    pub hw: MockBoard,
    pub timers: MockTimers,
    pub sink: RecordingSink,
}

#[allow(dead_code)]
impl Rig {
    /// Build and start a service on `config`.
    pub fn new(config: ContactorConfig) -> Self {
        let mut rig = Self {
            svc: ContactorService::new(config).expect("valid config"),
            hw: MockBoard::new(),
            timers: MockTimers::default(),
            sink: RecordingSink::new(),
        };
        rig.svc
            .start(&mut rig.hw, &rig.timers, &mut rig.sink)
            .expect("start");
        rig
    }

    pub fn default_config() -> Self {
        Self::new(ContactorConfig::default())
    }

    /// One wake with `pending`.  Returns the consumed bits.
    pub fn wake(&mut self, pending: u32) -> u32 {
        let dispatch = classify(pending);
        self.svc
            .process(dispatch, &mut self.hw, &self.timers, &mut self.sink);
        dispatch.consumed
    }

    /// Wake until every bit in `pending` is consumed.  Returns the wake
    /// count.
    pub fn drain(&mut self, mut pending: u32) -> usize {
        let mut wakes = 0;
        while pending != 0 {
            pending &= !self.wake(pending);
            wakes += 1;
        }
        wakes
    }

    pub fn notify(&mut self, source: Notification) {
        self.wake(source.bit());
    }

    /// Deliver a sensor line carrying these voltages.
    pub fn volts(&mut self, hv1: f32, hv2: f32, hv3: f32) {
        let cal = self.svc.config().calibration;
        let text = format!(
            "{},{},{}\r\n",
            cal.hv1.counts_for(hv1),
            cal.hv2.counts_for(hv2),
            cal.hv3.counts_for(hv3)
        );
        self.hw.push_line(&text);
        self.notify(Notification::SensorLine);
    }

    pub fn frame(&mut self, mailbox: Mailbox, data: &[u8]) {
        let ids = self.svc.config().can;
        let id = match mailbox {
            Mailbox::Command => ids.command_in,
            Mailbox::KeepAlive => ids.keepalive_in,
            Mailbox::Poll => ids.poll_in,
        };
        self.hw.mailboxes[mailbox as usize].push_back(CanFrame::new(id, data));
        self.notify(mailbox.notification());
    }

    pub fn keepalive(&mut self, byte: u8) {
        self.frame(Mailbox::KeepAlive, &[byte]);
    }

    pub fn command(&mut self, data: &[u8]) {
        self.frame(Mailbox::Command, data);
    }

    /// Let `id` run out and deliver its notification.
    pub fn expire(&mut self, id: TimerId) {
        self.timers.expire(id);
        self.notify(Notification::from(id));
    }

    pub fn advance(&mut self, ms: u64) {
        self.hw.now_ms += ms;
    }

    pub fn events(&self) -> &[ContactorEvent] {
        &self.sink.events
    }
}
