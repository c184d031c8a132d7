//! Bench plant: a simulated battery pack, pre-charge circuit and
//! contactor pair behind every port the control loop uses.
//!
//! ```text
//!   battery ──[#1]──┬──[Rpre]──┬── load (C)
//!                   └───[#2]───┘
//!   hv1 = battery    hv2 = load side of #1    hv3 = across #2
//! ```
//!
//! Contacts follow their coils after a pull-in / drop-out delay and can
//! be made to weld or stick open.  The sense board emits a line every
//! `line_period_ms`.  [`Bench`] wires the plant, a [`TimerBank`], the
//! [`Notifier`] and a [`ContactorService`] together and advances them on
//! a millisecond clock.

use core::fmt::Write as _;

use embassy_sync::blocking_mutex::raw::RawMutex;
use heapless::Deque;
use log::{debug, warn};

use crate::app::ports::{
    AuxLevels, AuxPort, BusPort, ClockPort, Coil, CoilDrive, CoilPort, EventSink,
    MailboxPort, SensorLinePort,
};
use crate::app::service::ContactorService;
use crate::app::task::ControlTask;
use crate::can::{CanFrame, Mailbox};
use crate::config::{CalibrationTable, CanIds, ContactorConfig, HwConfig};
use crate::error::Result;
use crate::events::{Notification, Notifier};
use crate::fsm::ContactorState;
use crate::sensors::SensorLine;
use crate::timers::TimerBank;

/// Frames a mailbox holds before the oldest is overwritten.
const MAILBOX_DEPTH: usize = 4;
/// Lines the sense-board transport buffers.
const LINE_DEPTH: usize = 4;

// ───────────────────────────────────────────────────────────────
// Plant parameters and injectable faults
// ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlantParams {
    pub battery_v: f32,
    /// Pre-charge RC time constant.
    pub precharge_tau_ms: f32,
    /// Load bleed-down time constant with #1 open.
    pub bleed_tau_ms: f32,
    /// Coil energised to contact closed.
    pub pull_in_ms: u32,
    /// Coil released to contact open.
    pub drop_out_ms: u32,
    pub line_period_ms: u32,
}

impl Default for PlantParams {
    fn default() -> Self {
        Self {
            battery_v: 160.0,
            precharge_tau_ms: 800.0,
            bleed_tau_ms: 2000.0,
            pull_in_ms: 20,
            drop_out_ms: 10,
            line_period_ms: 50,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PlantFaults {
    /// Contact stays closed whatever the coil does.
    pub welded: [bool; 2],
    /// Contact never closes.
    pub stuck_open: [bool; 2],
    /// Aux contact always reads open.
    pub aux_stuck_open: [bool; 2],
    /// Sense board stops sending lines.
    pub sensor_silent: bool,
}

// ───────────────────────────────────────────────────────────────
// Plant
// ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default)]
struct Contact {
    coil_on: bool,
    changed_ms: u64,
    closed: bool,
}

pub struct BenchPlant {
    pub params: PlantParams,
    pub faults: PlantFaults,
    hw: HwConfig,
    calibration: CalibrationTable,
    ids: CanIds,

    now_ms: u64,
    next_line_ms: u64,
    contacts: [Contact; 2],
    drives: [CoilDrive; 2],
    interlock: bool,
    load_v: f32,

    lines: Deque<SensorLine, LINE_DEPTH>,
    mailboxes: [Deque<CanFrame, MAILBOX_DEPTH>; Mailbox::COUNT],
    sent: Vec<CanFrame>,
}

impl BenchPlant {
    pub fn new(config: &ContactorConfig, params: PlantParams) -> Self {
        Self {
            params,
            faults: PlantFaults::default(),
            hw: config.hw,
            calibration: config.calibration,
            ids: config.can,
            now_ms: 0,
            next_line_ms: u64::from(params.line_period_ms),
            contacts: [Contact::default(); 2],
            drives: [CoilDrive::Off; 2],
            interlock: false,
            load_v: 0.0,
            lines: Deque::new(),
            mailboxes: [Deque::new(), Deque::new(), Deque::new()],
            sent: Vec::new(),
        }
    }

    /// Advance the plant by `dt_ms`.  Returns the notification bits the
    /// plant raised (a completed sensor line).
    pub fn advance(&mut self, dt_ms: u32) -> u32 {
        self.now_ms += u64::from(dt_ms);
        self.update_contacts();
        self.update_load(dt_ms as f32);

        if self.now_ms < self.next_line_ms {
            return 0;
        }
        self.next_line_ms = self.now_ms + u64::from(self.params.line_period_ms);
        if self.faults.sensor_silent {
            return 0;
        }
        self.push_line();
        Notification::SensorLine.bit()
    }

    /// Drop `frame` into its mailbox.  `None` when no mailbox listens on
    /// the identifier.
    pub fn deliver(&mut self, frame: CanFrame) -> Option<Mailbox> {
        let mailbox = Mailbox::for_id(frame.id, &self.ids)?;
        let slot = &mut self.mailboxes[mailbox as usize];
        if slot.is_full() {
            slot.pop_front();
        }
        // Cannot fail after the pop above.
        let _ = slot.push_back(frame);
        Some(mailbox)
    }

    /// Voltages the sense board sees: (hv1, hv2, hv3).
    pub fn voltages(&self) -> (f32, f32, f32) {
        let hv1 = self.params.battery_v;
        let hv2 = if self.contacts[0].closed { hv1 } else { 0.0 };
        let hv3 = (hv1 - self.load_v).max(0.0);
        (hv1, hv2, hv3)
    }

    pub fn contact_closed(&self, coil: Coil) -> bool {
        self.contacts[coil_index(coil)].closed
    }

    pub fn drive(&self, coil: Coil) -> CoilDrive {
        self.drives[coil_index(coil)]
    }

    pub fn interlock(&self) -> bool {
        self.interlock
    }

    pub fn load_v(&self) -> f32 {
        self.load_v
    }

    /// Frames the controller has sent.
    pub fn sent(&self) -> &[CanFrame] {
        &self.sent
    }

    pub fn take_sent(&mut self) -> Vec<CanFrame> {
        core::mem::take(&mut self.sent)
    }

    // ── Internal ──────────────────────────────────────────────

    fn update_contacts(&mut self) {
        for i in 0..2 {
            let c = &mut self.contacts[i];
            let settle = if c.coil_on {
                self.params.pull_in_ms
            } else {
                self.params.drop_out_ms
            };
            if self.now_ms >= c.changed_ms + u64::from(settle) {
                c.closed = c.coil_on;
            }
            if self.faults.stuck_open[i] {
                c.closed = false;
            }
            if self.faults.welded[i] {
                c.closed = true;
            }
        }
    }

    fn update_load(&mut self, dt: f32) {
        let battery = self.params.battery_v;
        let [c1, c2] = [self.contacts[0].closed, self.contacts[1].closed];
        if c1 && c2 {
            self.load_v = battery;
        } else if c1 {
            let k = (dt / self.params.precharge_tau_ms).min(1.0);
            self.load_v += (battery - self.load_v) * k;
        } else {
            let k = (dt / self.params.bleed_tau_ms).min(1.0);
            self.load_v -= self.load_v * k;
        }
    }

    fn push_line(&mut self) {
        let (hv1, hv2, hv3) = self.voltages();
        let cal = &self.calibration;
        let mut line = SensorLine::new();
        if write!(
            line,
            "{},{},{}\r\n",
            cal.hv1.counts_for(hv1),
            cal.hv2.counts_for(hv2),
            cal.hv3.counts_for(hv3)
        )
        .is_err()
        {
            warn!("bench: sensor line overflow");
            return;
        }
        if self.lines.is_full() {
            self.lines.pop_front();
        }
        let _ = self.lines.push_back(line);
    }

    fn aux_level(&self, index: usize) -> bool {
        let closed = self.contacts[index].closed && !self.faults.aux_stuck_open[index];
        let sense = match index {
            0 => self.hw.has(HwConfig::AUX1_SENSE),
            _ => self.hw.has(HwConfig::AUX2_SENSE),
        };
        closed == sense
    }
}

fn coil_index(coil: Coil) -> usize {
    match coil {
        Coil::One => 0,
        Coil::Two => 1,
    }
}

// ───────────────────────────────────────────────────────────────
// Port implementations
// ───────────────────────────────────────────────────────────────

impl SensorLinePort for BenchPlant {
    fn take_line(&mut self) -> Option<SensorLine> {
        self.lines.pop_front()
    }
}

impl MailboxPort for BenchPlant {
    fn take_frame(&mut self, mailbox: Mailbox) -> Option<CanFrame> {
        self.mailboxes[mailbox as usize].pop_front()
    }
}

impl AuxPort for BenchPlant {
    fn read_aux(&mut self) -> AuxLevels {
        AuxLevels {
            aux1_high: self.aux_level(0),
            aux2_high: self.aux_level(1),
        }
    }
}

impl CoilPort for BenchPlant {
    fn set_coil(&mut self, coil: Coil, drive: CoilDrive) {
        let i = coil_index(coil);
        self.drives[i] = drive;
        let c = &mut self.contacts[i];
        if c.coil_on != drive.is_on() {
            c.coil_on = drive.is_on();
            c.changed_ms = self.now_ms;
        }
        debug!("bench: {:?} -> {:?} at {} ms", coil, drive, self.now_ms);
    }

    fn set_interlock(&mut self, on: bool) {
        self.interlock = on;
    }
}

impl BusPort for BenchPlant {
    fn send(&mut self, frame: &CanFrame) {
        self.sent.push(frame.clone());
    }
}

impl ClockPort for BenchPlant {
    fn now_ms(&self) -> u64 {
        self.now_ms
    }
}

// ───────────────────────────────────────────────────────────────
// Bench: plant + timers + notifier + control task
// ───────────────────────────────────────────────────────────────

pub struct Bench<'n, M: RawMutex, S: EventSink> {
    pub plant: BenchPlant,
    pub sink: S,
    service: ContactorService,
    timers: TimerBank,
    notifier: &'n Notifier<M>,
    task: ControlTask<'n, M>,
    /// Command byte sent on the keep-alive id every `period` ms.
    keepalive: Option<(u8, u32)>,
    next_keepalive_ms: u64,
}

impl<'n, M: RawMutex, S: EventSink> Bench<'n, M, S> {
    pub fn new(
        config: ContactorConfig,
        params: PlantParams,
        notifier: &'n Notifier<M>,
        sink: S,
    ) -> Result<Self> {
        let plant = BenchPlant::new(&config, params);
        let service = ContactorService::new(config)?;
        Ok(Self {
            plant,
            sink,
            service,
            timers: TimerBank::new(),
            notifier,
            task: ControlTask::new(notifier),
            keepalive: None,
            next_keepalive_ms: 0,
        })
    }

    pub fn start(&mut self) -> Result<()> {
        self.service
            .start(&mut self.plant, &self.timers, &mut self.sink)
    }

    /// Send `byte` on the keep-alive id every `period_ms`, starting now.
    /// `None` stops the keep-alive stream.
    pub fn set_keepalive(&mut self, keepalive: Option<(u8, u32)>) {
        self.keepalive = keepalive;
        self.next_keepalive_ms = self.plant.now_ms;
    }

    /// Deliver a frame as if it arrived on the bus.
    pub fn inject(&mut self, id: u32, payload: &[u8]) {
        match self.plant.deliver(CanFrame::new(id, payload)) {
            Some(mailbox) => self.notifier.notify(mailbox.notification()),
            None => debug!("bench: no mailbox for 0x{:08X}", id),
        }
    }

    pub fn command(&mut self, payload: &[u8]) {
        let id = self.service.config().can.command_in;
        self.inject(id, payload);
    }

    pub fn keepalive(&mut self, byte: u8) {
        let id = self.service.config().can.keepalive_in;
        self.inject(id, &[byte]);
    }

    pub fn poll(&mut self) {
        let id = self.service.config().can.poll_in;
        self.inject(id, &[]);
    }

    /// Run the control task on whatever is already pending.
    pub fn settle(&mut self) -> usize {
        self.task
            .drain(&mut self.service, &mut self.plant, &self.timers, &mut self.sink)
    }

    /// Advance the bench clock by `ms`, one millisecond at a time.
    pub fn run_for(&mut self, ms: u32) {
        for _ in 0..ms {
            if let Some((byte, period)) = self.keepalive {
                if self.plant.now_ms >= self.next_keepalive_ms {
                    self.next_keepalive_ms = self.plant.now_ms + u64::from(period);
                    self.keepalive(byte);
                }
            }
            let bits = self.plant.advance(1);
            self.notifier.post(bits);
            self.timers.tick(1, self.notifier);
            self.settle();
        }
    }

    /// Advance until `state` is reached or `limit_ms` elapses.  Returns
    /// whether the state was reached.
    pub fn run_until(&mut self, state: ContactorState, limit_ms: u32) -> bool {
        for _ in 0..limit_ms {
            if self.service.state() == state {
                return true;
            }
            self.run_for(1);
        }
        self.service.state() == state
    }

    pub fn service(&self) -> &ContactorService {
        &self.service
    }

    pub fn state(&self) -> ContactorState {
        self.service.state()
    }

    pub fn now_ms(&self) -> u64 {
        self.plant.now_ms
    }
}
