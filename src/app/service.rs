//! Application service: the hexagonal core.
//!
//! [`ContactorService`] owns the state machine, the context, the output
//! aggregator and the closure timers.  One call to
//! [`process`](ContactorService::process) is one wake of the control
//! task: one handler → one state step → outputs.
//!
//! ```text
//!  SensorLinePort ─┐                               ┌──▶ CoilPort
//!  MailboxPort ────┤   ┌───────────────────────┐   ├──▶ BusPort
//!  AuxPort ────────┼──▶│   ContactorService    │───┤
//!  ClockPort ──────┘   │ handlers · FSM · outs │   └──▶ EventSink
//!  TimerPort ◀─────────└───────────────────────┘
//! ```

use log::{debug, error, info};

use crate::config::ContactorConfig;
use crate::diagnostics::ClosureTimer;
use crate::error::{Error, Result};
use crate::events::Dispatch;
use crate::fsm::context::{AuxInputs, ContactorContext, DelayRequest, FaultCode};
use crate::fsm::states::build_state_table;
use crate::fsm::{ContactorState, Fsm};
use crate::timers::TimerId;

use super::events::ContactorEvent;
use super::handlers;
use super::ports::{ContactorHw, EventSink, TimerPort};
use super::status::OutputAggregator;

pub struct ContactorService {
    fsm: Fsm,
    ctx: ContactorContext,
    outputs: OutputAggregator,
    timing: ClosureTimer,
    wakes: u64,
    started: bool,
}

impl ContactorService {
    /// Validate `config` and build the service.  Does not start it.
    pub fn new(config: ContactorConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            fsm: Fsm::new(build_state_table(), ContactorState::Disconnected),
            ctx: ContactorContext::new(config),
            outputs: OutputAggregator::new(ContactorState::Disconnected),
            timing: ClosureTimer::new(),
            wakes: 0,
            started: false,
        })
    }

    // ── Lifecycle ─────────────────────────────────────────────

    /// Enter the initial state, drive all outputs to it and arm both
    /// watchdogs.
    pub fn start(
        &mut self,
        hw: &mut impl ContactorHw,
        timers: &impl TimerPort,
        sink: &mut impl EventSink,
    ) -> Result<()> {
        if self.started {
            return Err(Error::Init("service already started"));
        }
        self.ctx.now_ms = hw.now_ms();
        self.fsm.start(&mut self.ctx);
        self.apply_delay(timers);
        self.outputs.apply_all(&mut self.ctx, hw);

        timers.start(TimerId::CommandKeepAlive, self.ctx.config.keepalive_timeout_ms)?;
        timers.start(TimerId::SensorWatchdog, self.ctx.config.sensor_timeout_ms)?;

        self.started = true;
        sink.emit(&ContactorEvent::Started(self.fsm.current_state()));
        info!("ContactorService started in {:?}", self.fsm.current_state());
        Ok(())
    }

    // ── Per-wake orchestration ────────────────────────────────

    /// Handle one wake.  `dispatch` comes from
    /// [`Notifier::take`](crate::events::Notifier::take) or
    /// [`classify`](crate::events::classify); its bit is already out of
    /// the word.
    pub fn process(
        &mut self,
        dispatch: Dispatch,
        hw: &mut impl ContactorHw,
        timers: &impl TimerPort,
        sink: &mut impl EventSink,
    ) {
        self.wakes += 1;
        self.ctx.now_ms = hw.now_ms();

        // 1. At most one handler.
        match dispatch.event {
            Some(event) => {
                debug!("wake {}: {}", self.wakes, event.name());
                handlers::handle(event, &mut self.ctx, &self.timing, hw, timers, sink);
            }
            None => debug!("wake {}: unknown bits 0x{:08X}", self.wakes, dispatch.consumed),
        }

        // 2. Inputs the states read directly.
        let levels = hw.read_aux();
        let hw_cfg = self.ctx.config.hw;
        self.ctx.aux = AuxInputs {
            aux1_closed: hw_cfg.aux1_present() && hw_cfg.aux1_closed(levels.aux1_high),
            aux2_closed: hw_cfg.aux2_present() && hw_cfg.aux2_closed(levels.aux2_high),
        };

        // 3. State step.
        let prev = self.fsm.current_state();
        let prev_fault = self.ctx.fault;
        let state = self.fsm.step(&mut self.ctx);
        self.apply_delay(timers);

        debug_assert_eq!(
            self.ctx.fault != FaultCode::NoFault,
            state.is_fault(),
            "fault {:?} in state {:?}",
            self.ctx.fault,
            state
        );

        if state != prev {
            sink.emit(&ContactorEvent::StateChanged { from: prev, to: state });
        }
        if self.ctx.fault != prev_fault {
            if self.ctx.fault == FaultCode::NoFault {
                sink.emit(&ContactorEvent::FaultCleared);
            } else {
                sink.emit(&ContactorEvent::FaultRaised(self.ctx.fault));
            }
        }

        // 4. Outputs and unsolicited frames.
        self.outputs.update(&mut self.ctx, &mut self.timing, hw);
    }

    // ── Queries ───────────────────────────────────────────────

    pub fn state(&self) -> ContactorState {
        self.fsm.current_state()
    }

    pub fn context(&self) -> &ContactorContext {
        &self.ctx
    }

    pub fn fault(&self) -> FaultCode {
        self.ctx.fault
    }

    pub fn config(&self) -> &ContactorConfig {
        &self.ctx.config
    }

    pub fn closure_timing(&self) -> &ClosureTimer {
        &self.timing
    }

    /// Wakes processed since start.
    pub fn wakes(&self) -> u64 {
        self.wakes
    }

    // ── Internal ──────────────────────────────────────────────

    fn apply_delay(&mut self, timers: &impl TimerPort) {
        match core::mem::take(&mut self.ctx.delay) {
            DelayRequest::Keep => {}
            DelayRequest::Start(ms) => {
                if let Err(e) = timers.start(TimerId::Delay, ms) {
                    error!("delay timer start failed: {e}");
                }
            }
            DelayRequest::Cancel => timers.stop(TimerId::Delay),
        }
    }
}
