//! Output / status aggregator.
//!
//! Runs once per wake after the state step.  Turns the coil requests the
//! state functions left in the context into electrical drives, keeps the
//! output bits current, feeds the closure timers and decides which
//! unsolicited frames go out.
//!
//! Coil ordering is fixed: when releasing, #2 goes before #1; when
//! energising, #1 goes before #2.

use log::debug;

use crate::can::msgs::{self, StatusWord};
use crate::config::{ContactorConfig, HwConfig};
use crate::diagnostics::ClosureTimer;
use crate::fsm::ContactorState;
use crate::fsm::context::{CoilRequest, ContactorContext, OutputFlags};

use super::ports::{BusPort, Coil, CoilDrive, CoilPort};

/// Snapshot of the context as a status frame payload.
pub fn status_word(ctx: &ContactorContext) -> StatusWord {
    StatusWord {
        state_code: ctx.state.code(),
        faulted: ctx.state.is_fault(),
        warning: ctx.warning,
        last_command: ctx.last_command,
        fault_code: ctx.fault.code(),
        coil1: ctx.outputs.contains(OutputFlags::K1),
        coil2: ctx.outputs.contains(OutputFlags::K2),
        aux1_closed: ctx.aux.aux1_closed,
        aux2_closed: ctx.aux.aux2_closed,
        interlock: ctx.outputs.contains(OutputFlags::INTERLOCK),
    }
}

/// Electrical drive for a coil request.
pub fn coil_drive(config: &ContactorConfig, coil: Coil, request: CoilRequest) -> CoilDrive {
    let (pwm_enabled, pct) = match coil {
        Coil::One => (config.hw.has(HwConfig::PWM_CONTACTOR1), config.pwm1_pct),
        Coil::Two => (config.hw.has(HwConfig::PWM_CONTACTOR2), config.pwm2_pct),
    };
    match request {
        CoilRequest::Off => CoilDrive::Off,
        CoilRequest::Pull => CoilDrive::Full,
        CoilRequest::Hold if pwm_enabled => CoilDrive::Hold(config.hold_counts(pct)),
        CoilRequest::Hold => CoilDrive::Full,
    }
}

pub struct OutputAggregator {
    applied: [CoilDrive; 2],
    interlock: bool,
    last_state: ContactorState,
    next_heartbeat1_ms: u64,
    next_heartbeat2_ms: u64,
}

impl OutputAggregator {
    pub fn new(initial: ContactorState) -> Self {
        Self {
            applied: [CoilDrive::Off; 2],
            interlock: false,
            last_state: initial,
            next_heartbeat1_ms: 0,
            next_heartbeat2_ms: 0,
        }
    }

    /// Force every output to match the context, regardless of what was
    /// applied before.  Used once at start.
    pub fn apply_all(&mut self, ctx: &mut ContactorContext, hw: &mut impl CoilPort) {
        let d1 = coil_drive(&ctx.config, Coil::One, ctx.coil1);
        let d2 = coil_drive(&ctx.config, Coil::Two, ctx.coil2);
        hw.set_coil(Coil::Two, d2);
        hw.set_coil(Coil::One, d1);
        hw.set_interlock(ctx.interlock);
        self.applied = [d1, d2];
        self.interlock = ctx.interlock;
        self.refresh_bits(ctx);
    }

    /// Apply outputs and send whatever frames are due.
    pub fn update(
        &mut self,
        ctx: &mut ContactorContext,
        timing: &mut ClosureTimer,
        hw: &mut (impl CoilPort + BusPort),
    ) {
        self.apply_coils(ctx, hw);
        self.refresh_bits(ctx);
        timing.observe(
            [self.applied[0].is_on(), self.applied[1].is_on()],
            [ctx.aux.aux1_closed, ctx.aux.aux2_closed],
            ctx.now_ms,
        );

        let ids = ctx.config.can;
        if ctx.state != self.last_state {
            debug!("status broadcast: {:?} -> {:?}", self.last_state, ctx.state);
            hw.send(&msgs::status_frame(ids.keepalive_response, &status_word(ctx)));
            if ctx.state == ContactorState::Connected {
                self.next_heartbeat1_ms = ctx.now_ms + u64::from(ctx.config.heartbeat1_ms);
                self.next_heartbeat2_ms = ctx.now_ms + u64::from(ctx.config.heartbeat2_ms);
            }
            self.last_state = ctx.state;
        }

        if ctx.state == ContactorState::Connected {
            if ctx.now_ms >= self.next_heartbeat1_ms {
                hw.send(&msgs::telemetry_frame(ids.heartbeat1, ctx.hv.hv1, ctx.hv.current1));
                self.next_heartbeat1_ms = ctx.now_ms + u64::from(ctx.config.heartbeat1_ms);
            }
            if ctx.now_ms >= self.next_heartbeat2_ms {
                hw.send(&msgs::telemetry_frame(ids.heartbeat2, ctx.hv.hv2, ctx.hv.hv3));
                self.next_heartbeat2_ms = ctx.now_ms + u64::from(ctx.config.heartbeat2_ms);
            }
        }
    }

    // ── Internal ──────────────────────────────────────────────

    fn apply_coils(&mut self, ctx: &ContactorContext, hw: &mut impl CoilPort) {
        let want = [
            coil_drive(&ctx.config, Coil::One, ctx.coil1),
            coil_drive(&ctx.config, Coil::Two, ctx.coil2),
        ];

        // Interlock drops before any coil is released.
        if !ctx.interlock && self.interlock {
            hw.set_interlock(false);
            self.interlock = false;
        }

        // Release: #2 first.
        for (idx, coil) in [(1, Coil::Two), (0, Coil::One)] {
            if !want[idx].is_on() && self.applied[idx].is_on() {
                hw.set_coil(coil, CoilDrive::Off);
                self.applied[idx] = CoilDrive::Off;
            }
        }
        // Energise / change level: #1 first.
        for (idx, coil) in [(0, Coil::One), (1, Coil::Two)] {
            if want[idx].is_on() && want[idx] != self.applied[idx] {
                hw.set_coil(coil, want[idx]);
                self.applied[idx] = want[idx];
            }
        }

        if ctx.interlock && !self.interlock {
            hw.set_interlock(true);
            self.interlock = true;
        }
    }

    fn refresh_bits(&self, ctx: &mut ContactorContext) {
        ctx.outputs.set(OutputFlags::K1, self.applied[0].is_on());
        ctx.outputs.set(OutputFlags::K2, self.applied[1].is_on());
        ctx.outputs.set(OutputFlags::AUX1, ctx.aux.aux1_closed);
        ctx.outputs.set(OutputFlags::AUX2, ctx.aux.aux2_closed);
        ctx.outputs.set(OutputFlags::INTERLOCK, self.interlock);
    }
}
