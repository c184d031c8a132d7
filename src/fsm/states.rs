//! Concrete state functions and table builder.
//!
//! ```text
//!  DISCONNECTED ──[connect, battery ok]──▶ CONNECTING ──[#2 closed]──▶ CONNECTED
//!       ▲                                     │  1 Close1                  │
//!       │                                     │  2 PrechargeMin            │
//!       │                                     │  3 PrechargeWait           │
//!       │                                     │  4 Close2                  │
//!       │                          [connect cleared]              [connect cleared]
//!       │                                     ▼                            │
//!       └──────────[both open]────────── DISCONNECTING ◀───────────────────┘
//!
//!  any check failure ──▶ FAULTING ──▶ FAULTED ──[reset]──▶ RESETTING ──▶ DISCONNECTED
//! ```
//!
//! Every wait is bounded by the delay timer.  A state asks for it with
//! `ctx.start_delay()` and learns of expiry through
//! `ctx.take_delay_expired()`; the service arms the real timer after
//! the step.

use log::{info, warn};

use super::context::{
    CoilRequest, ConnectSubstate, ContactorContext, DisconnectPhase, EventFlags, FaultCode,
};
use super::{ContactorState, StateDescriptor};
use crate::safety;

// ═══════════════════════════════════════════════════════════════════════════
//  Table builder
// ═══════════════════════════════════════════════════════════════════════════

pub fn build_state_table() -> [StateDescriptor; ContactorState::COUNT] {
    [
        StateDescriptor {
            id: ContactorState::Disconnected,
            name: "Disconnected",
            on_enter: Some(disconnected_enter),
            on_update: disconnected_update,
        },
        StateDescriptor {
            id: ContactorState::Connecting,
            name: "Connecting",
            on_enter: Some(connecting_enter),
            on_update: connecting_update,
        },
        StateDescriptor {
            id: ContactorState::Connected,
            name: "Connected",
            on_enter: Some(connected_enter),
            on_update: connected_update,
        },
        StateDescriptor {
            id: ContactorState::Faulting,
            name: "Faulting",
            on_enter: Some(faulting_enter),
            on_update: faulting_update,
        },
        StateDescriptor {
            id: ContactorState::Faulted,
            name: "Faulted",
            on_enter: Some(faulted_enter),
            on_update: faulted_update,
        },
        StateDescriptor {
            id: ContactorState::Resetting,
            name: "Resetting",
            on_enter: Some(resetting_enter),
            on_update: resetting_update,
        },
        StateDescriptor {
            id: ContactorState::Disconnecting,
            name: "Disconnecting",
            on_enter: Some(disconnecting_enter),
            on_update: disconnecting_update,
        },
    ]
}

// ═══════════════════════════════════════════════════════════════════════════
//  DISCONNECTED
// ═══════════════════════════════════════════════════════════════════════════

fn disconnected_enter(ctx: &mut ContactorContext) {
    ctx.all_off();
    ctx.cancel_delay();
    ctx.substate = ConnectSubstate::Close1;
    info!("DISCONNECTED: coils released");
}

fn disconnected_update(ctx: &mut ContactorContext) -> Option<ContactorState> {
    if !ctx.connect_requested() {
        return None;
    }

    if let Some(code) = safety::aux_closed_while_off(ctx) {
        return ctx.fault(code);
    }

    if safety::battery_ok(ctx) {
        info!(
            "DISCONNECTED: connect requested, battery {:.1} V",
            ctx.hv.hv1
        );
        return Some(ContactorState::Connecting);
    }

    None
}

// ═══════════════════════════════════════════════════════════════════════════
//  CONNECTING
// ═══════════════════════════════════════════════════════════════════════════

fn connecting_enter(ctx: &mut ContactorContext) {
    ctx.substate = ConnectSubstate::Close1;
    ctx.warning = false;
    ctx.coil2 = CoilRequest::Off;
    ctx.coil1 = CoilRequest::Pull;
    ctx.mark_energised();
    ctx.start_delay(ctx.config.close1_ms);
    info!("CONNECTING: coil #1 pulled in, {} ms", ctx.config.close1_ms);
}

fn connecting_update(ctx: &mut ContactorContext) -> Option<ContactorState> {
    if !ctx.connect_requested() {
        info!("CONNECTING: disconnect requested in {:?}", ctx.substate);
        return Some(ContactorState::Disconnecting);
    }
    if let Some(code) = safety::battery_low(ctx) {
        return ctx.fault(code);
    }

    match ctx.substate {
        ConnectSubstate::Close1 => {
            if !ctx.delay_expired() {
                return None;
            }
            if let Some(code) = safety::aux1_open_while_on(ctx) {
                return ctx.fault(code);
            }
            if !ctx.reading_since_energise() {
                let code = safety::contactor1_voltage_fault(ctx);
                return await_closure_reading(ctx, code);
            }
            ctx.take_delay_expired();
            if let Some(code) = safety::contactor1_voltage(ctx) {
                return ctx.fault(code);
            }
            ctx.coil1 = CoilRequest::Hold;
            if ctx.hv.hv3 < ctx.config.precharge_end_v {
                warn!(
                    "CONNECTING: pre-charge already complete ({:.1} V across #2)",
                    ctx.hv.hv3
                );
                ctx.warning = true;
            }
            ctx.start_delay(ctx.config.precharge_min_ms);
            ctx.substate = ConnectSubstate::PrechargeMin;
            None
        }

        ConnectSubstate::PrechargeMin => {
            if let Some(code) = safety::aux1_open_while_on(ctx) {
                return ctx.fault(code);
            }
            if ctx.take_delay_expired() {
                ctx.start_delay(ctx.config.precharge_max_ms);
                ctx.substate = ConnectSubstate::PrechargeWait;
            }
            None
        }

        ConnectSubstate::PrechargeWait => {
            if let Some(code) = safety::aux1_open_while_on(ctx) {
                return ctx.fault(code);
            }
            if ctx.hv_fresh() && ctx.hv.hv3 <= ctx.config.precharge_end_v {
                info!(
                    "CONNECTING: pre-charge done ({:.1} V), coil #2 pulled in",
                    ctx.hv.hv3
                );
                ctx.coil2 = CoilRequest::Pull;
                ctx.mark_energised();
                ctx.start_delay(ctx.config.close2_ms);
                ctx.substate = ConnectSubstate::Close2;
                return None;
            }
            if ctx.take_delay_expired() {
                return ctx.fault(FaultCode::PrechargeVoltageNotReached);
            }
            None
        }

        ConnectSubstate::Close2 => {
            if let Some(code) = safety::aux1_open_while_on(ctx) {
                return ctx.fault(code);
            }
            if !ctx.delay_expired() {
                return None;
            }
            if let Some(code) = safety::aux2_open_while_on(ctx) {
                return ctx.fault(code);
            }
            if !ctx.reading_since_energise() {
                return await_closure_reading(ctx, FaultCode::Contactor2ClosedVoltsTooBig);
            }
            ctx.take_delay_expired();
            if let Some(code) = safety::contactor2_voltage(ctx) {
                return ctx.fault(code);
            }
            ctx.coil2 = CoilRequest::Hold;
            Some(ContactorState::Connected)
        }
    }
}

/// The closure delay ran out but every reading predates the pull-in.
/// Hold the expiry until a new line arrives; with the sensor link down
/// the voltage check fails with `code`.
fn await_closure_reading(ctx: &mut ContactorContext, code: FaultCode) -> Option<ContactorState> {
    if ctx.events.contains(EventFlags::SENSOR_TIMEOUT) {
        warn!("CONNECTING: no reading since pull-in and sensor link down");
        return ctx.fault(code);
    }
    None
}

// ═══════════════════════════════════════════════════════════════════════════
//  CONNECTED
// ═══════════════════════════════════════════════════════════════════════════

fn connected_enter(ctx: &mut ContactorContext) {
    ctx.coil1 = CoilRequest::Hold;
    ctx.coil2 = CoilRequest::Hold;
    ctx.interlock = true;
    ctx.cancel_delay();
    info!("CONNECTED: both contactors holding, interlock on");
}

fn connected_update(ctx: &mut ContactorContext) -> Option<ContactorState> {
    if !ctx.connect_requested() {
        return Some(ContactorState::Disconnecting);
    }
    if let Some(code) = safety::aux_open_while_on(ctx) {
        return ctx.fault(code);
    }
    if ctx.hv_fresh() {
        if let Some(code) = safety::contactor1_voltage(ctx) {
            return ctx.fault(code);
        }
        if let Some(code) = safety::contactor2_voltage(ctx) {
            return ctx.fault(code);
        }
    }
    None
}

// ═══════════════════════════════════════════════════════════════════════════
//  FAULTING: one-shot safe shutdown
// ═══════════════════════════════════════════════════════════════════════════

fn faulting_enter(ctx: &mut ContactorContext) {
    ctx.all_off();
    ctx.cancel_delay();
    warn!(
        "FAULTING: coils released, fault {:?} (code {})",
        ctx.fault,
        ctx.fault.code()
    );
}

fn faulting_update(_ctx: &mut ContactorContext) -> Option<ContactorState> {
    Some(ContactorState::Faulted)
}

// ═══════════════════════════════════════════════════════════════════════════
//  FAULTED: waits for an explicit reset
// ═══════════════════════════════════════════════════════════════════════════

fn faulted_enter(ctx: &mut ContactorContext) {
    ctx.all_off();
    // Only a reset received from here on counts.
    ctx.events.remove(EventFlags::CMD_RESET);
    warn!("FAULTED: waiting for reset");
}

fn faulted_update(ctx: &mut ContactorContext) -> Option<ContactorState> {
    if !ctx.reset_requested() {
        return None;
    }
    if safety::battery_ok(ctx) && safety::aux_all_open(ctx) {
        return Some(ContactorState::Resetting);
    }
    None
}

// ═══════════════════════════════════════════════════════════════════════════
//  RESETTING
// ═══════════════════════════════════════════════════════════════════════════

fn resetting_enter(ctx: &mut ContactorContext) {
    info!("RESETTING: clearing fault {:?}", ctx.fault);
    ctx.fault = FaultCode::NoFault;
    ctx.warning = false;
    ctx.events.remove(EventFlags::CMD_RESET | EventFlags::DELAY_EXPIRED);
}

fn resetting_update(_ctx: &mut ContactorContext) -> Option<ContactorState> {
    Some(ContactorState::Disconnected)
}

// ═══════════════════════════════════════════════════════════════════════════
//  DISCONNECTING: #2 opens first, then #1
// ═══════════════════════════════════════════════════════════════════════════

fn disconnecting_enter(ctx: &mut ContactorContext) {
    ctx.interlock = false;
    ctx.coil2 = CoilRequest::Off;
    ctx.disconnect_phase = DisconnectPhase::OpenCoil2;
    ctx.start_delay(ctx.config.open2_ms);
    info!("DISCONNECTING: coil #2 released, {} ms", ctx.config.open2_ms);
}

fn disconnecting_update(ctx: &mut ContactorContext) -> Option<ContactorState> {
    if !ctx.take_delay_expired() {
        return None;
    }
    let hw = ctx.config.hw;
    match ctx.disconnect_phase {
        DisconnectPhase::OpenCoil2 => {
            if hw.aux2_present() && ctx.aux.aux2_closed {
                return ctx.fault(FaultCode::Contactor2OffAux2On);
            }
            ctx.coil1 = CoilRequest::Off;
            ctx.disconnect_phase = DisconnectPhase::OpenCoil1;
            ctx.start_delay(ctx.config.open1_ms);
            None
        }
        DisconnectPhase::OpenCoil1 => {
            if hw.aux1_present() && ctx.aux.aux1_closed {
                return ctx.fault(FaultCode::Contactor1OffAux1On);
            }
            Some(ContactorState::Disconnected)
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════
//  Tests
// ═══════════════════════════════════════════════════════════════════════════
