//! Contactor plausibility checks.
//!
//! Pure functions over the context that the state functions call.  Each
//! returns the [`FaultCode`] to raise, or `None` when the check passes.
//! Nothing here mutates the context; recording the fault and moving to
//! `Faulting` is the caller's job (`ctx.fault(code)`).
//!
//! ## Aux contacts
//!
//! A contactor without auxiliary contacts (`HwConfig::AUX*_PRESENT`
//! clear) can never fail an aux check.  Contactor #1 closure is then
//! judged from the voltage across it alone, which is why a large
//! `hv1 - hv2` maps to a different code with and without aux #1.

use crate::fsm::context::{CoilRequest, ContactorContext, FaultCode};

/// An aux contact reads closed while its coil is released.
pub fn aux_closed_while_off(ctx: &ContactorContext) -> Option<FaultCode> {
    let hw = ctx.config.hw;
    if hw.aux1_present() && ctx.coil1 == CoilRequest::Off && ctx.aux.aux1_closed {
        return Some(FaultCode::Contactor1OffAux1On);
    }
    if hw.aux2_present() && ctx.coil2 == CoilRequest::Off && ctx.aux.aux2_closed {
        return Some(FaultCode::Contactor2OffAux2On);
    }
    None
}

/// Aux #1 reads open while coil #1 is driven.
pub fn aux1_open_while_on(ctx: &ContactorContext) -> Option<FaultCode> {
    (ctx.config.hw.aux1_present() && ctx.coil1.is_on() && !ctx.aux.aux1_closed)
        .then_some(FaultCode::Contactor1OnAux1Off)
}

/// Aux #2 reads open while coil #2 is driven.
pub fn aux2_open_while_on(ctx: &ContactorContext) -> Option<FaultCode> {
    (ctx.config.hw.aux2_present() && ctx.coil2.is_on() && !ctx.aux.aux2_closed)
        .then_some(FaultCode::Contactor2OnAux2Off)
}

/// Both aux checks for coils that are driven.
pub fn aux_open_while_on(ctx: &ContactorContext) -> Option<FaultCode> {
    aux1_open_while_on(ctx).or_else(|| aux2_open_while_on(ctx))
}

/// Voltage across contactor #1 too large for a closed contact.
pub fn contactor1_voltage(ctx: &ContactorContext) -> Option<FaultCode> {
    (ctx.hv.hv1_minus_hv2.abs() > ctx.config.hv1_minus_hv2_max_v)
        .then(|| contactor1_voltage_fault(ctx))
}

/// Code for contactor #1 failing its voltage check.  Without aux #1 the
/// voltage is the only evidence of closure.
pub fn contactor1_voltage_fault(ctx: &ContactorContext) -> FaultCode {
    if ctx.config.hw.aux1_present() {
        FaultCode::Contactor1ClosedVoltsTooBig
    } else {
        FaultCode::Contactor1DoesNotAppearClosed
    }
}

/// Voltage across contactor #2 too large for a closed contact.
pub fn contactor2_voltage(ctx: &ContactorContext) -> Option<FaultCode> {
    (ctx.hv.hv3 > ctx.config.diff_after_v).then_some(FaultCode::Contactor2ClosedVoltsTooBig)
}

/// Fresh battery reading below the connect threshold.
pub fn battery_low(ctx: &ContactorContext) -> Option<FaultCode> {
    (ctx.hv_fresh() && ctx.hv.hv1 < ctx.config.battery_low_v).then_some(FaultCode::BatteryLow)
}

/// Battery fresh and above the connect threshold.
pub fn battery_ok(ctx: &ContactorContext) -> bool {
    ctx.hv_fresh() && ctx.hv.hv1 > ctx.config.battery_low_v
}

/// Every present aux contact reads open.
pub fn aux_all_open(ctx: &ContactorContext) -> bool {
    let hw = ctx.config.hw;
    !(hw.aux1_present() && ctx.aux.aux1_closed) && !(hw.aux2_present() && ctx.aux.aux2_closed)
}
