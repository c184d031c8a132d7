//! Event handlers: one per notification source.
//!
//! A handler runs to completion (including its replies) before the state
//! step of the same wake.  Handlers only record facts in the context:
//! readings, request flags, output bits.  They never transition the state
//! machine and never fail; anything odd is logged and dropped.

use log::{debug, error, warn};

use crate::can::msgs;
use crate::can::{CanFrame, CommandRequest, Mailbox};
use crate::diagnostics::{ClosureTimer, DiagItem};
use crate::events::Notification;
use crate::fsm::context::{ContactorContext, EventFlags, OutputFlags};
use crate::sensors;
use crate::timers::TimerId;

use super::events::ContactorEvent;
use super::ports::{BusPort, EventSink, MailboxPort, SensorLinePort, TimerPort};
use super::status::status_word;

/// Run the handler for `event`.
pub fn handle(
    event: Notification,
    ctx: &mut ContactorContext,
    timing: &ClosureTimer,
    hw: &mut (impl SensorLinePort + MailboxPort + BusPort),
    timers: &impl TimerPort,
    sink: &mut impl EventSink,
) {
    match event {
        Notification::AdcReady => on_adc_ready(ctx),
        Notification::SensorLine => on_sensor_line(ctx, hw, timers, sink),
        Notification::Spare => {}
        Notification::SensorWatchdog => on_sensor_watchdog(ctx, timers, sink),
        Notification::CommandWatchdog => on_command_watchdog(ctx, hw, sink),
        Notification::DelayTimeout => on_delay_timeout(ctx, timers),
        Notification::CommandMsg => on_command_msg(ctx, timing, hw, sink),
        Notification::KeepAliveMsg => on_keepalive_msg(ctx, hw, timers, sink),
        Notification::PollMsg => on_poll_msg(ctx, hw),
    }
}

// ───────────────────────────────────────────────────────────────
// Sensing
// ───────────────────────────────────────────────────────────────

fn on_adc_ready(ctx: &ContactorContext) {
    debug!("adc block ready at {} ms", ctx.now_ms);
}

fn on_sensor_line(
    ctx: &mut ContactorContext,
    hw: &mut impl SensorLinePort,
    timers: &impl TimerPort,
    sink: &mut impl EventSink,
) {
    // Only the newest line matters.
    let mut latest = None;
    while let Some(line) = hw.take_line() {
        latest = Some(line);
    }
    let Some(line) = latest else {
        debug!("sensor line notification without a line");
        return;
    };

    let raw = match sensors::parse_line(&line) {
        Ok(raw) => raw,
        Err(e) => {
            warn!("sensor line rejected ({e}): {:?}", line.as_str());
            sink.emit(&ContactorEvent::LineRejected(e));
            return;
        }
    };

    let volts = raw.calibrate(&ctx.config.calibration);
    ctx.hv.raw = raw;
    ctx.hv.hv1 = volts.hv1;
    ctx.hv.hv2 = volts.hv2;
    ctx.hv.hv3 = volts.hv3;
    ctx.hv.hv1_minus_hv2 = volts.hv1 - volts.hv2;
    ctx.hv.seq = ctx.hv.seq.wrapping_add(1);

    if let Err(e) = timers.start(TimerId::SensorWatchdog, ctx.config.sensor_timeout_ms) {
        error!("sensor watchdog re-arm failed: {e}");
    }

    if ctx.events.contains(EventFlags::SENSOR_TIMEOUT) {
        sink.emit(&ContactorEvent::SensorRestored);
    }
    ctx.events.remove(EventFlags::SENSOR_TIMEOUT);
    ctx.outputs.remove(OutputFlags::SENSOR_FAULT);
    ctx.events.insert(EventFlags::HV_NEW);

    sink.emit(&ContactorEvent::Readings {
        hv1: volts.hv1,
        hv2: volts.hv2,
        hv3: volts.hv3,
    });
}

fn on_sensor_watchdog(
    ctx: &mut ContactorContext,
    timers: &impl TimerPort,
    sink: &mut impl EventSink,
) {
    if timers.is_running(TimerId::SensorWatchdog) {
        debug!("stale sensor watchdog expiry dropped");
        return;
    }
    if !ctx.events.contains(EventFlags::SENSOR_TIMEOUT) {
        sink.emit(&ContactorEvent::SensorLost);
    }
    ctx.events.insert(EventFlags::SENSOR_TIMEOUT);
    ctx.events.remove(EventFlags::HV_NEW);
    ctx.outputs.insert(OutputFlags::SENSOR_FAULT);
}

// ───────────────────────────────────────────────────────────────
// Timers
// ───────────────────────────────────────────────────────────────

fn on_command_watchdog(
    ctx: &mut ContactorContext,
    hw: &mut impl BusPort,
    sink: &mut impl EventSink,
) {
    warn!("command link timeout in {:?}", ctx.state);
    ctx.events.insert(EventFlags::CMD_TIMEOUT);
    // Losing the command link keeps the contactors where they are.
    ctx.events.insert(EventFlags::CMD_CONNECT);
    ctx.outputs.remove(OutputFlags::KEEPALIVE);
    hw.send(&msgs::status_frame(
        ctx.config.can.keepalive_response,
        &status_word(ctx),
    ));
    sink.emit(&ContactorEvent::CommandLinkLost);
}

fn on_delay_timeout(ctx: &mut ContactorContext, timers: &impl TimerPort) {
    if timers.is_running(TimerId::Delay) {
        debug!("stale delay expiry dropped");
        return;
    }
    ctx.events.insert(EventFlags::DELAY_EXPIRED);
}

// ───────────────────────────────────────────────────────────────
// Bus messages
// ───────────────────────────────────────────────────────────────

/// Empty `mailbox` and keep only the newest frame.  Several frames can
/// arrive behind one notification bit; only the latest command counts.
fn take_newest(hw: &mut impl MailboxPort, mailbox: Mailbox) -> Option<CanFrame> {
    let mut newest = None;
    let mut dropped = 0u32;
    while let Some(frame) = hw.take_frame(mailbox) {
        if newest.replace(frame).is_some() {
            dropped += 1;
        }
    }
    if dropped > 0 {
        debug!("{mailbox:?}: {dropped} older frame(s) superseded");
    }
    newest
}

/// Latch the request bits of a decoded command.
fn apply_command(
    ctx: &mut ContactorContext,
    data: &[u8],
    sink: &mut impl EventSink,
) -> Option<CommandRequest> {
    let req = CommandRequest::decode(data)?;
    ctx.last_command = req.raw;
    ctx.events.set(EventFlags::CMD_CONNECT, req.connect);
    ctx.events.set(EventFlags::CMD_RESET, req.reset);
    sink.emit(&ContactorEvent::CommandReceived {
        raw: req.raw,
        connect: req.connect,
        reset: req.reset,
    });
    Some(req)
}

fn on_command_msg(
    ctx: &mut ContactorContext,
    timing: &ClosureTimer,
    hw: &mut (impl MailboxPort + BusPort),
    sink: &mut impl EventSink,
) {
    let frame = take_newest(hw, Mailbox::Command);
    let data = frame.as_ref().map_or(&[][..], |f| f.data.as_slice());
    ctx.events.insert(EventFlags::CAN_CMD);

    let req = apply_command(ctx, data, sink);

    let id = ctx.config.can.command_response;
    hw.send(&msgs::status_frame(id, &status_word(ctx)));

    if let Some(code) = req.and_then(|r| r.diag_item) {
        match DiagItem::from_code(code) {
            Some(item) => {
                let value = item.value(&ctx.hv.raw, timing);
                hw.send(&msgs::diag_frame(id, item.code(), value));
                sink.emit(&ContactorEvent::DiagnosticSent { item, value });
            }
            None => debug!("unknown diagnostic item {code}"),
        }
    }
}

fn on_keepalive_msg(
    ctx: &mut ContactorContext,
    hw: &mut (impl MailboxPort + BusPort),
    timers: &impl TimerPort,
    sink: &mut impl EventSink,
) {
    let frame = take_newest(hw, Mailbox::KeepAlive);
    let data = frame.as_ref().map_or(&[][..], |f| f.data.as_slice());

    ctx.events.insert(EventFlags::CAN_KEEPALIVE);
    ctx.outputs.insert(OutputFlags::KEEPALIVE);
    ctx.events.remove(EventFlags::CMD_TIMEOUT);
    if let Err(e) = timers.start(TimerId::CommandKeepAlive, ctx.config.keepalive_timeout_ms) {
        error!("keep-alive watchdog re-arm failed: {e}");
    }

    apply_command(ctx, data, sink);

    hw.send(&msgs::status_frame(
        ctx.config.can.keepalive_response,
        &status_word(ctx),
    ));
}

fn on_poll_msg(ctx: &mut ContactorContext, hw: &mut (impl MailboxPort + BusPort)) {
    // Payload is irrelevant; one answer covers every queued poll.
    let _ = take_newest(hw, Mailbox::Poll);
    ctx.events.insert(EventFlags::CAN_POLL);

    let ids = ctx.config.can;
    hw.send(&msgs::telemetry_frame(ids.poll_response1, ctx.hv.hv1, ctx.hv.current1));
    hw.send(&msgs::telemetry_frame(ids.poll_response2, ctx.hv.hv2, ctx.hv.hv3));
}
