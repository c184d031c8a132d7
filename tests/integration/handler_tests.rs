//! Per-source handler behaviour: replies, latched flags, watchdogs and
//! the one-event-per-wake rule.

use crate::mock_hw::Rig;

use contactor::app::events::ContactorEvent;
use contactor::app::ports::TimerPort;
use contactor::can::msgs::{self, StatusWord};
use contactor::can::{CanFrame, Mailbox};
use contactor::events::Notification;
use contactor::fsm::ContactorState;
use contactor::fsm::context::{EventFlags, OutputFlags};
use contactor::sensors::LineError;
use contactor::timers::TimerId;

// ── Dispatch ──────────────────────────────────────────────────

#[test]
fn one_source_per_wake_in_priority_order() {
    let mut rig = Rig::default_config();
    rig.hw.push_line("100,100,100");
    let pending = Notification::KeepAliveMsg.bit() | Notification::SensorLine.bit();

    let consumed = rig.wake(pending);
    assert_eq!(consumed, Notification::SensorLine.bit());
    assert!(rig.hw.sent.is_empty(), "keep-alive not handled yet");

    let consumed = rig.wake(pending & !consumed);
    assert_eq!(consumed, Notification::KeepAliveMsg.bit());
    assert_eq!(rig.hw.sent.len(), 1);
}

#[test]
fn unknown_bits_are_consumed_without_dispatch() {
    let mut rig = Rig::default_config();
    let consumed = rig.wake(1 << 20);
    assert_eq!(consumed, 1 << 20);
    assert_eq!(rig.svc.wakes(), 1);
    assert!(rig.hw.sent.is_empty());
    assert_eq!(rig.events().len(), 1); // Started
}

#[test]
fn mixed_pending_word_drains_in_one_wake_per_source() {
    let mut rig = Rig::default_config();
    let pending = Notification::PollMsg.bit()
        | Notification::AdcReady.bit()
        | Notification::Spare.bit()
        | (1 << 30);
    assert_eq!(rig.drain(pending), 4);
}

// ── Sensor line ───────────────────────────────────────────────

#[test]
fn sensor_line_updates_readings_and_rearms_watchdog() {
    let mut rig = Rig::default_config();
    rig.timers.starts.borrow_mut().clear();
    rig.volts(160.0, 40.0, 120.0);

    let hv = rig.svc.context().hv;
    assert!((hv.hv1 - 160.0).abs() < 0.05);
    assert!((hv.hv1_minus_hv2 - 120.0).abs() < 0.1);
    assert!(rig.svc.context().events.contains(EventFlags::HV_NEW));
    assert_eq!(
        *rig.timers.starts.borrow(),
        [(TimerId::SensorWatchdog, rig.svc.config().sensor_timeout_ms)]
    );
    assert!(matches!(rig.events().last(), Some(ContactorEvent::Readings { .. })));
}

#[test]
fn only_newest_line_is_used() {
    let mut rig = Rig::default_config();
    rig.hw.push_line("1000,1000,1000");
    rig.hw.push_line("2000,3000,4000");
    rig.notify(Notification::SensorLine);
    assert_eq!(rig.svc.context().hv.raw.hv2, 3000);
    assert!(rig.hw.lines.is_empty());
}

#[test]
fn malformed_line_is_dropped() {
    let mut rig = Rig::default_config();
    rig.hw.push_line("1000,1000,1000");
    rig.notify(Notification::SensorLine);
    rig.hw.push_line("1000,abc");
    rig.notify(Notification::SensorLine);

    assert_eq!(rig.svc.context().hv.raw.hv1, 1000);
    assert!(rig.events().contains(&ContactorEvent::LineRejected(LineError::BadField(1))));
}

#[test]
fn sensor_watchdog_marks_readings_stale() {
    let mut rig = Rig::default_config();
    rig.volts(160.0, 0.0, 160.0);
    rig.expire(TimerId::SensorWatchdog);

    let ctx = rig.svc.context();
    assert!(ctx.events.contains(EventFlags::SENSOR_TIMEOUT));
    assert!(!ctx.events.contains(EventFlags::HV_NEW));
    assert!(ctx.outputs.contains(OutputFlags::SENSOR_FAULT));
    assert!(rig.events().contains(&ContactorEvent::SensorLost));

    // Stale readings cannot start a connect.
    rig.keepalive(0x80);
    assert_eq!(rig.svc.state(), ContactorState::Disconnected);

    rig.volts(160.0, 0.0, 160.0);
    assert!(rig.events().contains(&ContactorEvent::SensorRestored));
    assert!(!rig.svc.context().outputs.contains(OutputFlags::SENSOR_FAULT));
    assert_eq!(rig.svc.state(), ContactorState::Connecting);
}

#[test]
fn stale_sensor_watchdog_expiry_is_ignored() {
    let mut rig = Rig::default_config();
    rig.volts(160.0, 0.0, 160.0);
    // Watchdog was re-armed by the line; the bit is left over.
    rig.notify(Notification::SensorWatchdog);
    assert!(rig.svc.context().events.contains(EventFlags::HV_NEW));
    assert!(!rig.events().contains(&ContactorEvent::SensorLost));
}

#[test]
fn adc_ready_has_no_effect() {
    let mut rig = Rig::default_config();
    let before = rig.svc.context().events;
    rig.notify(Notification::AdcReady);
    assert_eq!(rig.svc.context().events, before);
    assert!(rig.hw.sent.is_empty());
}

// ── Keep-alive / command ──────────────────────────────────────

#[test]
fn keepalive_replies_and_rearms_watchdog() {
    let mut rig = Rig::default_config();
    rig.expire(TimerId::CommandKeepAlive);
    assert!(rig.svc.context().events.contains(EventFlags::CMD_TIMEOUT));
    rig.hw.sent.clear();

    rig.keepalive(0x00);
    let ctx = rig.svc.context();
    assert!(!ctx.events.contains(EventFlags::CMD_TIMEOUT));
    assert!(ctx.outputs.contains(OutputFlags::KEEPALIVE));
    assert!(rig.timers.is_running(TimerId::CommandKeepAlive));

    let ids = rig.svc.config().can;
    assert_eq!(rig.hw.sent.len(), 1);
    assert_eq!(rig.hw.sent[0].id, ids.keepalive_response);
    let status = StatusWord::decode(&rig.hw.sent[0].data).expect("status");
    assert_eq!(status.last_command, 0x00);
    assert_eq!(status.state_code, 0);
}

#[test]
fn repeated_keepalive_is_idempotent() {
    let mut rig = Rig::default_config();
    rig.keepalive(0x80);
    let events = rig.svc.context().events;
    rig.keepalive(0x80);
    assert_eq!(rig.svc.context().events, events);
    assert_eq!(rig.svc.state(), ContactorState::Disconnected);
    assert_eq!(rig.hw.sent.len(), 2);
}

#[test]
fn empty_command_payload_keeps_request_flags() {
    let mut rig = Rig::default_config();
    rig.keepalive(0x80);
    rig.command(&[]);

    let ctx = rig.svc.context();
    assert!(ctx.connect_requested());
    assert!(ctx.events.contains(EventFlags::CAN_CMD));
    assert_eq!(ctx.last_command, 0x80);

    let id = rig.svc.config().can.command_response;
    assert_eq!(rig.hw.frames_with_id(id).len(), 1);
}

#[test]
fn newest_queued_keepalive_wins() {
    let mut rig = Rig::default_config();
    rig.volts(160.0, 0.0, 160.0);
    let id = rig.svc.config().can.keepalive_in;
    let mailbox = Mailbox::KeepAlive as usize;
    rig.hw.mailboxes[mailbox].push_back(CanFrame::new(id, &[0x80]));
    rig.hw.mailboxes[mailbox].push_back(CanFrame::new(id, &[0x00]));

    // Both frames arrived behind a single notification.
    rig.notify(Notification::KeepAliveMsg);
    let ctx = rig.svc.context();
    assert_eq!(ctx.last_command, 0x00);
    assert!(!ctx.connect_requested());
    assert!(rig.hw.mailboxes[mailbox].is_empty());
    assert_eq!(rig.svc.state(), ContactorState::Disconnected);
    assert_eq!(rig.hw.sent.len(), 1);
}

#[test]
fn newest_queued_command_wins() {
    let mut rig = Rig::default_config();
    let id = rig.svc.config().can.command_in;
    let mailbox = Mailbox::Command as usize;
    rig.hw.mailboxes[mailbox].push_back(CanFrame::new(id, &[0x00]));
    rig.hw.mailboxes[mailbox].push_back(CanFrame::new(id, &[0x80]));
    rig.notify(Notification::CommandMsg);

    assert_eq!(rig.svc.context().last_command, 0x80);
    assert!(rig.svc.context().connect_requested());
    assert!(rig.hw.mailboxes[mailbox].is_empty());
}

#[test]
fn queued_polls_get_one_answer() {
    let mut rig = Rig::default_config();
    let id = rig.svc.config().can.poll_in;
    let mailbox = Mailbox::Poll as usize;
    rig.hw.mailboxes[mailbox].push_back(CanFrame::new(id, &[]));
    rig.hw.mailboxes[mailbox].push_back(CanFrame::new(id, &[]));
    rig.notify(Notification::PollMsg);

    assert_eq!(rig.hw.sent.len(), 2);
    assert!(rig.hw.mailboxes[mailbox].is_empty());
}

#[test]
fn missing_mailbox_frame_is_an_empty_payload() {
    let mut rig = Rig::default_config();
    rig.notify(Notification::CommandMsg);
    let id = rig.svc.config().can.command_response;
    assert_eq!(rig.hw.frames_with_id(id).len(), 1);
    assert_eq!(rig.svc.context().last_command, 0);
}

#[test]
fn command_requests_diagnostic_item() {
    let mut rig = Rig::default_config();
    rig.hw.push_line("19632,19500,1043");
    rig.notify(Notification::SensorLine);
    rig.command(&[0x00, 3]);

    let id = rig.svc.config().can.command_response;
    let frames = rig.hw.frames_with_id(id);
    assert_eq!(frames.len(), 2);
    assert!(StatusWord::decode(&frames[0].data).is_some());
    assert_eq!(frames[1].data.as_slice(), msgs::diag_frame(id, 3, 1043).data.as_slice());
}

#[test]
fn unknown_diagnostic_item_gets_status_only() {
    let mut rig = Rig::default_config();
    rig.command(&[0x00, 0x42]);
    let id = rig.svc.config().can.command_response;
    assert_eq!(rig.hw.frames_with_id(id).len(), 1);
}

#[test]
fn poll_answers_with_two_telemetry_frames() {
    let mut rig = Rig::default_config();
    rig.volts(150.0, 20.0, 130.0);
    rig.frame(Mailbox::Poll, &[0xAA]);

    let ids = rig.svc.config().can;
    assert_eq!(rig.hw.sent.len(), 2);
    assert_eq!(rig.hw.sent[0].id, ids.poll_response1);
    assert_eq!(rig.hw.sent[1].id, ids.poll_response2);

    let (hv1, current) = msgs::telemetry_values(&rig.hw.sent[0]).expect("telemetry");
    assert!((hv1 - 150.0).abs() < 0.05);
    assert_eq!(current, 0.0);
    let (hv2, hv3) = msgs::telemetry_values(&rig.hw.sent[1]).expect("telemetry");
    assert!((hv2 - 20.0).abs() < 0.05);
    assert!((hv3 - 130.0).abs() < 0.05);
    assert!(rig.svc.context().events.contains(EventFlags::CAN_POLL));
}
