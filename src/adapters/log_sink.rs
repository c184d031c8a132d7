//! Log-based event sink adapter.
//!
//! Implements [`EventSink`] by writing structured controller events
//! through the `log` facade (serial console on the board, stdout on the
//! bench).  Readings are frequent, so they go out at debug level.

use log::{debug, info, warn};

use crate::app::events::ContactorEvent;
use crate::app::ports::EventSink;

/// Adapter that logs every [`ContactorEvent`].
#[derive(Debug, Default)]
pub struct LogEventSink;

impl LogEventSink {
    pub fn new() -> Self {
        Self
    }
}

impl EventSink for LogEventSink {
    fn emit(&mut self, event: &ContactorEvent) {
        match event {
            ContactorEvent::Started(state) => {
                info!("START | initial_state={:?}", state);
            }
            ContactorEvent::StateChanged { from, to } => {
                info!("STATE | {:?} -> {:?}", from, to);
            }
            ContactorEvent::FaultRaised(code) => {
                warn!("FAULT | raised {:?} (code {})", code, code.code());
            }
            ContactorEvent::FaultCleared => {
                info!("FAULT | cleared");
            }
            ContactorEvent::CommandReceived {
                raw,
                connect,
                reset,
            } => {
                info!(
                    "CMD   | 0x{:02X} connect={} reset={}",
                    raw, connect, reset
                );
            }
            ContactorEvent::CommandLinkLost => {
                warn!("CMD   | keep-alive lost");
            }
            ContactorEvent::SensorLost => {
                warn!("SENSE | line timeout");
            }
            ContactorEvent::SensorRestored => {
                info!("SENSE | line restored");
            }
            ContactorEvent::LineRejected(e) => {
                warn!("SENSE | line rejected: {}", e);
            }
            ContactorEvent::Readings { hv1, hv2, hv3 } => {
                debug!("HV    | hv1={:.1}V hv2={:.1}V hv3={:.1}V", hv1, hv2, hv3);
            }
            ContactorEvent::DiagnosticSent { item, value } => {
                info!("DIAG  | {:?} = {}", item, value);
            }
        }
    }
}

/// Event sink that keeps every event in memory.  Used by the bench to
/// assert on what happened during a scenario.
#[derive(Debug, Default)]
pub struct RecordingSink {
    pub events: Vec<ContactorEvent>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn states(&self) -> impl Iterator<Item = crate::fsm::ContactorState> + '_ {
        self.events.iter().filter_map(|e| match e {
            ContactorEvent::StateChanged { to, .. } => Some(*to),
            _ => None,
        })
    }
}

impl EventSink for RecordingSink {
    fn emit(&mut self, event: &ContactorEvent) {
        self.events.push(event.clone());
    }
}

/// Forward to two sinks.
impl<A: EventSink, B: EventSink> EventSink for (A, B) {
    fn emit(&mut self, event: &ContactorEvent) {
        self.0.emit(event);
        self.1.emit(event);
    }
}
