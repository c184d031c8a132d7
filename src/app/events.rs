//! Outbound domain events.
//!
//! The [`ContactorService`](super::service::ContactorService) emits these
//! through the [`EventSink`](super::ports::EventSink) port.  Adapters on
//! the other side decide what to do with them (serial log, bench trace).

use crate::diagnostics::DiagItem;
use crate::fsm::ContactorState;
use crate::fsm::context::FaultCode;
use crate::sensors::LineError;

#[derive(Debug, Clone, PartialEq)]
pub enum ContactorEvent {
    /// The service has started (carries the initial state).
    Started(ContactorState),

    /// The state machine moved.
    StateChanged {
        from: ContactorState,
        to: ContactorState,
    },

    /// A check failed; the machine is shutting down.
    FaultRaised(FaultCode),

    /// The fault was cleared by a reset.
    FaultCleared,

    /// Command or keep-alive byte received.
    CommandReceived { raw: u8, connect: bool, reset: bool },

    /// No command / keep-alive within the timeout.
    CommandLinkLost,

    /// No sensor line within the timeout.
    SensorLost,

    /// First good line after a sensor timeout.
    SensorRestored,

    /// A sensor line could not be decoded and was dropped.
    LineRejected(LineError),

    /// Fresh calibrated readings.
    Readings { hv1: f32, hv2: f32, hv3: f32 },

    /// A diagnostic item was answered.
    DiagnosticSent { item: DiagItem, value: u32 },
}
