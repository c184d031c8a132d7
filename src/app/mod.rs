//! Application core: pure domain logic, zero I/O.
//!
//! Event handlers, the output / status aggregator, the service that
//! sequences them around the state machine, and the control task that
//! drives the service from the notification word.  All interaction with
//! hardware happens through **port traits** defined in [`ports`].

pub mod events;
pub mod handlers;
pub mod ports;
pub mod service;
pub mod status;
pub mod task;
