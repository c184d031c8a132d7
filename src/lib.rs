//! Battery-pack contactor controller library.
//!
//! One control task consumes a word of notification bits posted by the
//! sensor link, the CAN mailboxes and three logical timers.  Each wake
//! runs one event handler, one step of the connect / disconnect state
//! machine and the output / status aggregator.
//!
//! Everything hardware-facing sits behind the port traits in
//! [`app::ports`]; [`adapters`] holds an `embedded-hal` board adapter and
//! a host bench simulator.

#![deny(unused_must_use)]

pub mod adapters;
pub mod app;
pub mod can;
pub mod config;
pub mod diagnostics;
pub mod error;
pub mod events;
pub mod fsm;
pub mod safety;
pub mod sensors;
pub mod timers;

pub use error::{Error, Result};
