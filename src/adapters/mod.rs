//! Adapters: concrete implementations of the hexagonal port traits.
//!
//! | Adapter    | Implements                    | Connects to                  |
//! |------------|-------------------------------|------------------------------|
//! | `gpio`     | CoilPort, AuxPort             | embedded-hal PWM / GPIO pins |
//! | `log_sink` | EventSink                     | `log` facade                 |
//! | `bench`    | every input and output port   | simulated pack and bus       |

pub mod bench;
pub mod gpio;
pub mod log_sink;
