//! Fuzz target: command / keep-alive payloads through the full service.
//!
//! Each input byte pair becomes a frame on one of the three inbound
//! mailboxes.  The service must never panic, must keep the fault code
//! consistent with the state and must only ever drive coil #2 while
//! coil #1 is driven.
//!
//! cargo fuzz run fuzz_command_frame

#![no_main]

use contactor::adapters::bench::{Bench, PlantParams};
use contactor::adapters::log_sink::RecordingSink;
use contactor::app::ports::Coil;
use contactor::config::ContactorConfig;
use contactor::events::Notifier;
use contactor::fsm::context::FaultCode;
use embassy_sync::blocking_mutex::raw::NoopRawMutex;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let notifier = Notifier::<NoopRawMutex>::new();
    let Ok(mut bench) = Bench::new(
        ContactorConfig::default(),
        PlantParams::default(),
        &notifier,
        RecordingSink::new(),
    ) else {
        return;
    };
    if bench.start().is_err() {
        return;
    }
    bench.run_for(100);

    for chunk in data.chunks(2) {
        let selector = chunk[0] % 4;
        let byte = chunk.get(1).copied().unwrap_or(0);
        match selector {
            0 => bench.keepalive(byte),
            1 => bench.command(&[byte, chunk[0] >> 2]),
            2 => bench.poll(),
            _ => bench.command(&[]),
        }
        bench.run_for(u32::from(chunk[0]) * 20);

        let svc = bench.service();
        assert_eq!(svc.fault() != FaultCode::NoFault, svc.state().is_fault());
        if bench.plant.drive(Coil::Two).is_on() {
            assert!(bench.plant.drive(Coil::One).is_on());
        }
    }
});
