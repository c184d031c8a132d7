//! Fuzz target: `sensors::parse_line`
//!
//! Feeds arbitrary text to the sensor-line decoder and checks that an
//! accepted line always calibrates to finite voltages and that the
//! decoder is insensitive to surrounding whitespace.
//!
//! cargo fuzz run fuzz_sensor_line

#![no_main]

use contactor::config::ContactorConfig;
use contactor::sensors::parse_line;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Ok(text) = core::str::from_utf8(data) else {
        return;
    };

    let Ok(raw) = parse_line(text) else {
        return;
    };

    let volts = raw.calibrate(&ContactorConfig::default().calibration);
    assert!(volts.hv1.is_finite() && volts.hv2.is_finite() && volts.hv3.is_finite());

    let padded = format!("  {}\r\n", text);
    assert_eq!(parse_line(&padded), Ok(raw));
});
