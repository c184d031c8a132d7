//! End-to-end scenarios on the bench plant: timer bank, notification
//! word and control task in the loop, with contact physics instead of
//! hand-fed readings.

use contactor::adapters::bench::{Bench, PlantParams};
use contactor::adapters::log_sink::RecordingSink;
use contactor::app::ports::Coil;
use contactor::config::{ContactorConfig, HwConfig};
use contactor::events::Notifier;
use contactor::fsm::ContactorState;
use contactor::fsm::context::{FaultCode, OutputFlags};
use embassy_sync::blocking_mutex::raw::NoopRawMutex;

type TestBench<'n> = Bench<'n, NoopRawMutex, RecordingSink>;

const KEEPALIVE_MS: u32 = 500;

fn aux_config() -> ContactorConfig {
    ContactorConfig {
        hw: HwConfig(
            HwConfig::AUX1_PRESENT
                | HwConfig::AUX1_SENSE
                | HwConfig::AUX2_PRESENT
                | HwConfig::AUX2_SENSE
                | HwConfig::PWM_CONTACTOR1
                | HwConfig::PWM_CONTACTOR2,
        ),
        ..Default::default()
    }
}

fn bench<'n>(
    config: ContactorConfig,
    params: PlantParams,
    notifier: &'n Notifier<NoopRawMutex>,
) -> TestBench<'n> {
    let mut b = Bench::new(config, params, notifier, RecordingSink::new()).expect("bench");
    b.start().expect("start");
    b.run_for(200);
    b
}

#[test]
fn connects_and_sends_heartbeats() {
    let notifier = Notifier::new();
    let mut b = bench(aux_config(), PlantParams::default(), &notifier);

    b.set_keepalive(Some((0x80, KEEPALIVE_MS)));
    assert!(b.run_until(ContactorState::Connected, 15_000));
    assert!(b.plant.interlock());
    assert!(b.plant.contact_closed(Coil::One) && b.plant.contact_closed(Coil::Two));
    assert_eq!(b.service().fault(), FaultCode::NoFault);

    b.plant.take_sent();
    b.run_for(2_200);
    let ids = b.service().config().can;
    let sent = b.plant.sent();
    assert_eq!(sent.iter().filter(|f| f.id == ids.heartbeat1).count(), 2);
    assert_eq!(sent.iter().filter(|f| f.id == ids.heartbeat2).count(), 2);
}

#[test]
fn disconnect_right_after_connect_is_not_lost() {
    let notifier = Notifier::new();
    let mut b = bench(aux_config(), PlantParams::default(), &notifier);

    b.keepalive(0x80);
    b.keepalive(0x00);
    assert_eq!(b.settle(), 1);
    assert_eq!(b.service().context().last_command, 0x00);
    assert!(!b.service().context().connect_requested());

    b.run_for(500);
    assert_eq!(b.state(), ContactorState::Disconnected);
    assert!(!b.plant.drive(Coil::One).is_on());
}

#[test]
fn closure_times_are_measured() {
    let notifier = Notifier::new();
    let mut b = bench(aux_config(), PlantParams::default(), &notifier);
    b.set_keepalive(Some((0x80, KEEPALIVE_MS)));
    assert!(b.run_until(ContactorState::Connected, 15_000));

    let t1 = b.service().closure_timing().contactor(0);
    let t2 = b.service().closure_timing().contactor(1);
    // Aux is sampled once per wake; a line wakes the task every period.
    let pull_in = b.plant.params.pull_in_ms;
    let window = pull_in..=pull_in + b.plant.params.line_period_ms;
    assert!(window.contains(&t1.close_ms), "close1 {}", t1.close_ms);
    assert!(window.contains(&t2.close_ms), "close2 {}", t2.close_ms);
}

#[test]
fn disconnect_releases_two_before_one() {
    let notifier = Notifier::new();
    let mut b = bench(aux_config(), PlantParams::default(), &notifier);
    b.set_keepalive(Some((0x80, KEEPALIVE_MS)));
    assert!(b.run_until(ContactorState::Connected, 15_000));

    b.set_keepalive(Some((0x00, KEEPALIVE_MS)));
    assert!(b.run_until(ContactorState::Disconnecting, 10));
    assert!(!b.plant.drive(Coil::Two).is_on());
    assert!(b.plant.drive(Coil::One).is_on());
    assert!(!b.plant.interlock());

    assert!(b.run_until(ContactorState::Disconnected, 500));
    assert!(!b.plant.contact_closed(Coil::One));
}

#[test]
fn contactor2_that_never_closes_faults() {
    let notifier = Notifier::new();
    let mut b = bench(aux_config(), PlantParams::default(), &notifier);
    b.plant.faults.stuck_open[1] = true;
    b.set_keepalive(Some((0x80, KEEPALIVE_MS)));

    assert!(b.run_until(ContactorState::Faulted, 15_000));
    assert_eq!(b.service().fault(), FaultCode::Contactor2OnAux2Off);
    assert!(!b.plant.drive(Coil::One).is_on());
}

#[test]
fn contactor1_without_aux_judged_by_voltage() {
    let notifier = Notifier::new();
    let mut b = bench(ContactorConfig::default(), PlantParams::default(), &notifier);
    b.plant.faults.stuck_open[0] = true;
    b.set_keepalive(Some((0x80, KEEPALIVE_MS)));

    assert!(b.run_until(ContactorState::Faulted, 1_000));
    assert_eq!(b.service().fault(), FaultCode::Contactor1DoesNotAppearClosed);
}

#[test]
fn slow_precharge_times_out() {
    let notifier = Notifier::new();
    let params = PlantParams {
        precharge_tau_ms: 5_000.0,
        ..Default::default()
    };
    let mut b = bench(aux_config(), params, &notifier);
    b.set_keepalive(Some((0x80, KEEPALIVE_MS)));

    assert!(b.run_until(ContactorState::Faulted, 15_000));
    assert_eq!(b.service().fault(), FaultCode::PrechargeVoltageNotReached);
}

#[test]
fn welded_contactor_faults_then_resets() {
    let notifier = Notifier::new();
    let mut b = bench(aux_config(), PlantParams::default(), &notifier);
    b.plant.faults.welded[1] = true;
    b.set_keepalive(Some((0x80, KEEPALIVE_MS)));
    assert!(b.run_until(ContactorState::Faulted, 100));
    assert_eq!(b.service().fault(), FaultCode::Contactor2OffAux2On);

    // Reset refused while the contact is still welded.
    b.set_keepalive(Some((0x40, KEEPALIVE_MS)));
    b.run_for(600);
    assert_eq!(b.state(), ContactorState::Faulted);

    b.plant.faults.welded[1] = false;
    assert!(b.run_until(ContactorState::Disconnected, 1_000));
    assert_eq!(b.service().fault(), FaultCode::NoFault);
    assert!(
        b.sink
            .states()
            .any(|s| s == ContactorState::Resetting)
    );
}

#[test]
fn sensor_loss_while_connected_holds_contactors() {
    let notifier = Notifier::new();
    let mut b = bench(aux_config(), PlantParams::default(), &notifier);
    b.set_keepalive(Some((0x80, KEEPALIVE_MS)));
    assert!(b.run_until(ContactorState::Connected, 15_000));

    b.plant.faults.sensor_silent = true;
    b.run_for(1_000);
    assert_eq!(b.state(), ContactorState::Connected);
    assert!(b.service().context().outputs.contains(OutputFlags::SENSOR_FAULT));
}

#[test]
fn keepalive_loss_while_connected_holds_contactors() {
    let notifier = Notifier::new();
    let mut b = bench(aux_config(), PlantParams::default(), &notifier);
    b.set_keepalive(Some((0x80, KEEPALIVE_MS)));
    assert!(b.run_until(ContactorState::Connected, 15_000));

    b.set_keepalive(None);
    b.run_for(5_000);
    assert_eq!(b.state(), ContactorState::Connected);
    assert!(!b.service().context().outputs.contains(OutputFlags::KEEPALIVE));
}
