//! Contactor bench: runs the controller against a simulated pack.
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │  BenchPlant (battery · pre-charge · contacts · bus)      │
//! │        │ lines / frames              ▲ coils / frames    │
//! │  ──────┼──── Port Trait Boundary ────┼────────────────   │
//! │        ▼                             │                   │
//! │  Notifier ──▶ ControlTask ──▶ ContactorService           │
//! │     ▲                         handlers · FSM · outputs   │
//! │  TimerBank (1 ms tick)                                   │
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! Usage: `contactor-bench [config.json]`.  Without a file the default
//! parameter table is used with both aux contacts fitted.  Set
//! `RUST_LOG=debug` to see every reading.

use anyhow::{Context, Result, bail};
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use log::info;

use contactor::adapters::bench::{Bench, PlantParams};
use contactor::adapters::log_sink::{LogEventSink, RecordingSink};
use contactor::app::ports::EventSink;
use contactor::can::msgs;
use contactor::config::{ContactorConfig, HwConfig};
use contactor::events::Notifier;
use contactor::fsm::ContactorState;

static NOTIFIER: Notifier<CriticalSectionRawMutex> = Notifier::new();

/// Keep-alive period the simulated master uses.
const KEEPALIVE_PERIOD_MS: u32 = 500;

fn load_config() -> Result<ContactorConfig> {
    let Some(path) = std::env::args().nth(1) else {
        return Ok(ContactorConfig {
            hw: HwConfig(
                HwConfig::AUX1_PRESENT
                    | HwConfig::AUX1_SENSE
                    | HwConfig::AUX2_PRESENT
                    | HwConfig::AUX2_SENSE
                    | HwConfig::PWM_CONTACTOR1
                    | HwConfig::PWM_CONTACTOR2,
            ),
            pwm1_pct: 60.0,
            pwm2_pct: 60.0,
            ..Default::default()
        });
    };
    let text = std::fs::read_to_string(&path).with_context(|| format!("reading {path}"))?;
    let config: ContactorConfig =
        serde_json::from_str(&text).with_context(|| format!("parsing {path}"))?;
    config.validate()?;
    info!("Config loaded from {}", path);
    Ok(config)
}

fn expect_state<S: EventSink>(
    bench: &mut Bench<'_, CriticalSectionRawMutex, S>,
    state: ContactorState,
    limit_ms: u32,
) -> Result<()> {
    if !bench.run_until(state, limit_ms) {
        bail!(
            "expected {:?} within {} ms, still {:?} (fault {:?})",
            state,
            limit_ms,
            bench.state(),
            bench.service().fault()
        );
    }
    info!("t={} ms: {:?}", bench.now_ms(), state);
    Ok(())
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    info!("╔══════════════════════════════════════╗");
    info!("║  contactor-bench v{}              ║", env!("CARGO_PKG_VERSION"));
    info!("╚══════════════════════════════════════╝");

    let config = load_config()?;
    let sink = (LogEventSink::new(), RecordingSink::new());
    let mut bench = Bench::new(config, PlantParams::default(), &NOTIFIER, sink)?;
    bench.start()?;
    bench.run_for(300);

    // ── 1. Connect ────────────────────────────────────────────
    bench.set_keepalive(Some((0x80, KEEPALIVE_PERIOD_MS)));
    expect_state(&mut bench, ContactorState::Connected, 15_000)?;
    bench.run_for(2_500);

    bench.poll();
    bench.command(&[0x80, 5]);
    bench.run_for(10);
    if let Some(frame) = bench.plant.sent().last() {
        info!("diag reply: {:02X?}", frame.data.as_slice());
    }

    // ── 2. Disconnect ─────────────────────────────────────────
    bench.set_keepalive(Some((0x00, KEEPALIVE_PERIOD_MS)));
    expect_state(&mut bench, ContactorState::Disconnected, 1_000)?;

    // ── 3. Welded contactor #2 ────────────────────────────────
    bench.plant.faults.welded[1] = true;
    bench.set_keepalive(Some((0x80, KEEPALIVE_PERIOD_MS)));
    expect_state(&mut bench, ContactorState::Faulted, 1_000)?;
    info!("fault: {:?}", bench.service().fault());

    // ── 4. Repair and reset ───────────────────────────────────
    bench.plant.faults.welded[1] = false;
    bench.run_for(100);
    bench.set_keepalive(Some((0x40, KEEPALIVE_PERIOD_MS)));
    expect_state(&mut bench, ContactorState::Disconnected, 1_000)?;

    // ── 5. Keep-alive lost while connected ────────────────────
    bench.set_keepalive(Some((0x80, KEEPALIVE_PERIOD_MS)));
    expect_state(&mut bench, ContactorState::Connected, 15_000)?;
    bench.set_keepalive(None);
    bench.run_for(3_000);
    info!("after keep-alive loss: {:?}", bench.state());

    let frames = bench.plant.take_sent();
    let status = frames
        .iter()
        .filter(|f| f.id == bench.service().config().can.keepalive_response)
        .filter_map(|f| msgs::StatusWord::decode(&f.data))
        .count();
    let transitions = bench.sink.1.states().count();
    info!(
        "Bench done at {} ms: {} transitions, {} frames ({} status), {} wakes",
        bench.now_ms(),
        transitions,
        frames.len(),
        status,
        bench.service().wakes()
    );
    Ok(())
}
