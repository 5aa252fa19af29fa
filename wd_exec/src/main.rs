//! Watchdog executable entry point.
//!
//! # Architecture
//!
//! The execution methodology consists of:
//!
//!     - Initialise the session, logging and parameters
//!     - Restore the persistent configuration
//!     - Build the rover context with its collaborators and links
//!     - Spawn the timer tick thread (which only signals the tick counter)
//!     - Main loop:
//!         - Convert pending timer ticks into events
//!         - Pump both links, buffering frames and raising data events
//!         - Sample the ADC and raise threshold events
//!         - Pump the I2C driver and raise transaction events
//!         - Drain the event queue one event at a time through the state
//!           machine
//!         - Spin the current state to advance multi-step transitions
//!         - Sleep the cycle remainder, but only when no asynchronous work
//!           is outstanding (the low power wait)

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use color_eyre::{eyre::WrapErr, Report};
use log::{info, warn};
use std::collections::VecDeque;
use std::thread;
use std::time::{Duration, Instant};

// Internal
use comms_if::net::{NetParams, PairSocket};
use util::{
    logger::{logger_init, LevelFilter},
    session::Session,
};
use wd_lib::{
    adc::{AdcReadings, SimAdc},
    context::{PersistentStore, RoverContext, POWER_FAULT_BATT_UV, POWER_FAULT_RAIL_UV},
    events::{Event, EventQueue, TickCounter},
    hw::SimHw,
    i2c::{sim::SimI2cBus, GaugeReadings, I2cScheduler},
    params::WdParams,
    state::StateMachine,
};

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

/// 3V3 rail voltage below which a power issue is raised.
const RAIL_3V3_UV_MV: u16 = 3000;

/// 5V rail voltage below which a power issue is raised.
const RAIL_5V_UV_MV: u16 = 4500;

/// Number of polls the simulated hardware takes to complete an operation.
const SIM_LATENCY_POLLS: u8 = 2;

// ---------------------------------------------------------------------------
// FUNCTIONS
// ---------------------------------------------------------------------------

/// Executable main function, entry point.
fn main() -> Result<(), Report> {
    // ---- EARLY INITIALISATION ----

    let session = Session::new("wd_exec", "sessions").wrap_err("Failed to create the session")?;

    logger_init(LevelFilter::Trace, &session).wrap_err("Failed to initialise logging")?;

    info!("Deimos Rover Watchdog Software\n");
    info!("Session directory: {:?}\n", session.session_root);

    // ---- LOAD PARAMETERS ----

    let params: WdParams = match util::params::load("wd_exec.toml") {
        Ok(p) => p,
        Err(e) => {
            warn!("Could not load wd_exec.toml ({}), using flight defaults", e);
            WdParams::default()
        }
    };

    let net_params: NetParams =
        util::params::load("net.toml").wrap_err("Could not load net params")?;

    info!("Exec parameters loaded");

    // ---- INITIALISE EVENT QUEUE ----

    let queue = EventQueue::new(params.event_queue_capacity)
        .wrap_err("Failed to create the event queue")?;
    let event_tx = queue.sender();

    // ---- INITIALISE NETWORK ----

    info!("Initialising network");

    let zmq_ctx = comms_if::net::zmq::Context::new();

    let lander_link = PairSocket::bind(&zmq_ctx, &net_params.lander_endpoint)
        .wrap_err("Failed to bind the lander link")?;
    let cm_link = PairSocket::bind(&zmq_ctx, &net_params.cm_endpoint)
        .wrap_err("Failed to bind the compute module link")?;

    info!("Network initialisation complete");

    // ---- BUILD CONTEXT ----

    // No flight hardware on the bench, the collaborators are simulated
    let (adc, _adc_state) = SimAdc::new(SIM_LATENCY_POLLS);
    let (i2c_bus, _i2c_state) = SimI2cBus::new(SIM_LATENCY_POLLS);
    let (hw, _hw_state) = SimHw::new();

    let persistent = PersistentStore::load(&session.persistent_root);

    let mut ctx = RoverContext {
        params,
        adc_readings: AdcReadings::default(),
        gauge_readings: GaugeReadings::default(),
        i2c: I2cScheduler::new(),
        i2c_bus: Box::new(i2c_bus),
        last_i2c_result: None,
        io_expander_out: 0,
        adc: Box::new(adc),
        hw: Box::new(hw),
        lander_link: Box::new(lander_link),
        cm_link: Box::new(cm_link),
        lander_frames: VecDeque::new(),
        cm_frames: VecDeque::new(),
        persistent,
        monitor: Default::default(),
        power_fault_mask: 0,
        heater_enabled: false,
        heater_on: false,
        event_tx: queue.sender(),
        cm_seq: 0,
    };

    // ---- TIMER TICK THREAD ----

    // The timer thread only increments the counter: every queue put happens
    // on this thread, the ring buffer is single-producer
    let ticks = TickCounter::new();
    let timer_ticks = ticks.clone();
    let tick_period = Duration::from_secs_f64(ctx.params.timer_tick_period_s);
    thread::spawn(move || loop {
        thread::sleep(tick_period);
        timer_ticks.increment();
    });

    // ---- MAIN LOOP ----

    info!("Begining main loop\n");

    let mut sm = StateMachine::new();

    // Implicit initial transition out of Init, before any event is consumed
    sm.spin(&mut ctx);

    loop {
        let cycle_start = Instant::now();

        // ---- TIMER TICKS ----

        // A full queue drops the tick, the next one will fire anyway
        for _ in 0..ticks.take() {
            event_tx.put(Event::TimerTick).ok();
        }

        // ---- LINK PUMPS ----

        loop {
            match ctx.lander_link.try_recv() {
                Ok(Some(frame)) => {
                    ctx.lander_frames.push_back(frame);
                    event_tx.put(Event::LanderData).ok();
                }
                Ok(None) => break,
                Err(e) => {
                    warn!("Lander link receive error: {}", e);
                    break;
                }
            }
        }

        loop {
            match ctx.cm_link.try_recv() {
                Ok(Some(frame)) => {
                    ctx.cm_frames.push_back(frame);
                    event_tx.put(Event::CmData).ok();
                }
                Ok(None) => break,
                Err(e) => {
                    warn!("Compute module link receive error: {}", e);
                    break;
                }
            }
        }

        // ---- ADC SAMPLING ----

        if let Some(readings) = ctx.adc.check_voltage_levels() {
            let prev = ctx.adc_readings;
            ctx.adc_readings = readings;

            // Threshold events are edge triggered so a persistent condition
            // doesn't flood the queue
            if readings.battery_therm >= ctx.params.high_temp_threshold
                && prev.battery_therm < ctx.params.high_temp_threshold
            {
                event_tx.put(Event::HighTemperature).ok();
            }

            if readings.battery_mv < ctx.params.batt_low_threshold_mv
                && prev.battery_mv >= ctx.params.batt_low_threshold_mv
            {
                ctx.raise_power_fault(POWER_FAULT_BATT_UV);
                event_tx.put(Event::PowerIssue).ok();
            }

            let rail_uv = readings.rail_3v3_mv < RAIL_3V3_UV_MV || readings.rail_5v_mv < RAIL_5V_UV_MV;
            let prev_rail_uv = prev.rail_3v3_mv < RAIL_3V3_UV_MV || prev.rail_5v_mv < RAIL_5V_UV_MV;
            if rail_uv && !prev_rail_uv {
                ctx.raise_power_fault(POWER_FAULT_RAIL_UV);
                event_tx.put(Event::PowerIssue).ok();
            }
        }

        // ---- I2C PUMP ----

        // The pump raises I2cStarted / I2cDone onto the queue itself
        let _ = ctx.pump_i2c();

        // ---- EVENT DISPATCH ----

        while let Some(event) = queue.get() {
            sm.dispatch(&mut ctx, event);
        }

        // ---- STATE SPIN ----

        sm.spin(&mut ctx);

        // ---- CYCLE MANAGEMENT ----

        // The low power wait: sleep the cycle remainder only when the queue
        // is drained and the current state has no asynchronous work pending
        let cycle_dur = Instant::now() - cycle_start;

        if queue.is_empty() && sm.can_enter_low_power_mode(&ctx) {
            match Duration::from_secs_f64(ctx.params.cycle_period_s).checked_sub(cycle_dur) {
                Some(d) => thread::sleep(d),
                None => warn!(
                    "Cycle overran by {:.06} s",
                    cycle_dur.as_secs_f64() - ctx.params.cycle_period_s
                ),
            }
        }
    }
}
