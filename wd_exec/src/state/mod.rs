//! # Rover state machine
//!
//! This module implements the hierarchical state machine at the heart of the
//! watchdog. The machine is broken down into a number of states:
//!
//! - `Init` - Transient boot state, immediately hands over to
//!   `EnteringKeepAlive`.
//! - `EnteringKeepAlive` - Powers everything down and reconfigures the ADC
//!   for lander-attached operation.
//! - `KeepAlive` - Steady state while docked to the lander.
//! - `EnteringService` - The KeepAlive entry sequence plus the diagnostic
//!   wake interrupt.
//! - `Service` - Steady diagnostic state while docked.
//! - `EnteringMission` - The seven step power-up sequence for free-roving
//!   operation.
//! - `Mission` - Steady free-roving state, compute module powered.
//! - `Fault` - Terminal recovery state, everything powered down.
//!
//! Events are dispatched to the current state's handler; an event reaching a
//! state which never expects it is a programming error in the state table,
//! not a runtime condition, and brings the watchdog down through
//! `raise_error!`. Which pairs are expected is recorded in [`event_handled`]
//! so the table itself is testable.

// ------------------------------------------------------------------------------------------------
// MODULES
// ------------------------------------------------------------------------------------------------

mod entering_keep_alive;
mod entering_mission;
mod entering_service;
mod fault;
mod keep_alive;
mod mission;
mod service;

// ------------------------------------------------------------------------------------------------
// EXPORTS
// ------------------------------------------------------------------------------------------------

pub mod states {
    pub use super::entering_keep_alive::EnteringKeepAlive;
    pub use super::entering_mission::EnteringMission;
    pub use super::entering_service::EnteringService;
    pub use super::fault::Fault;
    pub use super::keep_alive::KeepAlive;
    pub use super::mission::Mission;
    pub use super::service::Service;
}

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

// External
use log::{info, warn};
use std::fmt::Display;

// Internal
use crate::adc::AdcConfig;
use crate::cmd_proc;
use crate::cm_proc;
use crate::context::RoverContext;
use crate::events::Event;
use crate::hw::{Rail, ResetLine};
use comms_if::gnd::CmdId;
use states::*;
use util::raise_error;

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

/// Identifiers of all rover states. Exactly one state is current at any
/// time. The numeric value is the state id carried in heartbeat telemetry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum RoverStateId {
    Init = 0,
    EnteringKeepAlive = 1,
    KeepAlive = 2,
    EnteringService = 3,
    Service = 4,
    EnteringMission = 5,
    Mission = 6,
    Fault = 7,
}

/// All state ids, used by table-driven tests.
pub const ALL_STATE_IDS: [RoverStateId; 8] = [
    RoverStateId::Init,
    RoverStateId::EnteringKeepAlive,
    RoverStateId::KeepAlive,
    RoverStateId::EnteringService,
    RoverStateId::Service,
    RoverStateId::EnteringMission,
    RoverStateId::Mission,
    RoverStateId::Fault,
];

/// The current state and its data.
pub enum RoverState {
    Init,
    EnteringKeepAlive(EnteringKeepAlive),
    KeepAlive(KeepAlive),
    EnteringService(EnteringService),
    Service(Service),
    EnteringMission(EnteringMission),
    Mission(Mission),
    Fault(Fault),
}

/// Non-instant part of the shared lander-attached entry sequence, used by
/// both `EnteringKeepAlive` and `EnteringService`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum EnterLanderStep {
    /// Waiting for any in-flight ADC conversion to finish.
    WaitAdcIdle,

    /// Waiting for the lander-attached channel reconfiguration to finish.
    WaitAdcSetup,
}

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Driver of the rover state machine. Owns the current state and applies
/// transitions requested by handlers and spin functions.
pub struct StateMachine {
    state: RoverState,
}

// ------------------------------------------------------------------------------------------------
// PUBLIC FUNCTIONS
// ------------------------------------------------------------------------------------------------

/// True if the given state declares a handler for the given event.
///
/// `Init` handles nothing, it transitions away before the queue is first
/// drained. Compute module data is only expected in Mission, the one state
/// where the module is powered; everywhere else it indicates the state table
/// is wrong.
pub fn event_handled(state: RoverStateId, event: Event) -> bool {
    match state {
        RoverStateId::Init => false,
        RoverStateId::Mission => true,
        _ => event != Event::CmData,
    }
}

/// True if the transition between the two states is declared in the
/// topology. Fault is reachable from everywhere and left never.
pub fn transition_allowed(from: RoverStateId, to: RoverStateId) -> bool {
    use RoverStateId::*;

    if to == Fault {
        return from != Fault;
    }

    matches!(
        (from, to),
        (Init, EnteringKeepAlive)
            | (EnteringKeepAlive, KeepAlive)
            | (KeepAlive, EnteringService)
            | (KeepAlive, EnteringMission)
            | (EnteringService, Service)
            | (Service, EnteringKeepAlive)
            | (Service, EnteringMission)
            | (EnteringMission, Mission)
            | (Mission, EnteringKeepAlive)
    )
}

// ------------------------------------------------------------------------------------------------
// CRATE FUNCTIONS - SHARED STATE LOGIC
// ------------------------------------------------------------------------------------------------

/// Put the rover into the lander-attached power configuration: every
/// subsystem reset asserted, every rail off, heater off, monitor off.
pub(crate) fn power_down_for_lander(ctx: &mut RoverContext) {
    info!("Powering down all subsystems");

    ctx.hw.set_reset(ResetLine::Cams, true);
    ctx.hw.set_reset(ResetLine::Wifi, true);
    ctx.hw.set_rail(Rail::V3V3, false);
    ctx.hw.set_rail(Rail::V5, false);
    ctx.set_heater(false);

    // All expander rails off and all expander resets asserted
    ctx.write_io_expander(0x00);

    ctx.monitor.enabled = false;
    ctx.monitor.ticks_since_stroke = 0;
    ctx.monitor.reset_pending = false;

    ctx.clear_power_faults();
}

/// Advance the shared lander-attached entry sequence by one spin. Returns
/// true once the ADC is reconfigured and the heater and battery charging are
/// up.
pub(crate) fn advance_lander_setup(ctx: &mut RoverContext, step: &mut EnterLanderStep) -> bool {
    match step {
        EnterLanderStep::WaitAdcIdle => {
            if ctx.adc.is_sample_done() {
                ctx.adc.setup(AdcConfig::LanderAttached);
                *step = EnterLanderStep::WaitAdcSetup;
            }
            false
        }
        EnterLanderStep::WaitAdcSetup => {
            if ctx.adc.is_sample_done() {
                ctx.heater_enabled = true;
                ctx.hw.set_battery_charge(true);
                true
            } else {
                false
            }
        }
    }
}

/// Drain the buffered lander frames through the command processor, keeping
/// the last transition request.
pub(crate) fn process_lander_frames(
    ctx: &mut RoverContext,
    state: RoverStateId,
    hold: &mut Option<CmdId>,
) -> Option<RoverStateId> {
    let mut transition = None;

    while let Some(frame) = ctx.lander_frames.pop_front() {
        if let Some(target) = cmd_proc::process_lander_frame(ctx, state, hold, &frame) {
            transition = Some(target);
        }
    }

    transition
}

/// Drain the buffered compute module frames.
pub(crate) fn process_cm_frames(ctx: &mut RoverContext, state: RoverStateId) {
    while let Some(frame) = ctx.cm_frames.pop_front() {
        cm_proc::process_cm_frame(ctx, state, &frame);
    }
}

/// Switch the heater against the persistent thermostat setpoints. No-op
/// while the heater is disabled.
pub(crate) fn run_thermostat(ctx: &mut RoverContext) {
    if !ctx.heater_enabled {
        return;
    }

    let therm = ctx.adc_readings.battery_therm;
    let on_value = ctx.persistent.config.auto_heater_on_value;
    let off_value = ctx.persistent.config.auto_heater_off_value;

    if therm <= on_value {
        ctx.set_heater(true);
    } else if therm >= off_value {
        ctx.set_heater(false);
    }
}

/// Disable the heater for the remainder of the state. Used on high
/// temperature events.
pub(crate) fn disable_heater(ctx: &mut RoverContext) {
    warn!("High temperature, heater disabled");
    ctx.heater_enabled = false;
    ctx.set_heater(false);
}

/// Emit one heartbeat telemetry frame on the lander link.
pub(crate) fn emit_heartbeat(ctx: &mut RoverContext, state: RoverStateId) {
    let telem = ctx.telemetry(state as u8);
    ctx.send_lander(&telem.to_bytes());
}

/// Advance compute module aliveness monitoring by one timer tick: count
/// ticks since the last stroke and pulse the module's reset line through the
/// I/O expander once the limit is exceeded.
pub(crate) fn step_cm_monitor(ctx: &mut RoverContext) {
    use crate::i2c::io_exp;

    if !ctx.monitor.enabled {
        return;
    }

    if ctx.monitor.reset_pending {
        // Second half of the pulse, release the reset again
        ctx.monitor.reset_pending = false;
        let io = ctx.io_expander_out;
        ctx.write_io_expander(io | io_exp::RELEASE_CM_RESET);
        return;
    }

    ctx.monitor.ticks_since_stroke += 1;

    if ctx.monitor.ticks_since_stroke > ctx.params.cm_stroke_tick_limit {
        warn!(
            "No stroke for {} ticks, resetting the compute module",
            ctx.monitor.ticks_since_stroke
        );
        let io = ctx.io_expander_out;
        ctx.write_io_expander(io & !io_exp::RELEASE_CM_RESET);
        ctx.monitor.reset_pending = true;
        ctx.monitor.ticks_since_stroke = 0;
    }
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl StateMachine {
    /// Create the machine in `Init`. The first spin performs the transition
    /// into `EnteringKeepAlive`.
    pub fn new() -> Self {
        Self {
            state: RoverState::Init,
        }
    }

    /// The id of the current state.
    pub fn state_id(&self) -> RoverStateId {
        match self.state {
            RoverState::Init => RoverStateId::Init,
            RoverState::EnteringKeepAlive(_) => RoverStateId::EnteringKeepAlive,
            RoverState::KeepAlive(_) => RoverStateId::KeepAlive,
            RoverState::EnteringService(_) => RoverStateId::EnteringService,
            RoverState::Service(_) => RoverStateId::Service,
            RoverState::EnteringMission(_) => RoverStateId::EnteringMission,
            RoverState::Mission(_) => RoverStateId::Mission,
            RoverState::Fault(_) => RoverStateId::Fault,
        }
    }

    /// Dispatch one event to the current state's handler, applying any
    /// requested transition.
    pub fn dispatch(&mut self, ctx: &mut RoverContext, event: Event) {
        let id = self.state_id();

        if !event_handled(id, event) {
            raise_error!(
                "Event {:?} delivered to state {} which never expects it",
                event,
                id
            );
        }

        let target = match &mut self.state {
            // Unreachable, Init handles nothing
            RoverState::Init => None,
            RoverState::EnteringKeepAlive(s) => s.handle(ctx, event),
            RoverState::KeepAlive(s) => s.handle(ctx, event),
            RoverState::EnteringService(s) => s.handle(ctx, event),
            RoverState::Service(s) => s.handle(ctx, event),
            RoverState::EnteringMission(s) => s.handle(ctx, event),
            RoverState::Mission(s) => s.handle(ctx, event),
            RoverState::Fault(s) => s.handle(ctx, event),
        };

        if let Some(target) = target {
            self.transition(ctx, target);
        }
    }

    /// Let the current state advance any in-flight multi-step work. Called
    /// once per main loop cycle.
    pub fn spin(&mut self, ctx: &mut RoverContext) {
        let target = match &mut self.state {
            RoverState::Init => Some(RoverStateId::EnteringKeepAlive),
            RoverState::EnteringKeepAlive(s) => s.spin(ctx),
            RoverState::EnteringService(s) => s.spin(ctx),
            RoverState::EnteringMission(s) => s.spin(ctx),
            // Steady states have no multi-step work
            RoverState::KeepAlive(_)
            | RoverState::Service(_)
            | RoverState::Mission(_)
            | RoverState::Fault(_) => None,
        };

        if let Some(target) = target {
            self.transition(ctx, target);
        }
    }

    /// True if the main loop may suspend: no asynchronous work is
    /// outstanding in the current state.
    pub fn can_enter_low_power_mode(&self, ctx: &RoverContext) -> bool {
        match &self.state {
            // Transitions in progress always have outstanding work
            RoverState::Init
            | RoverState::EnteringKeepAlive(_)
            | RoverState::EnteringService(_)
            | RoverState::EnteringMission(_) => false,
            RoverState::KeepAlive(_) | RoverState::Service(_) | RoverState::Mission(_) => {
                !ctx.i2c.has_work()
            }
            RoverState::Fault(_) => true,
        }
    }

    /// Apply a transition, validating it against the declared topology.
    fn transition(&mut self, ctx: &mut RoverContext, target: RoverStateId) {
        let from = self.state_id();

        if !transition_allowed(from, target) {
            raise_error!("Undeclared state transition {} -> {}", from, target);
        }

        info!("State transition: {} -> {}", from, target);

        self.state = RoverState::for_id(target);
        self.state.on_entry(ctx);
    }

    #[cfg(test)]
    pub(crate) fn force_state(&mut self, ctx: &mut RoverContext, id: RoverStateId) {
        self.state = RoverState::for_id(id);
        self.state.on_entry(ctx);
    }
}

impl Default for StateMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl RoverState {
    /// Build a fresh state for the given id.
    fn for_id(id: RoverStateId) -> Self {
        match id {
            RoverStateId::Init => RoverState::Init,
            RoverStateId::EnteringKeepAlive => {
                RoverState::EnteringKeepAlive(EnteringKeepAlive::new())
            }
            RoverStateId::KeepAlive => RoverState::KeepAlive(KeepAlive::new()),
            RoverStateId::EnteringService => RoverState::EnteringService(EnteringService::new()),
            RoverStateId::Service => RoverState::Service(Service::new()),
            RoverStateId::EnteringMission => RoverState::EnteringMission(EnteringMission::new()),
            RoverStateId::Mission => RoverState::Mission(Mission::new()),
            RoverStateId::Fault => RoverState::Fault(Fault::new()),
        }
    }

    /// Run the state's entry action. Called exactly once, when the state
    /// becomes current.
    fn on_entry(&mut self, ctx: &mut RoverContext) {
        match self {
            RoverState::Init => (),
            RoverState::EnteringKeepAlive(s) => s.on_entry(ctx),
            RoverState::KeepAlive(s) => s.on_entry(ctx),
            RoverState::EnteringService(s) => s.on_entry(ctx),
            RoverState::Service(s) => s.on_entry(ctx),
            RoverState::EnteringMission(s) => s.on_entry(ctx),
            RoverState::Mission(s) => s.on_entry(ctx),
            RoverState::Fault(s) => s.on_entry(ctx),
        }
    }
}

impl Display for RoverStateId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RoverStateId::Init => write!(f, "Init"),
            RoverStateId::EnteringKeepAlive => write!(f, "EnteringKeepAlive"),
            RoverStateId::KeepAlive => write!(f, "KeepAlive"),
            RoverStateId::EnteringService => write!(f, "EnteringService"),
            RoverStateId::Service => write!(f, "Service"),
            RoverStateId::EnteringMission => write!(f, "EnteringMission"),
            RoverStateId::Mission => write!(f, "Mission"),
            RoverStateId::Fault => write!(f, "Fault"),
        }
    }
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;
    use crate::context::fixtures::{test_rig, TestRig};
    use crate::events::ALL_EVENTS;
    use crate::i2c::{io_exp, I2cAction};
    use comms_if::gnd::{
        CmdBody, CmdId, RespStatus, WdCmdMessage, WdResponse, DEPLOY_MAGIC, MODE_SWITCH_MAGIC,
        PREP_DEPLOY_MAGIC,
    };

    /// Pump the I2C driver and spin the machine until it reaches the target
    /// state or the iteration budget runs out.
    fn run_until(rig: &mut TestRig, sm: &mut StateMachine, target: RoverStateId) {
        for _ in 0..10_000 {
            if let Some(event) = rig.ctx.pump_i2c() {
                sm.dispatch(&mut rig.ctx, event);
            }
            sm.spin(&mut rig.ctx);

            if sm.state_id() == target {
                return;
            }
        }
        panic!(
            "machine stuck in {} while running to {}",
            sm.state_id(),
            target
        );
    }

    /// Drain all outstanding I2C work through the machine.
    fn drain_i2c(rig: &mut TestRig, sm: &mut StateMachine) {
        for _ in 0..1_000 {
            if !rig.ctx.i2c.has_work() {
                return;
            }
            if let Some(event) = rig.ctx.pump_i2c() {
                sm.dispatch(&mut rig.ctx, event);
            }
        }
        panic!("I2C work never drained");
    }

    fn push_cmd(rig: &TestRig, id: CmdId, body: CmdBody) {
        rig.lander.push_rx(WdCmdMessage::new(0, id, body).to_bytes());
    }

    fn responses(rig: &TestRig) -> Vec<WdResponse> {
        rig.lander
            .take_tx()
            .iter()
            .filter_map(|f| WdResponse::from_bytes(f).ok())
            .collect()
    }

    /// Feed buffered lander frames into the machine as one event.
    fn deliver_lander(rig: &mut TestRig, sm: &mut StateMachine) {
        while let Some(frame) = rig.ctx.lander_link.try_recv().unwrap() {
            rig.ctx.lander_frames.push_back(frame);
        }
        sm.dispatch(&mut rig.ctx, Event::LanderData);
    }

    #[test]
    fn test_handler_totality_table() {
        for state in ALL_STATE_IDS {
            for event in ALL_EVENTS {
                let expected = match state {
                    // Init transitions away before the queue is drained
                    RoverStateId::Init => false,
                    // The compute module is only powered in Mission
                    RoverStateId::Mission => true,
                    _ => event != Event::CmData,
                };
                assert_eq!(
                    event_handled(state, event),
                    expected,
                    "state {} event {:?}",
                    state,
                    event
                );
            }
        }
    }

    #[test]
    fn test_transition_topology() {
        use RoverStateId::*;

        let declared = [
            (Init, EnteringKeepAlive),
            (EnteringKeepAlive, KeepAlive),
            (KeepAlive, EnteringService),
            (KeepAlive, EnteringMission),
            (EnteringService, Service),
            (Service, EnteringKeepAlive),
            (Service, EnteringMission),
            (EnteringMission, Mission),
            (Mission, EnteringKeepAlive),
        ];

        for from in ALL_STATE_IDS {
            for to in ALL_STATE_IDS {
                let expected = if to == Fault {
                    from != Fault
                } else {
                    declared.contains(&(from, to))
                };
                assert_eq!(transition_allowed(from, to), expected, "{} -> {}", from, to);
            }
        }
    }

    #[test]
    fn test_boot_reaches_keep_alive() {
        let mut rig = test_rig();
        let mut sm = StateMachine::new();

        assert_eq!(sm.state_id(), RoverStateId::Init);
        assert!(!sm.can_enter_low_power_mode(&rig.ctx));

        sm.spin(&mut rig.ctx);
        assert_eq!(sm.state_id(), RoverStateId::EnteringKeepAlive);

        // Entry powered everything down
        assert!(rig.hw.borrow().cams_reset_asserted);
        assert!(!rig.hw.borrow().rail_3v3_on);

        run_until(&mut rig, &mut sm, RoverStateId::KeepAlive);

        // Heater thermostat and battery charging up once attached
        assert!(rig.ctx.heater_enabled);
        assert!(rig.hw.borrow().battery_charge_on);

        // Low power mode once the expander clear has drained
        drain_i2c(&mut rig, &mut sm);
        assert!(sm.can_enter_low_power_mode(&rig.ctx));
        assert_eq!(rig.i2c.borrow().io_expander_reg, 0x00);
    }

    #[test]
    fn test_keep_alive_heartbeat_every_third_tick() {
        let mut rig = test_rig();
        let mut sm = StateMachine::new();
        sm.force_state(&mut rig.ctx, RoverStateId::KeepAlive);
        rig.lander.take_tx();

        for _ in 0..6 {
            sm.dispatch(&mut rig.ctx, Event::TimerTick);
        }

        let beats = rig.lander.take_tx();
        assert_eq!(beats.len(), 2);
        assert_eq!(beats[0][0], comms_if::gnd::response::HEARTBEAT_MAGIC);
    }

    #[test]
    fn test_high_temperature_disables_heater_permanently() {
        let mut rig = test_rig();
        let mut sm = StateMachine::new();
        sm.force_state(&mut rig.ctx, RoverStateId::KeepAlive);

        rig.ctx.heater_enabled = true;
        rig.ctx.set_heater(true);

        sm.dispatch(&mut rig.ctx, Event::HighTemperature);
        assert!(!rig.ctx.heater_on);
        assert!(!rig.hw.borrow().heater_on);

        // Cold readings no longer switch it back on
        rig.ctx.adc_readings.battery_therm = 0;
        sm.dispatch(&mut rig.ctx, Event::TimerTick);
        assert!(!rig.ctx.heater_on);
    }

    #[test]
    fn test_thermostat_switches_on_setpoints() {
        let mut rig = test_rig();
        let mut sm = StateMachine::new();
        sm.force_state(&mut rig.ctx, RoverStateId::KeepAlive);
        rig.ctx.heater_enabled = true;

        rig.ctx.adc_readings.battery_therm = rig.ctx.persistent.config.auto_heater_on_value - 1;
        sm.dispatch(&mut rig.ctx, Event::TimerTick);
        assert!(rig.ctx.heater_on);

        rig.ctx.adc_readings.battery_therm = rig.ctx.persistent.config.auto_heater_off_value + 1;
        sm.dispatch(&mut rig.ctx, Event::TimerTick);
        assert!(!rig.ctx.heater_on);
    }

    #[test]
    fn test_double_confirmation_through_machine() {
        let mut rig = test_rig();
        let mut sm = StateMachine::new();
        sm.force_state(&mut rig.ctx, RoverStateId::Mission);
        rig.lander.take_tx();

        let eka = CmdBody::EnterKeepAlive {
            confirm: MODE_SWITCH_MAGIC,
        };

        // First command: success, still in Mission
        push_cmd(&rig, CmdId::EnterKeepAlive, eka.clone());
        deliver_lander(&mut rig, &mut sm);
        assert_eq!(sm.state_id(), RoverStateId::Mission);
        assert_eq!(responses(&rig)[0].status, RespStatus::Success);

        // Interleaved command cancels the hold
        push_cmd(
            &rig,
            CmdId::ResetSpecific,
            CmdBody::ResetSpecific {
                reset_id: comms_if::gnd::ResetId::NoOp,
            },
        );
        deliver_lander(&mut rig, &mut sm);
        assert_eq!(sm.state_id(), RoverStateId::Mission);

        // Next EnterKeepAlive holds again rather than transitioning
        push_cmd(&rig, CmdId::EnterKeepAlive, eka.clone());
        deliver_lander(&mut rig, &mut sm);
        assert_eq!(sm.state_id(), RoverStateId::Mission);

        // The repeat is honoured
        push_cmd(&rig, CmdId::EnterKeepAlive, eka);
        deliver_lander(&mut rig, &mut sm);
        assert_eq!(sm.state_id(), RoverStateId::EnteringKeepAlive);
    }

    #[test]
    fn test_prep_for_deploy_runs_entering_mission() {
        let mut rig = test_rig();
        rig.i2c.borrow_mut().gauge_init_nacks = 1;

        let mut sm = StateMachine::new();
        sm.force_state(&mut rig.ctx, RoverStateId::Service);
        rig.lander.take_tx();

        push_cmd(
            &rig,
            CmdId::PrepForDeploy,
            CmdBody::PrepForDeploy {
                confirm: PREP_DEPLOY_MAGIC,
            },
        );
        deliver_lander(&mut rig, &mut sm);
        assert_eq!(sm.state_id(), RoverStateId::EnteringMission);
        assert!(rig.ctx.persistent.config.deploy_armed);

        run_until(&mut rig, &mut sm, RoverStateId::Mission);
        drain_i2c(&mut rig, &mut sm);

        // Everything powered: rails, resets released, compute module up
        let io = rig.i2c.borrow().io_expander_reg;
        assert_eq!(
            io,
            io_exp::RAIL_RADIO
                | io_exp::RAIL_FPGA
                | io_exp::RAIL_MOTORS
                | io_exp::RAIL_CM
                | io_exp::RELEASE_RADIO_RESET
                | io_exp::RELEASE_FPGA_RESET
                | io_exp::RELEASE_CM_RESET
                | io_exp::RELEASE_MOTOR_RESETS
        );

        // Gauge init was retried after the scripted NACK
        let inits = rig
            .i2c
            .borrow()
            .initiated
            .iter()
            .filter(|a| **a == I2cAction::GaugeInit)
            .count();
        assert_eq!(inits, 2);

        // Monitoring defaults on in Mission
        assert!(rig.ctx.monitor.enabled);
        assert_eq!(rig.ctx.adc.config(), crate::adc::AdcConfig::Mission);
    }

    #[test]
    fn test_gauge_init_bypassed_on_timeout() {
        let mut rig = test_rig();
        rig.i2c.borrow_mut().gauge_init_nacks = u32::MAX;
        rig.ctx.params.gauge_init_timeout_s = 0.0;

        let mut sm = StateMachine::new();
        sm.force_state(&mut rig.ctx, RoverStateId::Service);

        push_cmd(
            &rig,
            CmdId::PrepForDeploy,
            CmdBody::PrepForDeploy {
                confirm: PREP_DEPLOY_MAGIC,
            },
        );
        deliver_lander(&mut rig, &mut sm);

        // A permanently NACKing gauge must not block the sequence
        run_until(&mut rig, &mut sm, RoverStateId::Mission);
    }

    #[test]
    fn test_deploy_line_asserted_from_mission() {
        let mut rig = test_rig();
        let mut sm = StateMachine::new();
        sm.force_state(&mut rig.ctx, RoverStateId::Mission);
        rig.ctx.persistent.config.deploy_armed = true;
        rig.lander.take_tx();

        push_cmd(
            &rig,
            CmdId::Deploy,
            CmdBody::Deploy {
                confirm: DEPLOY_MAGIC,
            },
        );
        deliver_lander(&mut rig, &mut sm);

        assert!(rig.hw.borrow().deploy_asserted);
        assert_eq!(responses(&rig).len(), 2);
    }

    #[test]
    fn test_cm_monitor_pulses_reset() {
        let mut rig = test_rig();
        let mut sm = StateMachine::new();
        sm.force_state(&mut rig.ctx, RoverStateId::Mission);
        drain_i2c(&mut rig, &mut sm);

        rig.ctx.params.cm_stroke_tick_limit = 2;
        rig.ctx.io_expander_out = io_exp::RAIL_CM | io_exp::RELEASE_CM_RESET;

        // Two ticks under the limit, the third trips the reset
        sm.dispatch(&mut rig.ctx, Event::TimerTick);
        sm.dispatch(&mut rig.ctx, Event::TimerTick);
        assert!(!rig.ctx.monitor.reset_pending);

        sm.dispatch(&mut rig.ctx, Event::TimerTick);
        assert!(rig.ctx.monitor.reset_pending);
        assert_eq!(rig.ctx.io_expander_out & io_exp::RELEASE_CM_RESET, 0);

        // Next tick releases the reset again
        sm.dispatch(&mut rig.ctx, Event::TimerTick);
        assert!(!rig.ctx.monitor.reset_pending);
        assert_ne!(rig.ctx.io_expander_out & io_exp::RELEASE_CM_RESET, 0);
    }

    #[test]
    fn test_power_issue_in_mission_enters_fault() {
        let mut rig = test_rig();
        let mut sm = StateMachine::new();
        sm.force_state(&mut rig.ctx, RoverStateId::Mission);

        sm.dispatch(&mut rig.ctx, Event::PowerIssue);
        assert_eq!(sm.state_id(), RoverStateId::Fault);

        // Fault entry powers everything down
        assert!(!rig.hw.borrow().rail_3v3_on);
        assert!(!rig.hw.borrow().battery_charge_on);
        assert!(sm.can_enter_low_power_mode(&rig.ctx));
    }

    #[test]
    fn test_enter_service_from_keep_alive() {
        let mut rig = test_rig();
        let mut sm = StateMachine::new();
        sm.force_state(&mut rig.ctx, RoverStateId::KeepAlive);

        push_cmd(
            &rig,
            CmdId::EnterService,
            CmdBody::EnterService {
                confirm: MODE_SWITCH_MAGIC,
            },
        );
        deliver_lander(&mut rig, &mut sm);
        assert_eq!(sm.state_id(), RoverStateId::EnteringService);

        run_until(&mut rig, &mut sm, RoverStateId::Service);

        // Service adds the diagnostic wake interrupt, monitoring stays off
        assert!(rig.hw.borrow().wake_interrupt_enabled);
        assert!(!rig.ctx.monitor.enabled);
    }

    #[test]
    #[should_panic]
    fn test_unexpected_event_is_fatal() {
        let mut rig = test_rig();
        let mut sm = StateMachine::new();
        sm.force_state(&mut rig.ctx, RoverStateId::KeepAlive);

        // Compute module data while the module is unpowered is a state table
        // bug
        sm.dispatch(&mut rig.ctx, Event::CmData);
    }
}
