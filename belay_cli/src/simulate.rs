//! Simulated print: a scripted primary extruder, simulated secondary drives
//! and sliders, and the configured belays closing the loop between them.

use std::cell::Cell;
use std::rc::Rc;

use belay_config::{BelayCfg, Config, ScheduledCommandCfg, SimulationCfg};
use belay_core::extruder::{TRAD_RACK_SYNCED_EVENT, TRAD_RACK_UNSYNCING_EVENT};
use belay_core::{
    Action, BelayBuilder, BelayHandle, BelaySystem, DirectionMonitor, ExtruderCfg, SensorCfg,
};
use belay_hardware::sim::{
    SimAnalog, SimFilamentDriver, SimMotionPlan, SimRegistry, SimSlider, SimStepper,
};
use belay_traits::ManualClock;
use eyre::WrapErr;
use serde_json::json;

/// Rotation distance of every simulated extruder stepper.
const SIM_ROTATION_DISTANCE: f64 = 22.0;
/// Moves are queued this far ahead of the clock.
const LOOKAHEAD_S: f64 = 0.5;
const RETRACT_SPEED: f64 = 35.0;
/// Pause at the retracted position before feeding again.
const RETRACT_DWELL_S: f64 = 1.0;
/// Half travel given to switch sliders, which have no travel setting.
const SWITCH_HALF_TRAVEL: f64 = 4.0;
const RIPPLE_HZ: f64 = 7.3;

/// What the primary extruder is asked to do next.
#[derive(Debug, Clone, Copy, PartialEq)]
enum Phase {
    Printing,
    Retracted,
    Dwelled,
}

#[derive(Debug)]
struct FeedProgram {
    feed_rate: f64,
    move_length: f64,
    retract_every: f64,
    retract_length: f64,
    next_retract: f64,
    phase: Phase,
}

impl FeedProgram {
    fn new(sim: &SimulationCfg) -> Self {
        Self {
            feed_rate: sim.feed_rate,
            move_length: sim.move_length,
            retract_every: sim.retract_every_s,
            retract_length: sim.retract_length,
            next_retract: sim.retract_every_s,
            phase: Phase::Printing,
        }
    }

    fn retracts(&self) -> bool {
        self.retract_every > 0.0 && self.retract_length > 0.0
    }

    /// Keep the plan queued `LOOKAHEAD_S` past `now`.
    fn fill(&mut self, plan: &SimMotionPlan, now: f64) {
        while plan.queued_until() < now + LOOKAHEAD_S {
            let start = plan.queued_until().max(now);
            let retract_time = self.retract_length / RETRACT_SPEED;
            match self.phase {
                Phase::Retracted => {
                    plan.queue_move(now, RETRACT_DWELL_S, 0.0);
                    self.phase = Phase::Dwelled;
                }
                Phase::Dwelled => {
                    plan.queue_move(now, retract_time, self.retract_length);
                    self.phase = Phase::Printing;
                }
                Phase::Printing if self.retracts() && start >= self.next_retract => {
                    plan.queue_move(now, retract_time, -self.retract_length);
                    self.next_retract += self.retract_every;
                    self.phase = Phase::Retracted;
                }
                Phase::Printing => {
                    plan.queue_move(now, self.move_length / self.feed_rate, self.move_length);
                }
            }
        }
    }
}

enum SimSensor {
    Switches(Vec<bool>),
    Analog {
        input: SimAnalog,
        expanded_reading: f64,
        compressed_reading: f64,
        sample_interval: f64,
        next_sample: f64,
    },
}

struct SimBelay {
    handle: BelayHandle,
    slider: SimSlider,
    sensor: SimSensor,
    min_position: f64,
    max_position: f64,
    at_stop_s: f64,
    switch_edges: u64,
}

impl SimBelay {
    fn switch_states(&self) -> Vec<bool> {
        match &self.sensor {
            SimSensor::Switches(states) if states.len() == 1 => vec![self.slider.single_switch()],
            SimSensor::Switches(_) => self.slider.dual_switches().to_vec(),
            SimSensor::Analog { .. } => Vec::new(),
        }
    }

    fn analog_reading(&self, t: f64, noise: f64) -> Option<f64> {
        match &self.sensor {
            SimSensor::Analog {
                expanded_reading,
                compressed_reading,
                ..
            } => {
                let ripple = noise * (std::f64::consts::TAU * RIPPLE_HZ * t).sin();
                Some(self.slider.reading(*expanded_reading, *compressed_reading) + ripple)
            }
            SimSensor::Switches(_) => None,
        }
    }

    /// Push the slider's current state into the belay's sensor.
    fn sense(&mut self, t: f64, noise: f64) -> eyre::Result<()> {
        if let Some(reading) = self.analog_reading(t, noise)
            && let SimSensor::Analog {
                input,
                sample_interval,
                next_sample,
                ..
            } = &mut self.sensor
        {
            input.set(reading);
            if t + 1e-9 >= *next_sample {
                *next_sample += *sample_interval;
                self.handle.borrow_mut().handle_sample(t, reading)?;
            }
            return Ok(());
        }
        let now = self.switch_states();
        let SimSensor::Switches(states) = &mut self.sensor else {
            return Ok(());
        };
        let changed: Vec<(usize, bool)> = now
            .iter()
            .enumerate()
            .filter(|(i, s)| states.get(*i) != Some(*s))
            .map(|(i, s)| (i, *s))
            .collect();
        *states = now;
        for (index, state) in changed {
            self.switch_edges += 1;
            self.handle.borrow_mut().handle_switch(index, t, state)?;
        }
        Ok(())
    }

    fn record(&mut self, step: f64) {
        let p = self.slider.position();
        self.min_position = self.min_position.min(p);
        self.max_position = self.max_position.max(p);
        if p.abs() >= self.slider.half_travel() {
            self.at_stop_s += step;
        }
    }
}

/// Outcome of one belay over the whole run.
#[derive(Debug, Clone, PartialEq)]
pub struct BelaySummary {
    pub name: String,
    pub enabled: bool,
    pub multiplier: f64,
    pub slider_mm: f64,
    pub min_slider_mm: f64,
    pub max_slider_mm: f64,
    /// Seconds the slider spent against a travel stop.
    pub at_stop_s: f64,
    pub switch_edges: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SimSummary {
    pub duration_s: f64,
    pub extruded_mm: f64,
    pub direction_changes: u32,
    pub command_errors: u32,
    pub belays: Vec<BelaySummary>,
}

/// The simulated printer with every configured belay wired in.
pub struct Rig {
    clock: ManualClock,
    plan: SimMotionPlan,
    registry: SimRegistry,
    system: BelaySystem,
    belays: Vec<SimBelay>,
    program: FeedProgram,
    sim: SimulationCfg,
    direction_changes: Rc<Cell<u32>>,
    next_tick: f64,
    now: f64,
}

fn registry_for(cfg: &Config) -> SimRegistry {
    let mut registry = SimRegistry::new();
    if cfg
        .belays
        .iter()
        .any(|b| b.extruder_type == belay_config::ExtruderType::TradRack)
    {
        registry = registry.with_driver(SimFilamentDriver::new());
    }
    let scripted = cfg.simulation.commands.iter().filter_map(|c| match &c.command {
        belay_config::CommandCfg::SetStepper { name } => Some(name.clone()),
        _ => None,
    });
    let configured = cfg
        .belays
        .iter()
        .filter_map(|b| b.extruder_stepper_name.clone());
    for name in configured.chain(scripted) {
        if registry.stepper_handle(&name).is_none() {
            registry = registry.with_stepper(name, SimStepper::new(SIM_ROTATION_DISTANCE));
        }
    }
    registry
}

impl Rig {
    pub fn new(cfg: &Config) -> eyre::Result<Self> {
        let clock = ManualClock::new();
        let plan = SimMotionPlan::new();
        let registry = registry_for(cfg);
        let monitor = DirectionMonitor::new(cfg.direction.update_interval)?;
        let direction_changes = Rc::new(Cell::new(0));
        let counter = direction_changes.clone();
        monitor.subscribe(move |_| counter.set(counter.get() + 1));

        let mut system = BelaySystem::new(monitor.clone());
        let mut belays = Vec::with_capacity(cfg.belays.len());
        for b in &cfg.belays {
            let sim_belay = build_belay(b, &monitor, &clock, &plan, &registry)
                .wrap_err_with(|| format!("build belay {}", b.name))?;
            system.add(sim_belay.handle.clone());
            belays.push(sim_belay);
        }
        Ok(Self {
            clock,
            plan,
            registry,
            system,
            belays,
            program: FeedProgram::new(&cfg.simulation),
            sim: cfg.simulation.clone(),
            direction_changes,
            next_tick: 0.0,
            now: 0.0,
        })
    }

    pub fn system(&self) -> &BelaySystem {
        &self.system
    }

    /// Report initial sensor states, finish start-up and sync any filament
    /// driver the way a tool change would.
    pub fn start(&mut self) -> eyre::Result<()> {
        self.clock.set(0.0);
        for b in &mut self.belays {
            let states = b.switch_states();
            if let SimSensor::Switches(known) = &mut b.sensor {
                known.clone_from(&states);
                for (index, state) in states.into_iter().enumerate() {
                    b.handle.borrow_mut().handle_switch(index, 0.0, state)?;
                }
            }
            if let Some(reading) = b.analog_reading(0.0, self.sim.noise)
                && let SimSensor::Analog { input, .. } = &b.sensor
            {
                input.set(reading);
            }
        }
        self.system.handle_ready()?;
        if let Some(driver) = self.registry.driver() {
            driver.set_synced(true);
            self.system.handle_event(TRAD_RACK_SYNCED_EVENT)?;
        }
        tracing::info!(belays = self.belays.len(), "simulation started");
        Ok(())
    }

    fn speed_factor(&self, handle: &BelayHandle) -> f64 {
        let belay = handle.borrow();
        match belay.extruder().stepper_name() {
            Some(name) => self
                .registry
                .stepper_handle(name)
                .map_or(0.0, SimStepper::speed_factor),
            None => self
                .registry
                .driver()
                .map_or(0.0, SimFilamentDriver::speed_factor),
        }
    }

    /// Advance the simulation by one step.
    pub fn step(&mut self) -> eyre::Result<()> {
        let prev = self.now;
        let t = prev + self.sim.step_s;
        self.now = t;
        self.clock.set(t);

        self.program.fill(&self.plan, t);
        if t + 1e-9 >= self.next_tick {
            self.next_tick = self.system.tick(t, &mut self.plan);
        }
        self.plan.commit_until(t);

        let primary = self.plan.position_at(t) - self.plan.position_at(prev);
        for i in 0..self.belays.len() {
            let factor = self.speed_factor(&self.belays[i].handle);
            let b = &mut self.belays[i];
            b.slider
                .advance(primary, primary * self.sim.secondary_ratio * factor);
            b.record(self.sim.step_s);
            b.sense(t, self.sim.noise)?;
        }
        Ok(())
    }

    /// Issue one scripted operator command or host event.
    pub fn issue(&mut self, scheduled: &ScheduledCommandCfg) -> eyre::Result<Option<String>> {
        let action = Action::from(&scheduled.command);
        let driver = self.registry.driver().cloned();
        if let (Action::Event(name), Some(d)) = (&action, &driver)
            && name == TRAD_RACK_SYNCED_EVENT
        {
            d.set_synced(true);
        }
        let reply = self
            .system
            .perform(scheduled.belay.as_deref(), &action, &self.registry)?;
        if let (Action::Event(name), Some(d)) = (&action, &driver)
            && name == TRAD_RACK_UNSYNCING_EVENT
        {
            d.set_synced(false);
        }
        Ok(reply.map(|r| r.to_string()))
    }

    pub fn now(&self) -> f64 {
        self.now
    }

    pub fn telemetry(&self) -> Vec<serde_json::Value> {
        self.belays
            .iter()
            .map(|b| {
                let belay = b.handle.borrow();
                let status = belay.status();
                json!({
                    "t": (self.now * 1000.0).round() / 1000.0,
                    "belay": status.name,
                    "enabled": status.enabled,
                    "state": status.state,
                    "multiplier": status.multiplier,
                    "slider_mm": b.slider.position(),
                })
            })
            .collect()
    }

    pub fn summary(&self, command_errors: u32) -> SimSummary {
        SimSummary {
            duration_s: self.now,
            extruded_mm: self.plan.position_at(self.now),
            direction_changes: self.direction_changes.get(),
            command_errors,
            belays: self
                .belays
                .iter()
                .map(|b| {
                    let belay = b.handle.borrow();
                    BelaySummary {
                        name: belay.name().to_string(),
                        enabled: belay.is_enabled(),
                        multiplier: belay.multiplier(),
                        slider_mm: b.slider.position(),
                        min_slider_mm: b.min_position,
                        max_slider_mm: b.max_position,
                        at_stop_s: b.at_stop_s,
                        switch_edges: b.switch_edges,
                    }
                })
                .collect(),
        }
    }
}

fn build_belay(
    b: &BelayCfg,
    monitor: &DirectionMonitor,
    clock: &ManualClock,
    plan: &SimMotionPlan,
    registry: &SimRegistry,
) -> eyre::Result<SimBelay> {
    let extruder = ExtruderCfg::try_from(b)?;
    let sensor_cfg = SensorCfg::from(b);
    let mut builder = BelayBuilder::new(b.name.clone())
        .with_debug_level(b.debug_level)
        .with_clock(Box::new(clock.clone()))
        .with_monitor(monitor.clone());

    let (slider, sensor) = match &b.sensor {
        belay_config::SensorCfg::SingleSwitch { .. } => (
            SimSlider::new(SWITCH_HALF_TRAVEL),
            SimSensor::Switches(vec![false]),
        ),
        belay_config::SensorCfg::DualSwitch { .. } => (
            SimSlider::new(SWITCH_HALF_TRAVEL),
            SimSensor::Switches(vec![false, false]),
        ),
        belay_config::SensorCfg::Analog(a) => {
            let input = SimAnalog::new(f64::NAN);
            builder = builder
                .with_analog_input(Box::new(input.clone()))
                .with_primary_extruder(Box::new(plan.extruder()));
            (
                SimSlider::new(a.half_travel),
                SimSensor::Analog {
                    input,
                    expanded_reading: a.expanded_reading,
                    compressed_reading: a.compressed_reading,
                    sample_interval: a.sample_interval,
                    next_sample: 0.0,
                },
            )
        }
    };

    let handle = builder
        .with_sensor(sensor_cfg)
        .with_extruder(extruder, registry)
        .build()?;
    Ok(SimBelay {
        handle,
        slider,
        sensor,
        min_position: 0.0,
        max_position: 0.0,
        at_stop_s: 0.0,
        switch_edges: 0,
    })
}

/// Options for one simulated run.
#[derive(Debug, Clone, Copy, Default)]
pub struct RunOptions {
    pub duration_s: Option<f64>,
    pub json: bool,
    pub quiet: bool,
}

fn emit(json_mode: bool, value: &serde_json::Value, text: impl FnOnce() -> String) {
    if json_mode {
        println!("{value}");
    } else {
        println!("{}", text());
    }
}

/// Run a simulated print and print telemetry along the way.
pub fn run(cfg: &Config, opts: RunOptions) -> eyre::Result<SimSummary> {
    let duration = opts.duration_s.unwrap_or(cfg.simulation.duration_s);
    if !(duration.is_finite() && duration > 0.0) {
        eyre::bail!("simulation duration must be > 0 (got {duration})");
    }
    let mut rig = Rig::new(cfg)?;
    rig.start()?;

    let mut script = cfg.simulation.commands.clone();
    script.sort_by(|a, b| a.at.total_cmp(&b.at));
    let mut script = script.into_iter().peekable();
    let mut command_errors = 0;
    let mut next_report = 1.0;

    while rig.now() + 1e-9 < duration {
        rig.step()?;
        let t = rig.now();

        while let Some(cmd) = script.next_if(|c| c.at <= t + 1e-9) {
            let target = cmd.belay.as_deref().unwrap_or("-");
            match rig.issue(&cmd) {
                Ok(Some(reply)) => emit(
                    opts.json,
                    &json!({ "t": t, "belay": target, "reply": reply }),
                    || format!("t={t:7.2}s {reply}"),
                ),
                Ok(None) => {}
                Err(e) => {
                    command_errors += 1;
                    tracing::warn!(error = %e, at = cmd.at, "scripted command failed");
                    emit(
                        opts.json,
                        &json!({ "t": t, "belay": target, "error": e.to_string() }),
                        || format!("t={t:7.2}s error: {e}"),
                    );
                }
            }
        }

        if t + 1e-9 >= next_report {
            next_report += 1.0;
            if !opts.quiet {
                for line in rig.telemetry() {
                    emit(opts.json, &line, || {
                        format!(
                            "t={:7.2}s belay {}: {} multiplier {:.4} slider {:+.3} mm",
                            line["t"].as_f64().unwrap_or_default(),
                            line["belay"].as_str().unwrap_or_default(),
                            line["state"].as_str().unwrap_or_default(),
                            line["multiplier"].as_f64().unwrap_or_default(),
                            line["slider_mm"].as_f64().unwrap_or_default(),
                        )
                    });
                }
            }
        }
    }

    let summary = rig.summary(command_errors);
    print_summary(&summary, opts.json);
    Ok(summary)
}

fn print_summary(s: &SimSummary, json_mode: bool) {
    if json_mode {
        let belays: Vec<_> = s
            .belays
            .iter()
            .map(|b| {
                json!({
                    "name": b.name,
                    "enabled": b.enabled,
                    "multiplier": b.multiplier,
                    "slider_mm": b.slider_mm,
                    "min_slider_mm": b.min_slider_mm,
                    "max_slider_mm": b.max_slider_mm,
                    "at_stop_s": b.at_stop_s,
                    "switch_edges": b.switch_edges,
                })
            })
            .collect();
        println!(
            "{}",
            json!({
                "summary": {
                    "duration_s": s.duration_s,
                    "extruded_mm": s.extruded_mm,
                    "direction_changes": s.direction_changes,
                    "command_errors": s.command_errors,
                    "belays": belays,
                }
            })
        );
        return;
    }
    println!("--- Belay simulation summary ---");
    println!(
        "Simulated {:.1} s, primary extruded {:.1} mm, {} direction changes, {} command errors",
        s.duration_s, s.extruded_mm, s.direction_changes, s.command_errors
    );
    for b in &s.belays {
        println!(
            "belay {}: {} multiplier {:.4} slider {:+.3} mm (range {:+.3} .. {:+.3}), {:.2} s at a stop, {} switch edges",
            b.name,
            if b.enabled { "enabled" } else { "disabled" },
            b.multiplier,
            b.slider_mm,
            b.min_slider_mm,
            b.max_slider_mm,
            b.at_stop_s,
            b.switch_edges,
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(extra: &str) -> Config {
        let text = format!(
            r#"
            [[belay]]
            name = "s"
            extruder_type = "extruder_stepper"
            extruder_stepper_name = "aux"
            [belay.sensor]
            type = "dual_switch"
            compression_pin = 5
            expansion_pin = 6

            {extra}
            "#
        );
        let cfg = belay_config::load_toml(&text).unwrap();
        cfg.validate().unwrap();
        cfg
    }

    fn quiet(duration_s: f64) -> RunOptions {
        RunOptions {
            duration_s: Some(duration_s),
            json: false,
            quiet: true,
        }
    }

    #[test]
    fn enabled_belay_keeps_the_slider_off_the_stops() {
        let cfg = config("");
        let s = run(&cfg, quiet(60.0)).unwrap();
        let b = &s.belays[0];
        assert!(b.enabled);
        assert_eq!(b.at_stop_s, 0.0, "{b:?}");
        assert!(b.switch_edges > 0);
        assert!(s.direction_changes >= 2, "{s:?}");
    }

    #[test]
    fn locked_out_belay_lets_the_buffer_run_dry() {
        let cfg = config(
            r#"
            [[simulation.commands]]
            at = 0.5
            command = "disable"
            override = true
            "#,
        );
        let s = run(&cfg, quiet(60.0)).unwrap();
        let b = &s.belays[0];
        assert!(!b.enabled);
        assert!(b.at_stop_s > 0.0, "{b:?}");
        assert_eq!(b.min_slider_mm, -SWITCH_HALF_TRAVEL);
    }

    #[test]
    fn failed_commands_are_counted_not_fatal() {
        let cfg = config(
            r#"
            [[simulation.commands]]
            at = 1.0
            command = "continue"
            "#,
        );
        let s = run(&cfg, quiet(2.0)).unwrap();
        assert_eq!(s.command_errors, 1);
    }

    #[test]
    fn retraction_program_goes_back_and_forth() {
        let plan = SimMotionPlan::new();
        let sim = SimulationCfg {
            retract_every_s: 1.0,
            ..SimulationCfg::default()
        };
        let mut program = FeedProgram::new(&sim);
        let mut lowest_step = f64::INFINITY;
        let mut last = 0.0;
        for i in 1..300 {
            let t = f64::from(i) * 0.01;
            program.fill(&plan, t);
            let p = plan.position_at(t);
            lowest_step = lowest_step.min(p - last);
            last = p;
        }
        assert!(lowest_step < 0.0);
        assert!(last > 0.0);
    }
}
