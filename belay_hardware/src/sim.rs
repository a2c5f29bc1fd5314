//! Simulated printer collaborators.
//!
//! A motion plan with a lookahead queue, the primary extruder reading back
//! from it, secondary actuators and a spring-loaded slider whose position
//! follows the difference between what the two drives feed. Everything is
//! single-threaded and shares state through `Rc` handles, like the host
//! objects it stands in for.
use crate::error::HwError;
use belay_traits::{
    ActuatorRegistry, AnalogInput, ExtruderDistance, FilamentDriver, FlushCallback, HwResult,
    MotionPlan, QueuedMove, Stepper,
};
use std::cell::{Cell, RefCell};
use std::collections::{BTreeMap, VecDeque};
use std::rc::Rc;

/// Committed moves older than this are folded into the base position.
const HISTORY_S: f64 = 5.0;

/// One linear extruder move.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SimMove {
    pub start_time: f64,
    pub end_time: f64,
    pub start_pos: f64,
    pub end_pos: f64,
}

impl SimMove {
    fn position_at(&self, time: f64) -> f64 {
        let span = self.end_time - self.start_time;
        if span <= 0.0 {
            return self.end_pos;
        }
        let frac = ((time - self.start_time) / span).clamp(0.0, 1.0);
        self.start_pos + (self.end_pos - self.start_pos) * frac
    }
}

#[derive(Default)]
struct PlanState {
    base_pos: f64,
    committed: VecDeque<SimMove>,
    pending: VecDeque<(SimMove, Vec<FlushCallback>)>,
    // registered while nothing was queued; run on the next commit
    orphans: Vec<FlushCallback>,
}

impl PlanState {
    fn last_move(&self) -> Option<&SimMove> {
        self.pending
            .back()
            .map(|(m, _)| m)
            .or_else(|| self.committed.back())
    }

    fn end_pos(&self) -> f64 {
        self.last_move().map_or(self.base_pos, |m| m.end_pos)
    }
}

/// Lookahead queue of extruder moves.
///
/// Moves are queued ahead of time and committed once the clock reaches
/// their start. Flush callbacks ride on the move that was last in the queue
/// when they were registered.
#[derive(Clone, Default)]
pub struct SimMotionPlan {
    state: Rc<RefCell<PlanState>>,
}

impl SimMotionPlan {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a move of `delta` mm lasting `duration` seconds. It starts where
    /// the queue ends, or at `not_before` if the queue drained earlier.
    pub fn queue_move(&self, not_before: f64, duration: f64, delta: f64) {
        let mut st = self.state.borrow_mut();
        let start_time = st.last_move().map_or(not_before, |m| m.end_time.max(not_before));
        let start_pos = st.end_pos();
        let mv = SimMove {
            start_time,
            end_time: start_time + duration.max(0.0),
            start_pos,
            end_pos: start_pos + delta,
        };
        st.pending.push_back((mv, Vec::new()));
    }

    /// Time at which the last queued move ends.
    pub fn queued_until(&self) -> f64 {
        self.state.borrow().last_move().map_or(0.0, |m| m.end_time)
    }

    pub fn pending_len(&self) -> usize {
        self.state.borrow().pending.len()
    }

    /// Commit every pending move that starts at or before `time` and run
    /// the callbacks they carry. Returns the number of moves committed.
    pub fn commit_until(&self, time: f64) -> usize {
        let mut fire: Vec<(f64, FlushCallback)> = Vec::new();
        let mut count = 0;
        {
            let mut st = self.state.borrow_mut();
            let end = st.end_pos();
            fire.extend(st.orphans.drain(..).map(|cb| (end, cb)));
            while st.pending.front().is_some_and(|(m, _)| m.start_time <= time) {
                let Some((mv, callbacks)) = st.pending.pop_front() else {
                    break;
                };
                fire.extend(callbacks.into_iter().map(|cb| (mv.end_pos, cb)));
                st.committed.push_back(mv);
                count += 1;
            }
            while st
                .committed
                .front()
                .is_some_and(|m| m.end_time < time - HISTORY_S)
            {
                if let Some(old) = st.committed.pop_front() {
                    st.base_pos = old.end_pos;
                }
            }
        }
        // callbacks may query the plan again
        for (end_pos, cb) in fire {
            cb(end_pos);
        }
        count
    }

    /// Extruder position at `time`, interpolated along queued moves.
    pub fn position_at(&self, time: f64) -> f64 {
        let st = self.state.borrow();
        let mut pos = st.base_pos;
        let moves = st.committed.iter().chain(st.pending.iter().map(|(m, _)| m));
        for m in moves {
            if time < m.start_time {
                break;
            }
            if time < m.end_time {
                return m.position_at(time);
            }
            pos = m.end_pos;
        }
        pos
    }

    /// Read handle for the primary extruder driven by this plan.
    pub fn extruder(&self) -> SimExtruder {
        SimExtruder { plan: self.clone() }
    }
}

impl MotionPlan for SimMotionPlan {
    fn last_queued_move(&self) -> Option<QueuedMove> {
        self.state
            .borrow()
            .pending
            .back()
            .map(|(m, _)| QueuedMove {
                extruder_end: m.end_pos,
            })
    }

    fn register_flush_callback(&mut self, callback: FlushCallback) {
        let mut st = self.state.borrow_mut();
        match st.pending.back_mut() {
            Some((_, callbacks)) => callbacks.push(callback),
            None => st.orphans.push(callback),
        }
    }
}

/// Primary extruder position as seen through the motion plan.
#[derive(Clone)]
pub struct SimExtruder {
    plan: SimMotionPlan,
}

impl ExtruderDistance for SimExtruder {
    fn distance_at(&self, time: f64) -> f64 {
        self.plan.position_at(time)
    }
}

/// Secondary stepper; its speed scales inversely with rotation distance.
#[derive(Clone)]
pub struct SimStepper {
    nominal: f64,
    rotation_distance: Rc<Cell<f64>>,
    updates: Rc<Cell<u64>>,
}

impl SimStepper {
    pub fn new(rotation_distance: f64) -> Self {
        Self {
            nominal: rotation_distance,
            rotation_distance: Rc::new(Cell::new(rotation_distance)),
            updates: Rc::new(Cell::new(0)),
        }
    }

    /// Feed speed relative to the stepper's configured rotation distance.
    pub fn speed_factor(&self) -> f64 {
        self.nominal / self.rotation_distance.get()
    }

    pub fn updates(&self) -> u64 {
        self.updates.get()
    }
}

impl Stepper for SimStepper {
    fn rotation_distance(&self) -> f64 {
        self.rotation_distance.get()
    }

    fn set_rotation_distance(&mut self, distance: f64) -> HwResult<()> {
        if !distance.is_finite() || distance <= 0.0 {
            return Err(Box::new(HwError::InvalidRotationDistance(distance)));
        }
        tracing::trace!(distance, "sim stepper rotation distance");
        self.rotation_distance.set(distance);
        self.updates.set(self.updates.get() + 1);
        Ok(())
    }
}

/// Filament driver that is synced on request.
#[derive(Clone)]
pub struct SimFilamentDriver {
    multiplier: Rc<Cell<f64>>,
    synced: Rc<Cell<bool>>,
}

impl Default for SimFilamentDriver {
    fn default() -> Self {
        Self {
            multiplier: Rc::new(Cell::new(1.0)),
            synced: Rc::new(Cell::new(false)),
        }
    }
}

impl SimFilamentDriver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_synced(&self, synced: bool) {
        self.synced.set(synced);
    }

    pub fn multiplier(&self) -> f64 {
        self.multiplier.get()
    }

    /// Feed speed relative to nominal; an unsynced driver does not feed.
    pub fn speed_factor(&self) -> f64 {
        if self.synced.get() {
            self.multiplier.get()
        } else {
            0.0
        }
    }
}

impl FilamentDriver for SimFilamentDriver {
    fn set_multiplier(&mut self, multiplier: f64) -> HwResult<()> {
        if !multiplier.is_finite() || multiplier <= 0.0 {
            return Err(Box::new(HwError::InvalidMultiplier(multiplier)));
        }
        tracing::trace!(multiplier, "sim filament driver multiplier");
        self.multiplier.set(multiplier);
        Ok(())
    }

    fn is_synced(&self) -> bool {
        self.synced.get()
    }
}

/// Name lookup over the simulated actuators.
#[derive(Clone, Default)]
pub struct SimRegistry {
    driver: Option<SimFilamentDriver>,
    steppers: BTreeMap<String, SimStepper>,
}

impl SimRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_driver(mut self, driver: SimFilamentDriver) -> Self {
        self.driver = Some(driver);
        self
    }

    pub fn with_stepper(mut self, name: impl Into<String>, stepper: SimStepper) -> Self {
        self.steppers.insert(name.into(), stepper);
        self
    }

    pub fn driver(&self) -> Option<&SimFilamentDriver> {
        self.driver.as_ref()
    }

    pub fn stepper_handle(&self, name: &str) -> Option<&SimStepper> {
        self.steppers.get(name)
    }

    pub fn stepper_names(&self) -> impl Iterator<Item = &str> {
        self.steppers.keys().map(String::as_str)
    }
}

impl ActuatorRegistry for SimRegistry {
    fn filament_driver(&self) -> Option<Box<dyn FilamentDriver>> {
        self.driver
            .clone()
            .map(|d| Box::new(d) as Box<dyn FilamentDriver>)
    }

    fn stepper(&self, name: &str) -> Option<Box<dyn Stepper>> {
        self.steppers
            .get(name)
            .cloned()
            .map(|s| Box::new(s) as Box<dyn Stepper>)
    }
}

/// Analog input whose latest conversion is set by the simulation.
#[derive(Clone, Default)]
pub struct SimAnalog {
    reading: Rc<Cell<f64>>,
}

impl SimAnalog {
    pub fn new(reading: f64) -> Self {
        Self {
            reading: Rc::new(Cell::new(reading)),
        }
    }

    pub fn set(&self, reading: f64) {
        self.reading.set(reading);
    }
}

impl AnalogInput for SimAnalog {
    fn last_reading(&self) -> f64 {
        self.reading.get()
    }
}

/// Spring-loaded filament buffer between the two drives.
///
/// Position is in mm from centre; positive is compressed. The buffer
/// compresses when the primary extruder feeds more than the secondary
/// drive delivers.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SimSlider {
    position: f64,
    half_travel: f64,
}

impl SimSlider {
    pub fn new(half_travel: f64) -> Self {
        Self {
            position: 0.0,
            half_travel: half_travel.abs(),
        }
    }

    pub fn position(&self) -> f64 {
        self.position
    }

    pub fn half_travel(&self) -> f64 {
        self.half_travel
    }

    /// Move the slider by what the drives fed since the last step.
    pub fn advance(&mut self, primary_delta: f64, secondary_delta: f64) {
        self.position = (self.position + primary_delta - secondary_delta)
            .clamp(-self.half_travel, self.half_travel);
    }

    /// Single switch, triggered on the compressed half of the travel.
    pub fn single_switch(&self) -> bool {
        self.position > 0.0
    }

    /// `[compression, expansion]` switches, each covering the outer half of
    /// its side.
    pub fn dual_switches(&self) -> [bool; 2] {
        let edge = self.half_travel / 2.0;
        [self.position > edge, self.position < -edge]
    }

    /// Reading of a linear position sensor calibrated between
    /// `expanded_reading` and `compressed_reading`.
    pub fn reading(&self, expanded_reading: f64, compressed_reading: f64) -> f64 {
        if self.half_travel == 0.0 {
            return (expanded_reading + compressed_reading) / 2.0;
        }
        let frac = (self.position + self.half_travel) / (2.0 * self.half_travel);
        expanded_reading + frac * (compressed_reading - expanded_reading)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slider_stops_at_the_ends() {
        let mut s = SimSlider::new(5.0);
        s.advance(20.0, 0.0);
        assert_eq!(s.position(), 5.0);
        assert_eq!(s.dual_switches(), [true, false]);
        s.advance(0.0, 30.0);
        assert_eq!(s.position(), -5.0);
        assert!(!s.single_switch());
        assert_eq!(s.reading(0.2, 0.8), 0.2);
    }

    #[test]
    fn registry_hands_out_shared_handles() {
        let stepper = SimStepper::new(20.0);
        let registry = SimRegistry::new().with_stepper("aux", stepper.clone());
        let mut boxed = registry.stepper("aux").unwrap();
        boxed.set_rotation_distance(10.0).unwrap();
        assert_eq!(stepper.rotation_distance(), 10.0);
        assert_eq!(stepper.speed_factor(), 2.0);
        assert!(registry.stepper("missing").is_none());
        assert!(registry.filament_driver().is_none());
    }

    #[test]
    fn driver_rejects_non_positive_multiplier() {
        let mut d = SimFilamentDriver::new();
        let err = d.set_multiplier(0.0).unwrap_err();
        assert!(err.downcast_ref::<HwError>().is_some());
        assert_eq!(d.multiplier(), 1.0);
    }
}
