//! Test and helper mocks for belay_core.
//!
//! Every mock is a cheap handle over shared state so a test can keep one
//! clone for inspection while the belay owns another.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::Rc;

use belay_traits::{
    ActuatorRegistry, AnalogInput, ExtruderDistance, FilamentDriver, FlushCallback, HwResult,
    MotionPlan, QueuedMove, Stepper,
};

/// A stepper that records every rotation distance it is given.
#[derive(Clone)]
pub struct MockStepper {
    distance: Rc<Cell<f64>>,
    history: Rc<RefCell<Vec<f64>>>,
    fail: Rc<Cell<bool>>,
}

impl MockStepper {
    pub fn new(rotation_distance: f64) -> Self {
        Self {
            distance: Rc::new(Cell::new(rotation_distance)),
            history: Rc::default(),
            fail: Rc::default(),
        }
    }

    pub fn history(&self) -> Vec<f64> {
        self.history.borrow().clone()
    }

    /// Make subsequent writes fail.
    pub fn set_failing(&self, fail: bool) {
        self.fail.set(fail);
    }
}

impl Stepper for MockStepper {
    fn rotation_distance(&self) -> f64 {
        self.distance.get()
    }

    fn set_rotation_distance(&mut self, distance: f64) -> HwResult<()> {
        if self.fail.get() {
            return Err(Box::new(std::io::Error::other("mock stepper offline")));
        }
        self.distance.set(distance);
        self.history.borrow_mut().push(distance);
        Ok(())
    }
}

/// A filament driver with a settable sync flag.
#[derive(Clone, Default)]
pub struct MockFilamentDriver {
    synced: Rc<Cell<bool>>,
    applied: Rc<RefCell<Vec<f64>>>,
}

impl MockFilamentDriver {
    pub fn new(synced: bool) -> Self {
        let d = Self::default();
        d.set_synced(synced);
        d
    }

    pub fn set_synced(&self, synced: bool) {
        self.synced.set(synced);
    }

    pub fn applied(&self) -> Vec<f64> {
        self.applied.borrow().clone()
    }
}

impl FilamentDriver for MockFilamentDriver {
    fn set_multiplier(&mut self, multiplier: f64) -> HwResult<()> {
        self.applied.borrow_mut().push(multiplier);
        Ok(())
    }

    fn is_synced(&self) -> bool {
        self.synced.get()
    }
}

#[derive(Clone, Default)]
pub struct MockRegistry {
    driver: Option<MockFilamentDriver>,
    steppers: HashMap<String, MockStepper>,
}

impl MockRegistry {
    pub fn with_driver(mut self, synced: bool) -> Self {
        self.driver = Some(MockFilamentDriver::new(synced));
        self
    }

    pub fn with_stepper(mut self, name: &str, stepper: MockStepper) -> Self {
        self.steppers.insert(name.to_string(), stepper);
        self
    }

    pub fn driver(&self) -> Option<MockFilamentDriver> {
        self.driver.clone()
    }
}

impl ActuatorRegistry for MockRegistry {
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

/// Analog input whose latest reading is set by the test.
#[derive(Clone)]
pub struct MockAnalog(Rc<Cell<f64>>);

impl MockAnalog {
    pub fn new(reading: f64) -> Self {
        Self(Rc::new(Cell::new(reading)))
    }

    pub fn set(&self, reading: f64) {
        self.0.set(reading);
    }
}

impl AnalogInput for MockAnalog {
    fn last_reading(&self) -> f64 {
        self.0.get()
    }
}

/// Primary extruder distance that ignores the query time.
#[derive(Clone, Default)]
pub struct MockExtruder(Rc<Cell<f64>>);

impl MockExtruder {
    pub fn set(&self, distance: f64) {
        self.0.set(distance);
    }
}

impl ExtruderDistance for MockExtruder {
    fn distance_at(&self, _time: f64) -> f64 {
        self.0.get()
    }
}

/// Motion plan holding at most one queued move; `flush` commits it.
#[derive(Default)]
pub struct MockPlan {
    queued: Option<f64>,
    callbacks: Vec<FlushCallback>,
}

impl MockPlan {
    pub fn queue(&mut self, extruder_end: f64) {
        self.queued = Some(extruder_end);
    }

    pub fn pending_callbacks(&self) -> usize {
        self.callbacks.len()
    }

    /// Commit the queued move and run its flush callbacks.
    pub fn flush(&mut self) {
        let Some(end) = self.queued.take() else {
            return;
        };
        for cb in std::mem::take(&mut self.callbacks) {
            cb(end);
        }
    }
}

impl MotionPlan for MockPlan {
    fn last_queued_move(&self) -> Option<QueuedMove> {
        self.queued.map(|extruder_end| QueuedMove { extruder_end })
    }

    fn register_flush_callback(&mut self, callback: FlushCallback) {
        self.callbacks.push(callback);
    }
}
