//! One slider sensor paired with one secondary extruder.
//!
//! `Belay` runs the enable/disable state machine and forwards sensor
//! multipliers to the actuator while enabled. Belays are shared with the
//! direction monitor through `BelayHandle`; the monitor only ever holds a
//! weak reference.

use std::cell::{Cell, Ref, RefCell, RefMut};
use std::rc::{Rc, Weak};
use std::sync::Arc;

use belay_traits::{ActuatorRegistry, Clock};

use crate::config::{Multipliers, PositionCalibration};
use crate::direction::DirectionMonitor;
use crate::error::{BelayError, Result};
use crate::extruder::SecondaryExtruder;
use crate::slider::{MultiplierBounds, MultiplierUpdate, SliderSensor};
use crate::status::BelayStatus;

pub struct Belay {
    name: String,
    enabled: bool,
    user_disable: bool,
    debug_level: u8,
    sensor: SliderSensor,
    extruder: SecondaryExtruder,
    clock: Arc<dyn Clock + Send + Sync>,
    multiplier: f64,
    // Bumped on every Enabled -> Disabled transition so a pending
    // calibration started before it can tell it was abandoned.
    generation: u64,
}

impl core::fmt::Debug for Belay {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Belay")
            .field("name", &self.name)
            .field("enabled", &self.enabled)
            .field("user_disable", &self.user_disable)
            .field("sensor", &self.sensor)
            .field("extruder", &self.extruder)
            .field("multiplier", &self.multiplier)
            .finish_non_exhaustive()
    }
}

impl Belay {
    pub(crate) fn new(
        name: String,
        debug_level: u8,
        sensor: SliderSensor,
        extruder: SecondaryExtruder,
        clock: Arc<dyn Clock + Send + Sync>,
    ) -> Self {
        Self {
            name,
            enabled: false,
            user_disable: false,
            debug_level,
            sensor,
            extruder,
            clock,
            multiplier: 1.0,
            generation: 0,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn user_disable(&self) -> bool {
        self.user_disable
    }

    pub fn debug_level(&self) -> u8 {
        self.debug_level
    }

    /// Multiplier most recently applied to the actuator.
    pub fn multiplier(&self) -> f64 {
        self.multiplier
    }

    pub fn sensor(&self) -> &SliderSensor {
        &self.sensor
    }

    pub fn extruder(&self) -> &SecondaryExtruder {
        &self.extruder
    }

    pub(crate) fn generation(&self) -> u64 {
        self.generation
    }

    fn should_announce(&self, announce: bool) -> bool {
        (announce && self.debug_level >= 1) || self.debug_level >= 2
    }

    /// Apply `multiplier` to the secondary extruder. Has no effect while
    /// the belay is disabled.
    pub fn set_multiplier(&mut self, multiplier: f64, announce: bool) -> Result<()> {
        if !self.enabled {
            tracing::trace!(belay = %self.name, multiplier, "ignoring multiplier while disabled");
            return Ok(());
        }
        self.extruder.apply(multiplier)?;
        self.multiplier = multiplier;
        if self.should_announce(announce) {
            tracing::info!(belay = %self.name, multiplier, "Set secondary extruder multiplier: {multiplier:.6}");
        } else {
            tracing::debug!(belay = %self.name, multiplier, "multiplier applied");
        }
        Ok(())
    }

    fn reset_multiplier(&mut self) -> Result<()> {
        self.extruder.apply(1.0)?;
        self.multiplier = 1.0;
        if self.should_announce(true) {
            tracing::info!(belay = %self.name, "Reset secondary extruder multiplier");
        } else {
            tracing::debug!(belay = %self.name, "multiplier reset");
        }
        Ok(())
    }

    fn apply_update(&mut self, update: Option<MultiplierUpdate>) -> Result<()> {
        match update {
            Some(u) => self.set_multiplier(u.multiplier, u.announce),
            None => Ok(()),
        }
    }

    /// Disabled -> Enabled, if the actuator allows it and the operator has
    /// not locked the belay out. A no-op otherwise.
    pub fn enable(&mut self) -> Result<()> {
        if self.enabled || self.user_disable || !self.extruder.enable_conditions_met() {
            return Ok(());
        }
        self.enabled = true;
        let multiplier = self.sensor.on_enable(self.clock.now());
        if let Err(e) = self.set_multiplier(multiplier, true) {
            self.enabled = false;
            self.sensor.on_disable();
            return Err(e);
        }
        tracing::info!(belay = %self.name, "belay enabled");
        Ok(())
    }

    /// Enabled -> Disabled, if the actuator allows it. Restores a unit
    /// multiplier before marking the belay disabled.
    pub fn disable(&mut self) -> Result<()> {
        if !self.enabled || !self.extruder.disable_conditions_met() {
            return Ok(());
        }
        self.reset_multiplier()?;
        self.enabled = false;
        self.sensor.on_disable();
        self.generation += 1;
        tracing::info!(belay = %self.name, "belay disabled");
        Ok(())
    }

    /// Operator enable: clears the lock and fails if the belay did not end
    /// up enabled.
    pub fn cmd_enable(&mut self) -> Result<()> {
        self.user_disable = false;
        self.enable()?;
        if !self.enabled {
            return Err(eyre::Report::new(BelayError::EnableRefused(self.name.clone())));
        }
        Ok(())
    }

    /// Operator disable. With `lock` set, automatic re-enables are
    /// suppressed until the lock is cleared.
    pub fn cmd_disable(&mut self, lock: bool) -> Result<()> {
        if lock {
            self.user_disable = true;
        }
        self.disable()?;
        if self.enabled {
            return Err(eyre::Report::new(BelayError::DisableRefused(self.name.clone())));
        }
        Ok(())
    }

    pub fn clear_override(&mut self) {
        self.user_disable = false;
    }

    /// A digital input changed. `index` selects the switch (0 = compression).
    pub fn handle_switch(&mut self, index: usize, time: f64, state: bool) -> Result<()> {
        tracing::trace!(belay = %self.name, index, time, state, "switch event");
        let update = self.sensor.handle_switch(index, state);
        self.apply_update(update)
    }

    /// A periodic analog sample arrived.
    pub fn handle_sample(&mut self, time: f64, raw: f64) -> Result<()> {
        let update = self.sensor.handle_sample(time, raw);
        self.apply_update(update)
    }

    /// The shared monitor reported a direction reversal.
    pub fn handle_direction(&mut self, direction: bool) -> Result<()> {
        if self.debug_level >= 2 {
            let dir = if direction { "forward" } else { "backward" };
            tracing::info!(belay = %self.name, direction, "Extrusion direction changed: {dir}");
        }
        let update = self.sensor.handle_direction(direction);
        self.apply_update(update)
    }

    /// Route a named host event to the matching transition.
    pub fn handle_event(&mut self, event: &str) -> Result<()> {
        if self.extruder.enable_event() == Some(event) {
            self.enable()
        } else if self.extruder.disable_event() == Some(event) {
            self.disable()
        } else {
            tracing::trace!(belay = %self.name, event, "ignoring unrelated host event");
            Ok(())
        }
    }

    /// Host start-up finished.
    pub fn handle_ready(&mut self) -> Result<()> {
        if self.extruder.enables_at_ready() {
            self.enable()?;
        }
        Ok(())
    }

    /// Replace the multiplier bounds of a switch sensor. When enabled, the
    /// sensor's multiplier is reapplied under the new bounds.
    pub fn set_multipliers(&mut self, bounds: MultiplierBounds) -> Result<Multipliers> {
        let next = match self.sensor.set_multipliers(bounds) {
            Some(res) => res?,
            None => {
                return Err(eyre::Report::new(BelayError::Unsupported {
                    belay: self.name.clone(),
                    what: "analog sensors have no multiplier bounds",
                }));
            }
        };
        let multiplier = self.sensor.multiplier();
        self.set_multiplier(multiplier, true)?;
        Ok(next)
    }

    /// Move the analog setpoint. Returns the setpoint in mm.
    pub fn set_setpoint(&mut self, value: f64, dimensionless: bool) -> Result<f64> {
        let name = self.name.clone();
        let analog = self.sensor.as_analog_mut().ok_or_else(|| {
            eyre::Report::new(BelayError::Unsupported {
                belay: name,
                what: "setpoint requires an analog sensor",
            })
        })?;
        let setpoint = analog.set_setpoint(value, dimensionless)?;
        tracing::info!(belay = %self.name, setpoint, "slider setpoint updated");
        Ok(setpoint)
    }

    /// Bind a different extruder stepper: disable, rebind, then try to
    /// enable again. The new stepper is resolved and validated before
    /// anything changes.
    pub fn set_stepper(&mut self, name: &str, registry: &dyn ActuatorRegistry) -> Result<()> {
        if self.extruder.stepper_name().is_none() {
            return Err(eyre::Report::new(BelayError::Unsupported {
                belay: self.name.clone(),
                what: "stepper selection is only available for extruder_stepper",
            }));
        }
        let stepper = registry.stepper(name).ok_or_else(|| {
            eyre::Report::new(BelayError::InvalidArgument {
                field: "stepper",
                reason: format!("unknown extruder stepper {name}"),
            })
        })?;
        let actuator = self.extruder.prepare_rebind(name, stepper)?;
        self.disable()?;
        if self.enabled {
            return Err(eyre::Report::new(BelayError::DisableRefused(self.name.clone())));
        }
        self.extruder.rebind(actuator);
        tracing::info!(belay = %self.name, stepper = name, "secondary extruder stepper rebound");
        self.enable()
    }

    pub(crate) fn read_raw(&self) -> Option<f64> {
        self.sensor.as_analog().map(|a| a.read_raw())
    }

    pub(crate) fn set_calibration(&mut self, calibration: PositionCalibration) -> Result<()> {
        let analog = self.sensor.as_analog_mut().ok_or_else(|| {
            eyre::Report::new(BelayError::Unsupported {
                belay: self.name.clone(),
                what: "calibration requires an analog sensor",
            })
        })?;
        analog.set_calibration(calibration)
    }

    pub fn status(&self) -> BelayStatus {
        BelayStatus {
            name: self.name.clone(),
            enabled: self.enabled,
            user_disable: self.user_disable,
            state: self.sensor.state_description(),
            position: self.sensor.dimensionless_position(),
            multiplier: self.multiplier,
            direction: self.sensor.direction(),
            sensor: self.sensor.status(),
        }
    }
}

/// Shared handle to a belay living on the event loop thread.
///
/// A reversal that arrives while the belay is borrowed is parked and
/// delivered on the next `borrow_mut`.
#[derive(Clone, Debug)]
pub struct BelayHandle {
    belay: Rc<RefCell<Belay>>,
    pending_direction: Rc<Cell<Option<bool>>>,
}

impl BelayHandle {
    /// Wrap `belay` and subscribe it to direction changes.
    pub fn attach(belay: Belay, monitor: &DirectionMonitor) -> Self {
        let handle = Self {
            belay: Rc::new(RefCell::new(belay)),
            pending_direction: Rc::default(),
        };
        let weak = handle.downgrade();
        let pending = Rc::downgrade(&handle.pending_direction);
        monitor.subscribe(move |direction| {
            let (Some(inner), Some(pending)) = (weak.upgrade(), pending.upgrade()) else {
                return;
            };
            let Ok(mut belay) = inner.try_borrow_mut() else {
                tracing::debug!(direction, "belay busy; direction change deferred");
                pending.set(Some(direction));
                return;
            };
            pending.set(None);
            deliver_direction(&mut belay, direction);
        });
        handle
    }

    pub fn borrow(&self) -> Ref<'_, Belay> {
        self.belay.borrow()
    }

    pub fn borrow_mut(&self) -> RefMut<'_, Belay> {
        let mut belay = self.belay.borrow_mut();
        if let Some(direction) = self.pending_direction.take() {
            deliver_direction(&mut belay, direction);
        }
        belay
    }

    pub fn name(&self) -> String {
        self.belay.borrow().name.clone()
    }

    pub(crate) fn downgrade(&self) -> Weak<RefCell<Belay>> {
        Rc::downgrade(&self.belay)
    }
}

fn deliver_direction(belay: &mut Belay, direction: bool) {
    if let Err(e) = belay.handle_direction(direction) {
        tracing::error!(belay = %belay.name, error = %e, "direction update failed");
    }
}
