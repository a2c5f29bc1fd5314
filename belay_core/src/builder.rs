//! Type-state builder for `Belay`.
//!
//! The sensor and the secondary extruder are mandatory; `build()` is only
//! available once both are set. `try_build()` works in any state and reports
//! the first missing piece as a `BuildError`.

use std::marker::PhantomData;
use std::sync::Arc;

use belay_traits::{ActuatorRegistry, AnalogInput, Clock, ExtruderDistance, MonotonicClock};

use crate::belay::{Belay, BelayHandle};
use crate::config::{ExtruderCfg, SensorCfg};
use crate::direction::DirectionMonitor;
use crate::error::{BuildError, Result};
use crate::extruder::SecondaryExtruder;
use crate::slider::{AnalogSliderSensor, DualSwitchSensor, SingleSwitchSensor, SliderSensor};

// Type-state markers for the builder
pub struct Missing;
pub struct Set;

pub struct BelayBuilder<S, E> {
    name: String,
    debug_level: u8,
    sensor: Option<SensorCfg>,
    // Resolved eagerly; a lookup failure is reported by build().
    extruder: Option<Result<SecondaryExtruder>>,
    analog_input: Option<Box<dyn AnalogInput>>,
    primary: Option<Box<dyn ExtruderDistance>>,
    monitor: Option<DirectionMonitor>,
    clock: Option<Box<dyn Clock + Send + Sync>>,
    _s: PhantomData<S>,
    _e: PhantomData<E>,
}

impl BelayBuilder<Missing, Missing> {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            debug_level: 0,
            sensor: None,
            extruder: None,
            analog_input: None,
            primary: None,
            monitor: None,
            clock: None,
            _s: PhantomData,
            _e: PhantomData,
        }
    }
}

impl<S, E> BelayBuilder<S, E> {
    fn retag<S2, E2>(self) -> BelayBuilder<S2, E2> {
        BelayBuilder {
            name: self.name,
            debug_level: self.debug_level,
            sensor: self.sensor,
            extruder: self.extruder,
            analog_input: self.analog_input,
            primary: self.primary,
            monitor: self.monitor,
            clock: self.clock,
            _s: PhantomData,
            _e: PhantomData,
        }
    }

    pub fn with_debug_level(mut self, level: u8) -> Self {
        self.debug_level = level;
        self
    }

    /// Raw reading source for the analog sensor.
    pub fn with_analog_input(mut self, input: Box<dyn AnalogInput>) -> Self {
        self.analog_input = Some(input);
        self
    }

    /// Primary extruder distance used as the analog controller's
    /// integration variable.
    pub fn with_primary_extruder(mut self, primary: Box<dyn ExtruderDistance>) -> Self {
        self.primary = Some(primary);
        self
    }

    pub fn with_monitor(mut self, monitor: DirectionMonitor) -> Self {
        self.monitor = Some(monitor);
        self
    }

    pub fn with_clock(mut self, clock: Box<dyn Clock + Send + Sync>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Build the belay without subscribing it to a direction monitor.
    pub fn build_belay(self) -> Result<Belay> {
        let BelayBuilder {
            name,
            debug_level,
            sensor,
            extruder,
            analog_input,
            primary,
            monitor: _,
            clock,
            _s: _,
            _e: _,
        } = self;

        let sensor_cfg = sensor.ok_or_else(|| eyre::Report::new(BuildError::MissingSensor))?;
        let extruder = extruder.ok_or_else(|| eyre::Report::new(BuildError::MissingExtruder))??;
        if debug_level > 2 {
            return Err(BuildError::invalid("debug_level", "must be in [0, 2]"));
        }

        let sensor = match sensor_cfg {
            SensorCfg::SingleSwitch { multipliers } => {
                SliderSensor::SingleSwitch(SingleSwitchSensor::new(multipliers)?)
            }
            SensorCfg::DualSwitch { multipliers } => {
                SliderSensor::DualSwitch(DualSwitchSensor::new(multipliers)?)
            }
            SensorCfg::Analog(cfg) => {
                let input = analog_input
                    .ok_or_else(|| eyre::Report::new(BuildError::MissingAnalogInput))?;
                let primary =
                    primary.ok_or_else(|| eyre::Report::new(BuildError::MissingPrimaryExtruder))?;
                SliderSensor::Analog(AnalogSliderSensor::new(&cfg, input, primary)?)
            }
        };

        let clock: Arc<dyn Clock + Send + Sync> = match clock {
            Some(b) => Arc::from(b),
            None => Arc::new(MonotonicClock::new()),
        };
        tracing::debug!(
            belay = %name,
            sensor = sensor.kind_name(),
            extruder = extruder.kind_name(),
            "belay configured"
        );
        Ok(Belay::new(name, debug_level, sensor, extruder, clock))
    }

    /// Fallible build available in any type-state.
    pub fn try_build(mut self) -> Result<BelayHandle> {
        let monitor = self
            .monitor
            .take()
            .ok_or_else(|| eyre::Report::new(BuildError::MissingMonitor))?;
        let belay = self.build_belay()?;
        Ok(BelayHandle::attach(belay, &monitor))
    }
}

impl<E> BelayBuilder<Missing, E> {
    pub fn with_sensor(mut self, sensor: SensorCfg) -> BelayBuilder<Set, E> {
        self.sensor = Some(sensor);
        self.retag()
    }
}

impl<S> BelayBuilder<S, Missing> {
    /// Resolve the secondary extruder through `registry`.
    pub fn with_extruder(
        mut self,
        cfg: ExtruderCfg,
        registry: &dyn ActuatorRegistry,
    ) -> BelayBuilder<S, Set> {
        self.extruder = Some(SecondaryExtruder::connect(&cfg, registry));
        self.retag()
    }
}

impl BelayBuilder<Set, Set> {
    /// Build and subscribe to the direction monitor.
    pub fn build(self) -> Result<BelayHandle> {
        self.try_build()
    }
}
