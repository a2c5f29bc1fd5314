//! Slider sensors: turn switch states or analog positions into multipliers.
//!
//! Three kinds of hardware are supported, selected by `SliderSensor`'s variant:
//! - a single switch that closes when the slider is compressed,
//! - a pair of switches, one at each end of the travel,
//! - an analog position sensor feeding a PID controller.
//!
//! Switch sensors apply `high` when the slider state agrees with the feed
//! direction (compressed while feeding forward, expanded while retracting)
//! and `low` otherwise.

use belay_traits::{AnalogInput, ExtruderDistance};

use crate::config::{AnalogCfg, Multipliers, PositionCalibration};
use crate::error::{BuildError, Result};
use crate::pid::PidController;
use crate::position::PositionSensor;
use crate::util::samples_per_message;

/// A multiplier the sensor wants applied.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MultiplierUpdate {
    pub multiplier: f64,
    /// Worth a status message at normal verbosity.
    pub announce: bool,
}

/// Optional replacements for the multiplier bounds.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct MultiplierBounds {
    pub high: Option<f64>,
    pub low: Option<f64>,
    pub mid: Option<f64>,
}

/// Sensor-specific part of the status snapshot.
#[derive(Debug, Clone, PartialEq)]
pub enum SensorStatus {
    SingleSwitch {
        last_state: bool,
    },
    DualSwitch {
        compression: bool,
        expansion: bool,
    },
    Analog {
        position: f64,
        raw: f64,
        offset: f64,
        setpoint: f64,
    },
}

/// Multiplier law shared by both switch sensors.
#[inline]
pub fn switch_multiplier(compressed: bool, direction: bool, m: &Multipliers) -> f64 {
    if compressed == direction {
        // compressed/forward or expanded/backward
        m.high
    } else {
        // compressed/backward or expanded/forward
        m.low
    }
}

fn validate_multipliers(m: &Multipliers) -> Result<()> {
    if !(m.high.is_finite() && m.high >= 1.0) {
        return Err(BuildError::invalid("multiplier.high", "must be >= 1.0"));
    }
    if !(m.low > 0.0 && m.low <= 1.0) {
        return Err(BuildError::invalid("multiplier.low", "must be in (0.0, 1.0]"));
    }
    if !(m.low <= m.mid && m.mid <= m.high) {
        return Err(BuildError::invalid(
            "multiplier.mid",
            "must be in [multiplier.low, multiplier.high]",
        ));
    }
    Ok(())
}

/// Apply `bounds` on top of `current`, validating the combined result.
fn merged_multipliers(current: &Multipliers, bounds: MultiplierBounds) -> Result<Multipliers> {
    let next = Multipliers {
        high: bounds.high.unwrap_or(current.high),
        low: bounds.low.unwrap_or(current.low),
        mid: bounds.mid.unwrap_or(current.mid),
    };
    validate_multipliers(&next)?;
    Ok(next)
}

#[derive(Debug, Clone)]
pub struct SingleSwitchSensor {
    multipliers: Multipliers,
    state: bool,
    direction: bool,
}

impl SingleSwitchSensor {
    pub fn new(multipliers: Multipliers) -> Result<Self> {
        validate_multipliers(&multipliers)?;
        Ok(Self {
            multipliers,
            state: false,
            direction: true,
        })
    }

    pub fn multiplier(&self) -> f64 {
        switch_multiplier(self.state, self.direction, &self.multipliers)
    }

    pub fn state(&self) -> bool {
        self.state
    }

    pub fn multipliers(&self) -> Multipliers {
        self.multipliers
    }
}

#[derive(Debug, Clone)]
pub struct DualSwitchSensor {
    multipliers: Multipliers,
    compression: bool,
    expansion: bool,
    direction: bool,
}

impl DualSwitchSensor {
    pub fn new(multipliers: Multipliers) -> Result<Self> {
        validate_multipliers(&multipliers)?;
        Ok(Self {
            multipliers,
            compression: false,
            expansion: false,
            direction: true,
        })
    }

    /// Both switches agree: the slider sits in the neutral zone.
    pub fn is_neutral(&self) -> bool {
        self.compression == self.expansion
    }

    pub fn multiplier(&self) -> f64 {
        if self.is_neutral() {
            self.multipliers.mid
        } else {
            switch_multiplier(self.compression, self.direction, &self.multipliers)
        }
    }

    pub fn multipliers(&self) -> Multipliers {
        self.multipliers
    }
}

/// Continuous slider position fed through a PID controller.
pub struct AnalogSliderSensor {
    position_sensor: PositionSensor,
    pid: PidController,
    input: Box<dyn AnalogInput>,
    extruder: Box<dyn ExtruderDistance>,
    sample_interval: f64,
    message_every: u32,
    samples_since_message: u32,
    active: bool,
    direction: bool,
    raw: f64,
    position: f64,
    offset: f64,
}

impl core::fmt::Debug for AnalogSliderSensor {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("AnalogSliderSensor")
            .field("position", &self.position)
            .field("offset", &self.offset)
            .field("active", &self.active)
            .field("direction", &self.direction)
            .finish()
    }
}

impl AnalogSliderSensor {
    pub fn new(
        cfg: &AnalogCfg,
        input: Box<dyn AnalogInput>,
        extruder: Box<dyn ExtruderDistance>,
    ) -> Result<Self> {
        if !(cfg.sample_interval.is_finite() && cfg.sample_interval > 0.0) {
            return Err(BuildError::invalid("sensor.sample_interval", "must be > 0"));
        }
        if !(cfg.message_interval.is_finite() && cfg.message_interval >= 0.0) {
            return Err(BuildError::invalid("sensor.message_interval", "must be >= 0"));
        }
        if !(cfg.pid.limit < 1.0) {
            return Err(BuildError::invalid("pid.limit", "must be < 1.0"));
        }
        let position_sensor = PositionSensor::new(cfg.half_travel, cfg.calibration)?;
        if cfg.pid.setpoint.abs() > cfg.half_travel {
            return Err(BuildError::invalid(
                "pid.setpoint",
                "must be within the slider travel",
            ));
        }
        let pid = PidController::new(&cfg.pid)?;
        Ok(Self {
            position_sensor,
            pid,
            input,
            extruder,
            sample_interval: cfg.sample_interval,
            message_every: samples_per_message(cfg.message_interval, cfg.sample_interval),
            samples_since_message: 0,
            active: false,
            direction: true,
            raw: f64::NAN,
            position: 0.0,
            offset: 0.0,
        })
    }

    /// Multiplier for the current offset and feed direction.
    pub fn multiplier(&self) -> f64 {
        if self.direction {
            1.0 - self.offset
        } else {
            1.0 + self.offset
        }
    }

    fn on_sample(&mut self, time: f64, raw: f64) -> Option<MultiplierUpdate> {
        self.raw = raw;
        self.position = self.position_sensor.position(raw);
        if !self.active {
            return None;
        }
        let distance = self.extruder.distance_at(time);
        self.offset = self.pid.update(self.position, distance);
        self.samples_since_message += 1;
        let announce = self.samples_since_message >= self.message_every;
        if announce {
            self.samples_since_message = 0;
        }
        Some(MultiplierUpdate {
            multiplier: self.multiplier(),
            announce,
        })
    }

    fn on_enable(&mut self, now: f64) {
        let raw = self.input.last_reading();
        if raw.is_finite() {
            self.raw = raw;
            self.position = self.position_sensor.position(raw);
        }
        let distance = self.extruder.distance_at(now);
        self.pid.reset(self.position, distance);
        self.offset = 0.0;
        self.samples_since_message = 0;
        self.active = true;
        tracing::debug!(position = self.position, distance, "analog slider: controller reset");
    }

    fn on_disable(&mut self) {
        self.active = false;
        self.offset = 0.0;
    }

    /// Latest raw reading straight from the input.
    pub fn read_raw(&self) -> f64 {
        self.input.last_reading()
    }

    pub fn position(&self) -> f64 {
        self.position
    }

    pub fn offset(&self) -> f64 {
        self.offset
    }

    pub fn half_travel(&self) -> f64 {
        self.position_sensor.half_travel()
    }

    pub fn sample_interval(&self) -> f64 {
        self.sample_interval
    }

    pub fn samples_per_message(&self) -> u32 {
        self.message_every
    }

    pub fn calibration(&self) -> PositionCalibration {
        self.position_sensor.calibration()
    }

    pub fn set_calibration(&mut self, calibration: PositionCalibration) -> Result<()> {
        self.position_sensor.set_calibration(calibration)?;
        if self.raw.is_finite() {
            self.position = self.position_sensor.position(self.raw);
        }
        Ok(())
    }

    pub fn pid(&self) -> &PidController {
        &self.pid
    }

    /// Set the target position in mm, or as a fraction of the half travel.
    pub fn set_setpoint(&mut self, value: f64, dimensionless: bool) -> Result<f64> {
        let half = self.position_sensor.half_travel();
        let setpoint = if dimensionless { value * half } else { value };
        if !setpoint.is_finite() || setpoint.abs() > half {
            return Err(eyre::Report::new(crate::error::BelayError::InvalidArgument {
                field: "setpoint",
                reason: format!("{value} is outside the slider travel"),
            }));
        }
        self.pid.set_setpoint(setpoint);
        Ok(setpoint)
    }
}

/// A slider sensor of any supported kind.
#[derive(Debug)]
pub enum SliderSensor {
    SingleSwitch(SingleSwitchSensor),
    DualSwitch(DualSwitchSensor),
    Analog(AnalogSliderSensor),
}

impl SliderSensor {
    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::SingleSwitch(_) => "single_switch",
            Self::DualSwitch(_) => "dual_switch",
            Self::Analog(_) => "analog",
        }
    }

    /// Multiplier the sensor currently asks for.
    pub fn multiplier(&self) -> f64 {
        match self {
            Self::SingleSwitch(s) => s.multiplier(),
            Self::DualSwitch(s) => s.multiplier(),
            Self::Analog(s) => s.multiplier(),
        }
    }

    /// A switch changed state. Index 0 is the (compression) switch, index 1
    /// the expansion switch of a dual-switch sensor.
    pub fn handle_switch(&mut self, index: usize, state: bool) -> Option<MultiplierUpdate> {
        match self {
            Self::SingleSwitch(s) if index == 0 => s.state = state,
            Self::DualSwitch(s) if index == 0 => s.compression = state,
            Self::DualSwitch(s) if index == 1 => s.expansion = state,
            _ => {
                tracing::warn!(kind = self.kind_name(), index, "ignoring unexpected switch event");
                return None;
            }
        }
        Some(MultiplierUpdate {
            multiplier: self.multiplier(),
            announce: true,
        })
    }

    /// A new analog sample arrived; only meaningful for the analog sensor.
    pub fn handle_sample(&mut self, time: f64, raw: f64) -> Option<MultiplierUpdate> {
        match self {
            Self::Analog(s) => s.on_sample(time, raw),
            _ => None,
        }
    }

    /// The net extrusion direction reversed.
    ///
    /// Switch sensors recompute from their last state. The analog sensor
    /// keeps the magnitude of its last offset and only flips its sign.
    pub fn handle_direction(&mut self, direction: bool) -> Option<MultiplierUpdate> {
        match self {
            Self::SingleSwitch(s) => s.direction = direction,
            Self::DualSwitch(s) => s.direction = direction,
            Self::Analog(s) => {
                s.direction = direction;
                if !s.active {
                    return None;
                }
            }
        }
        Some(MultiplierUpdate {
            multiplier: self.multiplier(),
            announce: false,
        })
    }

    /// Called on the Disabled -> Enabled transition; returns the multiplier to apply.
    pub fn on_enable(&mut self, now: f64) -> f64 {
        if let Self::Analog(s) = self {
            s.on_enable(now);
        }
        self.multiplier()
    }

    pub fn on_disable(&mut self) {
        if let Self::Analog(s) = self {
            s.on_disable();
        }
    }

    pub fn direction(&self) -> bool {
        match self {
            Self::SingleSwitch(s) => s.direction,
            Self::DualSwitch(s) => s.direction,
            Self::Analog(s) => s.direction,
        }
    }

    pub fn state_description(&self) -> String {
        match self {
            Self::SingleSwitch(s) => {
                let state = if s.state { "compressed" } else { "expanded" };
                state.to_string()
            }
            Self::DualSwitch(s) => match (s.compression, s.expansion) {
                (true, false) => "compressed".to_string(),
                (false, true) => "expanded".to_string(),
                _ => "neutral".to_string(),
            },
            Self::Analog(s) => format!("position {:.3} mm", s.position),
        }
    }

    /// Slider position scaled to `[-1, 1]` (-1 expanded, 1 compressed).
    pub fn dimensionless_position(&self) -> f64 {
        match self {
            Self::SingleSwitch(s) => {
                if s.state {
                    1.0
                } else {
                    -1.0
                }
            }
            Self::DualSwitch(s) => match (s.compression, s.expansion) {
                (true, false) => 1.0,
                (false, true) => -1.0,
                _ => 0.0,
            },
            Self::Analog(s) => s.position / s.half_travel(),
        }
    }

    pub fn status(&self) -> SensorStatus {
        match self {
            Self::SingleSwitch(s) => SensorStatus::SingleSwitch {
                last_state: s.state,
            },
            Self::DualSwitch(s) => SensorStatus::DualSwitch {
                compression: s.compression,
                expansion: s.expansion,
            },
            Self::Analog(s) => SensorStatus::Analog {
                position: s.position,
                raw: s.raw,
                offset: s.offset,
                setpoint: s.pid.setpoint(),
            },
        }
    }

    /// Replace some of the multiplier bounds. Returns `None` for sensors
    /// that have no bounds (the analog sensor).
    pub fn set_multipliers(&mut self, bounds: MultiplierBounds) -> Option<Result<Multipliers>> {
        let current = match self {
            Self::SingleSwitch(s) => &mut s.multipliers,
            Self::DualSwitch(s) => &mut s.multipliers,
            Self::Analog(_) => return None,
        };
        Some(merged_multipliers(current, bounds).map(|next| {
            *current = next;
            next
        }))
    }

    pub fn as_analog(&self) -> Option<&AnalogSliderSensor> {
        match self {
            Self::Analog(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_analog_mut(&mut self) -> Option<&mut AnalogSliderSensor> {
        match self {
            Self::Analog(s) => Some(s),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    const M: Multipliers = Multipliers {
        high: 1.05,
        low: 0.95,
        mid: 1.0,
    };

    #[rstest]
    #[case(true, true, 1.05)]
    #[case(false, false, 1.05)]
    #[case(true, false, 0.95)]
    #[case(false, true, 0.95)]
    fn single_switch_law(#[case] state: bool, #[case] direction: bool, #[case] expected: f64) {
        assert_eq!(switch_multiplier(state, direction, &M), expected);
    }

    #[test]
    fn single_switch_scenario() {
        let mut s = SliderSensor::SingleSwitch(SingleSwitchSensor::new(M).unwrap());
        let up = s.handle_switch(0, true).expect("switch update");
        assert_eq!(up.multiplier, 1.05);
        assert!(up.announce);
        assert_eq!(s.handle_switch(0, false).unwrap().multiplier, 0.95);
        let up = s.handle_direction(false).expect("direction update");
        assert_eq!(up.multiplier, 1.05);
        assert!(!up.announce);
    }

    #[rstest]
    #[case(false, false, true, 1.0)]
    #[case(true, true, true, 1.0)]
    #[case(true, false, true, 1.05)]
    #[case(true, false, false, 0.95)]
    #[case(false, true, true, 0.95)]
    #[case(false, true, false, 1.05)]
    fn dual_switch_zones(
        #[case] compression: bool,
        #[case] expansion: bool,
        #[case] direction: bool,
        #[case] expected: f64,
    ) {
        let mut s = SliderSensor::DualSwitch(DualSwitchSensor::new(M).unwrap());
        s.handle_direction(direction);
        s.handle_switch(0, compression);
        let up = s.handle_switch(1, expansion).unwrap();
        assert_eq!(up.multiplier, expected);
    }

    #[test]
    fn rejects_mid_outside_bounds() {
        let err = DualSwitchSensor::new(Multipliers { mid: 0.9, ..M }).expect_err("mid < low");
        assert!(err.to_string().contains("multiplier.mid"));
    }

    #[test]
    fn unexpected_switch_index_is_ignored() {
        let mut s = SliderSensor::SingleSwitch(SingleSwitchSensor::new(M).unwrap());
        assert!(s.handle_switch(1, true).is_none());
        assert_eq!(s.state_description(), "expanded");
    }

    #[test]
    fn set_multipliers_validates_combined_bounds() {
        let mut s = SliderSensor::SingleSwitch(SingleSwitchSensor::new(M).unwrap());
        let err = s
            .set_multipliers(MultiplierBounds {
                low: Some(1.2),
                ..Default::default()
            })
            .unwrap()
            .expect_err("low > 1");
        assert!(err.to_string().contains("multiplier.low"));
        let next = s
            .set_multipliers(MultiplierBounds {
                high: Some(1.1),
                ..Default::default()
            })
            .unwrap()
            .unwrap();
        assert_eq!(next.high, 1.1);
        assert_eq!(next.low, 0.95);
    }

    fn analog(message_interval: f64) -> (SliderSensor, crate::mocks::MockExtruder) {
        use crate::mocks::{MockAnalog, MockExtruder};
        let extruder = MockExtruder::default();
        let cfg = AnalogCfg {
            sample_interval: 0.05,
            message_interval,
            ..Default::default()
        };
        let sensor = AnalogSliderSensor::new(
            &cfg,
            Box::new(MockAnalog::new(0.5)),
            Box::new(extruder.clone()),
        )
        .unwrap();
        (SliderSensor::Analog(sensor), extruder)
    }

    #[test]
    fn analog_messages_every_nth_sample() {
        let (mut s, extruder) = analog(0.2);
        // nothing while inactive
        assert!(s.handle_sample(0.0, 0.5).is_none());
        s.on_enable(0.0);

        let mut announced = Vec::new();
        for i in 1..=12 {
            extruder.set(f64::from(i));
            let up = s.handle_sample(f64::from(i) * 0.05, 0.6).expect("active sample");
            announced.push(up.announce);
        }
        let every_fourth: Vec<bool> = (1..=12).map(|i| i % 4 == 0).collect();
        assert_eq!(announced, every_fourth);
    }

    #[test]
    fn analog_message_counter_restarts_on_enable() {
        let (mut s, _) = analog(0.2);
        s.on_enable(0.0);
        for i in 1..=3 {
            assert!(!s.handle_sample(f64::from(i) * 0.05, 0.5).unwrap().announce);
        }
        s.on_disable();
        s.on_enable(1.0);
        for i in 1..=3 {
            assert!(!s.handle_sample(1.0 + f64::from(i) * 0.05, 0.5).unwrap().announce);
        }
        assert!(s.handle_sample(1.2, 0.5).unwrap().announce);
    }

    #[test]
    fn zero_message_interval_announces_every_sample() {
        let (mut s, _) = analog(0.0);
        s.on_enable(0.0);
        for i in 1..=3 {
            assert!(s.handle_sample(f64::from(i) * 0.05, 0.5).unwrap().announce);
        }
    }
}
