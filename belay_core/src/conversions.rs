//! `From`/`TryFrom` implementations bridging `belay_config` types to `belay_core` types.

use crate::commands::{Action, Command};
use crate::config::{AnalogCfg, ExtruderCfg, Multipliers, PidCfg, PositionCalibration, SensorCfg};
use crate::error::BuildError;
use crate::slider::MultiplierBounds;

// ── Multipliers ──────────────────────────────────────────────────────────────

impl From<&belay_config::MultiplierCfg> for Multipliers {
    fn from(c: &belay_config::MultiplierCfg) -> Self {
        Self {
            high: c.high,
            low: c.low,
            mid: c.mid,
        }
    }
}

// ── PidCfg ───────────────────────────────────────────────────────────────────

impl From<&belay_config::PidCfg> for PidCfg {
    fn from(c: &belay_config::PidCfg) -> Self {
        Self {
            kp: c.kp,
            ki: c.ki,
            kd: c.kd,
            tt: c.tt,
            limit: c.max_offset,
            setpoint: c.setpoint,
        }
    }
}

// ── AnalogCfg ────────────────────────────────────────────────────────────────

impl From<&belay_config::AnalogCfg> for AnalogCfg {
    fn from(c: &belay_config::AnalogCfg) -> Self {
        Self {
            sample_interval: c.sample_interval,
            message_interval: c.message_interval,
            half_travel: c.half_travel,
            calibration: PositionCalibration {
                expanded_reading: c.expanded_reading,
                compressed_reading: c.compressed_reading,
            },
            pid: PidCfg::from(&c.pid),
        }
    }
}

// ── SensorCfg ────────────────────────────────────────────────────────────────

impl From<&belay_config::BelayCfg> for SensorCfg {
    fn from(c: &belay_config::BelayCfg) -> Self {
        let multipliers = Multipliers::from(&c.multiplier);
        match &c.sensor {
            belay_config::SensorCfg::SingleSwitch { .. } => Self::SingleSwitch { multipliers },
            belay_config::SensorCfg::DualSwitch { .. } => Self::DualSwitch { multipliers },
            belay_config::SensorCfg::Analog(a) => Self::Analog(AnalogCfg::from(a)),
        }
    }
}

// ── ExtruderCfg ──────────────────────────────────────────────────────────────

impl TryFrom<&belay_config::BelayCfg> for ExtruderCfg {
    type Error = BuildError;

    fn try_from(c: &belay_config::BelayCfg) -> Result<Self, Self::Error> {
        match c.extruder_type {
            belay_config::ExtruderType::TradRack => Ok(Self::TradRack),
            belay_config::ExtruderType::ExtruderStepper => match &c.extruder_stepper_name {
                Some(name) if !name.trim().is_empty() => Ok(Self::ExtruderStepper {
                    name: name.clone(),
                }),
                _ => Err(BuildError::InvalidConfig {
                    field: "extruder_stepper_name",
                    reason: "required for extruder_type = \"extruder_stepper\"",
                }),
            },
        }
    }
}

// ── Action ───────────────────────────────────────────────────────────────────

impl From<&belay_config::CommandCfg> for Action {
    fn from(c: &belay_config::CommandCfg) -> Self {
        use belay_config::CommandCfg as C;
        let cmd = match c {
            C::Query => Command::Query,
            C::Enable => Command::Enable,
            C::Disable { override_ } => Command::Disable { lock: *override_ },
            C::ClearOverride => Command::ClearOverride,
            C::SetMultiplier { high, low, mid } => Command::SetMultiplier(MultiplierBounds {
                high: *high,
                low: *low,
                mid: *mid,
            }),
            C::SetSetpoint {
                value,
                dimensionless,
            } => Command::SetSetpoint {
                value: *value,
                dimensionless: *dimensionless,
            },
            C::SetStepper { name } => Command::SetStepper { name: name.clone() },
            C::Calibrate => Command::Calibrate,
            C::Continue => Command::Continue,
            C::Event { name } => return Self::Event(name.clone()),
        };
        Self::Command(cmd)
    }
}
