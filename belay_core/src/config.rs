//! Configuration types for the control core.
//!
//! These are the runtime configuration structs used by sensors, the PID
//! controller and the builder. They are separate from the TOML-deserialized
//! config in `belay_config`.

/// Multiplier bounds applied by the digital switch sensors.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Multipliers {
    /// Applied when the slider needs the secondary extruder to speed up.
    pub high: f64,
    /// Applied when the slider needs the secondary extruder to slow down.
    pub low: f64,
    /// Neutral zone multiplier (dual-switch sensor only).
    pub mid: f64,
}

impl Default for Multipliers {
    fn default() -> Self {
        Self {
            high: 1.05,
            low: 0.95,
            mid: 1.0,
        }
    }
}

/// PID gains and limits.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PidCfg {
    pub kp: f64,
    pub ki: f64,
    pub kd: f64,
    /// Anti-windup tracking time constant. `None` derives it from Ti and Td.
    pub tt: Option<f64>,
    /// Output limit; the controller output stays in `[-limit, limit]`.
    pub limit: f64,
    /// Target slider position (mm).
    pub setpoint: f64,
}

impl Default for PidCfg {
    fn default() -> Self {
        Self {
            kp: 0.05,
            ki: 0.005,
            kd: 0.0,
            tt: None,
            limit: 0.1,
            setpoint: 0.0,
        }
    }
}

/// Linear raw-reading calibration of the analog slider.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PositionCalibration {
    /// Raw reading with the slider fully expanded (maps to `-half_travel`).
    pub expanded_reading: f64,
    /// Raw reading with the slider fully compressed (maps to `+half_travel`).
    pub compressed_reading: f64,
}

impl Default for PositionCalibration {
    fn default() -> Self {
        Self {
            expanded_reading: 0.0,
            compressed_reading: 1.0,
        }
    }
}

/// Analog slider sensor configuration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AnalogCfg {
    /// Seconds between samples delivered by the host.
    pub sample_interval: f64,
    /// Seconds between status messages while enabled.
    pub message_interval: f64,
    /// Half of the slider travel (mm).
    pub half_travel: f64,
    pub calibration: PositionCalibration,
    pub pid: PidCfg,
}

impl Default for AnalogCfg {
    fn default() -> Self {
        Self {
            sample_interval: 0.05,
            message_interval: 1.0,
            half_travel: 5.0,
            calibration: PositionCalibration::default(),
            pid: PidCfg::default(),
        }
    }
}

/// Which slider sensor hardware a belay uses.
#[derive(Debug, Clone, PartialEq)]
pub enum SensorCfg {
    SingleSwitch { multipliers: Multipliers },
    DualSwitch { multipliers: Multipliers },
    Analog(AnalogCfg),
}

/// Which secondary extruder a belay drives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExtruderCfg {
    TradRack,
    ExtruderStepper { name: String },
}
