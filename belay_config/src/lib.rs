#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]
//! Config schemas for belay extruder syncing.
//!
//! - `Config` and sub-structs are deserialized from TOML and validated.
//! - Every `[[belay]]` table describes one slider sensor paired with one
//!   secondary extruder; `[direction]` tunes the shared direction monitor.
//! - `[simulation]` drives the simulated printer used by the CLI.
use serde::Deserialize;
use std::path::Path;

/// Default polling interval of the extrusion direction monitor (seconds).
pub const DEFAULT_UPDATE_INTERVAL: f64 = 0.1;

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct DirectionCfg {
    /// Seconds between motion-plan polls.
    pub update_interval: f64,
}

impl Default for DirectionCfg {
    fn default() -> Self {
        Self {
            update_interval: DEFAULT_UPDATE_INTERVAL,
        }
    }
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ExtruderType {
    /// Filament driver of a Trad Rack style filament changer.
    TradRack,
    /// A named extruder_stepper.
    ExtruderStepper,
}

#[derive(Debug, Deserialize, Clone, Copy)]
#[serde(default)]
pub struct MultiplierCfg {
    pub high: f64,
    pub low: f64,
    /// Only used by the dual-switch sensor.
    pub mid: f64,
}

impl Default for MultiplierCfg {
    fn default() -> Self {
        Self {
            high: 1.05,
            low: 0.95,
            mid: 1.0,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SensorCfg {
    /// One switch that closes when the slider is compressed.
    SingleSwitch { pin: u8 },
    /// One switch at each end of the slider travel.
    DualSwitch { compression_pin: u8, expansion_pin: u8 },
    /// Continuous position from an analog input.
    Analog(AnalogCfg),
}

#[derive(Debug, Deserialize, Clone)]
pub struct AnalogCfg {
    pub pin: u8,
    /// Seconds between analog samples.
    #[serde(default = "default_sample_interval")]
    pub sample_interval: f64,
    /// Seconds between human-readable status messages while enabled.
    #[serde(default = "default_message_interval")]
    pub message_interval: f64,
    /// Half of the slider travel in mm; positions span `[-half_travel, half_travel]`.
    #[serde(default = "default_half_travel")]
    pub half_travel: f64,
    /// Raw reading with the slider held fully expanded.
    #[serde(default)]
    pub expanded_reading: f64,
    /// Raw reading with the slider held fully compressed.
    #[serde(default = "default_compressed_reading")]
    pub compressed_reading: f64,
    #[serde(default)]
    pub pid: PidCfg,
}

fn default_sample_interval() -> f64 {
    0.05
}
fn default_message_interval() -> f64 {
    1.0
}
fn default_half_travel() -> f64 {
    5.0
}
fn default_compressed_reading() -> f64 {
    1.0
}

#[derive(Debug, Deserialize, Clone, Copy)]
#[serde(default)]
pub struct PidCfg {
    pub kp: f64,
    pub ki: f64,
    pub kd: f64,
    /// Anti-windup tracking time constant; derived from Ti/Td when absent.
    pub tt: Option<f64>,
    /// Largest correction applied either way (multiplier stays in `1 ± max_offset`).
    pub max_offset: f64,
    /// Target slider position in mm.
    pub setpoint: f64,
}

impl Default for PidCfg {
    fn default() -> Self {
        Self {
            kp: 0.05,
            ki: 0.005,
            kd: 0.0,
            tt: None,
            max_offset: 0.1,
            setpoint: 0.0,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct BelayCfg {
    pub name: String,
    pub extruder_type: ExtruderType,
    /// Required when `extruder_type = "extruder_stepper"`.
    #[serde(default)]
    pub extruder_stepper_name: Option<String>,
    /// 0: quiet, 1: multiplier changes, 2: everything including direction changes.
    #[serde(default)]
    pub debug_level: u8,
    #[serde(default)]
    pub multiplier: MultiplierCfg,
    pub sensor: SensorCfg,
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct Logging {
    pub file: Option<String>,  // path to .log (JSON lines)
    pub level: Option<String>, // "info","debug"
    /// Log rotation policy: "never" | "daily" | "hourly" (default: never)
    pub rotation: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct SimulationCfg {
    /// Simulated print length in seconds.
    pub duration_s: f64,
    /// Event loop resolution in seconds.
    pub step_s: f64,
    /// Primary extruder feed rate in mm/s.
    pub feed_rate: f64,
    /// Extrusion length of each queued move in mm.
    pub move_length: f64,
    /// Seconds between retractions; 0 disables them.
    pub retract_every_s: f64,
    /// Retraction length in mm (also unretracted afterwards).
    pub retract_length: f64,
    /// Natural speed of the secondary drive relative to the primary one.
    pub secondary_ratio: f64,
    /// Amplitude of the deterministic ripple added to analog readings.
    pub noise: f64,
    /// Operator commands issued during the run.
    pub commands: Vec<ScheduledCommandCfg>,
}

impl Default for SimulationCfg {
    fn default() -> Self {
        Self {
            duration_s: 30.0,
            step_s: 0.01,
            feed_rate: 4.0,
            move_length: 2.0,
            retract_every_s: 10.0,
            retract_length: 1.5,
            secondary_ratio: 1.03,
            noise: 0.0,
            commands: Vec::new(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ScheduledCommandCfg {
    /// Simulated time at which the command is issued.
    pub at: f64,
    /// Target belay; defaults to the first configured one.
    #[serde(default)]
    pub belay: Option<String>,
    #[serde(flatten)]
    pub command: CommandCfg,
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum CommandCfg {
    Query,
    Enable,
    Disable {
        #[serde(default, rename = "override")]
        override_: bool,
    },
    ClearOverride,
    SetMultiplier {
        #[serde(default)]
        high: Option<f64>,
        #[serde(default)]
        low: Option<f64>,
        #[serde(default)]
        mid: Option<f64>,
    },
    SetSetpoint {
        value: f64,
        #[serde(default)]
        dimensionless: bool,
    },
    SetStepper {
        name: String,
    },
    Calibrate,
    Continue,
    /// Host event such as `trad_rack:synced_to_extruder`.
    Event {
        name: String,
    },
}

#[derive(Debug, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub direction: DirectionCfg,
    #[serde(rename = "belay")]
    pub belays: Vec<BelayCfg>,
    #[serde(default)]
    pub logging: Logging,
    #[serde(default)]
    pub simulation: SimulationCfg,
}

pub fn load_toml(s: &str) -> Result<Config, toml::de::Error> {
    toml::from_str::<Config>(s)
}

/// Read, parse and validate a config file.
pub fn load_file(path: &Path) -> eyre::Result<Config> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| eyre::eyre!("read config {:?}: {}", path, e))?;
    let cfg = load_toml(&text).map_err(|e| eyre::eyre!("parse config {:?}: {}", path, e))?;
    cfg.validate()?;
    Ok(cfg)
}

impl MultiplierCfg {
    /// Range checks shared by the config loader and runtime updates.
    pub fn validate(&self) -> eyre::Result<()> {
        if !self.high.is_finite() || self.high < 1.0 {
            eyre::bail!("multiplier.high must be >= 1.0");
        }
        if !(self.low > 0.0 && self.low <= 1.0) {
            eyre::bail!("multiplier.low must be in (0.0, 1.0]");
        }
        if !(self.low <= self.mid && self.mid <= self.high) {
            eyre::bail!("multiplier.mid must be in [multiplier.low, multiplier.high]");
        }
        Ok(())
    }
}

impl PidCfg {
    pub fn validate(&self) -> eyre::Result<()> {
        if !(self.kp.is_finite() && self.kp > 0.0) {
            eyre::bail!("pid.kp must be > 0");
        }
        if !(self.ki.is_finite() && self.ki >= 0.0) {
            eyre::bail!("pid.ki must be >= 0");
        }
        if !(self.kd.is_finite() && self.kd >= 0.0) {
            eyre::bail!("pid.kd must be >= 0");
        }
        if !(self.max_offset > 0.0 && self.max_offset < 1.0) {
            eyre::bail!("pid.max_offset must be in (0.0, 1.0)");
        }
        if let Some(tt) = self.tt {
            let ti = if self.ki > 0.0 {
                self.kp / self.ki
            } else {
                f64::INFINITY
            };
            let td = self.kd / self.kp;
            if !(tt.is_finite() && tt > 0.0 && td <= tt && tt <= ti) {
                eyre::bail!("pid.tt must satisfy kd/kp <= tt <= kp/ki");
            }
        }
        Ok(())
    }
}

impl AnalogCfg {
    pub fn validate(&self) -> eyre::Result<()> {
        if !(self.sample_interval.is_finite() && self.sample_interval > 0.0) {
            eyre::bail!("sensor.sample_interval must be > 0");
        }
        if !(self.message_interval.is_finite() && self.message_interval >= 0.0) {
            eyre::bail!("sensor.message_interval must be >= 0");
        }
        if !(self.half_travel.is_finite() && self.half_travel > 0.0) {
            eyre::bail!("sensor.half_travel must be > 0");
        }
        if !self.expanded_reading.is_finite() || !self.compressed_reading.is_finite() {
            eyre::bail!("sensor calibration readings must be finite");
        }
        if self.expanded_reading == self.compressed_reading {
            eyre::bail!("sensor.expanded_reading and sensor.compressed_reading must differ");
        }
        self.pid.validate()?;
        if self.pid.setpoint.abs() > self.half_travel {
            eyre::bail!("pid.setpoint must be within [-half_travel, half_travel]");
        }
        Ok(())
    }
}

impl BelayCfg {
    pub fn validate(&self) -> eyre::Result<()> {
        let name = &self.name;
        if name.trim().is_empty() || name.contains(char::is_whitespace) {
            eyre::bail!("belay.name must be a single non-empty word, got {name:?}");
        }
        if self.extruder_type == ExtruderType::ExtruderStepper
            && self
                .extruder_stepper_name
                .as_deref()
                .is_none_or(|s| s.trim().is_empty())
        {
            eyre::bail!(
                "belay {name}: extruder_stepper_name is required for extruder_type = \"extruder_stepper\""
            );
        }
        if self.debug_level > 2 {
            eyre::bail!("belay {name}: debug_level must be in [0, 2]");
        }
        self.multiplier
            .validate()
            .map_err(|e| eyre::eyre!("belay {name}: {e}"))?;
        match &self.sensor {
            SensorCfg::SingleSwitch { .. } => {}
            SensorCfg::DualSwitch {
                compression_pin,
                expansion_pin,
            } => {
                if compression_pin == expansion_pin {
                    eyre::bail!("belay {name}: compression_pin and expansion_pin must differ");
                }
            }
            SensorCfg::Analog(a) => a.validate().map_err(|e| eyre::eyre!("belay {name}: {e}"))?,
        }
        Ok(())
    }
}

impl Config {
    pub fn validate(&self) -> eyre::Result<()> {
        // Direction monitor
        let interval = self.direction.update_interval;
        if !(interval.is_finite() && interval > 0.0) {
            eyre::bail!("direction.update_interval must be > 0");
        }
        if interval > 10.0 {
            eyre::bail!("direction.update_interval is unreasonably large (>10s)");
        }

        // Belays
        if self.belays.is_empty() {
            eyre::bail!("at least one [[belay]] table is required");
        }
        for (i, b) in self.belays.iter().enumerate() {
            b.validate()?;
            if self.belays[..i].iter().any(|o| o.name == b.name) {
                eyre::bail!("duplicate belay name {:?}", b.name);
            }
        }

        // Simulation
        let sim = &self.simulation;
        if !(sim.duration_s.is_finite() && sim.duration_s > 0.0) {
            eyre::bail!("simulation.duration_s must be > 0");
        }
        if !(sim.step_s > 0.0 && sim.step_s <= interval) {
            eyre::bail!("simulation.step_s must be in (0, direction.update_interval]");
        }
        if !(sim.feed_rate.is_finite() && sim.feed_rate > 0.0) {
            eyre::bail!("simulation.feed_rate must be > 0");
        }
        if !(sim.move_length.is_finite() && sim.move_length > 0.0) {
            eyre::bail!("simulation.move_length must be > 0");
        }
        if !(sim.retract_every_s >= 0.0 && sim.retract_length >= 0.0) {
            eyre::bail!("simulation retraction settings must be >= 0");
        }
        if !(sim.secondary_ratio > 0.5 && sim.secondary_ratio < 2.0) {
            eyre::bail!("simulation.secondary_ratio must be in (0.5, 2.0)");
        }
        for c in &sim.commands {
            if let Some(target) = &c.belay
                && !self.belays.iter().any(|b| &b.name == target)
            {
                eyre::bail!("simulation command at {}s targets unknown belay {target:?}", c.at);
            }
        }
        Ok(())
    }
}
