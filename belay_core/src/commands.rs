//! Operator commands.
//!
//! `BelaySystem` owns the shared direction monitor, every belay handle and
//! the system-wide calibration sequencer. Commands target one belay by name
//! (or the first one when no name is given), except `Continue`, which
//! advances whatever sequence is pending.

use belay_traits::{ActuatorRegistry, MotionPlan};

use crate::belay::BelayHandle;
use crate::calibration::{SequenceProgress, Sequencer};
use crate::direction::DirectionMonitor;
use crate::error::{BelayError, Result};
use crate::slider::MultiplierBounds;
use crate::status::BelayStatus;

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Query,
    Enable,
    /// `lock` also sets the operator lock that blocks automatic re-enables.
    Disable { lock: bool },
    ClearOverride,
    SetMultiplier(MultiplierBounds),
    SetSetpoint { value: f64, dimensionless: bool },
    SetStepper { name: String },
    Calibrate,
    Continue,
}

impl Command {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Query => "QUERY_BELAY",
            Self::Enable => "ENABLE_BELAY",
            Self::Disable { .. } => "DISABLE_BELAY",
            Self::ClearOverride => "BELAY_CLEAR_OVERRIDE",
            Self::SetMultiplier(_) => "BELAY_SET_MULTIPLIER",
            Self::SetSetpoint { .. } => "BELAY_SET_SETPOINT",
            Self::SetStepper { .. } => "BELAY_SET_STEPPER",
            Self::Calibrate => "BELAY_CALIBRATE",
            Self::Continue => "BELAY_CONTINUE",
        }
    }
}

/// Something that can happen to the system from outside: an operator
/// command or a named host event.
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    Command(Command),
    Event(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    Query { summary: String, position: f64 },
    Message(String),
}

impl core::fmt::Display for Reply {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Query { summary, position } => write!(f, "{summary} (position {position:.3})"),
            Self::Message(m) => f.write_str(m),
        }
    }
}

#[derive(Debug)]
pub struct BelaySystem {
    monitor: DirectionMonitor,
    belays: Vec<BelayHandle>,
    sequencer: Sequencer,
}

impl BelaySystem {
    pub fn new(monitor: DirectionMonitor) -> Self {
        Self {
            monitor,
            belays: Vec::new(),
            sequencer: Sequencer::new(),
        }
    }

    pub fn monitor(&self) -> &DirectionMonitor {
        &self.monitor
    }

    pub fn add(&mut self, belay: BelayHandle) {
        self.belays.push(belay);
    }

    pub fn belays(&self) -> &[BelayHandle] {
        &self.belays
    }

    pub fn sequencer(&self) -> &Sequencer {
        &self.sequencer
    }

    /// Look a belay up by name; `None` selects the first one.
    pub fn belay(&self, name: Option<&str>) -> Result<&BelayHandle> {
        let found = match name {
            Some(n) => self.belays.iter().find(|b| b.borrow().name() == n),
            None => self.belays.first(),
        };
        found.ok_or_else(|| {
            eyre::Report::new(BelayError::UnknownBelay(
                name.unwrap_or_default().to_string(),
            ))
        })
    }

    /// Direction monitor timer callback.
    pub fn tick(&self, eventtime: f64, plan: &mut dyn MotionPlan) -> f64 {
        self.monitor.tick(eventtime, plan)
    }

    /// Host start-up finished.
    pub fn handle_ready(&self) -> Result<()> {
        for b in &self.belays {
            b.borrow_mut().handle_ready()?;
        }
        Ok(())
    }

    /// Broadcast a named host event to every belay.
    pub fn handle_event(&self, event: &str) -> Result<()> {
        for b in &self.belays {
            b.borrow_mut().handle_event(event)?;
        }
        Ok(())
    }

    pub fn status(&self) -> Vec<BelayStatus> {
        self.belays.iter().map(|b| b.borrow().status()).collect()
    }

    pub fn perform(
        &mut self,
        target: Option<&str>,
        action: &Action,
        registry: &dyn ActuatorRegistry,
    ) -> Result<Option<Reply>> {
        match action {
            Action::Command(cmd) => self.execute(target, cmd, registry).map(Some),
            Action::Event(name) => {
                self.handle_event(name)?;
                Ok(None)
            }
        }
    }

    fn continue_sequence(&mut self) -> Result<Reply> {
        Ok(match self.sequencer.continue_pending()? {
            SequenceProgress::Prompt(p) => Reply::Message(p),
            SequenceProgress::Done(c) => Reply::Message(format!(
                "calibration complete: expanded_reading = {:.6}, compressed_reading = {:.6}",
                c.expanded_reading, c.compressed_reading
            )),
        })
    }

    /// Run one operator command.
    pub fn execute(
        &mut self,
        target: Option<&str>,
        cmd: &Command,
        registry: &dyn ActuatorRegistry,
    ) -> Result<Reply> {
        tracing::debug!(command = cmd.name(), target, "operator command");
        let reply = match cmd {
            Command::Continue => self.continue_sequence()?,
            Command::Calibrate => {
                let handle = self.belay(target)?.clone();
                Reply::Message(self.sequencer.start_calibration(&handle)?)
            }
            Command::Query => {
                let status = self.belay(target)?.borrow().status();
                Reply::Query {
                    summary: status.summary(),
                    position: status.position,
                }
            }
            Command::Enable => {
                let mut belay = self.belay(target)?.borrow_mut();
                belay.cmd_enable()?;
                Reply::Message(format!("belay {} enabled", belay.name()))
            }
            Command::Disable { lock } => {
                let mut belay = self.belay(target)?.borrow_mut();
                belay.cmd_disable(*lock)?;
                Reply::Message(format!("belay {} disabled", belay.name()))
            }
            Command::ClearOverride => {
                let mut belay = self.belay(target)?.borrow_mut();
                belay.clear_override();
                Reply::Message(format!("belay {}: override cleared", belay.name()))
            }
            Command::SetMultiplier(bounds) => {
                let mut belay = self.belay(target)?.borrow_mut();
                let m = belay.set_multipliers(*bounds)?;
                Reply::Message(format!(
                    "belay {}: multiplier_high = {}, multiplier_low = {}, multiplier_mid = {}",
                    belay.name(),
                    m.high,
                    m.low,
                    m.mid
                ))
            }
            Command::SetSetpoint {
                value,
                dimensionless,
            } => {
                let mut belay = self.belay(target)?.borrow_mut();
                let sp = belay.set_setpoint(*value, *dimensionless)?;
                Reply::Message(format!("belay {}: setpoint = {sp:.3} mm", belay.name()))
            }
            Command::SetStepper { name } => {
                let mut belay = self.belay(target)?.borrow_mut();
                belay.set_stepper(name, registry)?;
                Reply::Message(format!(
                    "belay {}: extruder stepper set to {name}",
                    belay.name()
                ))
            }
        };
        Ok(reply)
    }
}
