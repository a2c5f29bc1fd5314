//! Two-step interactive calibration of the analog slider.
//!
//! The operator holds the slider fully expanded and sends a continue
//! command, then holds it fully compressed and continues again. Readings are
//! captured at each continue; the sensor is only touched once both are in.
//!
//! A single `Sequencer` exists per system. Starting a calibration replaces
//! whatever sequence was pending, and a continue with nothing pending is an
//! error.

use std::cell::RefCell;
use std::rc::Weak;

use crate::belay::{Belay, BelayHandle};
use crate::config::PositionCalibration;
use crate::error::{BelayError, Result};

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CalibrationStep {
    AwaitingExpanded,
    AwaitingCompressed { expanded_reading: f64 },
}

/// Result of advancing a sequence.
#[derive(Debug, Clone, PartialEq)]
pub enum SequenceProgress {
    /// More input is needed; the message tells the operator what to do.
    Prompt(String),
    Done(PositionCalibration),
}

pub struct CalibrationSequence {
    belay: Weak<RefCell<Belay>>,
    name: String,
    generation: u64,
    step: CalibrationStep,
}

impl core::fmt::Debug for CalibrationSequence {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("CalibrationSequence")
            .field("belay", &self.name)
            .field("step", &self.step)
            .finish()
    }
}

impl CalibrationSequence {
    fn begin(handle: &BelayHandle) -> Result<(Self, String)> {
        let belay = handle.borrow();
        if belay.sensor().as_analog().is_none() {
            return Err(eyre::Report::new(BelayError::Unsupported {
                belay: belay.name().to_string(),
                what: "calibration requires an analog sensor",
            }));
        }
        let name = belay.name().to_string();
        let seq = Self {
            belay: handle.downgrade(),
            name: name.clone(),
            generation: belay.generation(),
            step: CalibrationStep::AwaitingExpanded,
        };
        Ok((seq, expanded_prompt(&name)))
    }

    pub fn belay_name(&self) -> &str {
        &self.name
    }

    pub fn step(&self) -> CalibrationStep {
        self.step
    }

    fn advance(&mut self) -> Result<SequenceProgress> {
        let Some(inner) = self.belay.upgrade() else {
            return Err(eyre::Report::new(BelayError::NoPendingSequence));
        };
        let mut belay = inner.borrow_mut();
        if belay.generation() != self.generation {
            tracing::info!(belay = %self.name, "calibration abandoned after disable");
            return Err(eyre::Report::new(BelayError::NoPendingSequence));
        }
        let raw = belay.read_raw().ok_or_else(|| {
            eyre::Report::new(BelayError::Unsupported {
                belay: self.name.clone(),
                what: "calibration requires an analog sensor",
            })
        })?;
        if !raw.is_finite() {
            return Err(eyre::Report::new(BelayError::InvalidArgument {
                field: "reading",
                reason: format!("analog input returned {raw}"),
            }));
        }
        match self.step {
            CalibrationStep::AwaitingExpanded => {
                tracing::debug!(belay = %self.name, raw, "captured expanded reading");
                self.step = CalibrationStep::AwaitingCompressed {
                    expanded_reading: raw,
                };
                Ok(SequenceProgress::Prompt(format!(
                    "belay {}: expanded reading {raw:.6}. Hold the slider fully compressed, then CONTINUE",
                    self.name
                )))
            }
            CalibrationStep::AwaitingCompressed { expanded_reading } => {
                let calibration = PositionCalibration {
                    expanded_reading,
                    compressed_reading: raw,
                };
                belay.set_calibration(calibration)?;
                tracing::info!(
                    belay = %self.name,
                    expanded_reading,
                    compressed_reading = raw,
                    "slider calibration updated"
                );
                Ok(SequenceProgress::Done(calibration))
            }
        }
    }
}

fn expanded_prompt(name: &str) -> String {
    format!("belay {name}: hold the slider fully expanded, then CONTINUE")
}

/// System-wide slot for the pending suspend/resume sequence.
#[derive(Debug, Default)]
pub struct Sequencer {
    pending: Option<CalibrationSequence>,
}

impl Sequencer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pending(&self) -> Option<&CalibrationSequence> {
        self.pending.as_ref()
    }

    /// Start calibrating `belay`, replacing any pending sequence.
    pub fn start_calibration(&mut self, belay: &BelayHandle) -> Result<String> {
        let (seq, prompt) = CalibrationSequence::begin(belay)?;
        if let Some(old) = self.pending.replace(seq) {
            tracing::info!(belay = %old.name, "pending calibration replaced");
        }
        Ok(prompt)
    }

    /// Advance the pending sequence. A failed step ends the sequence and
    /// leaves the existing calibration in place.
    pub fn continue_pending(&mut self) -> Result<SequenceProgress> {
        let mut seq = self
            .pending
            .take()
            .ok_or_else(|| eyre::Report::new(BelayError::NoPendingSequence))?;
        let progress = seq.advance()?;
        if matches!(progress, SequenceProgress::Prompt(_)) {
            self.pending = Some(seq);
        }
        Ok(progress)
    }
}
