use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum BelayError {
    #[error("actuator error: {0}")]
    Actuator(String),
    #[error("actuator fault: {0}")]
    ActuatorFault(String),
    #[error("Conditions not met to enable belay {0}")]
    EnableRefused(String),
    #[error("Conditions not met to disable belay {0}")]
    DisableRefused(String),
    #[error("no pending sequence to continue")]
    NoPendingSequence,
    #[error("belay {belay}: {what}")]
    Unsupported { belay: String, what: &'static str },
    #[error("invalid argument {field}: {reason}")]
    InvalidArgument { field: &'static str, reason: String },
    #[error("unknown belay {0}")]
    UnknownBelay(String),
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum BuildError {
    #[error("missing slider sensor")]
    MissingSensor,
    #[error("missing secondary extruder")]
    MissingExtruder,
    #[error("missing direction monitor")]
    MissingMonitor,
    #[error("analog sensor needs an analog input")]
    MissingAnalogInput,
    #[error("analog sensor needs the primary extruder distance")]
    MissingPrimaryExtruder,
    #[error("unknown extruder {0}")]
    UnknownExtruder(String),
    #[error("invalid config {field}: {reason}")]
    InvalidConfig { field: &'static str, reason: &'static str },
}

impl BuildError {
    pub(crate) fn invalid(field: &'static str, reason: &'static str) -> eyre::Report {
        eyre::Report::new(BuildError::InvalidConfig { field, reason })
    }
}

pub type Result<T> = eyre::Result<T>;
pub use eyre::Report;
