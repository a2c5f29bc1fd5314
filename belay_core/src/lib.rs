#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]
#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]
//! Closed-loop secondary extruder synchronization (hardware-agnostic).
//!
//! A belay watches a spring-loaded filament buffer ("slider") sitting between
//! the primary extruder and a secondary drive, and nudges the secondary
//! drive's speed so the buffer never bottoms out or runs dry. All hardware
//! and host interaction goes through the traits in `belay_traits`.
//!
//! ## Architecture
//!
//! - **Direction**: net extrusion direction from committed motion (`direction`)
//! - **Sensors**: single switch, dual switch, analog + PID (`slider`, `position`, `pid`)
//! - **Actuators**: filament driver or extruder stepper (`extruder`)
//! - **State machine**: enable/disable gating per belay (`belay`)
//! - **Operator surface**: commands, calibration and status (`commands`, `calibration`, `status`)
//!
//! Everything runs on the host's single event loop thread. Shared state is
//! held in `Rc<RefCell<_>>` and no borrow is held across a callback.

pub mod belay;
pub mod builder;
pub mod calibration;
pub mod commands;
pub mod config;
pub mod conversions;
pub mod direction;
pub mod error;
pub mod extruder;
pub mod hw_error;
pub mod mocks;
pub mod pid;
pub mod position;
pub mod sampler;
pub mod slider;
pub mod status;
pub mod util;

pub use belay::{Belay, BelayHandle};
pub use builder::{BelayBuilder, Missing, Set};
pub use calibration::{CalibrationStep, SequenceProgress, Sequencer};
pub use commands::{Action, BelaySystem, Command, Reply};
pub use config::{AnalogCfg, ExtruderCfg, Multipliers, PidCfg, PositionCalibration, SensorCfg};
pub use direction::DirectionMonitor;
pub use error::{BelayError, BuildError, Result};
pub use extruder::SecondaryExtruder;
pub use pid::PidController;
pub use position::PositionSensor;
pub use slider::{MultiplierBounds, MultiplierUpdate, SensorStatus, SliderSensor};
pub use status::BelayStatus;
