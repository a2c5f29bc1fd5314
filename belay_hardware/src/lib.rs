//! Simulated and GPIO-backed collaborators for the belay core.
//!
//! The simulation backend is always built; the GPIO switch reader needs the
//! `hardware` feature and a Linux target.
pub mod error;
pub mod sim;

#[cfg(all(feature = "hardware", target_os = "linux"))]
pub mod gpio;

#[cfg(all(feature = "hardware", target_os = "linux"))]
pub use gpio::GpioSwitch;
pub use sim::{
    SimAnalog, SimExtruder, SimFilamentDriver, SimMotionPlan, SimMove, SimRegistry, SimSlider,
    SimStepper,
};
