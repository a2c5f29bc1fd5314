//! Collaborator contracts consumed by the belay control core.
//!
//! The motion planner, the primary extruder, the ADC/GPIO drivers and the
//! physical secondary-extruder objects all live in the host. The core only
//! sees them through these traits.
pub mod clock;

pub use clock::{Clock, ManualClock, MonotonicClock};

pub type HwResult<T> = Result<T, Box<dyn std::error::Error + Send + Sync>>;

/// One-shot callback run once the most recently queued move is committed.
/// Receives the committed end position of the primary extruder axis.
pub type FlushCallback = Box<dyn FnOnce(f64)>;

/// The most recently queued (not yet committed) move.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QueuedMove {
    /// Extruder-axis end position of the move.
    pub extruder_end: f64,
}

/// Read contract of the host motion planner.
pub trait MotionPlan {
    /// The most recently queued move, or `None` when the queue is empty.
    fn last_queued_move(&self) -> Option<QueuedMove>;
    /// Run `callback` once the queued moves are irrevocably committed.
    fn register_flush_callback(&mut self, callback: FlushCallback);
}

/// Cumulative distance extruded by the primary extruder.
pub trait ExtruderDistance {
    fn distance_at(&self, time: f64) -> f64;
}

/// On-demand access to an analog input's latest conversion.
pub trait AnalogInput {
    fn last_reading(&self) -> f64;
}

/// A filament drive that accepts a speed multiplier directly.
pub trait FilamentDriver {
    fn set_multiplier(&mut self, multiplier: f64) -> HwResult<()>;
    /// Whether the drive is currently mechanically synced to the extruder.
    fn is_synced(&self) -> bool;
}

/// A stepper whose effective speed is set through its rotation distance.
pub trait Stepper {
    fn rotation_distance(&self) -> f64;
    fn set_rotation_distance(&mut self, distance: f64) -> HwResult<()>;
}

/// Name lookup for external actuator objects.
pub trait ActuatorRegistry {
    fn filament_driver(&self) -> Option<Box<dyn FilamentDriver>>;
    fn stepper(&self, name: &str) -> Option<Box<dyn Stepper>>;
}

/// A digital input polled by a background sampler.
pub trait DigitalInput {
    fn is_high(&mut self) -> HwResult<bool>;
}
