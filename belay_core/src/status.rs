//! Status snapshot of a belay.

use crate::slider::SensorStatus;

/// Point-in-time view of one belay, as reported to the operator.
#[derive(Debug, Clone, PartialEq)]
pub struct BelayStatus {
    pub name: String,
    pub enabled: bool,
    pub user_disable: bool,
    /// Human-readable slider state, e.g. "compressed" or "position 1.250 mm".
    pub state: String,
    /// Slider position scaled to `[-1, 1]`.
    pub position: f64,
    /// Multiplier most recently applied to the secondary extruder.
    pub multiplier: f64,
    pub direction: bool,
    pub sensor: SensorStatus,
}

impl BelayStatus {
    /// One-line operator summary.
    pub fn summary(&self) -> String {
        format!("belay {}: {}", self.name, self.state)
    }
}
