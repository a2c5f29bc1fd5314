//! Maps `Box<dyn Error>` from trait boundaries to typed `BelayError`.
//!
//! The traits in `belay_traits` use `Box<dyn Error + Send + Sync>` so any host
//! can plug in; this module converts those to our typed error enum, with an
//! optional feature-gated path for `belay_hardware::HwError` downcasting.

use crate::error::BelayError;

/// Map a trait-boundary error to a typed `BelayError`.
///
/// Attempts to downcast known hardware error types first, then falls back
/// to the error's display text.
pub fn map_hw_error(e: &(dyn std::error::Error + 'static)) -> BelayError {
    #[cfg(feature = "hardware-errors")]
    {
        if let Some(hw) = e.downcast_ref::<belay_hardware::error::HwError>() {
            return BelayError::ActuatorFault(hw.to_string());
        }
    }

    BelayError::Actuator(e.to_string())
}
