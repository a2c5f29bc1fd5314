//! Slider switches wired to Raspberry Pi GPIO.
use belay_traits::{DigitalInput, HwResult};
use rppal::gpio::{Gpio, InputPin};

use crate::error::{HwError, Result};

/// A limit switch on a GPIO input with the internal pull-up enabled.
///
/// `is_high` reports whether the switch is triggered; with `active_low`
/// set a grounded pin counts as triggered.
pub struct GpioSwitch {
    pin: InputPin,
    active_low: bool,
}

impl GpioSwitch {
    pub fn open(pin: u8, active_low: bool) -> Result<Self> {
        let gpio = Gpio::new().map_err(|e| HwError::Gpio(e.to_string()))?;
        let pin = gpio
            .get(pin)
            .map_err(|e| HwError::Gpio(format!("open switch pin {pin}: {e}")))?
            .into_input_pullup();
        tracing::debug!(pin = pin.pin(), active_low, "switch input opened");
        Ok(Self { pin, active_low })
    }
}

impl DigitalInput for GpioSwitch {
    fn is_high(&mut self) -> HwResult<bool> {
        Ok(self.pin.is_high() != self.active_low)
    }
}
