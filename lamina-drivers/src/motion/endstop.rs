//! Endstop switch input

use embedded_hal::digital::InputPin;
use lamina_core::traits::ActuatorFault;

/// Endstop switch on a GPIO input
pub struct EndstopInput<P> {
    pin: P,
    active_high: bool,
}

impl<P: InputPin> EndstopInput<P> {
    /// Switch reading high when triggered
    pub fn active_high(pin: P) -> Self {
        Self {
            pin,
            active_high: true,
        }
    }

    /// Switch reading low when triggered (pull-up, normally open)
    pub fn active_low(pin: P) -> Self {
        Self {
            pin,
            active_high: false,
        }
    }

    /// Check if the switch is triggered
    pub fn is_triggered(&mut self) -> Result<bool, ActuatorFault> {
        let high = self
            .pin
            .is_high()
            .map_err(|_| ActuatorFault::Communication)?;
        Ok(high == self.active_high)
    }
}
