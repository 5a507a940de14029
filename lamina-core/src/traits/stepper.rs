//! Stepper driver traits
//!
//! These traits abstract over the step generator (PIO, timer, motion
//! chip) and the driver's torque settings (TMC2209 UART registers, or
//! nothing on drivers without a configuration interface).

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use super::motion::ActuatorFault;
use crate::motion::Axis;
use crate::profiles::{MovingProfile, ProfileParams};

/// Errors that can occur with stepper operations
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum StepperError {
    /// Communication error with driver (UART/SPI)
    CommunicationError,
    /// Motor stall detected
    StallDetected,
    /// Driver overtemperature
    OverTemperature,
    /// Invalid configuration
    InvalidConfig,
    /// Command not allowed while the motor moves
    Busy,
}

impl From<StepperError> for ActuatorFault {
    fn from(err: StepperError) -> Self {
        match err {
            StepperError::CommunicationError => ActuatorFault::Communication,
            StepperError::StallDetected => ActuatorFault::Stalled,
            StepperError::OverTemperature => ActuatorFault::OverTemperature,
            StepperError::InvalidConfig => ActuatorFault::OutOfBounds,
            StepperError::Busy => ActuatorFault::Busy,
        }
    }
}

/// Step generator ramp
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct RampConfig {
    /// Step rate at the start and end of a move (steps/s)
    pub start_rate: u16,
    /// Cruise step rate (steps/s)
    pub max_rate: u16,
    /// Acceleration (steps/s²)
    pub acceleration: u16,
    /// Deceleration (steps/s²)
    pub deceleration: u16,
}

impl From<&ProfileParams> for RampConfig {
    fn from(params: &ProfileParams) -> Self {
        Self {
            start_rate: params.starting_steprate,
            max_rate: params.maximum_steprate,
            acceleration: params.acceleration,
            deceleration: params.deceleration,
        }
    }
}

/// Position-controlled stepper (tilt, tower)
///
/// Positions are in microsteps. Moves are started here and polled for
/// completion by the motion controller.
pub trait PositionStepperDriver {
    /// Load the ramp used by subsequent moves
    ///
    /// Must only be called while the motor is stopped.
    fn configure_ramp(&mut self, ramp: RampConfig) -> Result<(), StepperError>;

    /// Start a move to an absolute position
    fn start_move(&mut self, target: i32) -> Result<(), StepperError>;

    /// Get the current position
    fn position(&self) -> i32;

    /// Overwrite the position counter
    fn set_position(&mut self, position: i32);

    /// Check if a move is in progress
    fn is_moving(&self) -> bool;

    /// Stop immediately
    fn stop(&mut self);

    /// Check if a stall has been detected
    ///
    /// For TMC drivers with StallGuard, this indicates the motor has hit
    /// an obstruction or the mechanical end of travel.
    fn is_stalled(&self) -> bool;

    /// Clear any stall flag
    fn clear_stall(&mut self);
}

/// Driver current and stall detection settings
pub trait TorqueControl {
    /// Program a profile's torque settings for an axis
    fn apply(&mut self, axis: Axis, profile: &MovingProfile) -> Result<(), StepperError>;
}

/// Drivers without a configuration interface
impl TorqueControl for () {
    fn apply(&mut self, _axis: Axis, _profile: &MovingProfile) -> Result<(), StepperError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ramp_from_profile() {
        let params = ProfileParams {
            starting_steprate: 200,
            maximum_steprate: 1500,
            acceleration: 300,
            deceleration: 350,
            current: 20,
            ..Default::default()
        };
        let ramp = RampConfig::from(&params);
        assert_eq!(ramp.start_rate, 200);
        assert_eq!(ramp.max_rate, 1500);
        assert_eq!(ramp.deceleration, 350);
    }

    #[test]
    fn test_fault_mapping() {
        assert_eq!(
            ActuatorFault::from(StepperError::CommunicationError),
            ActuatorFault::Communication
        );
        assert_eq!(
            ActuatorFault::from(StepperError::StallDetected),
            ActuatorFault::Stalled
        );
        assert_eq!(ActuatorFault::from(StepperError::Busy), ActuatorFault::Busy);
    }
}
