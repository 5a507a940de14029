//! Motion controller trait
//!
//! The sequencer's only view of the actuators. A controller executes one
//! profiled move at a time and blocks until the axis stops, reporting how
//! the move ended. Tilt positions are microsteps, tower positions are
//! nanometres of platform travel.

use crate::motion::{Axis, MoveResult};
use crate::profiles::MovingProfile;

/// Actuator faults reported by a motion controller
///
/// Faults are escalated immediately; only a watchdog expiry
/// ([`MoveResult::TimedOut`]) may be retried by the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ActuatorFault {
    /// Communication error with the driver (UART/SPI)
    Communication,
    /// Axis stalled outside of a move that allows it
    Stalled,
    /// Driver over-temperature
    OverTemperature,
    /// Axis position is unknown
    NotHomed,
    /// Target outside the axis travel
    OutOfBounds,
    /// Command rejected while the axis is moving
    Busy,
    /// Axis has no endstop input
    NoEndstop,
}

/// Profiled two-axis motion controller
pub trait MotionController {
    /// Make a profile the active one for its axis
    ///
    /// Subsequent moves on `axis` use this profile's ramp and torque.
    fn activate_profile(&mut self, axis: Axis, profile: &MovingProfile)
        -> Result<(), ActuatorFault>;

    /// Move an axis to an absolute position and wait for it to stop
    fn move_to(&mut self, axis: Axis, position: i32) -> Result<MoveResult, ActuatorFault>;

    /// Move an axis by a relative distance and wait for it to stop
    fn move_relative(&mut self, axis: Axis, delta: i32) -> Result<MoveResult, ActuatorFault>;

    /// Check the endstop input of an axis
    fn endstop_reached(&mut self, axis: Axis) -> Result<bool, ActuatorFault>;

    /// Current position of an axis
    fn position(&mut self, axis: Axis) -> Result<i32, ActuatorFault>;

    /// Overwrite the position counter of an axis without moving
    fn set_position(&mut self, axis: Axis, position: i32) -> Result<(), ActuatorFault>;

    /// Blocking wait
    ///
    /// A duration of 0 returns immediately.
    fn wait(&mut self, duration_ms: u32) -> Result<(), ActuatorFault>;
}

impl<M: MotionController + ?Sized> MotionController for &mut M {
    fn activate_profile(
        &mut self,
        axis: Axis,
        profile: &MovingProfile,
    ) -> Result<(), ActuatorFault> {
        (**self).activate_profile(axis, profile)
    }

    fn move_to(&mut self, axis: Axis, position: i32) -> Result<MoveResult, ActuatorFault> {
        (**self).move_to(axis, position)
    }

    fn move_relative(&mut self, axis: Axis, delta: i32) -> Result<MoveResult, ActuatorFault> {
        (**self).move_relative(axis, delta)
    }

    fn endstop_reached(&mut self, axis: Axis) -> Result<bool, ActuatorFault> {
        (**self).endstop_reached(axis)
    }

    fn position(&mut self, axis: Axis) -> Result<i32, ActuatorFault> {
        (**self).position(axis)
    }

    fn set_position(&mut self, axis: Axis, position: i32) -> Result<(), ActuatorFault> {
        (**self).set_position(axis, position)
    }

    fn wait(&mut self, duration_ms: u32) -> Result<(), ActuatorFault> {
        (**self).wait(duration_ms)
    }
}
