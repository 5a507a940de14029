//! Separation errors

use super::plan::Phase;
use crate::motion::Axis;
use crate::state::FaultKind;
use crate::traits::ActuatorFault;

/// Why a layer separation failed
///
/// Every error ends the layer; the print engine decides whether to retry
/// the layer or stop the job, guided by [`SeparationError::is_fatal`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SeparationError {
    /// A profile name is not registered for the axis
    ProfileNotFound(Axis),
    /// Tilt cycle count outside 1..=MAX_TILT_CYCLES
    InvalidCycleCount,
    /// A move did not finish within its watchdog window
    MotionTimeout {
        phase: Phase,
        axis: Axis,
        /// Stall recovery already ran in this phase
        recovery_ran: bool,
    },
    /// Stall recovery could not bring the tilt to its endstop
    StallUnrecovered,
    /// Driver-level failure
    Actuator(ActuatorFault),
}

impl SeparationError {
    /// Check if the job has to stop
    ///
    /// Only a timeout before any recovery in its phase may be retried.
    pub fn is_fatal(&self) -> bool {
        !matches!(
            self,
            SeparationError::MotionTimeout {
                recovery_ran: false,
                ..
            }
        )
    }

    /// Fault category for the job state machine
    pub fn fault_kind(&self) -> FaultKind {
        match self {
            SeparationError::ProfileNotFound(_) | SeparationError::InvalidCycleCount => {
                FaultKind::Configuration
            }
            SeparationError::MotionTimeout { .. } => FaultKind::MotionTimeout,
            SeparationError::StallUnrecovered => FaultKind::StallUnrecovered,
            SeparationError::Actuator(_) => FaultKind::Actuator,
        }
    }
}

impl From<ActuatorFault> for SeparationError {
    fn from(fault: ActuatorFault) -> Self {
        SeparationError::Actuator(fault)
    }
}
