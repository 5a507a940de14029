//! Job state machine definition
//!
//! Whether the sequencer may drive the actuators is a function of the
//! current state; every sequencer outcome maps to an event.

use super::events::Event;

/// Print job states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum JobState {
    /// No job loaded
    Idle,
    /// Between layers, waiting for the next separation
    Ready,
    /// Layer separation in progress
    Separating,
    /// Resin stirring in progress
    Stirring,
    /// Separation failed with a retryable error; operator decides
    LayerFailed,
    /// Last layer released
    Finished,
    /// Operator aborted the job
    Aborted,
    /// Fatal fault; actuators must not move
    Fault(FaultKind),
}

/// Types of fatal faults
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum FaultKind {
    /// Unknown profile or invalid cycle count
    Configuration,
    /// Driver-level failure
    Actuator,
    /// Tilt could not be freed; likely mechanical obstruction
    StallUnrecovered,
    /// Move timed out after recovery already ran
    MotionTimeout,
}

impl JobState {
    /// Check if this state allows actuator motion
    pub fn motion_allowed(&self) -> bool {
        matches!(self, JobState::Separating | JobState::Stirring)
    }

    /// Check if this is a fault state
    pub fn is_fault(&self) -> bool {
        matches!(self, JobState::Fault(_))
    }

    /// Check if the job has ended
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobState::Finished | JobState::Aborted | JobState::Fault(_)
        )
    }

    /// Process an event and return the next state
    ///
    /// This is the core state transition logic.
    pub fn transition(self, event: Event) -> Self {
        use Event::*;
        use JobState::*;

        match (self, event) {
            // Idle transitions
            (Idle, JobStarted) => Ready,
            (Idle, FaultDetected(kind)) => Fault(kind),

            // Ready transitions
            (Ready, SeparationStarted) => Separating,
            (Ready, StirringStarted) => Stirring,
            (Ready, AbortRequested) => Aborted,
            (Ready, FaultDetected(kind)) => Fault(kind),

            // Separating transitions
            (Separating, SeparationCompleted) => Ready,
            (Separating, LastLayerCompleted) => Finished,
            (Separating, Event::LayerFailed) => JobState::LayerFailed,
            (Separating, AbortRequested) => Aborted,
            (Separating, FaultDetected(kind)) => Fault(kind),

            // Stirring transitions
            (Stirring, StirringCompleted) => Ready,
            (Stirring, Event::LayerFailed) => JobState::LayerFailed,
            (Stirring, AbortRequested) => Aborted,
            (Stirring, FaultDetected(kind)) => Fault(kind),

            // LayerFailed transitions
            (JobState::LayerFailed, RetryLayer) => Ready,
            (JobState::LayerFailed, AbortRequested) => Aborted,
            (JobState::LayerFailed, FaultDetected(kind)) => Fault(kind),

            // A finished or aborted job may be followed by a new one
            (Finished, JobStarted) => Ready,
            (Aborted, JobStarted) => Ready,

            // Fault transitions
            (Fault(_), AcknowledgeFault) => Idle,

            // Default: stay in current state
            _ => self,
        }
    }
}
