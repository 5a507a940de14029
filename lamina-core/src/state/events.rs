//! Events that trigger job state transitions

use super::machine::FaultKind;

/// Events that can trigger state transitions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Event {
    // Job control events
    /// Configuration accepted, job may start
    JobStarted,
    /// Operator requested abort
    AbortRequested,
    /// Operator decided to retry the failed layer
    RetryLayer,
    /// Operator acknowledged a fault
    AcknowledgeFault,

    // Sequencer events
    /// Layer separation started
    SeparationStarted,
    /// Layer separation completed
    SeparationCompleted,
    /// Separation after the last layer completed
    LastLayerCompleted,
    /// Resin stirring started
    StirringStarted,
    /// Resin stirring completed
    StirringCompleted,
    /// Separation failed with a retryable error
    LayerFailed,

    // Safety events
    /// Fatal fault detected
    FaultDetected(FaultKind),
}

impl Event {
    /// Check if this event is operator-initiated
    pub fn is_operator_event(&self) -> bool {
        matches!(
            self,
            Event::JobStarted | Event::AbortRequested | Event::RetryLayer | Event::AcknowledgeFault
        )
    }

    /// Check if this event comes from the sequencer
    pub fn is_sequencer_event(&self) -> bool {
        matches!(
            self,
            Event::SeparationStarted
                | Event::SeparationCompleted
                | Event::LastLayerCompleted
                | Event::StirringStarted
                | Event::StirringCompleted
                | Event::LayerFailed
        )
    }

    /// Check if this event indicates a fault
    pub fn is_fault_event(&self) -> bool {
        matches!(self, Event::FaultDetected(_))
    }
}
