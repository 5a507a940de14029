//! Hardware abstraction traits
//!
//! These traits define the interface between the separation logic and
//! the board-specific implementations.

pub mod abort;
pub mod clock;
pub mod motion;
pub mod stepper;
pub mod telemetry;

pub use abort::AbortSignal;
pub use clock::Clock;
pub use motion::{ActuatorFault, MotionController};
pub use stepper::{PositionStepperDriver, RampConfig, StepperError, TorqueControl};
pub use telemetry::{NullTelemetry, PhaseOutcome, PhaseRecord, TelemetrySink};

#[cfg(feature = "defmt")]
pub use telemetry::DefmtTelemetry;
