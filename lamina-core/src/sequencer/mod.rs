//! Layer separation sequencer
//!
//! Builds a separation plan from the layer's parameter set and runs it
//! against the motion controller.

pub mod error;
pub mod executor;
pub mod plan;

pub use error::SeparationError;
pub use executor::{LayerSeparationResult, SeparationReport, Sequencer, SequencerState};
pub use plan::{
    Phase, PhaseDescriptor, PhaseStep, SeparationPlan, TiltStroke, TowerMove, MAX_PHASES,
};
