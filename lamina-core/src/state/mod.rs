//! Print job state machine
//!
//! Defines the job-level behavior around layer separation.
//! The state machine is explicit, finite, and deterministic.

pub mod events;
pub mod machine;

pub use events::Event;
pub use machine::{FaultKind, JobState};
