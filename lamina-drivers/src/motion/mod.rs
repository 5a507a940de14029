//! Motion controller implementations

pub mod controller;
pub mod endstop;

pub use controller::{AxisDrive, StepperMotionController, DEFAULT_POLL_MS};
pub use endstop::EndstopInput;
