//! Safety supervision
//!
//! Detects a tilt that did not reach its endstop and runs bounded recovery.

pub mod stall_guard;

pub use stall_guard::{EndstopState, RecoveryBudget, RecoveryOutcome, StallGuard, StallReport};
