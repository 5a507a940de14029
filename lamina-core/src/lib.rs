//! Board-agnostic layer separation logic for the SLA printer firmware
//!
//! This crate contains the application logic that peels a cured layer off
//! the vat film between two exposures, independent of the concrete motion
//! hardware:
//!
//! - Hardware abstraction traits (motion controller, steppers, telemetry)
//! - Moving profile catalog and per-layer parameter selection
//! - Separation plan and the sequencer executing it
//! - Stall detection and bounded recovery on the tilt axis
//! - Print job state machine
//! - Configuration type definitions

#![cfg_attr(not(test), no_std)]
#![deny(unsafe_code)]

#[macro_use]
mod fmt;

pub mod config;
pub mod exposure;
pub mod job;
pub mod motion;
pub mod profiles;
pub mod safety;
pub mod sequencer;
pub mod state;
pub mod traits;

#[cfg(test)]
mod testing;
