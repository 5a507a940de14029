//! Hardware driver implementations
//!
//! This crate provides concrete implementations of the traits defined
//! in lamina-core:
//!
//! - Motion controller over position steppers and endstop inputs
//! - Stepper drivers (TMC2209 torque programming over UART)

#![cfg_attr(not(test), no_std)]
#![deny(unsafe_code)]

#[macro_use]
mod fmt;

pub mod motion;
pub mod stepper;
