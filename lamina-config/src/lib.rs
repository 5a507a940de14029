//! Configuration loading and persistence
//!
//! Parses the printer configuration and exposure profiles from TOML,
//! applies the loader's validation policy and stores validated
//! configuration as a versioned postcard snapshot.

#![cfg_attr(not(test), no_std)]
#![deny(unsafe_code)]

extern crate alloc;

#[macro_use]
mod fmt;

pub mod error;
pub mod parse;
pub mod snapshot;
pub mod validate;

pub use error::ConfigError;
pub use parse::{parse_exposure_profile, parse_printer_config};
pub use snapshot::{decode_snapshot, encode_snapshot};
pub use validate::{validate_exposure_profile, validate_parameters, validate_printer_config};
